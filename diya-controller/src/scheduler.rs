//! Delayed, cancelable event scheduling.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use crate::engine::Event;

/// Handle to one pending scheduled event.
pub type TaskId = u64;

/// Schedule-callback-after-duration capability consumed by the engine.
///
/// Implementations must deliver events in non-decreasing fire-time order,
/// FIFO among events sharing a fire time, so retransmission cycles replay
/// deterministically.
pub trait TaskScheduler {
    /// Schedules `event` to fire after `delay`.
    fn schedule(&mut self, delay: Duration, event: Event) -> TaskId;
    /// Cancels a pending event. Unknown or already-fired ids are a no-op.
    fn cancel(&mut self, id: TaskId);
}

/// Deterministic single-threaded scheduler backed by a virtual clock.
///
/// Cloning yields another handle onto the same queue, so the engine can own
/// one handle while the event loop (or a test) drains the other. The queue
/// never consults wall-clock time: [`pop_next`](Self::pop_next) advances
/// the virtual clock to the fire time of the earliest pending entry.
#[derive(Clone, Default)]
pub struct EventQueue {
    inner: Rc<RefCell<QueueInner>>,
}

#[derive(Default)]
struct QueueInner {
    now: Duration,
    next_seq: u64,
    next_id: TaskId,
    entries: BTreeMap<(Duration, u64), (TaskId, Event)>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The virtual clock's current position.
    pub fn now(&self) -> Duration {
        self.inner.borrow().now
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns the earliest pending event together with its
    /// fire time, advancing the virtual clock to it.
    pub fn pop_next(&self) -> Option<(Duration, Event)> {
        let mut inner = self.inner.borrow_mut();
        let key = *inner.entries.keys().next()?;
        let (_, event) = inner.entries.remove(&key)?;
        inner.now = key.0;
        Some((key.0, event))
    }
}

impl TaskScheduler for EventQueue {
    fn schedule(&mut self, delay: Duration, event: Event) -> TaskId {
        let mut inner = self.inner.borrow_mut();
        let fire_at = inner.now + delay;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.insert((fire_at, seq), (id, event));
        id
    }

    fn cancel(&mut self, id: TaskId) {
        let mut inner = self.inner.borrow_mut();
        inner.entries.retain(|_, (entry_id, _)| *entry_id != id);
    }
}

/// Tokio-backed scheduler: fired events arrive on an mpsc channel that the
/// caller's event loop drains into the engine.
#[cfg(feature = "async")]
pub mod tokio_scheduler {
    use std::collections::HashMap;
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::task::AbortHandle;

    use super::{TaskId, TaskScheduler};
    use crate::engine::Event;

    pub struct TokioScheduler {
        sender: mpsc::UnboundedSender<Event>,
        tasks: HashMap<TaskId, AbortHandle>,
        next_id: TaskId,
    }

    impl TokioScheduler {
        /// Creates a scheduler and the receiving end for the event loop.
        /// Must run inside a tokio runtime.
        pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
            let (sender, receiver) = mpsc::unbounded_channel();
            let scheduler = TokioScheduler { sender, tasks: HashMap::new(), next_id: 0 };
            (scheduler, receiver)
        }
    }

    impl TaskScheduler for TokioScheduler {
        fn schedule(&mut self, delay: Duration, event: Event) -> TaskId {
            let id = self.next_id;
            self.next_id += 1;
            let sender = self.sender.clone();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = sender.send(event);
            });
            self.tasks.insert(id, handle.abort_handle());
            // Drop bookkeeping for tasks that already fired.
            self.tasks.retain(|_, h| !h.is_finished());
            id
        }

        fn cancel(&mut self, id: TaskId) {
            if let Some(handle) = self.tasks.remove(&id) {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn delivers_in_fire_time_order() {
        let mut queue = EventQueue::new();
        queue.schedule(millis(300), Event::DetectFinished);
        queue.schedule(millis(100), Event::Detect);
        queue.schedule(millis(200), Event::Detect);

        assert_eq!(queue.pop_next().map(|(t, _)| t), Some(millis(100)));
        assert_eq!(queue.pop_next().map(|(t, _)| t), Some(millis(200)));
        let (time, event) = queue.pop_next().unwrap();
        assert_eq!(time, millis(300));
        assert_eq!(event, Event::DetectFinished);
        assert!(queue.pop_next().is_none());
    }

    #[test]
    fn fifo_among_equal_fire_times() {
        let mut queue = EventQueue::new();
        queue.schedule(millis(100), Event::Detect);
        queue.schedule(millis(100), Event::DetectFinished);

        assert_eq!(queue.pop_next().map(|(_, e)| e), Some(Event::Detect));
        assert_eq!(queue.pop_next().map(|(_, e)| e), Some(Event::DetectFinished));
    }

    #[test]
    fn cancel_removes_one_pending_entry() {
        let mut queue = EventQueue::new();
        let id = queue.schedule(millis(100), Event::Detect);
        queue.schedule(millis(200), Event::DetectFinished);
        queue.cancel(id);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop_next().map(|(_, e)| e), Some(Event::DetectFinished));
        // Canceling a fired id is a no-op.
        queue.cancel(id);
    }

    #[test]
    fn delays_are_relative_to_the_advancing_clock() {
        let mut queue = EventQueue::new();
        queue.schedule(millis(100), Event::Detect);
        queue.pop_next();
        assert_eq!(queue.now(), millis(100));

        queue.schedule(millis(50), Event::DetectFinished);
        assert_eq!(queue.pop_next().map(|(t, _)| t), Some(millis(150)));
    }

    #[test]
    fn cloned_handles_share_the_queue() {
        let mut writer = EventQueue::new();
        let reader = writer.clone();
        writer.schedule(millis(10), Event::Detect);
        assert_eq!(reader.len(), 1);
        assert!(reader.pop_next().is_some());
        assert!(writer.is_empty());
    }
}
