//! The protocol driver: timed HELLO/BIND/BOOTSTRAP exchanges and inbound
//! frame handling.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use diya_proto::frame::{self, ReceiveCommand, SendCommand};
use diya_proto::provision::BootstrapData;
use diya_proto::report::DeviceReport;
use diya_proto::cipher;
use tracing::{debug, trace, warn};

use crate::device::DeviceMode;
use crate::registry::{ConfigError, DeviceRegistry};
use crate::scheduler::{TaskId, TaskScheduler};
use crate::transport::Transport;

/// Port devices listen on.
pub const SEND_PORT: u16 = 8711;

/// Port the controller listens on for device reports.
pub const RECEIVE_PORT: u16 = 8712;

/// Discovery frames go to the local broadcast address.
pub const BROADCAST_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::BROADCAST);

/// Which of the registry's key slots validated an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    Bound,
    Unbound,
}

/// Everything `parse_packet` learned from one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketOutcome {
    /// The frame validated under one of our keys and decoded.
    Report {
        key_class: KeyClass,
        report: DeviceReport,
        from: SocketAddr,
    },
    /// The frame validated under neither key: a device bound elsewhere.
    Foreign { from: SocketAddr },
}

/// Events drained by the single serialized mutation loop.
///
/// Packet parsing and timer firings both funnel into these; one event runs
/// to completion before the next, which is what keeps the index-based
/// change notifications coherent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// One firing of the discovery cycle: broadcast a HELLO.
    Detect,
    /// The discovery cycle has run out of repetitions.
    DetectFinished,
    /// One firing of the provisioning cycle: push SET_DATA to bound devices.
    Bootstrap(BootstrapData),
    /// The provisioning cycle has run out of repetitions.
    BootstrapFinished,
    /// An inbound frame finished parsing and wants its registry side
    /// effects applied.
    BindOrUpdate(PacketOutcome),
}

/// The protocol driver.
///
/// Owns the registry, a transport and a scheduler. Everything that touches
/// device state funnels through [`handle_event`](Self::handle_event) on one
/// logical thread; [`parse_packet`](Self::parse_packet) may run elsewhere
/// but only enqueues.
pub struct BootstrapEngine<T: Transport, S: TaskScheduler> {
    registry: DeviceRegistry,
    transport: T,
    scheduler: S,
    detect_tasks: Vec<TaskId>,
    bootstrap_tasks: Vec<TaskId>,
    detect_cycle: u64,
}

impl<T: Transport, S: TaskScheduler> BootstrapEngine<T, S> {
    /// Creates an engine. `bound_key` is this controller's secret,
    /// `unbound_key` the factory default new devices ship with; both must
    /// be 1..=64 bytes or construction fails.
    pub fn new(
        transport: T,
        scheduler: S,
        bound_key: &[u8],
        unbound_key: &[u8],
        own_ssid: &str,
    ) -> Result<Self, ConfigError> {
        Ok(BootstrapEngine {
            registry: DeviceRegistry::new(bound_key, unbound_key, own_ssid)?,
            transport,
            scheduler,
            detect_tasks: Vec::new(),
            bootstrap_tasks: Vec::new(),
            detect_cycle: 0,
        })
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DeviceRegistry {
        &mut self.registry
    }

    /// Replaces the app nonce carried by subsequent HELLO firings.
    pub fn set_app_nonce(&mut self, nonce: &[u8]) {
        self.registry.set_app_nonce(nonce);
    }

    /// Validates and decodes one inbound datagram.
    ///
    /// Never mutates the registry: a successful parse enqueues an
    /// [`Event::BindOrUpdate`] at zero delay so the side effects run on the
    /// serialized event loop. Malformed or foreign traffic on the shared
    /// port is expected and discarded without error.
    pub fn parse_packet(&mut self, data: &[u8], from: SocketAddr) {
        if !frame::is_header_valid(data) {
            trace!("discarding datagram from {}: bad header", from);
            return;
        }
        let outcome = match self.try_keys(data) {
            Some((key_class, plaintext)) => {
                let command = frame::command_byte(&plaintext)
                    .map(ReceiveCommand::from_u8)
                    .unwrap_or(ReceiveCommand::Unknown);
                if command != ReceiveCommand::WifiList {
                    debug!("ignoring validated frame from {}: unknown command", from);
                    return;
                }
                let Some(payload) = frame::payload(&plaintext) else { return };
                match DeviceReport::from_bytes(payload) {
                    Ok(report) => PacketOutcome::Report { key_class, report, from },
                    Err(err) => {
                        trace!("discarding frame from {}: {}", from, err);
                        return;
                    }
                }
            }
            None => {
                debug!("frame from {} validates under no known key", from);
                PacketOutcome::Foreign { from }
            }
        };
        self.scheduler.schedule(Duration::ZERO, Event::BindOrUpdate(outcome));
    }

    /// Trial-deciphers under the bound key, then the unbound key. The
    /// payload CRC is the oracle for which key the sender used; with a
    /// wrong key the payload decodes to garbage that fails it.
    fn try_keys(&self, data: &[u8]) -> Option<(KeyClass, Vec<u8>)> {
        let candidates = [
            (KeyClass::Bound, self.registry.bound_key()),
            (KeyClass::Unbound, self.registry.unbound_key()),
        ];
        for (key_class, key) in candidates {
            let mut plaintext = data.to_vec();
            cipher::decrypt(
                key.as_slice(),
                self.registry.app_nonce(),
                &mut plaintext[frame::PAYLOAD_OFFSET..],
            );
            if frame::verify_checksum(&plaintext) {
                return Some((key_class, plaintext));
            }
        }
        None
    }

    /// Applies one event's side effects. This is the single mutation point
    /// for the registry; callers drain their scheduler into it from one
    /// logical thread.
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Detect => self.send_hello(),
            Event::DetectFinished => self.finish_detection(),
            Event::Bootstrap(data) => self.send_bootstrap(&data),
            Event::BootstrapFinished => self.registry.notify_changes_finished(),
            Event::BindOrUpdate(outcome) => self.bind_or_update(outcome),
        }
    }

    /// Starts a discovery cycle: `repeats` HELLO broadcasts at `interval`
    /// spacing, then one finished event at `repeats * interval`. Replaces
    /// any discovery cycle still in flight.
    pub fn detect_devices(&mut self, interval: Duration, repeats: u32) {
        self.cancel_detection();
        self.detect_cycle += 1;
        for i in 0..repeats {
            let id = self.scheduler.schedule(interval * i, Event::Detect);
            self.detect_tasks.push(id);
        }
        let id = self.scheduler.schedule(interval * repeats, Event::DetectFinished);
        self.detect_tasks.push(id);
    }

    /// Starts a provisioning cycle over the currently bound devices, with
    /// the same firing shape as [`detect_devices`](Self::detect_devices).
    pub fn bootstrap_devices(&mut self, interval: Duration, repeats: u32, data: BootstrapData) {
        self.cancel_bootstrap();
        for i in 0..repeats {
            let id = self.scheduler.schedule(interval * i, Event::Bootstrap(data.clone()));
            self.bootstrap_tasks.push(id);
        }
        let id = self.scheduler.schedule(interval * repeats, Event::BootstrapFinished);
        self.bootstrap_tasks.push(id);
    }

    /// Cancels the pending remainder of the discovery cycle.
    pub fn cancel_detection(&mut self) {
        for id in self.detect_tasks.drain(..) {
            self.scheduler.cancel(id);
        }
    }

    /// Cancels the pending remainder of the provisioning cycle.
    pub fn cancel_bootstrap(&mut self) {
        for id in self.bootstrap_tasks.drain(..) {
            self.scheduler.cancel(id);
        }
    }

    /// Drops every unselected device; pending provisioning sends are
    /// canceled along with them so nothing stale goes out afterwards.
    pub fn remove_devices_not_selected(&mut self) {
        self.cancel_bootstrap();
        self.registry.remove_devices_not_selected();
    }

    /// Empties the roster and cancels pending provisioning sends.
    pub fn clear_devices(&mut self) {
        self.cancel_bootstrap();
        self.registry.clear_devices();
    }

    fn send_hello(&mut self) {
        if !self.transport.is_ready() {
            return;
        }
        // The nonce is read at fire time - it may have been refreshed since
        // the cycle was scheduled.
        let hello = frame::encode(SendCommand::Hello as u8, self.registry.app_nonce(), None);
        if !self.transport.send(SEND_PORT, BROADCAST_ADDRESS, &hello) {
            warn!("transport rejected HELLO broadcast");
        }
    }

    fn finish_detection(&mut self) {
        // One generation counter: anything still stamped with an older
        // generation went unseen for the whole cycle.
        let cycle = self.detect_cycle;
        let stale: Vec<usize> = self
            .registry
            .devices()
            .iter()
            .enumerate()
            .filter(|(_, d)| d.mode() == DeviceMode::Bound && d.last_seen_cycle() < cycle)
            .map(|(index, _)| index)
            .collect();
        for index in stale {
            if let Some(device) = self.registry.device_mut(index) {
                device.set_mode(DeviceMode::NotInRange);
            }
            self.registry.notify_updated(index, false);
        }
        self.registry.notify_changes_finished();
    }

    fn send_bootstrap(&mut self, data: &BootstrapData) {
        if !self.transport.is_ready() {
            return;
        }
        let payload = data.to_bytes();
        // Only devices confirmed on our key are eligible; every other mode
        // is silently skipped for this firing.
        let frames: Vec<(IpAddr, Vec<u8>)> = self
            .registry
            .devices()
            .iter()
            .filter(|d| d.mode() == DeviceMode::Bound)
            .filter_map(|d| {
                let address = d.address()?;
                let key = d.key()?;
                let datagram = frame::encode(
                    SendCommand::SetData as u8,
                    &payload,
                    Some((key.as_slice(), d.session_nonce())),
                );
                Some((address.ip(), datagram))
            })
            .collect();
        for (ip, bytes) in frames {
            if !self.transport.send(SEND_PORT, ip, &bytes) {
                warn!("transport rejected SET_DATA to {}", ip);
            }
        }
    }

    fn bind_or_update(&mut self, outcome: PacketOutcome) {
        match outcome {
            PacketOutcome::Report { key_class, report, from } => {
                let (key, mode) = match key_class {
                    KeyClass::Bound => (*self.registry.bound_key(), DeviceMode::Bound),
                    KeyClass::Unbound => (*self.registry.unbound_key(), DeviceMode::Unbound),
                };
                let (index, added) = self.registry.upsert(&report.uid, &report.device_name, Some(from));
                let cycle = self.detect_cycle;
                if let Some(device) = self.registry.device_mut(index) {
                    device.update_from_report(mode, &report, key, from, cycle);
                }
                if key_class == KeyClass::Unbound {
                    // Claim it: hand over our key, enciphered under the key
                    // and nonce the device is using right now.
                    self.send_bind(index);
                    if let Some(device) = self.registry.device_mut(index) {
                        device.set_mode(DeviceMode::Binding);
                    }
                }
                self.registry.notify_updated(index, added);
            }
            PacketOutcome::Foreign { from } => {
                // Present but owned by another controller. Record it so a
                // UI can show it; never decode, bind or bootstrap it.
                let uid = format!("@{}", from);
                let (index, added) = self.registry.upsert(&uid, "", Some(from));
                if let Some(device) = self.registry.device_mut(index) {
                    device.set_mode(DeviceMode::ForeignlyBound);
                }
                self.registry.notify_updated(index, added);
            }
        }
    }

    fn send_bind(&mut self, index: usize) {
        if !self.transport.is_ready() {
            return;
        }
        let bound_key = *self.registry.bound_key();
        let Some(device) = self.registry.device(index) else { return };
        let Some(device_key) = device.key() else { return };
        let Some(address) = device.address() else { return };

        let mut payload = Vec::with_capacity(1 + bound_key.len());
        payload.push(bound_key.len() as u8);
        payload.extend_from_slice(bound_key.as_slice());
        let bind = frame::encode(
            SendCommand::Bind as u8,
            &payload,
            Some((device_key.as_slice(), device.session_nonce())),
        );

        let ip = address.ip();
        if !self.transport.send(SEND_PORT, ip, &bind) {
            warn!("transport rejected BIND to {}", ip);
        }
    }
}
