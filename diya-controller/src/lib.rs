//! Diya controller engine - discovers, binds and provisions headless
//! devices on the local network.
//!
//! The engine drives three exchanges over the [`diya_proto`] wire format:
//!
//! 1. **Detection**: a bounded burst of HELLO broadcasts carrying the app
//!    nonce; reachable devices answer with a status report.
//! 2. **Binding**: an unclaimed device (one still encrypting with the
//!    factory-default key) is answered with a BIND frame carrying this
//!    controller's key.
//! 3. **Bootstrap**: bound devices receive the Wi-Fi credentials and extra
//!    configuration in a SET_DATA frame.
//!
//! All registry mutation happens on one logical thread by draining a
//! scheduler into [`engine::BootstrapEngine::handle_event`]; packet parsing
//! may run elsewhere but only enqueues. UDP loss and duplication are
//! tolerated by timed retransmission, not acknowledgements.

pub mod device;
pub mod engine;
pub mod registry;
pub mod scheduler;
pub mod transport;

pub use device::{Device, DeviceMode, DeviceState};
pub use engine::{BootstrapEngine, Event, BROADCAST_ADDRESS, RECEIVE_PORT, SEND_PORT};
pub use registry::{ConfigError, DeviceChangeListener, DeviceRegistry, Key, ListenerId};
pub use scheduler::{EventQueue, TaskId, TaskScheduler};
#[cfg(feature = "async")]
pub use scheduler::tokio_scheduler::TokioScheduler;
pub use transport::{Transport, UdpTransport};
