//! Diya wire protocol - framing, checksum and payload cipher for bootstrapping
//! headless devices over UDP.
//!
//! One frame is one datagram: a clear magic header, a clear CRC-16 field, a
//! clear command byte and an enciphered payload. The CRC covers the plaintext
//! payload, so it doubles as the implicit authentication check: a frame
//! deciphered under the wrong key turns into garbage that fails it.

pub mod checksum;
pub mod cipher;
pub mod frame;
pub mod provision;
pub mod report;

pub use frame::{ReceiveCommand, SendCommand};
pub use provision::BootstrapData;
pub use report::{DeviceReport, WirelessNetwork};
