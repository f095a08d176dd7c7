//! Per-device state.

use std::net::SocketAddr;

use diya_proto::report::{DeviceReport, WirelessNetwork};

use crate::registry::Key;

/// Where a device stands in the bind protocol, from this controller's
/// point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    /// Freshly discovered; still encrypts with the shared default key.
    Unbound,
    /// A BIND carrying our key went out; not yet confirmed.
    Binding,
    /// The last successful decryption used our controller key.
    Bound,
    /// Was bound, but missed the most recent detection cycle.
    NotInRange,
    /// Present on the network but bound to another controller; neither of
    /// our keys validates its frames.
    ForeignlyBound,
}

/// Device health as carried in the report's state byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Ok,
    BindFailed,
    BootstrapFailed,
    Unknown,
}

impl DeviceState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => DeviceState::Ok,
            1 => DeviceState::BindFailed,
            2 => DeviceState::BootstrapFailed,
            _ => DeviceState::Unknown,
        }
    }
}

/// One known peer and everything the protocol tracks about it.
///
/// The uid is assigned by firmware and fixed at first observation; all
/// other fields are refreshed wholesale from each valid report.
#[derive(Debug, Clone)]
pub struct Device {
    uid: String,
    device_name: String,
    mode: DeviceMode,
    state: DeviceState,
    address: Option<SocketAddr>,
    networks: Vec<WirelessNetwork>,
    session_nonce: Vec<u8>,
    key: Option<Key>,
    selected: bool,
    last_seen_cycle: u64,
}

impl Device {
    pub fn new(uid: &str, device_name: &str, address: Option<SocketAddr>) -> Self {
        Device {
            uid: uid.to_string(),
            device_name: device_name.to_string(),
            mode: DeviceMode::Unbound,
            state: DeviceState::Ok,
            address,
            networks: Vec::new(),
            session_nonce: Vec::new(),
            key: None,
            selected: false,
            last_seen_cycle: 0,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: DeviceMode) {
        self.mode = mode;
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn address(&self) -> Option<SocketAddr> {
        self.address
    }

    pub fn networks(&self) -> &[WirelessNetwork] {
        &self.networks
    }

    /// The nonce this device generated; outbound frames to it are
    /// enciphered under `(key, session_nonce)`.
    pub fn session_nonce(&self) -> &[u8] {
        &self.session_nonce
    }

    /// The key this device is currently encrypting with, once known.
    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn selected(&self) -> bool {
        self.selected
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    pub(crate) fn last_seen_cycle(&self) -> u64 {
        self.last_seen_cycle
    }

    /// Refreshes everything a status report carries. The uid stays as it
    /// was at first observation.
    pub fn update_from_report(
        &mut self,
        mode: DeviceMode,
        report: &DeviceReport,
        key: Key,
        address: SocketAddr,
        cycle: u64,
    ) {
        self.device_name = report.device_name.clone();
        self.mode = mode;
        self.state = DeviceState::from_u8(report.state);
        self.address = Some(address);
        self.networks = report.networks.clone();
        self.session_nonce = report.session_nonce.clone();
        self.key = Some(key);
        self.last_seen_cycle = cycle;
    }

    /// Direct state refresh for callers managing a device by hand, e.g. a
    /// roster restored from elsewhere.
    pub fn update_state(
        &mut self,
        mode: DeviceMode,
        state: DeviceState,
        session_nonce: &[u8],
        key: Key,
    ) {
        self.mode = mode;
        self.state = state;
        self.session_nonce = session_nonce.to_vec();
        self.key = Some(key);
    }

    /// The reported network matching the controller's own SSID, if any.
    /// This is what a UI shows as the device's signal strength.
    pub fn wireless_network(&self, own_ssid: &str) -> Option<&WirelessNetwork> {
        self.networks.iter().find(|n| n.ssid == own_ssid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_byte_mapping() {
        assert_eq!(DeviceState::from_u8(0), DeviceState::Ok);
        assert_eq!(DeviceState::from_u8(1), DeviceState::BindFailed);
        assert_eq!(DeviceState::from_u8(2), DeviceState::BootstrapFailed);
        assert_eq!(DeviceState::from_u8(42), DeviceState::Unknown);
    }

    #[test]
    fn wireless_network_matches_own_ssid() {
        let mut device = Device::new("uid", "name", None);
        let report = DeviceReport {
            session_nonce: b"n".to_vec(),
            state: 0,
            uid: "uid".to_string(),
            device_name: "name".to_string(),
            networks: vec![
                WirelessNetwork { ssid: "a".to_string(), strength: 90 },
                WirelessNetwork { ssid: "b".to_string(), strength: 40 },
            ],
        };
        let key = Key::new(b"k").unwrap();
        device.update_from_report(DeviceMode::Bound, &report, key, "10.0.0.2:8712".parse().unwrap(), 1);
        assert_eq!(device.wireless_network("b").map(|n| n.strength), Some(40));
        assert!(device.wireless_network("c").is_none());
    }
}
