//! The device roster, its key material and change notification.

use std::net::SocketAddr;

use rand::RngCore;

use crate::device::Device;

/// Storage size of a key slot; actual keys carry an explicit length.
pub const MAX_KEY_LEN: usize = 64;

/// Invalid engine configuration. This is the only error the library
/// surfaces to callers - everything mid-protocol degrades silently instead.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("key must not be empty")]
    EmptyKey,
    #[error("key of {0} bytes exceeds the 64 byte maximum")]
    KeyTooLong(usize),
}

/// A symmetric key with explicit length, as the BIND payload carries it.
/// Trailing storage bytes are don't-care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key {
    bytes: [u8; MAX_KEY_LEN],
    len: usize,
}

impl Key {
    /// Validates and copies key material; fails fast at configuration time
    /// rather than mid-protocol.
    pub fn new(material: &[u8]) -> Result<Self, ConfigError> {
        if material.is_empty() {
            return Err(ConfigError::EmptyKey);
        }
        if material.len() > MAX_KEY_LEN {
            return Err(ConfigError::KeyTooLong(material.len()));
        }
        let mut bytes = [0u8; MAX_KEY_LEN];
        bytes[..material.len()].copy_from_slice(material);
        Ok(Key { bytes, len: material.len() })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Registry change notifications.
///
/// Indices are positions in the ordered roster and are valid only at the
/// time of the call; a consumer that defers processing must re-read the
/// roster on the next notification instead of holding on to indices.
pub trait DeviceChangeListener {
    /// The device at `index` was refreshed; `added` is true on first sight.
    fn device_updated(&mut self, index: usize, added: bool);
    /// The device at `index` (pre-removal numbering) went away.
    fn device_removed(&mut self, index: usize);
    /// The whole roster was dropped at once.
    fn device_remove_all(&mut self);
    /// A burst of changes is complete; a good point to re-render.
    fn device_changes_finished(&mut self);
}

/// Handle for unregistering a change listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

/// Ordered collection of known devices plus the controller's key material
/// and app nonce.
///
/// Insertion order is preserved so index-based notifications stay coherent
/// for a list UI; uids are unique across entries. All mutation belongs to
/// one logical thread (see the crate docs).
pub struct DeviceRegistry {
    devices: Vec<Device>,
    unbound_key: Key,
    bound_key: Key,
    app_nonce: Vec<u8>,
    own_ssid: String,
    listeners: Vec<(ListenerId, Box<dyn DeviceChangeListener>)>,
    next_listener_id: u64,
}

impl DeviceRegistry {
    /// Creates a registry. `bound_key` is this controller's secret,
    /// `unbound_key` the factory default new devices ship with.
    pub fn new(bound_key: &[u8], unbound_key: &[u8], own_ssid: &str) -> Result<Self, ConfigError> {
        Ok(DeviceRegistry {
            devices: Vec::new(),
            unbound_key: Key::new(unbound_key)?,
            bound_key: Key::new(bound_key)?,
            app_nonce: Vec::new(),
            own_ssid: own_ssid.to_string(),
            listeners: Vec::new(),
            next_listener_id: 0,
        })
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device(&self, index: usize) -> Option<&Device> {
        self.devices.get(index)
    }

    pub fn device_mut(&mut self, index: usize) -> Option<&mut Device> {
        self.devices.get_mut(index)
    }

    /// Index of the device carrying `uid`.
    pub fn position(&self, uid: &str) -> Option<usize> {
        self.devices.iter().position(|d| d.uid() == uid)
    }

    /// Appends a device without notification; a bring-up aid for rosters
    /// assembled by hand. Protocol-driven insertion goes through
    /// [`upsert`](Self::upsert).
    pub fn add_device(&mut self, device: Device) {
        self.devices.push(device);
    }

    /// Finds the device carrying `uid` or inserts a fresh entry for it.
    /// Returns its index and whether it was newly added.
    pub fn upsert(&mut self, uid: &str, device_name: &str, address: Option<SocketAddr>) -> (usize, bool) {
        match self.position(uid) {
            Some(index) => (index, false),
            None => {
                self.devices.push(Device::new(uid, device_name, address));
                (self.devices.len() - 1, true)
            }
        }
    }

    pub fn bound_key(&self) -> &Key {
        &self.bound_key
    }

    pub fn unbound_key(&self) -> &Key {
        &self.unbound_key
    }

    /// Exchanges the two key slots. Lets a bring-up rig exercise both
    /// directions of the bind protocol against one recorded frame.
    pub fn swap_bound_unbound_keys(&mut self) {
        std::mem::swap(&mut self.bound_key, &mut self.unbound_key);
    }

    pub fn app_nonce(&self) -> &[u8] {
        &self.app_nonce
    }

    pub fn set_app_nonce(&mut self, nonce: &[u8]) {
        self.app_nonce = nonce.to_vec();
    }

    /// Replaces the app nonce with 8 fresh random bytes. Devices use the
    /// nonce to tell discovery rounds apart, so refresh once per round.
    pub fn refresh_app_nonce(&mut self) {
        let mut nonce = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut nonce);
        self.app_nonce = nonce.to_vec();
    }

    pub fn own_ssid(&self) -> &str {
        &self.own_ssid
    }

    pub fn add_change_listener(&mut self, listener: Box<dyn DeviceChangeListener>) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, listener));
        id
    }

    pub fn remove_change_listener(&mut self, id: ListenerId) {
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
    }

    /// Drops every unselected device. The batch coalesces into a single
    /// `device_removed` carrying the lowest removed index, followed by
    /// `device_changes_finished`; bulk consumers re-read the roster there.
    pub fn remove_devices_not_selected(&mut self) {
        let first_removed = self.devices.iter().position(|d| !d.selected());
        self.devices.retain(|d| d.selected());
        if let Some(index) = first_removed {
            for (_, listener) in &mut self.listeners {
                listener.device_removed(index);
            }
            self.notify_changes_finished();
        }
    }

    /// Empties the roster, signalled as one `device_remove_all` - never a
    /// series of `device_removed`.
    pub fn clear_devices(&mut self) {
        self.devices.clear();
        for (_, listener) in &mut self.listeners {
            listener.device_remove_all();
        }
    }

    pub(crate) fn notify_updated(&mut self, index: usize, added: bool) {
        for (_, listener) in &mut self.listeners {
            listener.device_updated(index, added);
        }
    }

    pub(crate) fn notify_changes_finished(&mut self) {
        for (_, listener) in &mut self.listeners {
            listener.device_changes_finished();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_validated_at_construction() {
        assert!(matches!(Key::new(b""), Err(ConfigError::EmptyKey)));
        assert!(matches!(Key::new(&[0u8; 65]), Err(ConfigError::KeyTooLong(65))));
        let key = Key::new(b"app_secret\0").unwrap();
        assert_eq!(key.as_slice(), b"app_secret\0");
        assert_eq!(key.len(), 11);
    }

    #[test]
    fn upsert_is_keyed_by_uid() {
        let mut registry = DeviceRegistry::new(b"bound", b"unbound", "net").unwrap();
        let (first, added) = registry.upsert("uid1", "name1", None);
        assert!(added);
        let (second, added) = registry.upsert("uid1", "renamed", None);
        assert!(!added);
        assert_eq!(first, second);
        assert_eq!(registry.devices().len(), 1);
    }

    #[test]
    fn swap_exchanges_the_key_slots() {
        let mut registry = DeviceRegistry::new(b"bound", b"unbound", "net").unwrap();
        registry.swap_bound_unbound_keys();
        assert_eq!(registry.bound_key().as_slice(), b"unbound");
        assert_eq!(registry.unbound_key().as_slice(), b"bound");
    }

    #[test]
    fn refresh_replaces_the_app_nonce() {
        let mut registry = DeviceRegistry::new(b"bound", b"unbound", "net").unwrap();
        registry.set_app_nonce(b"abcdefgh");
        registry.refresh_app_nonce();
        assert_eq!(registry.app_nonce().len(), 8);
        assert_ne!(registry.app_nonce(), b"abcdefgh");
    }
}
