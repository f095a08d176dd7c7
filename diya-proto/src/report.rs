//! Inbound device status report.
//!
//! Devices answer a HELLO with one of these: their session nonce, health
//! state, identity and the wireless networks they can currently see. The
//! controller refreshes its picture of a device wholesale from every report.
//!
//! Payload layout (plaintext, after the frame's clear prefix):
//!
//! ```text
//! [nonce_len: 1][nonce][state: 1][uid NUL][name NUL]([strength: 1][ssid NUL])*
//! ```

use std::io;

/// One scanned wireless network, as reported by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WirelessNetwork {
    pub ssid: String,
    pub strength: u8,
}

/// The decoded payload of a device status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReport {
    /// Device-generated nonce; every later frame *to* this device is
    /// enciphered under it.
    pub session_nonce: Vec<u8>,
    /// Raw health byte as firmware sent it.
    pub state: u8,
    pub uid: String,
    pub device_name: String,
    pub networks: Vec<WirelessNetwork>,
}

impl DeviceReport {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            2 + self.session_nonce.len() + self.uid.len() + self.device_name.len() + 2,
        );
        buf.push(self.session_nonce.len() as u8);
        buf.extend_from_slice(&self.session_nonce);
        buf.push(self.state);
        buf.extend_from_slice(self.uid.as_bytes());
        buf.push(0);
        buf.extend_from_slice(self.device_name.as_bytes());
        buf.push(0);
        for network in &self.networks {
            buf.push(network.strength);
            buf.extend_from_slice(network.ssid.as_bytes());
            buf.push(0);
        }
        buf
    }

    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        if data.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "report too short"));
        }
        let nonce_len = data[0] as usize;
        if data.len() < 1 + nonce_len + 1 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "report nonce truncated"));
        }
        let session_nonce = data[1..1 + nonce_len].to_vec();
        let state = data[1 + nonce_len];

        let mut pos = 1 + nonce_len + 1;
        let uid = read_string(data, &mut pos, "uid")?;
        let device_name = read_string(data, &mut pos, "device name")?;

        let mut networks = Vec::new();
        while pos < data.len() {
            let strength = data[pos];
            pos += 1;
            let ssid = read_string(data, &mut pos, "ssid")?;
            networks.push(WirelessNetwork { ssid, strength });
        }

        Ok(DeviceReport { session_nonce, state, uid, device_name, networks })
    }
}

fn read_string(data: &[u8], pos: &mut usize, field: &str) -> io::Result<String> {
    let rest = &data[*pos..];
    let end = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("{} not terminated", field)))?;
    let value = String::from_utf8(rest[..end].to_vec())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, format!("{} not utf-8", field)))?;
    *pos += end + 1;
    Ok(value)
}
