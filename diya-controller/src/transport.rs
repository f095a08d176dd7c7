//! Outbound datagram capability.

use std::net::{IpAddr, SocketAddr, UdpSocket};

use tracing::warn;

/// Fire-and-forget send capability consumed by the engine.
///
/// `send` reports whether the transport accepted the datagram, not whether
/// it was delivered; the engine treats a refusal as non-fatal because
/// retries are time-driven, not failure-driven.
pub trait Transport {
    fn send(&mut self, port: u16, address: IpAddr, data: &[u8]) -> bool;

    /// False while the network is unusable; the engine suppresses sends
    /// without raising an error.
    fn is_ready(&self) -> bool;
}

/// UDP transport over a standard socket with broadcast enabled.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Binds to `local` and enables broadcast.
    pub fn bind(local: SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(local)?;
        socket.set_broadcast(true)?;
        Ok(UdpTransport { socket })
    }

    pub fn socket(&self) -> &UdpSocket {
        &self.socket
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, port: u16, address: IpAddr, data: &[u8]) -> bool {
        match self.socket.send_to(data, SocketAddr::new(address, port)) {
            Ok(_) => true,
            Err(err) => {
                warn!("udp send to {}:{} failed: {}", address, port, err);
                false
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.socket.local_addr().is_ok()
    }
}
