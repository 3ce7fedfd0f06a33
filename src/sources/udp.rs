//! UDP byte source
//!
//! Autopilots and telemetry forwarders (mavproxy, companion computers, VPN
//! bridges) push MAVLink at a ground station over UDP, conventionally on port
//! 14550. Each datagram becomes one chunk. UDP has no notion of closing, so this
//! source only ends when the relay cancels it; silence is detected by the
//! relay's link timeout instead.

use bytes::Bytes;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{info, trace};

use crate::source::ByteSource;
use crate::{RelayError, Result};

/// Largest datagram accepted; a signed MAVLink 2 frame is at most 280 bytes
/// but forwarders may batch several frames per datagram.
const MAX_DATAGRAM: usize = 65_507;

/// UDP listener that forwards every datagram as a chunk
pub struct UdpSource {
    socket: UdpSocket,
    buf: Vec<u8>,
    peer: Option<SocketAddr>,
}

impl UdpSource {
    /// Bind a UDP socket on `addr`
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket =
            UdpSocket::bind(addr).await.map_err(|source| RelayError::Bind { addr, source })?;
        let local = socket.local_addr()?;
        info!("UDP telemetry socket listening on {}", local);
        Ok(Self { socket, buf: vec![0u8; MAX_DATAGRAM], peer: None })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Address of the last vehicle or forwarder heard from
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }
}

#[async_trait::async_trait]
impl ByteSource for UdpSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let (n, from) = self.socket.recv_from(&mut self.buf).await?;

        if self.peer != Some(from) {
            info!(peer = %from, "Receiving telemetry from new peer");
            self.peer = Some(from);
        }
        trace!(bytes = n, peer = %from, "Datagram");

        Ok(Some(Bytes::copy_from_slice(&self.buf[..n])))
    }

    fn describe(&self) -> String {
        match self.socket.local_addr() {
            Ok(addr) => format!("udp:{addr}"),
            Err(_) => "udp".to_string(),
        }
    }
}
