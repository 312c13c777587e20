//! TCP packet channel for network-attached radios
//!
//! Connects to the packet stream port a radio exposes over the network
//! and speaks the `0x94C3` frame protocol from [`crate::wire`].

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::PacketChannel;
use crate::error::{BridgeError, Result};
use crate::packet::MeshPacket;
use crate::wire::{self, FrameBuffer};

/// Read chunk size for the stream
const READ_BUFFER_SIZE: usize = 512;

/// Deadline for establishing the TCP connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// TCP channel to a radio's packet stream
pub struct TcpChannel {
    addr: String,
    stream: Option<TcpStream>,
    frames: FrameBuffer,
    name: String,
}

impl TcpChannel {
    /// Create a channel for the given `host:port` address
    pub fn new(addr: impl Into<String>) -> Self {
        let addr = addr.into();
        let name = format!("tcp:{addr}");
        Self {
            addr,
            stream: None,
            frames: FrameBuffer::new(),
            name,
        }
    }

    /// The configured radio address
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl PacketChannel for TcpChannel {
    async fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        info!(addr = %self.addr, "connecting to radio");
        let connect = TcpStream::connect(&self.addr);
        let stream = match tokio::time::timeout(CONNECT_TIMEOUT, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(BridgeError::ConnectFailed {
                    addr: self.addr.clone(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(BridgeError::ConnectFailed {
                    addr: self.addr.clone(),
                    reason: format!("timed out after {CONNECT_TIMEOUT:?}"),
                })
            }
        };

        stream.set_nodelay(true).ok();
        self.stream = Some(stream);
        self.frames.clear();
        info!(addr = %self.addr, "connected to radio");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await.ok();
            info!(addr = %self.addr, "disconnected from radio");
        }
        self.frames.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn next_packet(&mut self) -> Result<Option<MeshPacket>> {
        loop {
            // Drain any frame already buffered before touching the socket
            match self.frames.next_frame() {
                Ok(Some(frame)) => {
                    let packet = wire::decode_packet(&frame)?;
                    debug!(
                        from = %crate::packet::format_node_id(packet.from),
                        port = ?packet.body.port(),
                        "received packet"
                    );
                    return Ok(Some(packet));
                }
                Ok(None) => {}
                Err(e) => {
                    // Corrupt frame; surface as protocol error, stream stays up
                    warn!(error = %e, "corrupt frame on radio stream");
                    return Err(e);
                }
            }

            let stream = self.stream.as_mut().ok_or(BridgeError::NotConnected)?;
            let mut buf = [0u8; READ_BUFFER_SIZE];
            let read = stream.read(&mut buf).await;
            match read {
                Ok(0) => {
                    self.stream = None;
                    self.frames.clear();
                    return Err(BridgeError::Disconnected);
                }
                Ok(n) => self.frames.extend(&buf[..n]),
                Err(e) => {
                    self.stream = None;
                    self.frames.clear();
                    return Err(BridgeError::Io(e));
                }
            }
        }
    }

    async fn send_packet(&mut self, packet: &MeshPacket) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(BridgeError::NotConnected)?;
        let payload = wire::encode_packet(packet)?;
        let framed = wire::frame(&payload);
        match stream.write_all(&framed).await {
            Ok(()) => {
                debug!(
                    to = %crate::packet::format_node_id(packet.to),
                    bytes = framed.len(),
                    "transmitted packet"
                );
                Ok(())
            }
            Err(e) => {
                self.stream = None;
                self.frames.clear();
                Err(BridgeError::Io(e))
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{PacketBody, BROADCAST_ADDR};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_refused() {
        // Port 1 is essentially never listening
        let mut channel = TcpChannel::new("127.0.0.1:1");
        let err = channel.connect().await.unwrap_err();
        assert!(matches!(err, BridgeError::ConnectFailed { .. }));
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn test_send_and_receive_over_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            // Echo the inbound frame back
            let mut buf = vec![0u8; 1024];
            let n = sock.read(&mut buf).await.unwrap();
            sock.write_all(&buf[..n]).await.unwrap();
        });

        let mut channel = TcpChannel::new(addr.to_string());
        channel.connect().await.unwrap();
        assert!(channel.is_connected());

        let sent = MeshPacket::text(0x42, BROADCAST_ADDR, "over tcp");
        channel.send_packet(&sent).await.unwrap();

        let received = channel.next_packet().await.unwrap().unwrap();
        assert_eq!(received.body, PacketBody::Text("over tcp".to_string()));
        assert_eq!(received.from, 0x42);

        server.await.unwrap();
        channel.disconnect().await.unwrap();
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn test_peer_close_is_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            drop(sock);
        });

        let mut channel = TcpChannel::new(addr.to_string());
        channel.connect().await.unwrap();
        server.await.unwrap();

        let err = channel.next_packet().await.unwrap_err();
        assert!(matches!(err, BridgeError::Disconnected));
        assert!(!channel.is_connected());
    }
}
