//! Wire framing and packet codec for the radio link
//!
//! The stream protocol frames each packet as:
//! - Bytes 0-1: Magic number `0x94C3` (big-endian)
//! - Bytes 2-3: Payload length (big-endian u16)
//! - Bytes 4+: Packet payload
//!
//! Inside a frame, the packet header is fixed-width big-endian fields
//! followed by a port-specific body: raw UTF-8 for text, CBOR for
//! structured payloads.

use bytes::{Buf, Bytes, BytesMut};
use chrono::Utc;
use tracing::{trace, warn};

use crate::error::{BridgeError, Result};
use crate::packet::{MeshPacket, NodeUser, PacketBody, PortNum, TelemetryFrame, TelemetryKind};

/// Frame magic number (first 2 bytes of every frame)
pub const FRAME_MAGIC: u16 = 0x94C3;

/// Largest frame payload the codec accepts; longer lengths are treated as
/// stream corruption and resynchronized past.
pub const MAX_FRAME_PAYLOAD: usize = 1024;

/// Fixed packet header size inside a frame:
/// from(4) + to(4) + packet_id(4) + request_id(4) + channel(1) + port(1) + flags(1)
const HEADER_LEN: usize = 19;

/// Header flag: sender expects a correlated response
const FLAG_WANT_RESPONSE: u8 = 0x01;

/// Accumulates stream bytes and yields complete frame payloads
///
/// Partial frames are buffered across reads; garbage before a magic number
/// is discarded with a resynchronization scan.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: BytesMut,
}

impl FrameBuffer {
    /// Create an empty frame buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes read from the stream
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Discard any buffered partial data (on disconnect)
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Try to extract the next complete frame payload
    ///
    /// Returns `Ok(None)` when more stream bytes are needed. A frame whose
    /// declared length exceeds [`MAX_FRAME_PAYLOAD`] is skipped and
    /// reported as an invalid packet.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        // Need at least magic + length
        if self.buf.len() < 4 {
            return Ok(None);
        }

        let magic = u16::from_be_bytes([self.buf[0], self.buf[1]]);
        if magic != FRAME_MAGIC {
            // Not a valid frame start - scan forward for magic
            match self.find_magic() {
                Some(pos) => {
                    warn!(discarded = pos, "discarding bytes before frame magic");
                    self.buf.advance(pos);
                }
                None => {
                    // Keep a trailing first-magic-byte, it may be a partial magic
                    let keep = usize::from(self.buf.last() == Some(&0x94));
                    let discard = self.buf.len() - keep;
                    if discard > 0 {
                        warn!(discarded = discard, "discarding buffer without frame magic");
                        self.buf.advance(discard);
                    }
                    return Ok(None);
                }
            }
            if self.buf.len() < 4 {
                return Ok(None);
            }
        }

        let length = u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
        if length > MAX_FRAME_PAYLOAD {
            warn!(length, "frame length too large, likely corrupt");
            // Skip this magic and let the next call resynchronize
            self.buf.advance(2);
            return Err(BridgeError::InvalidPacket(format!(
                "frame length {length} exceeds maximum"
            )));
        }

        let total = 4 + length;
        if self.buf.len() < total {
            trace!(have = self.buf.len(), need = total, "waiting for complete frame");
            return Ok(None);
        }

        let frame = self.buf.split_to(total);
        Ok(Some(Bytes::copy_from_slice(&frame[4..])))
    }

    fn find_magic(&self) -> Option<usize> {
        (0..self.buf.len().saturating_sub(1))
            .find(|&i| self.buf[i] == 0x94 && self.buf[i + 1] == 0xC3)
    }
}

/// Wrap a packet payload in a stream frame
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&FRAME_MAGIC.to_be_bytes());
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Encode a packet into a frame payload
pub fn encode_packet(packet: &MeshPacket) -> Result<Vec<u8>> {
    let body = match &packet.body {
        PacketBody::Text(text) => text.as_bytes().to_vec(),
        PacketBody::NodeInfo(user) => serde_cbor::to_vec(user)
            .map_err(|e| BridgeError::PayloadDecode(e.to_string()))?,
        PacketBody::Telemetry(frame) => serde_cbor::to_vec(frame)
            .map_err(|e| BridgeError::PayloadDecode(e.to_string()))?,
        PacketBody::TelemetryRequest(kind) => serde_cbor::to_vec(kind)
            .map_err(|e| BridgeError::PayloadDecode(e.to_string()))?,
        PacketBody::Other { .. } => Vec::new(),
    };

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&packet.from.to_be_bytes());
    out.extend_from_slice(&packet.to.to_be_bytes());
    out.extend_from_slice(&packet.packet_id.to_be_bytes());
    out.extend_from_slice(&packet.request_id.unwrap_or(0).to_be_bytes());
    out.push(packet.channel);
    out.push(packet.body.port() as u8);
    let mut flags = 0u8;
    if packet.want_response {
        flags |= FLAG_WANT_RESPONSE;
    }
    out.push(flags);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode a frame payload into a packet
///
/// Header or body decode failures are protocol errors; the caller logs
/// and drops them without tearing down the link.
pub fn decode_packet(data: &[u8]) -> Result<MeshPacket> {
    if data.len() < HEADER_LEN {
        return Err(BridgeError::InvalidPacket(format!(
            "packet too short: {} bytes",
            data.len()
        )));
    }

    let from = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let to = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    let packet_id = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
    let request_id = u32::from_be_bytes([data[12], data[13], data[14], data[15]]);
    let channel = data[16];
    let port_raw = data[17];
    let flags = data[18];
    let payload = &data[HEADER_LEN..];

    let want_response = flags & FLAG_WANT_RESPONSE != 0;

    let body = match PortNum::from(port_raw) {
        PortNum::TextMessage => {
            let text = std::str::from_utf8(payload)
                .map_err(|e| BridgeError::PayloadDecode(format!("text not UTF-8: {e}")))?;
            PacketBody::Text(text.to_string())
        }
        PortNum::NodeInfo => {
            let user: NodeUser = serde_cbor::from_slice(payload)
                .map_err(|e| BridgeError::PayloadDecode(format!("node info: {e}")))?;
            PacketBody::NodeInfo(user)
        }
        PortNum::Telemetry if want_response => {
            let kind: TelemetryKind = serde_cbor::from_slice(payload)
                .map_err(|e| BridgeError::PayloadDecode(format!("telemetry request: {e}")))?;
            PacketBody::TelemetryRequest(kind)
        }
        PortNum::Telemetry => {
            let frame: TelemetryFrame = serde_cbor::from_slice(payload)
                .map_err(|e| BridgeError::PayloadDecode(format!("telemetry frame: {e}")))?;
            PacketBody::Telemetry(frame)
        }
        _ => PacketBody::Other { port: port_raw },
    };

    Ok(MeshPacket {
        from,
        to,
        packet_id,
        channel,
        body,
        request_id: (request_id != 0).then_some(request_id),
        want_response,
        rx_time: Utc::now(),
    })
}
