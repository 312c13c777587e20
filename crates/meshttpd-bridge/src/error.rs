//! Error types for bridge operations
//!
//! Errors fall into four families that callers treat differently:
//! validation errors are surfaced directly and never retried, transport
//! errors drive the listener's reconnect loop, timeouts surface as
//! "telemetry unavailable", and protocol errors are logged and dropped
//! inside the listener without ever reaching a caller.

use thiserror::Error;

use crate::packet::TelemetryKind;

/// Main error type for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    // ===== Validation Errors =====
    /// Message text is empty
    #[error("message text is empty")]
    EmptyMessage,

    /// Message exceeds the radio payload limit
    #[error("message too large: {size} bytes exceeds payload maximum of {max} bytes")]
    MessageTooLarge {
        /// Actual message size in bytes
        size: usize,
        /// Maximum allowed size in bytes
        max: usize,
    },

    /// Node id could not be parsed
    #[error("invalid node id: {0}")]
    InvalidNodeId(String),

    // ===== Transport Errors =====
    /// Radio link is not connected
    #[error("radio link is not connected")]
    NotConnected,

    /// Connection attempt failed
    #[error("failed to connect to {addr}: {reason}")]
    ConnectFailed {
        /// Target address
        addr: String,
        /// Failure reason
        reason: String,
    },

    /// Transport signalled end-of-stream or a link-level failure
    #[error("radio link disconnected")]
    Disconnected,

    /// Internal command channel closed (listener is gone)
    #[error("bridge channel closed")]
    ChannelClosed,

    /// IO error wrapper
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // ===== Timeout / Pending-request Errors =====
    /// Telemetry round trip exceeded its deadline
    #[error("{kind} telemetry request to !{node:08x} timed out")]
    TelemetryTimeout {
        /// Target node
        node: u32,
        /// Requested telemetry kind
        kind: TelemetryKind,
    },

    /// A request for the same target and kind is already outstanding
    #[error("{kind} telemetry request to !{node:08x} already pending")]
    TelemetryBusy {
        /// Target node
        node: u32,
        /// Requested telemetry kind
        kind: TelemetryKind,
    },

    /// The node answered but without the requested metric set
    #[error("{kind} telemetry unavailable for !{node:08x}")]
    TelemetryUnavailable {
        /// Target node
        node: u32,
        /// Requested telemetry kind
        kind: TelemetryKind,
    },

    /// The radio's own address is needed but not yet known
    #[error("local radio node address not yet known")]
    LocalNodeUnknown,

    // ===== Protocol Errors =====
    /// Invalid packet framing or header
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    /// Packet payload failed to decode
    #[error("payload decode error: {0}")]
    PayloadDecode(String),
}

impl BridgeError {
    /// Check if this error is a validation error (caller fault, never retried)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BridgeError::EmptyMessage
                | BridgeError::MessageTooLarge { .. }
                | BridgeError::InvalidNodeId(_)
        )
    }

    /// Check if this error is recoverable by reconnecting
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            BridgeError::Disconnected
                | BridgeError::ConnectFailed { .. }
                | BridgeError::Io(_)
        )
    }

    /// Check if this is a protocol error (bad data from the link, drop and continue)
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidPacket(_) | BridgeError::PayloadDecode(_)
        )
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_validation() {
        assert!(BridgeError::EmptyMessage.is_validation());
        assert!(BridgeError::MessageTooLarge { size: 300, max: 237 }.is_validation());
        assert!(!BridgeError::NotConnected.is_validation());
    }

    #[test]
    fn test_is_retriable() {
        assert!(BridgeError::Disconnected.is_retriable());
        assert!(!BridgeError::EmptyMessage.is_retriable());
        assert!(!BridgeError::InvalidPacket("short".into()).is_retriable());
    }

    #[test]
    fn test_is_protocol() {
        assert!(BridgeError::InvalidPacket("bad magic".into()).is_protocol());
        assert!(BridgeError::PayloadDecode("truncated".into()).is_protocol());
        assert!(!BridgeError::Disconnected.is_protocol());
    }

    #[test]
    fn test_display_node_formatting() {
        let err = BridgeError::TelemetryTimeout {
            node: 0xA1B2_C3D4,
            kind: TelemetryKind::Device,
        };
        assert!(err.to_string().contains("!a1b2c3d4"));
    }
}
