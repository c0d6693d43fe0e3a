//! Domain-specific error types for the buddy chat transport.
//!
//! Fallible internals return `Result<T, BuddyError>`. The public
//! operations that sit on the degrade-to-default boundary (sending,
//! history load/save, the listener loops) log these and fall back to
//! a safe value instead of propagating them.

use std::path::PathBuf;

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// The canonical error type for the buddy chat core.
#[derive(Debug, Error)]
pub enum BuddyError {
    // ── Transport Errors ─────────────────────────────────────────
    /// The peer could not be reached.
    #[error("connect to {address} failed: {source}")]
    ConnectFailure {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// An inbound stream failed mid-read or delivered undecodable bytes.
    #[error("transport read failed: {0}")]
    TransportReadFailure(String),

    /// Writing a payload to an established connection failed.
    #[error("transport write failed: {0}")]
    TransportWriteFailure(#[source] std::io::Error),

    /// The listening socket could not be bound.
    #[error("failed to bind listener on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    // ── Protocol Errors ──────────────────────────────────────────
    /// Chat text that is indistinguishable from a control token.
    #[error("text collides with reserved control token {0:?}")]
    ReservedPayload(&'static str),

    // ── Persistence Errors ───────────────────────────────────────
    /// A JSON document (history, settings) could not be encoded or decoded.
    #[error("JSON serialization failed: {0}")]
    SerializationFailure(#[from] serde_json::Error),

    /// A data file could not be read, written or removed.
    #[error("file {} I/O failed: {source}", .path.display())]
    FileIoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Runtime Errors ───────────────────────────────────────────
    /// The conversation task is gone.
    #[error("channel closed")]
    ChannelClosed,
}

// ── Convenient From implementations ──────────────────────────────

impl From<LinesCodecError> for BuddyError {
    fn from(e: LinesCodecError) -> Self {
        match e {
            LinesCodecError::MaxLineLengthExceeded => {
                BuddyError::TransportReadFailure("line length limit exceeded".into())
            }
            LinesCodecError::Io(io) => BuddyError::TransportReadFailure(io.to_string()),
        }
    }
}

/// Raw I/O errors only reach this conversion through the framed reader.
impl From<std::io::Error> for BuddyError {
    fn from(e: std::io::Error) -> Self {
        BuddyError::TransportReadFailure(e.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for BuddyError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        BuddyError::ChannelClosed
    }
}
