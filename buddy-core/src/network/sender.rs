//! Outbound side of the transport: one short-lived connection per payload.

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Encoder;
use tracing::debug;

use crate::codec::ChatCodec;
use crate::error::BuddyError;
use crate::payload::Payload;

// ── MessageSender ────────────────────────────────────────────────

/// Connect, write one line, close.
///
/// No pooling, no retries. Connect and write timeouts are whatever the
/// OS applies.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageSender;

impl MessageSender {
    pub fn new() -> Self {
        Self
    }

    /// Deliver `payload` to `address:port`.
    ///
    /// Every failure collapses to `false`; the cause is only logged.
    pub async fn send(&self, address: &str, port: u16, payload: Payload) -> bool {
        match self.try_send(address, port, payload).await {
            Ok(()) => true,
            Err(e) => {
                debug!("send to {address}:{port} failed: {e}");
                false
            }
        }
    }

    /// Like [`send`](Self::send) but keeps the error.
    pub async fn try_send(&self, address: &str, port: u16, payload: Payload) -> Result<(), BuddyError> {
        let mut frame = BytesMut::new();
        ChatCodec::new().encode(payload, &mut frame)?;

        let mut stream = TcpStream::connect((address, port))
            .await
            .map_err(|source| BuddyError::ConnectFailure {
                address: format!("{address}:{port}"),
                source,
            })?;

        stream
            .write_all(&frame)
            .await
            .map_err(BuddyError::TransportWriteFailure)?;
        stream
            .shutdown()
            .await
            .map_err(BuddyError::TransportWriteFailure)?;
        Ok(())
    }
}

// ── Outbound ─────────────────────────────────────────────────────

/// Where a conversation's outgoing payloads go.
///
/// The conversation actor only sees this trait, so tests can swap the
/// TCP sender for an in-memory recorder.
#[async_trait]
pub trait Outbound: Send + Sync + 'static {
    /// Deliver one payload; `true` when it was written without error.
    async fn deliver(&self, payload: Payload) -> bool;
}

/// [`Outbound`] bound to a fixed peer address and port.
#[derive(Debug, Clone)]
pub struct PeerOutbound {
    sender: MessageSender,
    address: String,
    port: u16,
}

impl PeerOutbound {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            sender: MessageSender::new(),
            address: address.into(),
            port,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

#[async_trait]
impl Outbound for PeerOutbound {
    async fn deliver(&self, payload: Payload) -> bool {
        // A peer without an address is never dialed.
        if self.address.trim().is_empty() {
            return false;
        }
        self.sender.send(&self.address, self.port, payload).await
    }
}

// ── Tests ────────────────────────────────────────────────────────
