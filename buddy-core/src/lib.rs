//! # buddy-core
//!
//! Core library of the buddy peer-to-peer chat tool: two hosts exchange
//! short text messages, typing indicators and nudges directly over TCP.
//!
//! This crate contains:
//! - **Payload**: reserved control tokens vs. chat text, newline normalization
//! - **Codec**: `ChatCodec`, line-delimited framing via `tokio_util`
//! - **Network**: `ChatListener` (accept + per-connection decode loops) and
//!   `MessageSender` (one short-lived connection per payload)
//! - **State**: the typing-indicator and nudge-aggregation state machines
//! - **Conversation**: `MessageLog` reconciliation and the per-conversation
//!   owning task that serializes every mutation
//! - **History**: JSON history files, one per conversation
//! - **Task**: `SendTaskPool` for tracked, abortable outgoing sends
//! - **Peer**: `PeerEndpoint` and the `PeerDirectory` discovery seam
//! - **Error**: `BuddyError`, `thiserror`-based

pub mod codec;
pub mod conversation;
pub mod error;
pub mod history;
pub mod network;
pub mod payload;
pub mod peer;
pub mod state;
pub mod task;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{ChatCodec, MAX_LINE_LENGTH};
pub use conversation::{
    ChatMessage, Conversation, ConversationEvent, ConversationHandle, ConversationSettings,
    ConversationUpdate, Direction, LogMutation, MessageId, MessageLog,
};
pub use error::BuddyError;
pub use history::{ConversationKey, HistoryRecord, HistoryStore};
pub use network::{ChatListener, LineHandler, MessageSender, Outbound, PeerOutbound};
pub use payload::{NUDGE_TOKEN, Payload, TYPING_START_TOKEN, TYPING_STOP_TOKEN};
pub use peer::{PeerDirectory, PeerEndpoint, StaticDirectory};
pub use state::{NudgeAggregate, TypingPhase, TypingSignal, TypingState};
pub use task::{SendOutcome, SendTaskPool};

/// Port both peers listen on and dial.
pub const DEFAULT_CHAT_PORT: u16 = 54545;
