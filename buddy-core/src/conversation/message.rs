//! In-memory chat log entries.

use std::fmt;

use chrono::{DateTime, Utc};

/// Text shown for the remote typing indicator.
pub const TYPING_TEXT: &str = "Typing...";

/// Per-conversation handle to a log entry. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Written and sent locally.
    Own,
    /// Received from the remote peer.
    Incoming,
}

impl Direction {
    pub fn is_own(self) -> bool {
        matches!(self, Direction::Own)
    }
}

/// One entry of a conversation's ordered log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub text: String,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
    pub delivered: bool,
    /// Remote typing indicator; at most one per log.
    pub typing: bool,
}

impl ChatMessage {
    pub fn is_own(&self) -> bool {
        self.direction.is_own()
    }

    pub fn is_incoming(&self) -> bool {
        !self.is_own()
    }
}
