//! Wire payloads: reserved control tokens versus literal chat text.
//!
//! The transport carries one newline-terminated UTF-8 line per payload.
//! Three exact line values are reserved; everything else is chat text.

use std::fmt;

use crate::error::BuddyError;

// ── Reserved tokens ──────────────────────────────────────────────

/// Attention-getting signal.
pub const NUDGE_TOKEN: &str = "__nudge__";
/// Remote peer started composing.
pub const TYPING_START_TOKEN: &str = "__typing__:start";
/// Remote peer stopped composing.
pub const TYPING_STOP_TOKEN: &str = "__typing__:stop";

/// Canonical in-memory and on-wire line separator.
pub const NEWLINE: char = '\n';

// ── Payload ──────────────────────────────────────────────────────

/// One decoded (or to-be-encoded) line of the chat protocol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Payload {
    Nudge,
    TypingStart,
    TypingStop,
    /// Literal chat text, newline-normalized.
    Text(String),
}

impl Payload {
    /// Classify a received line.
    ///
    /// Control tokens are matched exactly and case-sensitively; any other
    /// line, including the empty line, is chat text.
    pub fn classify(line: &str) -> Self {
        match line {
            NUDGE_TOKEN => Payload::Nudge,
            TYPING_START_TOKEN => Payload::TypingStart,
            TYPING_STOP_TOKEN => Payload::TypingStop,
            text => Payload::Text(normalize_newlines(text)),
        }
    }

    /// Build a text payload from user input.
    pub fn text(text: impl AsRef<str>) -> Self {
        Payload::Text(normalize_newlines(text.as_ref()))
    }

    /// Returns `true` for the three reserved control payloads.
    pub fn is_control(&self) -> bool {
        !matches!(self, Payload::Text(_))
    }

    /// The exact line written to the wire, without the terminator.
    ///
    /// Fails for text with a line that would be read back as a control
    /// token.
    pub fn to_wire(&self) -> Result<&str, BuddyError> {
        match self {
            Payload::Nudge => Ok(NUDGE_TOKEN),
            Payload::TypingStart => Ok(TYPING_START_TOKEN),
            Payload::TypingStop => Ok(TYPING_STOP_TOKEN),
            Payload::Text(text) => match reserved_token(text) {
                Some(token) => Err(BuddyError::ReservedPayload(token)),
                None => Ok(text),
            },
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Nudge => write!(f, "Nudge"),
            Payload::TypingStart => write!(f, "TypingStart"),
            Payload::TypingStop => write!(f, "TypingStop"),
            Payload::Text(text) => write!(f, "Text({} bytes)", text.len()),
        }
    }
}

fn reserved_token(text: &str) -> Option<&'static str> {
    text.split(['\n', '\r']).find_map(|line| {
        [NUDGE_TOKEN, TYPING_START_TOKEN, TYPING_STOP_TOKEN]
            .into_iter()
            .find(|token| *token == line)
    })
}

// ── Text helpers ─────────────────────────────────────────────────

/// Map `\r\n` and lone `\r` to `\n`.
pub fn normalize_newlines(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_owned();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Normalize newlines and drop blank lines at both edges.
///
/// Returns an empty string when nothing but whitespace remains.
pub fn trim_blank_edge_lines(text: &str) -> String {
    let normalized = normalize_newlines(text);
    let lines: Vec<&str> = normalized.split(NEWLINE).collect();

    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}

// ── Tests ────────────────────────────────────────────────────────
