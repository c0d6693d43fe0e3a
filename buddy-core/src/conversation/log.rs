//! Message reconciliation: turns decoded inbound payloads and local sends
//! into mutations of a conversation's ordered log.
//!
//! Rules applied here:
//!
//! - Typing start/stop add or remove the single typing entry.
//! - Nudges fold into one anchor entry ("Nudge", "Nudge x2", ...) until
//!   any other inbound payload or an own send ends the run.
//! - A text line arriving within the merge window of the latest incoming
//!   entry is appended to it. This rejoins multi-line messages that the
//!   line-oriented transport splits apart; it is a timing heuristic and
//!   can also join two distinct messages sent in quick succession.
//!
//! `MessageLog` is plain data with no clock or I/O of its own, so every
//! rule is testable by passing explicit timestamps.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::conversation::message::{ChatMessage, Direction, MessageId, TYPING_TEXT};
use crate::history::HistoryRecord;
use crate::payload::Payload;
use crate::state::{NudgeAggregate, NudgeStep};

/// Consecutive incoming lines closer than this coalesce into one entry.
pub const DEFAULT_MERGE_WINDOW: Duration = Duration::from_millis(300);

// ── LogMutation ──────────────────────────────────────────────────

/// One observable change to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogMutation {
    Appended(ChatMessage),
    /// Entry rewritten in place (merge, nudge count, delivery status).
    Updated(ChatMessage),
    Removed(ChatMessage),
    Cleared,
}

impl LogMutation {
    /// Whether the persisted projection changed (typing entries never are).
    pub fn affects_history(&self) -> bool {
        match self {
            LogMutation::Appended(m) | LogMutation::Updated(m) | LogMutation::Removed(m) => {
                !m.typing
            }
            LogMutation::Cleared => true,
        }
    }
}

// ── MessageLog ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MessageLog {
    entries: Vec<ChatMessage>,
    next_id: u64,
    typing: Option<MessageId>,
    nudge: NudgeAggregate,
    merge_window: TimeDelta,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::with_merge_window(DEFAULT_MERGE_WINDOW)
    }

    pub fn with_merge_window(window: Duration) -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
            typing: None,
            nudge: NudgeAggregate::new(),
            merge_window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn entries(&self) -> &[ChatMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: MessageId) -> Option<&ChatMessage> {
        self.entries.iter().find(|m| m.id == id)
    }

    pub fn typing_entry(&self) -> Option<&ChatMessage> {
        self.typing.and_then(|id| self.get(id))
    }

    pub fn nudge(&self) -> &NudgeAggregate {
        &self.nudge
    }

    /// Entries that belong in the history file, in log order.
    pub fn persisted(&self) -> impl Iterator<Item = &ChatMessage> {
        self.entries.iter().filter(|m| !m.typing)
    }

    // ── Mutations ────────────────────────────────────────────────

    /// Replace the log with previously persisted records.
    pub fn restore(&mut self, records: impl IntoIterator<Item = HistoryRecord>) {
        self.entries.clear();
        self.typing = None;
        self.nudge.reset();
        for record in records {
            let id = self.allocate_id();
            self.entries.push(record.into_message(id));
        }
    }

    /// Apply one decoded inbound payload.
    pub fn apply_inbound(&mut self, payload: Payload, now: DateTime<Utc>) -> Option<LogMutation> {
        match payload {
            Payload::TypingStart => {
                self.nudge.reset();
                self.begin_remote_typing(now)
            }
            Payload::TypingStop => {
                self.nudge.reset();
                self.end_remote_typing()
            }
            Payload::Nudge => Some(self.register_nudge(now)),
            Payload::Text(line) => Some(self.receive_line(line, now)),
        }
    }

    /// Append a locally sent message, not yet delivered.
    pub fn push_own(&mut self, text: String, now: DateTime<Utc>) -> (MessageId, LogMutation) {
        self.nudge.reset();
        let message = self.append(text, Direction::Own, now, false, false);
        (message.id, LogMutation::Appended(message))
    }

    /// Record the outcome of a send. No mutation if nothing changed.
    pub fn set_delivered(&mut self, id: MessageId, delivered: bool) -> Option<LogMutation> {
        let entry = self.entries.iter_mut().find(|m| m.id == id)?;
        if entry.delivered == delivered {
            return None;
        }
        entry.delivered = delivered;
        Some(LogMutation::Updated(entry.clone()))
    }

    /// Drop every entry and all transient state.
    pub fn clear(&mut self) -> LogMutation {
        self.entries.clear();
        self.typing = None;
        self.nudge.reset();
        LogMutation::Cleared
    }

    // ── Internal ─────────────────────────────────────────────────

    fn begin_remote_typing(&mut self, now: DateTime<Utc>) -> Option<LogMutation> {
        if self.typing.is_some() {
            return None;
        }
        let message = self.append(TYPING_TEXT.to_string(), Direction::Incoming, now, false, true);
        self.typing = Some(message.id);
        Some(LogMutation::Appended(message))
    }

    fn end_remote_typing(&mut self) -> Option<LogMutation> {
        let id = self.typing.take()?;
        let index = self.entries.iter().position(|m| m.id == id)?;
        Some(LogMutation::Removed(self.entries.remove(index)))
    }

    fn register_nudge(&mut self, now: DateTime<Utc>) -> LogMutation {
        match self.nudge.register() {
            NudgeStep::CreateAnchor { text } => {
                let message = self.append(text, Direction::Incoming, now, true, false);
                self.nudge.anchor_to(message.id);
                LogMutation::Appended(message)
            }
            NudgeStep::UpdateAnchor { anchor, text } => {
                let entry = self.entries.iter_mut().find(|m| m.id == anchor);
                match entry {
                    Some(entry) => {
                        entry.text = text;
                        entry.timestamp = now;
                        LogMutation::Updated(entry.clone())
                    }
                    // Anchor no longer in the log; start a fresh run.
                    None => {
                        self.nudge.reset();
                        self.register_nudge(now)
                    }
                }
            }
        }
    }

    fn receive_line(&mut self, line: String, now: DateTime<Utc>) -> LogMutation {
        let anchor = self.nudge.anchor();
        self.nudge.reset();

        let window = self.merge_window;
        if let Some(last) = self.entries.last_mut() {
            let mergeable = last.is_incoming()
                && !last.typing
                && Some(last.id) != anchor
                && now.signed_duration_since(last.timestamp) <= window;
            if mergeable {
                if last.text.is_empty() {
                    last.text = line;
                } else {
                    last.text.push('\n');
                    last.text.push_str(&line);
                }
                last.timestamp = now;
                return LogMutation::Updated(last.clone());
            }
        }

        let message = self.append(line, Direction::Incoming, now, true, false);
        LogMutation::Appended(message)
    }

    fn append(
        &mut self,
        text: String,
        direction: Direction,
        timestamp: DateTime<Utc>,
        delivered: bool,
        typing: bool,
    ) -> ChatMessage {
        let message = ChatMessage {
            id: self.allocate_id(),
            text,
            direction,
            timestamp,
            delivered,
            typing,
        };
        self.entries.push(message.clone());
        message
    }

    fn allocate_id(&mut self) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn at(ms: i64) -> DateTime<Utc> {
        t0() + TimeDelta::milliseconds(ms)
    }

    fn typing_count(log: &MessageLog) -> usize {
        log.entries().iter().filter(|m| m.typing).count()
    }

    #[test]
    fn lines_within_window_merge() {
        let mut log = MessageLog::new();
        log.apply_inbound(Payload::text("Hello"), at(0));
        let m = log.apply_inbound(Payload::text("World"), at(250)).unwrap();

        assert!(matches!(m, LogMutation::Updated(_)));
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].text, "Hello\nWorld");
        assert_eq!(log.entries()[0].timestamp, at(250));
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let mut log = MessageLog::new();
        log.apply_inbound(Payload::text("a"), at(0));
        log.apply_inbound(Payload::text("b"), at(300));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn lines_outside_window_stay_separate() {
        let mut log = MessageLog::new();
        log.apply_inbound(Payload::text("Hello"), at(0));
        log.apply_inbound(Payload::text("World"), at(400));

        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[1].text, "World");
        assert!(log.entries()[1].delivered);
    }

    #[test]
    fn merge_refreshes_window() {
        let mut log = MessageLog::new();
        log.apply_inbound(Payload::text("1"), at(0));
        log.apply_inbound(Payload::text("2"), at(200));
        log.apply_inbound(Payload::text("3"), at(450));
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].text, "1\n2\n3");
    }

    #[test]
    fn split_multiline_message_keeps_blank_lines() {
        let mut log = MessageLog::new();
        for line in ["first", "", "third"] {
            log.apply_inbound(Payload::text(line), at(5));
        }
        assert_eq!(log.entries()[0].text, "first\n\nthird");
    }

    #[test]
    fn own_entry_is_never_merge_target() {
        let mut log = MessageLog::new();
        log.push_own("mine".into(), at(0));
        log.apply_inbound(Payload::text("theirs"), at(10));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn typing_start_is_single_entry() {
        let mut log = MessageLog::new();
        assert!(log.apply_inbound(Payload::TypingStart, at(0)).is_some());
        assert!(log.apply_inbound(Payload::TypingStart, at(10)).is_none());
        assert_eq!(typing_count(&log), 1);
        assert_eq!(log.typing_entry().unwrap().text, TYPING_TEXT);
    }

    #[test]
    fn typing_stop_removes_entry() {
        let mut log = MessageLog::new();
        assert!(log.apply_inbound(Payload::TypingStop, at(0)).is_none());

        log.apply_inbound(Payload::TypingStart, at(0));
        log.apply_inbound(Payload::text("hey"), at(10));
        let m = log.apply_inbound(Payload::TypingStop, at(20)).unwrap();

        assert!(matches!(&m, LogMutation::Removed(e) if e.typing));
        assert!(!m.affects_history());
        assert_eq!(typing_count(&log), 0);
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].text, "hey");
    }

    #[test]
    fn typing_entry_is_never_merge_target() {
        let mut log = MessageLog::new();
        log.apply_inbound(Payload::TypingStart, at(0));
        log.apply_inbound(Payload::text("x"), at(10));
        assert_eq!(log.len(), 2);
        assert_eq!(typing_count(&log), 1);
    }

    #[test]
    fn three_nudges_collapse() {
        let mut log = MessageLog::new();
        log.apply_inbound(Payload::Nudge, at(0));
        log.apply_inbound(Payload::Nudge, at(1000));
        let m = log.apply_inbound(Payload::Nudge, at(2000)).unwrap();

        assert!(matches!(m, LogMutation::Updated(_)));
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].text, "Nudge x3");
        assert_eq!(log.entries()[0].timestamp, at(2000));
    }

    #[test]
    fn text_resets_nudge_run() {
        let mut log = MessageLog::new();
        log.apply_inbound(Payload::Nudge, at(0));
        log.apply_inbound(Payload::Nudge, at(10));
        // Arrives inside the merge window, but the anchor is not a merge target.
        log.apply_inbound(Payload::text("hi"), at(20));
        log.apply_inbound(Payload::Nudge, at(1000));

        let texts: Vec<_> = log.entries().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["Nudge x2", "hi", "Nudge"]);
    }

    #[test]
    fn own_send_resets_nudge_run() {
        let mut log = MessageLog::new();
        log.apply_inbound(Payload::Nudge, at(0));
        log.push_own("what?".into(), at(10));
        log.apply_inbound(Payload::Nudge, at(20));
        assert_eq!(log.entries()[2].text, "Nudge");
        assert_eq!(log.nudge().pending(), 1);
    }

    #[test]
    fn typing_signals_end_nudge_run() {
        let mut log = MessageLog::new();
        log.apply_inbound(Payload::Nudge, at(0));
        log.apply_inbound(Payload::TypingStart, at(5));
        log.apply_inbound(Payload::TypingStop, at(8));
        log.apply_inbound(Payload::Nudge, at(10));
        let texts: Vec<&str> = log.entries().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["Nudge", "Nudge"]);
        assert_eq!(log.nudge().pending(), 1);

        // A stray stop with no typing entry still ends the run.
        log.apply_inbound(Payload::TypingStop, at(12));
        log.apply_inbound(Payload::Nudge, at(14));
        assert_eq!(log.len(), 3);
        assert_eq!(log.entries()[2].text, "Nudge");
    }

    #[test]
    fn delivery_update_only_when_changed() {
        let mut log = MessageLog::new();
        let (id, _) = log.push_own("ping".into(), at(0));
        assert!(!log.get(id).unwrap().delivered);

        assert!(log.set_delivered(id, true).is_some());
        assert!(log.set_delivered(id, true).is_none());
        assert!(log.set_delivered(MessageId(999), true).is_none());
    }

    #[test]
    fn clear_resets_everything() {
        let mut log = MessageLog::new();
        log.apply_inbound(Payload::TypingStart, at(0));
        log.apply_inbound(Payload::Nudge, at(0));
        assert_eq!(log.clear(), LogMutation::Cleared);
        assert!(log.is_empty());
        assert!(log.typing_entry().is_none());
        assert_eq!(log.nudge().anchor(), None);

        // Typing can start again after a clear.
        assert!(log.apply_inbound(Payload::TypingStart, at(1)).is_some());
    }

    #[test]
    fn persisted_skips_typing() {
        let mut log = MessageLog::new();
        log.apply_inbound(Payload::text("a"), at(0));
        log.apply_inbound(Payload::TypingStart, at(1));
        assert_eq!(log.persisted().count(), 1);
    }
}
