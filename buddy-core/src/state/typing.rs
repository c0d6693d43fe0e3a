//! Local typing-indicator state machine.
//!
//! Driven only by edits to the outgoing draft and by the idle monitor's
//! periodic poll. It never touches the network itself; each transition
//! that must be announced returns a [`TypingSignal`] for the caller to send.

use std::time::Duration;

use tokio::time::Instant;

use crate::payload::Payload;

/// No activity for this long ends a composing session.
pub const DEFAULT_TYPING_IDLE: Duration = Duration::from_millis(2000);

/// How often the idle monitor checks for inactivity.
pub const DEFAULT_TYPING_POLL: Duration = Duration::from_millis(500);

// ── TypingPhase ──────────────────────────────────────────────────

/// ```text
///            non-empty draft (send Start)
///   Idle ──────────────────────────────► Composing ──┐ edit: refresh
///     ▲                                     │  ▲     │
///     │  empty draft / idle timeout         │  └─────┘
///     └──────────── (send Stop) ◄───────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypingPhase {
    /// No composing session; a stop (if any start was sent) is already out.
    #[default]
    Idle,

    /// Start was sent for this session; stop not yet sent.
    Composing {
        /// Last draft edit.
        last_activity: Instant,
    },
}

/// Control token the caller must transmit after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Start,
    Stop,
}

impl From<TypingSignal> for Payload {
    fn from(signal: TypingSignal) -> Self {
        match signal {
            TypingSignal::Start => Payload::TypingStart,
            TypingSignal::Stop => Payload::TypingStop,
        }
    }
}

// ── TypingState ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TypingState {
    phase: TypingPhase,
    idle_timeout: Duration,
}

impl TypingState {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            phase: TypingPhase::Idle,
            idle_timeout,
        }
    }

    pub fn phase(&self) -> TypingPhase {
        self.phase
    }

    pub fn is_composing(&self) -> bool {
        matches!(self.phase, TypingPhase::Composing { .. })
    }

    /// The outgoing draft changed to `draft`.
    ///
    /// A whitespace-only draft counts as empty.
    pub fn on_draft_changed(&mut self, draft: &str, now: Instant) -> Option<TypingSignal> {
        let has_text = !draft.trim().is_empty();
        match (self.phase, has_text) {
            (TypingPhase::Idle, true) => {
                self.phase = TypingPhase::Composing { last_activity: now };
                Some(TypingSignal::Start)
            }
            (TypingPhase::Composing { .. }, true) => {
                self.phase = TypingPhase::Composing { last_activity: now };
                None
            }
            (TypingPhase::Composing { .. }, false) => {
                self.phase = TypingPhase::Idle;
                Some(TypingSignal::Stop)
            }
            (TypingPhase::Idle, false) => None,
        }
    }

    /// One idle-monitor tick.
    ///
    /// Ends the session once `now` is at least the idle timeout past the
    /// last edit.
    pub fn poll_idle(&mut self, now: Instant) -> Option<TypingSignal> {
        match self.phase {
            TypingPhase::Composing { last_activity }
                if now.saturating_duration_since(last_activity) >= self.idle_timeout =>
            {
                self.phase = TypingPhase::Idle;
                Some(TypingSignal::Stop)
            }
            _ => None,
        }
    }
}

impl Default for TypingState {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_IDLE)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn start_sent_once_per_session() {
        let t0 = Instant::now();
        let mut typing = TypingState::default();

        assert_eq!(typing.on_draft_changed("h", t0), Some(TypingSignal::Start));
        assert_eq!(typing.on_draft_changed("he", t0 + ms(100)), None);
        assert_eq!(typing.on_draft_changed("hel", t0 + ms(200)), None);
        assert_eq!(
            typing.phase(),
            TypingPhase::Composing {
                last_activity: t0 + ms(200)
            }
        );
    }

    #[test]
    fn clearing_draft_sends_stop_once() {
        let t0 = Instant::now();
        let mut typing = TypingState::default();

        typing.on_draft_changed("hi", t0);
        assert_eq!(typing.on_draft_changed("", t0 + ms(50)), Some(TypingSignal::Stop));
        assert_eq!(typing.on_draft_changed("   ", t0 + ms(60)), None);
        assert_eq!(typing.poll_idle(t0 + ms(5000)), None);
    }

    #[test]
    fn idle_timeout_sends_stop_once() {
        let t0 = Instant::now();
        let mut typing = TypingState::default();

        typing.on_draft_changed("hi", t0);
        assert_eq!(typing.poll_idle(t0 + ms(500)), None);
        assert_eq!(typing.poll_idle(t0 + ms(1999)), None);
        assert_eq!(typing.poll_idle(t0 + ms(2000)), Some(TypingSignal::Stop));
        assert_eq!(typing.poll_idle(t0 + ms(2500)), None);
        // Clearing afterwards does not repeat the stop.
        assert_eq!(typing.on_draft_changed("", t0 + ms(2600)), None);
    }

    #[test]
    fn edits_postpone_idle_timeout() {
        let t0 = Instant::now();
        let mut typing = TypingState::default();

        typing.on_draft_changed("a", t0);
        typing.on_draft_changed("ab", t0 + ms(1500));
        assert_eq!(typing.poll_idle(t0 + ms(2000)), None);
        assert_eq!(typing.poll_idle(t0 + ms(3500)), Some(TypingSignal::Stop));
    }

    #[test]
    fn edit_after_idle_stop_starts_new_session() {
        let t0 = Instant::now();
        let mut typing = TypingState::new(ms(100));

        typing.on_draft_changed("a", t0);
        assert_eq!(typing.poll_idle(t0 + ms(100)), Some(TypingSignal::Stop));
        assert_eq!(
            typing.on_draft_changed("ab", t0 + ms(150)),
            Some(TypingSignal::Start)
        );
    }

    #[test]
    fn signal_maps_to_control_payload() {
        assert_eq!(Payload::from(TypingSignal::Start), Payload::TypingStart);
        assert_eq!(Payload::from(TypingSignal::Stop), Payload::TypingStop);
    }
}
