//! Inbound nudge aggregation.
//!
//! Consecutive nudges with no other message activity in between collapse
//! into one visible log entry (the anchor) whose text carries the count.

use crate::conversation::MessageId;

/// Text of the anchor entry for `count` pending nudges.
pub fn nudge_label(count: u32) -> String {
    if count > 1 {
        format!("Nudge x{count}")
    } else {
        "Nudge".to_string()
    }
}

/// What the log must do for a freshly received nudge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NudgeStep {
    /// No anchor yet: append a new entry and [`anchor`](NudgeAggregate::anchor_to) it.
    CreateAnchor { text: String },
    /// Rewrite the existing anchor's text and refresh its timestamp.
    UpdateAnchor { anchor: MessageId, text: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NudgeAggregate {
    pending: u32,
    anchor: Option<MessageId>,
}

impl NudgeAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> u32 {
        self.pending
    }

    pub fn anchor(&self) -> Option<MessageId> {
        self.anchor
    }

    /// Count one more nudge.
    pub fn register(&mut self) -> NudgeStep {
        self.pending += 1;
        let text = nudge_label(self.pending);
        match self.anchor {
            Some(anchor) => NudgeStep::UpdateAnchor { anchor, text },
            None => NudgeStep::CreateAnchor { text },
        }
    }

    /// Record the entry created for [`NudgeStep::CreateAnchor`].
    pub fn anchor_to(&mut self, id: MessageId) {
        self.anchor = Some(id);
    }

    /// Any other message activity ends the run of nudges.
    pub fn reset(&mut self) {
        self.pending = 0;
        self.anchor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels() {
        assert_eq!(nudge_label(1), "Nudge");
        assert_eq!(nudge_label(3), "Nudge x3");
    }

    #[test]
    fn first_nudge_creates_then_updates() {
        let mut agg = NudgeAggregate::new();
        assert_eq!(
            agg.register(),
            NudgeStep::CreateAnchor {
                text: "Nudge".into()
            }
        );
        agg.anchor_to(MessageId(7));
        assert_eq!(
            agg.register(),
            NudgeStep::UpdateAnchor {
                anchor: MessageId(7),
                text: "Nudge x2".into()
            }
        );
        assert_eq!(agg.pending(), 2);
    }

    #[test]
    fn reset_starts_over() {
        let mut agg = NudgeAggregate::new();
        agg.register();
        agg.anchor_to(MessageId(1));
        agg.register();
        agg.reset();
        assert_eq!(agg.anchor(), None);
        assert_eq!(
            agg.register(),
            NudgeStep::CreateAnchor {
                text: "Nudge".into()
            }
        );
    }
}
