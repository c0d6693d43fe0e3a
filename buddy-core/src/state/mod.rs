pub mod nudge;
pub mod typing;

pub use nudge::{NudgeAggregate, NudgeStep, nudge_label};
pub use typing::{
    DEFAULT_TYPING_IDLE, DEFAULT_TYPING_POLL, TypingPhase, TypingSignal, TypingState,
};
