pub mod actor;
pub mod log;
pub mod message;

pub use actor::{
    Conversation, ConversationEvent, ConversationHandle, ConversationSettings, ConversationUpdate,
};
pub use log::{DEFAULT_MERGE_WINDOW, LogMutation, MessageLog};
pub use message::{ChatMessage, Direction, MessageId, TYPING_TEXT};
