pub mod listener;
pub mod sender;

pub use listener::{ChatListener, LineHandler};
pub use sender::{MessageSender, Outbound, PeerOutbound};
