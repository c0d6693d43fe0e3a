//! # buddy-chat: terminal chat client
//!
//! Talks to one peer at a time over the buddy line protocol. Peers come
//! from `tailscale status --json` or a static list in the config file;
//! the last chosen peer is remembered between runs.
//!
//! ## Modules
//!
//! - **config**: `buddy-chat.toml`, defaults on any load failure.
//! - **discovery**: `PeerDirectory` backends.
//! - **selection**: the remembered peer (`settings.json`).
//! - **session**: stdin commands in, conversation updates out.

pub mod config;
pub mod discovery;
pub mod selection;
pub mod session;
