//! Remote devices as reported by an external discovery service.
//!
//! The core never discovers peers itself. It consumes a snapshot of
//! [`PeerEndpoint`]s from a [`PeerDirectory`] implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One remote device. Immutable snapshot per directory refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEndpoint {
    pub id: String,
    pub name: String,
    /// Host or IP the chat port is dialed on.
    pub address: String,
    #[serde(default)]
    pub online: bool,
}

impl PeerEndpoint {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
        online: bool,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            online,
        }
    }

    /// Whether `query` names this peer by id, display name or address.
    pub fn matches(&self, query: &str) -> bool {
        self.id.eq_ignore_ascii_case(query)
            || self.name.eq_ignore_ascii_case(query)
            || self.address == query
    }
}

// ── PeerDirectory ────────────────────────────────────────────────

#[async_trait]
pub trait PeerDirectory: Send + Sync {
    /// Current snapshot of known peers. Failures yield an empty list.
    async fn list_peers(&self) -> Vec<PeerEndpoint>;

    /// Whether the peer with `id` is known and online.
    async fn is_online(&self, id: &str) -> bool {
        self.list_peers()
            .await
            .iter()
            .any(|p| p.online && p.id.eq_ignore_ascii_case(id))
    }
}

/// A fixed list of peers, e.g. from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    peers: Vec<PeerEndpoint>,
}

impl StaticDirectory {
    pub fn new(peers: Vec<PeerEndpoint>) -> Self {
        Self { peers }
    }
}

#[async_trait]
impl PeerDirectory for StaticDirectory {
    async fn list_peers(&self) -> Vec<PeerEndpoint> {
        self.peers.clone()
    }
}
