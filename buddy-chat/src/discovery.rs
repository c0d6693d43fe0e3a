//! Peer directories backed by Tailscale or by the config file.

use std::collections::BTreeMap;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use buddy_core::{PeerDirectory, PeerEndpoint, StaticDirectory};

use crate::config::{DiscoveryBackend, DiscoveryConfig};

/// Build the directory selected in the config.
pub fn from_config(config: &DiscoveryConfig) -> Box<dyn PeerDirectory> {
    match config.backend {
        DiscoveryBackend::Tailscale => Box::new(TailscaleDirectory::new()),
        DiscoveryBackend::Static => Box::new(StaticDirectory::new(config.peers.clone())),
    }
}

// ── Tailscale ────────────────────────────────────────────────────

/// Lists tailnet peers by running `tailscale status --json`.
#[derive(Debug, Clone)]
pub struct TailscaleDirectory {
    program: String,
}

impl TailscaleDirectory {
    pub fn new() -> Self {
        Self::with_program("tailscale")
    }

    /// Use a different executable, e.g. a full path.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn status_json(&self) -> std::io::Result<Vec<u8>> {
        let output = Command::new(&self.program)
            .args(["status", "--json"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await?;
        if !output.status.success() {
            debug!("{} status exited with {}", self.program, output.status);
        }
        Ok(output.stdout)
    }
}

impl Default for TailscaleDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerDirectory for TailscaleDirectory {
    async fn list_peers(&self) -> Vec<PeerEndpoint> {
        let json = match self.status_json().await {
            Ok(json) => json,
            Err(e) => {
                warn!("could not run {}: {e}", self.program);
                return Vec::new();
            }
        };
        parse_status(&json).unwrap_or_else(|e| {
            warn!("unreadable tailscale status: {e}");
            Vec::new()
        })
    }
}

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(rename = "Peer", default)]
    peer: Option<BTreeMap<String, PeerStatus>>,
}

#[derive(Debug, Deserialize)]
struct PeerStatus {
    #[serde(rename = "DNSName", default)]
    dns_name: Option<String>,
    #[serde(rename = "HostName", default)]
    host_name: Option<String>,
    #[serde(rename = "TailscaleIPs", default)]
    tailscale_ips: Option<Vec<String>>,
    #[serde(rename = "Online", default)]
    online: bool,
}

/// Peers from `tailscale status --json` output, keyed by peer key.
///
/// Empty output means no peers.
pub fn parse_status(json: &[u8]) -> Result<Vec<PeerEndpoint>, serde_json::Error> {
    if json.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    let status: Status = serde_json::from_slice(json)?;
    let peers = status
        .peer
        .unwrap_or_default()
        .into_iter()
        .map(|(key, peer)| {
            let raw_name = [peer.dns_name.as_deref(), peer.host_name.as_deref()]
                .into_iter()
                .flatten()
                .find(|n| !n.trim().is_empty())
                .unwrap_or(key.as_str());
            let name = first_label(raw_name).to_string();
            let address = peer
                .tailscale_ips
                .and_then(|ips| ips.into_iter().next())
                .unwrap_or_default();
            PeerEndpoint::new(key.clone(), name, address, peer.online)
        })
        .collect();
    Ok(peers)
}

/// `laptop.tail1234.ts.net.` → `laptop`.
fn first_label(name: &str) -> &str {
    match name.find('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

// ── Tests ────────────────────────────────────────────────────────
