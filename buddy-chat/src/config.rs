//! Configuration for the chat client.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use buddy_core::{ConversationSettings, DEFAULT_CHAT_PORT, PeerEndpoint};

/// Folder name under the platform data directory.
pub const APP_DIR_NAME: &str = "ChattyBuddy";

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub network: NetworkConfig,
    pub chat: ChatTuning,
    pub history: HistoryConfig,
    pub discovery: DiscoveryConfig,
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP port to listen on and to dial peers at.
    pub port: u16,
    /// Address the listener binds.
    pub bind: String,
}

/// Conversation timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatTuning {
    /// Incoming lines closer together than this become one message.
    pub merge_window_ms: u64,
    /// Draft inactivity after which typing-stop is sent.
    pub typing_idle_ms: u64,
    /// How often the idle monitor checks the draft.
    pub typing_poll_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// History directory. Empty means `<data dir>/ChattyBuddy/history`.
    pub dir: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryBackend {
    #[default]
    Tailscale,
    Static,
}

/// Where peers come from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub backend: DiscoveryBackend,
    /// Peers for the `static` backend.
    pub peers: Vec<PeerEndpoint>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_CHAT_PORT,
            bind: "0.0.0.0".into(),
        }
    }
}

impl Default for ChatTuning {
    fn default() -> Self {
        let defaults = ConversationSettings::default();
        Self {
            merge_window_ms: defaults.merge_window.as_millis() as u64,
            typing_idle_ms: defaults.typing_idle.as_millis() as u64,
            typing_poll_ms: defaults.typing_poll.as_millis() as u64,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ChatConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// The default configuration as pretty TOML.
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&Self::default())
    }

    /// Write the default configuration to a file, refusing to replace
    /// one that already exists.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = Self::default_toml().map_err(std::io::Error::other)?;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        std::io::Write::write_all(&mut file, text.as_bytes())
    }

    /// Timing settings for a conversation. The poll interval is kept
    /// above zero so the idle monitor can always tick.
    pub fn to_conversation_settings(&self) -> ConversationSettings {
        ConversationSettings {
            merge_window: Duration::from_millis(self.chat.merge_window_ms),
            typing_idle: Duration::from_millis(self.chat.typing_idle_ms),
            typing_poll: Duration::from_millis(self.chat.typing_poll_ms.max(10)),
        }
    }

    /// Listener bind address; an unparsable value falls back to all
    /// IPv4 interfaces.
    pub fn bind_ip(&self) -> IpAddr {
        self.network.bind.trim().parse().unwrap_or_else(|e| {
            tracing::warn!("invalid bind address {:?}: {e}; using 0.0.0.0", self.network.bind);
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        })
    }

    pub fn history_dir(&self) -> PathBuf {
        if self.history.dir.trim().is_empty() {
            app_data_dir().join("history")
        } else {
            PathBuf::from(&self.history.dir)
        }
    }
}

/// `<platform data dir>/ChattyBuddy`, or a relative folder when the
/// platform has none.
pub fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&ChatConfig::default()).unwrap();
        assert!(text.contains("port = 54545"));
        assert!(text.contains("merge_window_ms = 300"));
        assert!(text.contains("backend = \"tailscale\""));
    }

    #[test]
    fn roundtrip_config() {
        let text = toml::to_string_pretty(&ChatConfig::default()).unwrap();
        let parsed: ChatConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.network.port, 54545);
        assert_eq!(parsed.chat.typing_idle_ms, 2000);
        assert_eq!(parsed.chat.typing_poll_ms, 500);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let parsed: ChatConfig = toml::from_str(
            r#"
            [discovery]
            backend = "static"

            [[discovery.peers]]
            id = "desk"
            name = "Desktop"
            address = "192.168.1.20"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.discovery.backend, DiscoveryBackend::Static);
        assert_eq!(parsed.discovery.peers[0].address, "192.168.1.20");
        assert!(!parsed.discovery.peers[0].online);
        assert_eq!(parsed.network.port, DEFAULT_CHAT_PORT);
    }

    #[test]
    fn load_falls_back_on_missing_or_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("buddy-chat.toml");
        assert_eq!(ChatConfig::load(&path).network.port, DEFAULT_CHAT_PORT);

        std::fs::write(&path, "[network\nport = ").unwrap();
        assert_eq!(ChatConfig::load(&path).network.port, DEFAULT_CHAT_PORT);

        std::fs::write(&path, "[network]\nport = 6000\n").unwrap();
        assert_eq!(ChatConfig::load(&path).network.port, 6000);
    }

    #[test]
    fn write_default_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("buddy-chat.toml");
        ChatConfig::write_default(&path).unwrap();
        let cfg = ChatConfig::load(&path);
        assert_eq!(cfg.logging.level, "warn");
        assert_eq!(cfg.to_conversation_settings(), ConversationSettings::default());

        let err = ChatConfig::write_default(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            ChatConfig::default_toml().unwrap()
        );
    }

    #[test]
    fn zero_poll_is_clamped() {
        let mut cfg = ChatConfig::default();
        cfg.chat.typing_poll_ms = 0;
        assert_eq!(
            cfg.to_conversation_settings().typing_poll,
            Duration::from_millis(10)
        );
    }

    #[test]
    fn bind_and_history_dir_resolution() {
        let mut cfg = ChatConfig::default();
        assert_eq!(cfg.bind_ip(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        cfg.network.bind = "127.0.0.1".into();
        assert_eq!(cfg.bind_ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        cfg.network.bind = "not an ip".into();
        assert_eq!(cfg.bind_ip(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        assert!(cfg.history_dir().ends_with("ChattyBuddy/history"));
        cfg.history.dir = "/tmp/buddy".into();
        assert_eq!(cfg.history_dir(), PathBuf::from("/tmp/buddy"));
    }
}
