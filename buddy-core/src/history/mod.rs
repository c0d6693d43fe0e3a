//! Conversation history persistence.
//!
//! One JSON file per conversation holding an array of
//! `{text, isOwn, timestamp, isDelivered}` objects. The file is always
//! read and written as a whole document. Typing entries are never
//! written.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::conversation::{ChatMessage, Direction, LogMutation, MessageId, MessageLog};
use crate::error::BuddyError;
use crate::peer::PeerEndpoint;

// ── HistoryRecord ────────────────────────────────────────────────

/// Durable projection of a [`ChatMessage`].
///
/// PascalCase aliases accept files written by older desktop builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    #[serde(alias = "Text")]
    pub text: String,
    #[serde(alias = "IsOwn")]
    pub is_own: bool,
    #[serde(alias = "Timestamp", deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(alias = "IsDelivered")]
    pub is_delivered: bool,
}

/// RFC 3339, or a bare `YYYY-MM-DDTHH:MM:SS[.fffffff]` read as local time.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp {raw:?}")))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    // Skipped local times (DST gaps) fall back to reading the value as UTC.
    Some(
        naive
            .and_local_timezone(Local)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .unwrap_or_else(|| naive.and_utc()),
    )
}

impl HistoryRecord {
    pub fn from_message(message: &ChatMessage) -> Self {
        Self {
            text: message.text.clone(),
            is_own: message.is_own(),
            timestamp: message.timestamp,
            is_delivered: message.delivered,
        }
    }

    pub fn into_message(self, id: MessageId) -> ChatMessage {
        ChatMessage {
            id,
            text: self.text,
            direction: if self.is_own {
                Direction::Own
            } else {
                Direction::Incoming
            },
            timestamp: self.timestamp,
            delivered: self.is_delivered,
            typing: false,
        }
    }
}

// ── ConversationKey ──────────────────────────────────────────────

/// File-name-safe identifier of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey(String);

impl ConversationKey {
    /// Peer id, falling back to the address. `None` when both are blank.
    pub fn new(peer_id: &str, address: &str) -> Option<Self> {
        let raw = [peer_id, address]
            .into_iter()
            .find(|s| !s.trim().is_empty())?;
        Some(Self(sanitize(raw)))
    }

    pub fn for_peer(peer: &PeerEndpoint) -> Option<Self> {
        Self::new(&peer.id, &peer.address)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            ':' | '/' | '\\' | '<' | '>' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

// ── HistoryStore ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &ConversationKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Persisted records for `key`, oldest first.
    ///
    /// A missing, unreadable or malformed file yields an empty list.
    pub async fn load(&self, key: &ConversationKey) -> Vec<HistoryRecord> {
        match self.try_load(key).await {
            Ok(records) => records,
            Err(e) => {
                warn!("ignoring history for {key}: {e}");
                Vec::new()
            }
        }
    }

    /// Like [`load`](Self::load) but reports why nothing was loaded.
    /// A missing file is not an error.
    pub async fn try_load(&self, key: &ConversationKey) -> Result<Vec<HistoryRecord>, BuddyError> {
        let path = self.path_for(key);
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(BuddyError::FileIoFailure { path, source }),
        };
        let records: Option<Vec<HistoryRecord>> = serde_json::from_str(&json)?;
        Ok(records.unwrap_or_default())
    }

    /// Overwrite the file for `key` with the persistable part of `log`.
    pub async fn save(&self, key: &ConversationKey, log: &MessageLog) -> Result<(), BuddyError> {
        let records: Vec<HistoryRecord> = log.persisted().map(HistoryRecord::from_message).collect();
        self.save_records(key, &records).await
    }

    pub async fn save_records(
        &self,
        key: &ConversationKey,
        records: &[HistoryRecord],
    ) -> Result<(), BuddyError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| BuddyError::FileIoFailure {
                path: self.dir.clone(),
                source,
            })?;

        let path = self.path_for(key);
        let json = serde_json::to_string(records)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| BuddyError::FileIoFailure { path, source })?;
        debug!("saved {} history records for {key}", records.len());
        Ok(())
    }

    /// Empty `log` and delete the backing file if it exists.
    pub async fn clear(&self, key: Option<&ConversationKey>, log: &mut MessageLog) -> LogMutation {
        let mutation = log.clear();
        if let Some(key) = key {
            if let Err(e) = self.remove_file(key).await {
                warn!("could not delete history for {key}: {e}");
            }
        }
        mutation
    }

    async fn remove_file(&self, key: &ConversationKey) -> Result<(), BuddyError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(BuddyError::FileIoFailure { path, source }),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
