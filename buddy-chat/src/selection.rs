//! The remembered peer, stored as `settings.json` in the app data dir.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use buddy_core::BuddyError;

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Settings {
    #[serde(alias = "SelectedDeviceId")]
    selected_device_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SelectionStore {
    path: PathBuf,
}

impl SelectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `settings.json` inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(SETTINGS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The saved peer id. Missing or unreadable settings mean none.
    pub async fn load(&self) -> Option<String> {
        let json = tokio::fs::read_to_string(&self.path).await.ok()?;
        match serde_json::from_str::<Option<Settings>>(&json) {
            Ok(settings) => settings?.selected_device_id,
            Err(e) => {
                debug!("ignoring {}: {e}", self.path.display());
                None
            }
        }
    }

    pub async fn save(&self, peer_id: &str) -> Result<(), BuddyError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| BuddyError::FileIoFailure {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let json = serde_json::to_string(&Settings {
            selected_device_id: Some(peer_id.to_string()),
        })?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|source| BuddyError::FileIoFailure {
                path: self.path.clone(),
                source,
            })
    }
}
