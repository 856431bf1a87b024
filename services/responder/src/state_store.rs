//! Persisted client state: the last selected facility

use std::path::{Path, PathBuf};

use errors::ResponderResult;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_facility: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable state is an empty state
    pub async fn load(&self) -> SessionState {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return SessionState::default(),
            Err(e) => {
                warn!(path = %self.path.display(), "Failed to read session state: {}", e);
                return SessionState::default();
            },
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), "Ignoring corrupt session state: {}", e);
            SessionState::default()
        })
    }

    pub async fn save(&self, state: &SessionState) -> ResponderResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string_pretty(state)?;
        tokio::fs::write(&self.path, raw).await?;
        debug!(path = %self.path.display(), "Session state saved");
        Ok(())
    }

    pub async fn remember_facility(&self, name: &str) -> ResponderResult<()> {
        self.save(&SessionState {
            last_facility: Some(name.to_string()),
        })
        .await
    }

    pub async fn forget_facility(&self) -> ResponderResult<()> {
        self.save(&SessionState::default()).await
    }
}
