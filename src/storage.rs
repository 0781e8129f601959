use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::UserProfile;

const SESSION_FILE: &str = "session.json";

/// Credentials cached between runs. Token and profile live in one file so
/// they are always written and cleared together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub user: UserProfile,
}

/// Owns the session cache file under the configured state directory.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(SESSION_FILE),
        }
    }

    /// Read the cached session. Anything unreadable or unparsable counts as
    /// absent; a stale cache must never block startup.
    pub fn load(&self) -> Option<StoredSession> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(?err, path = %self.path.display(), "failed to read session cache");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(session) => Some(session),
            Err(err) => {
                warn!(?err, path = %self.path.display(), "session cache is corrupt, ignoring it");
                None
            }
        }
    }

    pub fn save(&self, session: &StoredSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let payload =
            serde_json::to_vec_pretty(session).context("failed to encode session cache")?;
        // Write-then-rename so a crash cannot leave a half-written cache.
        let staged = self.path.with_extension("json.tmp");
        fs::write(&staged, &payload)
            .with_context(|| format!("failed to write {}", staged.display()))?;
        fs::rename(&staged, &self.path)
            .with_context(|| format!("failed to move session cache into {}", self.path.display()))?;
        Ok(())
    }

    /// Remove the cache. A missing file already counts as cleared.
    pub fn clear(&self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                warn!(?err, path = %self.path.display(), "failed to remove session cache");
            }
        }
    }
}
