use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

/// Local state directory. Everything durable on this machine lives here:
/// the cached auth session, the sign-up profile stash, and the active
/// focus marker. The authoritative data stays remote.
#[derive(Debug)]
pub struct StateDir {
    pub root: PathBuf,
    pub session_path: PathBuf,
    pub pending_profile_path: PathBuf,
    pub focus_path: PathBuf,
}

/// Cached auth session for the signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user_id: Uuid,
    pub email: String,
}

/// Name and email captured at sign-up, inserted into `profiles` on the
/// first successful sign-in and cleared afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingProfile {
    pub full_name: String,
    pub email: String,
}

/// An in-progress focus session; becomes a remote row on `focus stop`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveFocus {
    pub name: String,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
}

impl StateDir {
    #[tracing::instrument(skip(root))]
    pub fn open(root: &Path) -> anyhow::Result<Self> {
        let root = root.to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create {}", root.display()))?;

        let session_path = root.join("session.json");
        let pending_profile_path = root.join("pending_profile.json");
        let focus_path = root.join("focus.json");

        info!(
            root = %root.display(),
            session = %session_path.display(),
            focus = %focus_path.display(),
            "opened state directory"
        );

        Ok(Self {
            root,
            session_path,
            pending_profile_path,
            focus_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_session(&self) -> anyhow::Result<Option<AuthSession>> {
        load_json(&self.session_path).context("failed to load session.json")
    }

    #[tracing::instrument(skip(self, session))]
    pub fn save_session(&self, session: &AuthSession) -> anyhow::Result<()> {
        save_json_atomic(&self.session_path, session).context("failed to save session.json")
    }

    #[tracing::instrument(skip(self))]
    pub fn clear_session(&self) -> anyhow::Result<()> {
        remove_if_present(&self.session_path)
    }

    /// The cached session, or an error telling the user to sign in.
    pub fn require_session(&self) -> anyhow::Result<AuthSession> {
        self.load_session()?
            .ok_or_else(|| anyhow!("not signed in; run `tempo signin` first"))
    }

    #[tracing::instrument(skip(self))]
    pub fn load_pending_profile(&self) -> anyhow::Result<Option<PendingProfile>> {
        load_json(&self.pending_profile_path).context("failed to load pending_profile.json")
    }

    #[tracing::instrument(skip(self, pending))]
    pub fn save_pending_profile(&self, pending: &PendingProfile) -> anyhow::Result<()> {
        save_json_atomic(&self.pending_profile_path, pending)
            .context("failed to save pending_profile.json")
    }

    #[tracing::instrument(skip(self))]
    pub fn clear_pending_profile(&self) -> anyhow::Result<()> {
        remove_if_present(&self.pending_profile_path)
    }

    #[tracing::instrument(skip(self))]
    pub fn load_active_focus(&self) -> anyhow::Result<Option<ActiveFocus>> {
        load_json(&self.focus_path).context("failed to load focus.json")
    }

    #[tracing::instrument(skip(self, focus))]
    pub fn save_active_focus(&self, focus: &ActiveFocus) -> anyhow::Result<()> {
        save_json_atomic(&self.focus_path, focus).context("failed to save focus.json")
    }

    #[tracing::instrument(skip(self))]
    pub fn clear_active_focus(&self) -> anyhow::Result<()> {
        remove_if_present(&self.focus_path)
    }
}

#[tracing::instrument(skip(path))]
fn load_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value = serde_json::from_str(trimmed)
        .with_context(|| format!("failed parsing {}", path.display()))?;
    debug!(file = %path.display(), "loaded state file");
    Ok(Some(value))
}

#[tracing::instrument(skip(path, value))]
fn save_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    debug!(file = %path.display(), "saving state file atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    let serialized = serde_json::to_string_pretty(value)?;
    writeln!(temp, "{serialized}")?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

fn remove_if_present(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("failed removing {}", path.display()))?;
    }
    Ok(())
}
