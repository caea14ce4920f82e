//! File-backed approval preferences.
//!
//! Session approvals live in memory and die with the session; persistent
//! approvals are stored as a small JSON file in the project root (home
//! directory fallback when no project root is configured). Saves go through a
//! sibling temporary file so a partial write never corrupts the last
//! known-good preferences.

use crate::approval::ApprovalStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Default preferences file name placed in the project root.
pub const PREFS_FILE_NAME: &str = ".liaison-approvals.json";
/// On-disk schema version for [`PersistedApprovals`].
const PREFS_FILE_VERSION: u32 = 1;

/// On-disk payload shape for persisted approvals.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedApprovals {
    /// File-format version for forward compatibility checks.
    version: u32,
    /// Persistently approved tool names, sorted for stable diffs.
    persistent: BTreeSet<String>,
}

/// Allow-list store that persists the "always approve" scope to disk.
#[derive(Debug)]
pub struct JsonApprovalStore {
    path: PathBuf,
    inner: Mutex<Scopes>,
}

#[derive(Debug, Default)]
struct Scopes {
    session: HashSet<String>,
    persistent: BTreeSet<String>,
}

impl JsonApprovalStore {
    /// Open a store backed by the given file, loading any existing approvals.
    ///
    /// A missing file is an empty store; a malformed file is logged and
    /// treated as empty rather than failing session startup.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let persistent = load_persistent(&path);
        Self {
            path,
            inner: Mutex::new(Scopes {
                session: HashSet::new(),
                persistent,
            }),
        }
    }

    /// Resolve the default preferences path for a project.
    ///
    /// Falls back to the home directory when no project root is configured,
    /// and to the current directory when even that is unavailable.
    pub fn default_path(project_root: Option<&Path>) -> PathBuf {
        if let Some(root) = project_root {
            return root.join(PREFS_FILE_NAME);
        }
        match dirs::home_dir() {
            Some(home) => {
                tracing::warn!(
                    "no project root configured; storing approval preferences in {}",
                    home.display()
                );
                home.join(PREFS_FILE_NAME)
            }
            None => PathBuf::from(PREFS_FILE_NAME),
        }
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop one tool from both scopes and persist the change.
    pub fn remove_approval(&self, tool_name: &str) {
        let mut scopes = self.inner.lock().expect("prefs lock poisoned");
        scopes.session.remove(tool_name);
        scopes.persistent.remove(tool_name);
        save_persistent(&self.path, &scopes.persistent);
    }

    /// Remove every persistent approval and delete the backing file.
    pub fn clear_all_persistent(&self) {
        let mut scopes = self.inner.lock().expect("prefs lock poisoned");
        scopes.persistent.clear();
        if self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                tracing::warn!("failed to remove approval preferences file: {e}");
            }
        }
    }
}

impl ApprovalStore for JsonApprovalStore {
    fn is_approved(&self, tool_name: &str) -> bool {
        let scopes = self.inner.lock().expect("prefs lock poisoned");
        scopes.session.contains(tool_name) || scopes.persistent.contains(tool_name)
    }

    fn approve_for_session(&self, tool_name: &str) {
        let mut scopes = self.inner.lock().expect("prefs lock poisoned");
        scopes.session.insert(tool_name.to_string());
    }

    fn approve_persistently(&self, tool_name: &str) {
        let mut scopes = self.inner.lock().expect("prefs lock poisoned");
        scopes.persistent.insert(tool_name.to_string());
        save_persistent(&self.path, &scopes.persistent);
    }

    fn clear_session(&self) {
        let mut scopes = self.inner.lock().expect("prefs lock poisoned");
        scopes.session.clear();
    }
}

/// Load the persistent set from disk, tolerating absence and corruption.
fn load_persistent(path: &Path) -> BTreeSet<String> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeSet::new(),
        Err(e) => {
            tracing::warn!("failed to read approval preferences {}: {e}", path.display());
            return BTreeSet::new();
        }
    };
    match serde_json::from_str::<PersistedApprovals>(&raw) {
        Ok(payload) if payload.version == PREFS_FILE_VERSION => payload.persistent,
        Ok(payload) => {
            tracing::warn!(
                "unsupported approval preferences version {} in {}",
                payload.version,
                path.display()
            );
            BTreeSet::new()
        }
        Err(e) => {
            tracing::warn!(
                "failed to parse approval preferences {}: {e}",
                path.display()
            );
            BTreeSet::new()
        }
    }
}

/// Persist the persistent set, best effort.
fn save_persistent(path: &Path, persistent: &BTreeSet<String>) {
    let payload = PersistedApprovals {
        version: PREFS_FILE_VERSION,
        persistent: persistent.clone(),
    };
    let json = match serde_json::to_vec_pretty(&payload) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!("failed to serialize approval preferences: {e}");
            return;
        }
    };
    // Write to a sibling temporary file first so partial writes do not
    // corrupt the last known-good preferences.
    let tmp_path = path.with_extension("json.tmp");
    if let Err(e) = fs::write(&tmp_path, json) {
        tracing::warn!(
            "failed to write approval preferences {}: {e}",
            tmp_path.display()
        );
        return;
    }
    if let Err(e) = fs::rename(&tmp_path, path) {
        tracing::warn!(
            "failed to move approval preferences into place {}: {e}",
            path.display()
        );
    }
}
