// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry persistence: load/save to JSON file with atomic writes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::store::{ProxyServer, User};

/// Persisted snapshot of the whole registry.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PersistedRegistry {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub servers: Vec<ProxyServer>,
}

/// Resolve the state directory for fleet data.
///
/// Checks `KEYFLEET_STATE_DIR`, then `$XDG_STATE_HOME/keyfleet`,
/// then `$HOME/.local/state/keyfleet`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("KEYFLEET_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("keyfleet");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/keyfleet");
    }
    PathBuf::from(".keyfleet")
}

/// Load a persisted registry from a JSON file.
pub fn load(path: &Path) -> anyhow::Result<PersistedRegistry> {
    let contents = std::fs::read_to_string(path)?;
    let registry: PersistedRegistry = serde_json::from_str(&contents)?;
    Ok(registry)
}

/// Save the registry to a JSON file atomically (write tmp + rename).
///
/// Uses a unique temp filename (PID + counter) so concurrent saves never
/// race on the same `.tmp` file; a shorter write can leave trailing bytes
/// from a longer previous write.
pub fn save(path: &Path, registry: &PersistedRegistry) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
        }
    }

    let json = serde_json::to_string_pretty(registry)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
