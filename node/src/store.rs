//! # Snapshot Store
//!
//! Reads and writes the runtime snapshot as pretty-printed JSON under the
//! data directory. Writes go to a sibling temp file first and are renamed
//! into place, so a crash mid-write leaves the previous snapshot intact.
//!
//! A snapshot that fails its audit is still written, plus a copy under
//! [`inconsistent_path`] for inspection. Loading such a snapshot is refused
//! by [`Runtime::from_snapshot`](grantvault_contracts::Runtime::from_snapshot).

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use grantvault_contracts::config::SNAPSHOT_FILE_NAME;
use grantvault_contracts::Snapshot;

/// Appended to the snapshot file name for the audit-failure copy.
const INCONSISTENT_SUFFIX: &str = ".inconsistent";

/// Expands a leading `~` to `$HOME`. Other paths are returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Location of the snapshot file inside `data_dir`.
pub fn snapshot_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SNAPSHOT_FILE_NAME)
}

/// Where a copy of a snapshot that failed its audit is kept.
pub fn inconsistent_path(snapshot_path: &Path) -> PathBuf {
    let mut name = snapshot_path.as_os_str().to_owned();
    name.push(INCONSISTENT_SUFFIX);
    PathBuf::from(name)
}

/// Loads the snapshot at `path`, or `None` if no file exists yet.
pub fn load(path: &Path) -> Result<Option<Snapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let snapshot = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse snapshot {}", path.display()))?;
    Ok(Some(snapshot))
}

/// Writes `snapshot` to `path`, creating parent directories as needed.
pub fn save(path: &Path, snapshot: &Snapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let json = serde_json::to_vec_pretty(snapshot).context("failed to encode snapshot")?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .with_context(|| format!("failed to write snapshot {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to move snapshot into {}", path.display()))?;

    tracing::info!(
        path = %path.display(),
        taken_at = snapshot.taken_at,
        "snapshot saved"
    );
    Ok(())
}

/// Writes `snapshot` to `path` and audits it. On a violation, also writes
/// the copy at [`inconsistent_path`] and returns the violation.
pub fn persist(path: &Path, snapshot: &Snapshot) -> Result<Option<String>> {
    save(path, snapshot)?;
    let Some(violation) = snapshot.audit() else {
        return Ok(None);
    };

    let copy = inconsistent_path(path);
    save(&copy, snapshot)?;
    tracing::error!(
        %violation,
        path = %path.display(),
        copy = %copy.display(),
        "state audit failed, inconsistent snapshot kept for inspection"
    );
    Ok(Some(violation))
}
