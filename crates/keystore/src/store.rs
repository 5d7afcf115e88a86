//! Wallet file persistence.
//!
//! The file is a JSON object mapping agent id to identity record. Writers hold
//! an exclusive lock on `<file>.lock`, rewrite the whole mapping into
//! `<file>.tmp` with mode 0600 and rename it over the target. Readers never
//! lock: they see either the previous or the next complete snapshot.

use chrono::{DateTime, Utc};
use custody_core::types::DelegationCredential;
use custody_core::{Error, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

pub(crate) type WalletMap = BTreeMap<String, StoredIdentity>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredIdentity {
    pub public_address: String,
    pub secret: StoredSecret,
    #[serde(default)]
    pub credential: Option<DelegationCredential>,
    pub created_at: DateTime<Utc>,
}

/// Secret seed as written to disk.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "snake_case")]
pub(crate) enum StoredSecret {
    /// Base-58 seed, protected by file permissions only.
    Plain { seed: String },
    /// Base-64 AES-GCM ciphertext (nonce prefixed) and salt.
    Sealed { ciphertext: String, salt: String },
}

impl std::fmt::Debug for StoredSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain { .. } => f.write_str("Plain([REDACTED])"),
            Self::Sealed { .. } => f.write_str("Sealed([REDACTED])"),
        }
    }
}

/// Load the mapping; a missing file is an empty store.
#[allow(clippy::result_large_err)]
pub(crate) fn read(path: &Path) -> Result<WalletMap> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(WalletMap::new()),
        Err(e) => return Err(e.into()),
    };

    if content.trim().is_empty() {
        return Ok(WalletMap::new());
    }

    serde_json::from_str(&content).map_err(|e| {
        Error::storage(format!(
            "wallet file {} is not a valid wallet store: {}",
            path.display(),
            e
        ))
    })
}

/// Read-modify-write under the cross-process lock.
///
/// `apply` returns its result and whether the mapping changed; unchanged
/// mappings are not rewritten.
#[allow(clippy::result_large_err)]
pub(crate) fn mutate<R, F>(path: &Path, apply: F) -> Result<R>
where
    F: FnOnce(&mut WalletMap) -> Result<(R, bool)>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(sidecar(path, ".lock"))?;
    FileExt::lock_exclusive(&lock)?;

    let result = read(path).and_then(|mut map| {
        let (value, changed) = apply(&mut map)?;
        if changed {
            write_atomic(path, &map)?;
        }
        Ok(value)
    });

    FileExt::unlock(&lock)?;
    result
}

#[allow(clippy::result_large_err)]
fn write_atomic(path: &Path, map: &WalletMap) -> Result<()> {
    let temp_path = sidecar(path, ".tmp");
    let content = serde_json::to_vec_pretty(map)?;

    {
        let mut file = create_private(&temp_path)?;
        file.write_all(&content)?;
        file.sync_all()?;
    }
    restrict_permissions(&temp_path)?;

    fs::rename(&temp_path, path).map_err(|e| {
        Error::storage(format!(
            "failed to replace wallet file {}: {}",
            path.display(),
            e
        ))
    })
}

#[cfg(unix)]
fn create_private(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

/// A stale temp file may predate us with wider permissions.
#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
