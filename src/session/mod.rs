//! Session storage
//!
//! Persists the decoded session credential and the gateway's incremental
//! authentication state to a single directory:
//!
//! ```text
//! <session_dir>/
//! ├── creds.json            decoded credential, rewritten on every rotation
//! └── key-<name>.json       one file per auth key entry
//! ```
//!
//! The whole directory is removed on terminal logout.

mod bootstrap;
mod state;

pub use bootstrap::{bootstrap, Bootstrap};
pub use state::{AuthState, AuthUpdate};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Result;

/// File name of the primary credential blob
pub const CREDS_FILE: &str = "creds.json";

const KEY_PREFIX: &str = "key-";
const KEY_SUFFIX: &str = ".json";

/// Durable store for session material
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Create a store rooted at `dir` (created lazily)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        SessionStore { dir: dir.into() }
    }

    /// Session directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the credential file
    pub fn creds_path(&self) -> PathBuf {
        self.dir.join(CREDS_FILE)
    }

    /// Whether a stored credential exists
    pub fn exists(&self) -> bool {
        self.creds_path().is_file()
    }

    /// Create the session directory if absent
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Persist freshly decoded credential bytes
    pub async fn persist(&self, bytes: &[u8]) -> Result<()> {
        self.ensure_dir().await?;
        write_atomic(&self.creds_path(), bytes).await?;
        info!(
            "Session credential saved to {} ({} bytes)",
            self.creds_path().display(),
            bytes.len()
        );
        Ok(())
    }

    /// Read the stored credential bytes, if any
    pub async fn load_credentials(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.creds_path()).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Load the full auth state handed to the gateway on connect
    pub async fn load(&self) -> Result<AuthState> {
        self.ensure_dir().await?;

        let creds = self.load_credentials().await?.unwrap_or_default();
        let mut keys = BTreeMap::new();

        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().and_then(key_name_from_file) else {
                continue;
            };
            let bytes = tokio::fs::read(entry.path()).await?;
            keys.insert(name, bytes);
        }

        debug!("Loaded auth state: {} bytes of creds, {} keys", creds.len(), keys.len());
        Ok(AuthState { creds, keys })
    }

    /// Persist a rotation reported by the gateway.
    ///
    /// Completes only once every file is on disk.
    pub async fn on_credentials_updated(&self, update: &AuthUpdate) -> Result<()> {
        self.ensure_dir().await?;

        if let Some(ref creds) = update.creds {
            write_atomic(&self.creds_path(), creds).await?;
        }

        for (name, value) in &update.keys {
            let path = self.dir.join(key_file_name(name));
            match value {
                Some(bytes) => write_atomic(&path, bytes).await?,
                None => match tokio::fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                },
            }
        }

        debug!(
            "Persisted credential update (creds: {}, keys: {})",
            update.creds.is_some(),
            update.keys.len()
        );
        Ok(())
    }

    /// Delete the whole session directory
    pub async fn purge(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                info!("Session directory {} deleted", self.dir.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Escape a key name into a file name. Reversible.
fn key_file_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '/' => escaped.push_str("%2F"),
            '\\' => escaped.push_str("%5C"),
            ':' => escaped.push_str("%3A"),
            _ => escaped.push(c),
        }
    }
    format!("{}{}{}", KEY_PREFIX, escaped, KEY_SUFFIX)
}

fn key_name_from_file(file_name: &str) -> Option<String> {
    let escaped = file_name.strip_prefix(KEY_PREFIX)?.strip_suffix(KEY_SUFFIX)?;
    Some(
        escaped
            .replace("%2F", "/")
            .replace("%5C", "\\")
            .replace("%3A", ":")
            .replace("%25", "%"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_persist_and_reload_is_byte_identical() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session"));
        assert!(!store.exists());

        let bytes = b"{\"noiseKey\":\"\xF0\x9F\x94\x91\"}".to_vec();
        store.persist(&bytes).await.unwrap();

        assert!(store.exists());
        assert_eq!(store.load_credentials().await.unwrap(), Some(bytes.clone()));
        assert_eq!(store.load().await.unwrap().creds, bytes);
    }

    #[tokio::test]
    async fn test_credentials_update_writes_and_removes_keys() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session"));

        let mut update = AuthUpdate::default();
        update.creds = Some(b"rotated".to_vec());
        update.keys.insert("pre-key:1".to_string(), Some(b"one".to_vec()));
        update.keys.insert("session/abc".to_string(), Some(b"two".to_vec()));
        store.on_credentials_updated(&update).await.unwrap();

        let state = store.load().await.unwrap();
        assert_eq!(state.creds, b"rotated");
        assert_eq!(state.keys.get("pre-key:1").map(Vec::as_slice), Some(&b"one"[..]));
        assert_eq!(state.keys.get("session/abc").map(Vec::as_slice), Some(&b"two"[..]));

        let mut removal = AuthUpdate::default();
        removal.keys.insert("pre-key:1".to_string(), None);
        store.on_credentials_updated(&removal).await.unwrap();

        let state = store.load().await.unwrap();
        assert_eq!(state.creds, b"rotated");
        assert!(!state.keys.contains_key("pre-key:1"));
        assert_eq!(state.keys.len(), 1);
    }

    #[tokio::test]
    async fn test_purge_removes_everything() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session"));
        store.persist(b"creds").await.unwrap();

        store.purge().await.unwrap();
        assert!(!store.exists());
        assert!(!store.dir().exists());

        // Idempotent
        store.purge().await.unwrap();
    }

    #[tokio::test]
    async fn test_load_creates_missing_dir() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nested").join("session"));

        let state = store.load().await.unwrap();
        assert!(state.creds.is_empty());
        assert!(state.keys.is_empty());
        assert!(store.dir().is_dir());
    }

    #[test]
    fn test_key_file_names_round_trip() {
        for name in ["plain", "pre-key:12", "app/state%sync", "a\\b"] {
            let file = key_file_name(name);
            assert!(!file[KEY_PREFIX.len()..].contains('/'));
            assert_eq!(key_name_from_file(&file).as_deref(), Some(name));
        }
        assert_eq!(key_name_from_file(CREDS_FILE), None);
    }
}
