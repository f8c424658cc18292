//! Whole-document transcript storage with file locking.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

use fd_lock::RwLock;

use crate::{
    error::{Error, Result},
    model::{ChatKey, Transcript, Turn},
};

/// Durable per-chat transcript storage.
///
/// One pretty-printed JSON document per chat key. `load` of an unknown chat
/// returns an empty transcript; `save` replaces the document whole
/// (create + truncate) under an exclusive advisory lock, so the store is
/// never left holding a half-written document visible to readers honoring
/// the lock.
pub struct TranscriptStore {
    base_dir: PathBuf,
}

impl TranscriptStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Sanitize a chat key for use as a filename. Telegram chat ids are
    /// numeric (group ids carry a leading `-`), but the store accepts any
    /// opaque key.
    fn key_to_filename(key: &ChatKey) -> String {
        key.as_str()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    fn path_for(&self, key: &ChatKey) -> PathBuf {
        self.base_dir
            .join(format!("{}.json", Self::key_to_filename(key)))
    }

    /// Read the persisted transcript for `key`, or an empty one if none
    /// exists. Only I/O faults and corrupt documents are errors.
    pub async fn load(&self, key: &ChatKey) -> Result<Transcript> {
        let path = self.path_for(key);

        tokio::task::spawn_blocking(move || -> Result<Transcript> {
            if !path.exists() {
                return Ok(Transcript::new());
            }
            let data = fs::read_to_string(&path)?;
            if data.trim().is_empty() {
                return Ok(Transcript::new());
            }
            Ok(serde_json::from_str(&data)?)
        })
        .await?
    }

    /// Replace the persisted transcript for `key` with `transcript`.
    pub async fn save(&self, key: &ChatKey, transcript: &[Turn]) -> Result<()> {
        let path = self.path_for(key);
        let doc = serde_json::to_string_pretty(transcript)?;

        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)?;
            let mut lock = RwLock::new(file);
            let mut guard = lock.write().map_err(|e| Error::lock_failed(e.to_string()))?;
            guard.write_all(doc.as_bytes())?;
            writeln!(*guard)?;
            Ok(())
        })
        .await??;

        Ok(())
    }
}
