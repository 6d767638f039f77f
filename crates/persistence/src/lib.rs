#![deny(warnings)]

//! Persistence layer: the save-store capability and the snapshot format.
//!
//! A store holds named string blobs (get/set/remove). The engine keeps a
//! single [`Snapshot`] under one fixed key, encoded as camelCase JSON.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;

/// Key the snapshot is stored under unless configured otherwise.
pub const DEFAULT_SAVE_KEY: &str = "idle-economy.save";

/// Errors surfaced by stores and the snapshot codec.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid save key: {0:?}")]
    InvalidKey(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Durable key-value storage for named blobs.
pub trait SaveStore {
    /// Read the blob under `key`, `None` if nothing is stored.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous blob.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Delete the blob under `key`. Removing a missing key is not an error.
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// Serialized progress record.
///
/// Derived stats are deliberately absent; they are recomputed from
/// `upgrade_levels` on load. Money is written as a JSON number carrying the
/// full decimal text, so a save and reload gives back the same value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(with = "rust_decimal::serde::arbitrary_precision", default)]
    pub resource: Decimal,
    #[serde(with = "rust_decimal::serde::arbitrary_precision", default)]
    pub total_earned: Decimal,
    #[serde(default)]
    pub upgrade_levels: BTreeMap<String, u32>,
    /// Wall-clock time of the write; older saves may not carry it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at_epoch_millis: Option<i64>,
    #[serde(default = "default_sound_enabled")]
    pub sound_enabled: bool,
}

fn default_sound_enabled() -> bool {
    true
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            resource: Decimal::ZERO,
            total_earned: Decimal::ZERO,
            upgrade_levels: BTreeMap::new(),
            saved_at_epoch_millis: None,
            sound_enabled: true,
        }
    }
}

impl Snapshot {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Read and decode the snapshot under `key`.
pub fn load_snapshot(store: &dyn SaveStore, key: &str) -> Result<Option<Snapshot>> {
    match store.get(key)? {
        Some(blob) => Snapshot::decode(&blob).map(Some),
        None => Ok(None),
    }
}

/// Encode and write `snapshot` under `key`.
pub fn write_snapshot(store: &mut dyn SaveStore, key: &str, snapshot: &Snapshot) -> Result<()> {
    let blob = snapshot.encode()?;
    store.set(key, &blob)?;
    debug!(key, bytes = blob.len(), "snapshot written");
    Ok(())
}

#[derive(Debug, Default)]
struct MemoryInner {
    blobs: HashMap<String, String>,
    writes: usize,
    fail_writes: bool,
}

/// In-memory store. Clones share the same contents, so a caller can hand one
/// clone to the engine and inspect writes through another.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `set` calls so far.
    pub fn writes(&self) -> usize {
        self.inner.borrow().writes
    }

    /// Make every subsequent `set` fail, simulating a full or revoked backend.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.borrow_mut().fail_writes = fail;
    }

    /// Put a raw blob in place without counting it as a write.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.inner
            .borrow_mut()
            .blobs
            .insert(key.to_string(), value.to_string());
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.inner.borrow().blobs.get(key).cloned()
    }
}

impl SaveStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.raw(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_writes {
            return Err(PersistenceError::Unavailable("writes disabled".into()));
        }
        inner.blobs.insert(key.to_string(), value.to_string());
        inner.writes += 1;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.inner.borrow_mut().blobs.remove(key);
        Ok(())
    }
}

/// Directory-backed store: one `<key>.json` file per key.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
            return Err(PersistenceError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl SaveStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)?;
        // Write to a temp file first, then rename over the old save.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
