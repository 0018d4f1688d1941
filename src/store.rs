// src/store.rs
//! Explicit key space owning digests (and plain string values) by key.
//!
//! Snapshots hold one codec blob per digest key and are framed with bincode.
//! Loading replaces the whole key space; there is no partial restore.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::tdigest::wire::{decode_digest, encode_digest};
use crate::tdigest::TDigest;
use crate::{TdError, TdResult};

const SNAPSHOT_VERSION: u32 = 1;

/// A value held under a key.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Digest(TDigest),
    Str(String),
}

impl Value {
    /// Reported footprint in bytes.
    pub fn memory_usage(&self) -> usize {
        match self {
            Value::Digest(td) => td.memory_usage(),
            Value::Str(s) => std::mem::size_of::<String>() + s.len(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
enum EntryKind {
    Digest,
    Str,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry {
    key: String,
    kind: EntryKind,
    blob: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Default, Clone)]
pub struct Keyspace {
    entries: HashMap<String, Value>,
}

impl Keyspace {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn exists(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Borrow the digest under `key`; `KeyMissing` or `WrongType` otherwise.
    pub fn digest(&self, key: &str) -> TdResult<&TDigest> {
        match self.entries.get(key) {
            Some(Value::Digest(td)) => Ok(td),
            Some(_) => Err(TdError::WrongType { key: key.into() }),
            None => Err(TdError::KeyMissing { key: key.into() }),
        }
    }

    pub fn digest_mut(&mut self, key: &str) -> TdResult<&mut TDigest> {
        match self.entries.get_mut(key) {
            Some(Value::Digest(td)) => Ok(td),
            Some(_) => Err(TdError::WrongType { key: key.into() }),
            None => Err(TdError::KeyMissing { key: key.into() }),
        }
    }

    /// Store a new digest. Never overwrites: an existing digest is `KeyExists`,
    /// any other value is `WrongType`.
    pub fn create_digest(&mut self, key: &str, td: TDigest) -> TdResult<()> {
        match self.entries.get(key) {
            Some(Value::Digest(_)) => Err(TdError::KeyExists { key: key.into() }),
            Some(_) => Err(TdError::WrongType { key: key.into() }),
            None => {
                self.entries.insert(key.to_string(), Value::Digest(td));
                Ok(())
            }
        }
    }

    /// Store a string, replacing whatever the key held.
    pub fn set_string(&mut self, key: &str, value: impl Into<String>) {
        self.entries
            .insert(key.to_string(), Value::Str(value.into()));
    }

    /// `Ok(None)` for a missing key; `WrongType` if the key holds a digest.
    pub fn get_string(&self, key: &str) -> TdResult<Option<&str>> {
        match self.entries.get(key) {
            Some(Value::Str(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(TdError::WrongType { key: key.into() }),
            None => Ok(None),
        }
    }

    /// Remove `key`; returns whether it existed. Dropping the value releases the digest.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn memory_usage(&self, key: &str) -> Option<usize> {
        self.entries.get(key).map(Value::memory_usage)
    }

    /* ===========================
     * Snapshots
     * =========================== */

    /// Encode every key. Digests are compressed on the way out.
    pub fn to_snapshot(&mut self) -> TdResult<Vec<u8>> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort_unstable();

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(value) = self.entries.get_mut(&key) else {
                continue;
            };
            let (kind, blob) = match value {
                Value::Digest(td) => (EntryKind::Digest, encode_digest(td)),
                Value::Str(s) => (EntryKind::Str, s.as_bytes().to_vec()),
            };
            entries.push(SnapshotEntry { key, kind, blob });
        }

        let snap = Snapshot {
            version: SNAPSHOT_VERSION,
            entries,
        };
        bincode::serde::encode_to_vec(&snap, bincode::config::standard())
            .map_err(|e| TdError::corrupt(format!("snapshot encode: {e}")))
    }

    /// Rebuild a key space from [`Keyspace::to_snapshot`] output.
    pub fn from_snapshot(bytes: &[u8]) -> TdResult<Keyspace> {
        let (snap, used): (Snapshot, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| TdError::corrupt(format!("snapshot decode: {e}")))?;
        if used != bytes.len() {
            return Err(TdError::corrupt("trailing bytes after snapshot"));
        }
        if snap.version != SNAPSHOT_VERSION {
            return Err(TdError::corrupt(format!(
                "unsupported snapshot version {}",
                snap.version
            )));
        }

        let mut entries = HashMap::with_capacity(snap.entries.len());
        for SnapshotEntry { key, kind, blob } in snap.entries {
            let value = match kind {
                EntryKind::Digest => Value::Digest(decode_digest(&blob)?),
                EntryKind::Str => Value::Str(
                    String::from_utf8(blob)
                        .map_err(|_| TdError::corrupt(format!("non-utf8 string at {key}")))?,
                ),
            };
            if entries.insert(key.clone(), value).is_some() {
                return Err(TdError::corrupt(format!("duplicate key {key}")));
            }
        }
        Ok(Keyspace { entries })
    }

    /// Write a snapshot to `path`, going through a sibling temp file so a crash
    /// never leaves a half-written snapshot behind.
    pub fn save(&mut self, path: &Path) -> TdResult<()> {
        let bytes = self.to_snapshot()?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, path)?;
        info!(path = %path.display(), keys = self.len(), bytes = bytes.len(), "snapshot saved");
        Ok(())
    }

    pub fn load(path: &Path) -> TdResult<Keyspace> {
        let bytes = fs::read(path)?;
        let ks = Self::from_snapshot(&bytes)?;
        info!(path = %path.display(), keys = ks.len(), "snapshot loaded");
        Ok(ks)
    }
}
