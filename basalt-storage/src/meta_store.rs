// Copyright 2026 the Basalt Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-data-directory metadata store and the rowset meta adapter.
//!
//! `MetaKv` is the ordered key-value surface the node persists small
//! metadata through: committed rowset metas, tablet headers. Two
//! implementations are provided: an in-memory map for tests and
//! ephemeral nodes, and an append-only log replayed on open for durable
//! deployments. The log tolerates a torn tail: replay stops at the first
//! record that fails its length or checksum validation.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use basalt_core::{BasaltError, Result, RowsetId, TabletUid};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::rowset::RowsetMeta;

/// Ordered key-value store scoped to one data directory.
pub trait MetaKv: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Idempotent: removing an absent key succeeds.
    fn remove(&self, key: &[u8]) -> Result<()>;

    /// Visit entries with the given prefix in ascending key order; the
    /// visitor returns `false` to stop early.
    fn prefix_scan(
        &self,
        prefix: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<()>;
}

// =============================================================================
// In-memory backend
// =============================================================================

/// In-memory [`MetaKv`].
#[derive(Default)]
pub struct MemMetaKv {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemMetaKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetaKv for MemMetaKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn prefix_scan(
        &self,
        prefix: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<()> {
        let entries = self.entries.read();
        for (key, value) in entries.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            if !visit(key, value) {
                break;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Append-only log backend
// =============================================================================

const OP_PUT: u8 = 1;
const OP_REMOVE: u8 = 2;

/// Durable [`MetaKv`] backed by an append-only log.
///
/// Record layout: `op (u8) | key_len (u32 le) | key | val_len (u32 le) |
/// val | crc32 (u32 le over op+key+val)`. The full map is replayed into
/// memory on open; reads never touch the file.
pub struct LogMetaKv {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    log: Mutex<File>,
    path: PathBuf,
}

impl LogMetaKv {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut entries = BTreeMap::new();
        if path.exists() {
            let mut data = Vec::new();
            File::open(&path)?.read_to_end(&mut data)?;
            Self::replay(&path, &data, &mut entries);
        }
        let log = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(path = %path.display(), entries = entries.len(), "opened meta store");
        Ok(Self {
            entries: RwLock::new(entries),
            log: Mutex::new(log),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn replay(path: &Path, data: &[u8], entries: &mut BTreeMap<Vec<u8>, Vec<u8>>) {
        let mut offset = 0usize;
        while offset < data.len() {
            match Self::decode_record(&data[offset..]) {
                Some((op, key, value, consumed)) => {
                    match op {
                        OP_PUT => {
                            entries.insert(key, value);
                        }
                        OP_REMOVE => {
                            entries.remove(&key);
                        }
                        _ => {
                            warn!(
                                path = %path.display(),
                                offset,
                                op,
                                "unknown meta log op, stopping replay"
                            );
                            return;
                        }
                    }
                    offset += consumed;
                }
                None => {
                    warn!(
                        path = %path.display(),
                        offset,
                        total = data.len(),
                        "torn or corrupt meta log tail, stopping replay"
                    );
                    return;
                }
            }
        }
    }

    fn decode_record(data: &[u8]) -> Option<(u8, Vec<u8>, Vec<u8>, usize)> {
        if data.len() < 9 {
            return None;
        }
        let op = data[0];
        let key_len = u32::from_le_bytes(data[1..5].try_into().ok()?) as usize;
        let mut offset = 5usize;
        let key = data.get(offset..offset + key_len)?.to_vec();
        offset += key_len;
        let val_len = u32::from_le_bytes(data.get(offset..offset + 4)?.try_into().ok()?) as usize;
        offset += 4;
        let value = data.get(offset..offset + val_len)?.to_vec();
        offset += val_len;
        let stored_crc = u32::from_le_bytes(data.get(offset..offset + 4)?.try_into().ok()?);
        offset += 4;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&[op]);
        hasher.update(&key);
        hasher.update(&value);
        if hasher.finalize() != stored_crc {
            return None;
        }
        Some((op, key, value, offset))
    }

    fn append(&self, op: u8, key: &[u8], value: &[u8]) -> Result<()> {
        let mut buf = Vec::with_capacity(13 + key.len() + value.len());
        buf.push(op);
        buf.extend(&(key.len() as u32).to_le_bytes());
        buf.extend(key);
        buf.extend(&(value.len() as u32).to_le_bytes());
        buf.extend(value);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&[op]);
        hasher.update(key);
        hasher.update(value);
        buf.extend(&hasher.finalize().to_le_bytes());

        let mut log = self.log.lock();
        log.write_all(&buf)?;
        log.sync_data()?;
        Ok(())
    }
}

impl MetaKv for LogMetaKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.append(OP_PUT, key, value)?;
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        self.append(OP_REMOVE, key, &[])?;
        self.entries.write().remove(key);
        Ok(())
    }

    fn prefix_scan(
        &self,
        prefix: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<()> {
        let entries = self.entries.read();
        for (key, value) in entries.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            if !visit(key, value) {
                break;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Rowset meta adapter
// =============================================================================

const ROWSET_META_PREFIX: &str = "rsm_";

/// Adapter persisting rowset metas into a [`MetaKv`], keyed by
/// `(tablet_uid, rowset_id)`.
pub struct RowsetMetaStore;

impl RowsetMetaStore {
    fn key(tablet_uid: TabletUid, rowset_id: RowsetId) -> Vec<u8> {
        format!("{ROWSET_META_PREFIX}{tablet_uid}_{rowset_id}").into_bytes()
    }

    fn parse_key(key: &[u8]) -> Option<(TabletUid, RowsetId)> {
        let key = std::str::from_utf8(key).ok()?;
        let rest = key.strip_prefix(ROWSET_META_PREFIX)?;
        let (uid, rid) = rest.split_at_checked(33)?;
        let rid = rid.strip_prefix('_')?;
        Some((uid.parse().ok()?, rid.parse().ok()?))
    }

    /// Durable overwrite of the serialized rowset meta.
    pub fn save(
        kv: &dyn MetaKv,
        tablet_uid: TabletUid,
        rowset_id: RowsetId,
        meta: &RowsetMeta,
    ) -> Result<()> {
        let bytes =
            bincode::serialize(meta).map_err(|e| BasaltError::Serialization(e.to_string()))?;
        kv.put(&Self::key(tablet_uid, rowset_id), &bytes)
    }

    /// Idempotent removal.
    pub fn remove(kv: &dyn MetaKv, tablet_uid: TabletUid, rowset_id: RowsetId) -> Result<()> {
        kv.remove(&Self::key(tablet_uid, rowset_id))
    }

    pub fn exists(kv: &dyn MetaKv, tablet_uid: TabletUid, rowset_id: RowsetId) -> Result<bool> {
        Ok(kv.get(&Self::key(tablet_uid, rowset_id))?.is_some())
    }

    pub fn load(
        kv: &dyn MetaKv,
        tablet_uid: TabletUid,
        rowset_id: RowsetId,
    ) -> Result<Option<RowsetMeta>> {
        match kv.get(&Self::key(tablet_uid, rowset_id))? {
            None => Ok(None),
            Some(bytes) => {
                let meta = bincode::deserialize(&bytes)
                    .map_err(|e| BasaltError::Corruption(format!("bad rowset meta: {e}")))?;
                Ok(Some(meta))
            }
        }
    }

    /// Visit every persisted rowset meta; used by the startup replay that
    /// rebuilds the transaction manager via recovery-mode commits.
    pub fn traverse(
        kv: &dyn MetaKv,
        visit: &mut dyn FnMut(TabletUid, RowsetId, &[u8]) -> bool,
    ) -> Result<()> {
        kv.prefix_scan(ROWSET_META_PREFIX.as_bytes(), &mut |key, value| {
            match Self::parse_key(key) {
                Some((tablet_uid, rowset_id)) => visit(tablet_uid, rowset_id, value),
                None => {
                    warn!(key = ?String::from_utf8_lossy(key), "skipping unparsable rowset meta key");
                    true
                }
            }
        })
    }
}
