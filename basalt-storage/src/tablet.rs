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

//! Tablets: the per-shard data objects the transaction manager publishes
//! into.
//!
//! A tablet owns its header — the visible rowset list and, for
//! merge-on-write tablets, the delete bitmap — behind a single RwLock.
//! Primary-key lookup walks visible rowsets newest-first and honors the
//! delete bitmap, so it always resolves to the most recent live
//! occurrence of a key.

use std::sync::Arc;

use basalt_core::{
    BasaltError, Result, RowsetId, SchemaHash, TabletId, TabletInfo, TabletUid,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::delete_bitmap::DeleteBitmap;
use crate::meta_store::MetaKv;
use crate::rowset::{KeysType, Rowset, RowsetKind, RowsetMeta};

const TABLET_META_PREFIX: &str = "tbm_";

/// Location of a row: which rowset, which segment, which row id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLocation {
    pub rowset_id: RowsetId,
    pub segment_id: u32,
    pub row_id: u32,
}

/// Mutable tablet header: visible rowsets plus the delete bitmap.
#[derive(Default)]
pub struct TabletMeta {
    visible_rowsets: Vec<Arc<Rowset>>,
    delete_bitmap: DeleteBitmap,
}

impl TabletMeta {
    pub fn visible_rowsets(&self) -> &[Arc<Rowset>] {
        &self.visible_rowsets
    }

    pub fn add_rowset(&mut self, rowset: Arc<Rowset>) {
        self.visible_rowsets.push(rowset);
    }

    pub fn delete_bitmap(&self) -> &DeleteBitmap {
        &self.delete_bitmap
    }

    pub fn delete_bitmap_mut(&mut self) -> &mut DeleteBitmap {
        &mut self.delete_bitmap
    }

    /// Find the most recent live occurrence of `key` among rowsets visible
    /// at `max_version`.
    ///
    /// Rowsets are scanned newest-version-first and segments within a
    /// rowset newest-first, skipping rows the delete bitmap marks
    /// superseded at or before `max_version`. Only primary-key rowsets
    /// carry a key index.
    pub fn lookup_row_key(&self, key: &[u8], max_version: i64) -> Result<Option<RowLocation>> {
        let mut candidates: Vec<&Arc<Rowset>> = self
            .visible_rowsets
            .iter()
            .filter(|r| {
                let v = r.version();
                v.is_visible() && v.end <= max_version && r.kind() == RowsetKind::Primary
            })
            .collect();
        candidates.sort_by_key(|r| std::cmp::Reverse(r.version().end));

        for rowset in candidates {
            let rowset_id = rowset.rowset_id();
            for segment in rowset.load_segments()?.iter().rev() {
                let Some(row_id) = segment.lookup_row_key(key) else {
                    continue;
                };
                if self
                    .delete_bitmap
                    .is_row_deleted(rowset_id, segment.id(), row_id, max_version)
                {
                    continue;
                }
                return Ok(Some(RowLocation {
                    rowset_id,
                    segment_id: segment.id(),
                    row_id,
                }));
            }
        }
        Ok(None)
    }
}

/// Serialized form of the tablet header.
#[derive(Serialize, Deserialize)]
struct TabletMetaRecord {
    rowsets: Vec<RowsetMeta>,
    delete_bitmap: Vec<u8>,
}

/// A tablet generation hosted by this node.
pub struct Tablet {
    tablet_id: TabletId,
    schema_hash: SchemaHash,
    tablet_uid: TabletUid,
    keys_type: KeysType,
    merge_on_write: bool,
    header: RwLock<TabletMeta>,
}

impl Tablet {
    pub fn new(
        tablet_id: TabletId,
        schema_hash: SchemaHash,
        tablet_uid: TabletUid,
        keys_type: KeysType,
        merge_on_write: bool,
    ) -> Self {
        Self {
            tablet_id,
            schema_hash,
            tablet_uid,
            keys_type,
            merge_on_write,
            header: RwLock::new(TabletMeta::default()),
        }
    }

    pub fn tablet_id(&self) -> TabletId {
        self.tablet_id
    }

    pub fn tablet_uid(&self) -> TabletUid {
        self.tablet_uid
    }

    pub fn tablet_info(&self) -> TabletInfo {
        TabletInfo::new(self.tablet_id, self.schema_hash, self.tablet_uid)
    }

    pub fn keys_type(&self) -> KeysType {
        self.keys_type
    }

    /// Whether this tablet resolves duplicate primary keys through the
    /// delete bitmap at write time.
    pub fn merge_on_write_enabled(&self) -> bool {
        self.merge_on_write && self.keys_type == KeysType::Unique
    }

    /// The header lock. Writers of the visible set or the delete bitmap
    /// hold it for the full mutation, including meta persistence.
    pub fn header(&self) -> &RwLock<TabletMeta> {
        &self.header
    }

    /// Append a published rowset to the visible set.
    pub fn add_rowset(&self, rowset: Arc<Rowset>) {
        self.header.write().add_rowset(rowset);
    }

    pub fn lookup_row_key(&self, key: &[u8], max_version: i64) -> Result<Option<RowLocation>> {
        self.header.read().lookup_row_key(key, max_version)
    }

    fn meta_key(&self) -> Vec<u8> {
        format!("{TABLET_META_PREFIX}{}", self.tablet_id).into_bytes()
    }

    /// Persist the header under the caller's guard; used on the publish
    /// path where the header write lock is already held.
    pub(crate) fn save_meta_locked(&self, meta: &TabletMeta, kv: &dyn MetaKv) -> Result<()> {
        let record = TabletMetaRecord {
            rowsets: meta.visible_rowsets.iter().map(|r| r.meta()).collect(),
            delete_bitmap: meta.delete_bitmap.to_bytes()?,
        };
        let bytes =
            bincode::serialize(&record).map_err(|e| BasaltError::Serialization(e.to_string()))?;
        kv.put(&self.meta_key(), &bytes)
    }

    pub fn save_meta(&self, kv: &dyn MetaKv) -> Result<()> {
        let meta = self.header.read();
        self.save_meta_locked(&meta, kv)
    }
}

/// Resolves tablet ids to live tablet handles.
#[derive(Default)]
pub struct TabletRegistry {
    tablets: DashMap<TabletId, Arc<Tablet>>,
}

impl TabletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tablet: Arc<Tablet>) {
        self.tablets.insert(tablet.tablet_id(), tablet);
    }

    pub fn get(&self, tablet_id: TabletId) -> Option<Arc<Tablet>> {
        self.tablets.get(&tablet_id).map(|t| Arc::clone(t.value()))
    }

    pub fn remove(&self, tablet_id: TabletId) -> Option<Arc<Tablet>> {
        self.tablets.remove(&tablet_id).map(|(_, t)| t)
    }

    pub fn len(&self) -> usize {
        self.tablets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tablets.is_empty()
    }
}
