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

//! Rowsets: immutable units of ingested data for one tablet.
//!
//! A rowset is produced by a delta writer, committed into the transaction
//! manager, and later published under an assigned version. The version is
//! the only mutable state; everything else is frozen when the writer seals
//! the rowset. Rowsets are shared as `Arc<Rowset>` between the writer, the
//! transaction manager's records and the tablet's visible set.

use std::sync::Arc;

use basalt_core::{LoadId, PartitionId, RowsetId, TabletId, TabletUid, TxnId, Version};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::segment::Segment;

/// Key model of the schema a rowset was written against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeysType {
    Duplicate,
    Aggregate,
    Unique,
}

/// Physical rowset variant. Only primary-key rowsets carry segment
/// key indexes and participate in delete-bitmap construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowsetKind {
    Basic,
    Primary,
}

/// Serializable rowset metadata persisted to the metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowsetMeta {
    pub rowset_id: RowsetId,
    pub partition_id: PartitionId,
    pub txn_id: TxnId,
    pub load_id: LoadId,
    pub tablet_id: TabletId,
    pub tablet_uid: TabletUid,
    pub keys_type: KeysType,
    pub kind: RowsetKind,
    pub version: Version,
    pub num_rows: u64,
}

/// An immutable rowset plus its single mutable field, the version.
///
/// `make_visible` is the one mutation point; the transaction manager
/// serializes it under the per-transaction lock during publish.
#[derive(Debug)]
pub struct Rowset {
    meta: RowsetMeta,
    version: RwLock<Version>,
    segments: Vec<Arc<Segment>>,
}

impl Rowset {
    pub fn new(meta: RowsetMeta, segments: Vec<Arc<Segment>>) -> Self {
        let version = meta.version;
        Self {
            meta,
            version: RwLock::new(version),
            segments,
        }
    }

    pub fn rowset_id(&self) -> RowsetId {
        self.meta.rowset_id
    }

    pub fn tablet_id(&self) -> TabletId {
        self.meta.tablet_id
    }

    pub fn keys_type(&self) -> KeysType {
        self.meta.keys_type
    }

    pub fn kind(&self) -> RowsetKind {
        self.meta.kind
    }

    pub fn num_rows(&self) -> u64 {
        self.meta.num_rows
    }

    pub fn version(&self) -> Version {
        *self.version.read()
    }

    /// Whether this rowset has been published.
    pub fn is_visible(&self) -> bool {
        self.version().is_visible()
    }

    /// Assign the publication version, making the rowset visible.
    pub fn make_visible(&self, version: Version) {
        *self.version.write() = version;
    }

    /// Snapshot of the meta with the current version folded in; this is
    /// what gets persisted through the rowset meta store.
    pub fn meta(&self) -> RowsetMeta {
        let mut meta = self.meta.clone();
        meta.version = self.version();
        meta
    }

    /// Segment handles for index iteration. In-memory here; the on-disk
    /// rowset implementation faults segment footers in at this point.
    pub fn load_segments(&self) -> basalt_core::Result<Vec<Arc<Segment>>> {
        Ok(self.segments.clone())
    }
}

/// Sink for rowsets whose transactions were deleted before publication.
/// The garbage collector drains it and reclaims the physical files.
pub trait UnusedRowsetSink: Send + Sync {
    fn add_unused_rowset(&self, rowset: Arc<Rowset>);
}

/// In-memory queue implementation of [`UnusedRowsetSink`].
#[derive(Default)]
pub struct UnusedRowsetQueue {
    rowsets: parking_lot::Mutex<Vec<Arc<Rowset>>>,
}

impl UnusedRowsetQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Arc<Rowset>> {
        std::mem::take(&mut *self.rowsets.lock())
    }

    pub fn len(&self) -> usize {
        self.rowsets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rowsets.lock().is_empty()
    }
}

impl UnusedRowsetSink for UnusedRowsetQueue {
    fn add_unused_rowset(&self, rowset: Arc<Rowset>) {
        self.rowsets.lock().push(rowset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn meta_for_test(rowset_id: RowsetId) -> RowsetMeta {
        RowsetMeta {
            rowset_id,
            partition_id: 1,
            txn_id: 100,
            load_id: LoadId::new(1, 1),
            tablet_id: 7,
            tablet_uid: TabletUid::new(1, 2),
            keys_type: KeysType::Unique,
            kind: RowsetKind::Primary,
            version: Version::UNSET,
            num_rows: 0,
        }
    }

    #[test]
    fn test_make_visible() {
        let rowset = Rowset::new(meta_for_test(RowsetId::new(0, 9)), Vec::new());
        assert!(!rowset.is_visible());

        rowset.make_visible(Version::single(5));
        assert!(rowset.is_visible());
        assert_eq!(rowset.version(), Version::new(5, 5));
        assert_eq!(rowset.meta().version, Version::new(5, 5));
    }

    #[test]
    fn test_meta_snapshot_keeps_identity() {
        let rowset = Rowset::new(meta_for_test(RowsetId::new(3, 4)), Vec::new());
        let meta = rowset.meta();
        assert_eq!(meta.rowset_id, RowsetId::new(3, 4));
        assert_eq!(meta.keys_type, KeysType::Unique);
    }

    #[test]
    fn test_unused_rowset_queue() {
        let queue = UnusedRowsetQueue::new();
        assert!(queue.is_empty());
        queue.add_unused_rowset(Arc::new(Rowset::new(
            meta_for_test(RowsetId::new(0, 1)),
            Vec::new(),
        )));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain().len(), 1);
        assert!(queue.is_empty());
    }
}
