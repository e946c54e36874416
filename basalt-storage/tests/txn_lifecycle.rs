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

//! End-to-end transaction lifecycle tests: prepare/commit/publish against
//! real metadata stores, publish retry after a failed save, startup
//! recovery replay, and delete-bitmap construction across batch
//! boundaries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use basalt_core::{
    BasaltError, LoadId, Result, TabletInfo, TabletUid, TxnConfig, Version,
};
use basalt_storage::{
    BitmapKey, KeysType, LogMetaKv, MemMetaKv, MetaKv, Rowset, RowsetKind, RowsetMeta,
    RowsetMetaStore, Segment, Tablet, TabletRegistry, TxnManager, UnusedRowsetQueue,
};
use proptest::prelude::*;
use tempfile::tempdir;

const TABLET_UID: TabletUid = TabletUid { hi: 0xaa, lo: 0xbb };

fn tablet_info(tablet_id: i64) -> TabletInfo {
    TabletInfo::new(tablet_id, 1111, TABLET_UID)
}

fn make_rowset(lo: u64, txn_id: i64, segments: Vec<(u32, Vec<String>)>) -> Arc<Rowset> {
    let segments: Vec<Arc<Segment>> = segments
        .into_iter()
        .map(|(id, keys)| {
            let keys = keys.into_iter().map(String::into_bytes).collect();
            Arc::new(Segment::from_sorted_keys(id, keys).unwrap())
        })
        .collect();
    let num_rows = segments.iter().map(|s| s.num_rows() as u64).sum();
    Arc::new(Rowset::new(
        RowsetMeta {
            rowset_id: basalt_core::RowsetId::new(0, lo),
            partition_id: 1,
            txn_id,
            load_id: LoadId::new(lo, lo),
            tablet_id: 7,
            tablet_uid: TABLET_UID,
            keys_type: KeysType::Unique,
            kind: RowsetKind::Primary,
            version: Version::UNSET,
            num_rows,
        },
        segments,
    ))
}

fn sorted_keys(keys: &[&str]) -> Vec<String> {
    let mut keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    keys.sort();
    keys.dedup();
    keys
}

fn manager(config: TxnConfig) -> (TxnManager, Arc<TabletRegistry>, Arc<UnusedRowsetQueue>) {
    let registry = Arc::new(TabletRegistry::new());
    let queue = Arc::new(UnusedRowsetQueue::new());
    let mgr = TxnManager::new(config, registry.clone(), queue.clone());
    (mgr, registry, queue)
}

#[test]
fn test_full_lifecycle_happy_path() {
    let (mgr, _, _) = manager(TxnConfig::default());
    let kv = MemMetaKv::new();
    let ti = tablet_info(7);
    let load = LoadId::new(1, 2);
    let rowset = make_rowset(1, 100, vec![(0, sorted_keys(&["k1", "k2"]))]);

    mgr.prepare_txn(1, 100, ti, load).unwrap();
    assert!(mgr.has_txn(1, 100, ti));

    mgr.commit_txn(&kv, 1, 100, ti, load, &rowset, false).unwrap();
    assert!(RowsetMetaStore::exists(&kv, TABLET_UID, rowset.rowset_id()).unwrap());

    mgr.publish_txn(&kv, 1, 100, ti, Version::single(5)).unwrap();
    assert!(!mgr.has_txn(1, 100, ti));
    assert_eq!(rowset.version(), Version::new(5, 5));
    assert!(RowsetMetaStore::exists(&kv, TABLET_UID, rowset.rowset_id()).unwrap());
}

#[test]
fn test_publish_unknown_txn_leaves_tablet_meta_untouched() {
    let (mgr, registry, _) = manager(TxnConfig::default());
    let kv = MemMetaKv::new();
    registry.register(Arc::new(Tablet::new(7, 1111, TABLET_UID, KeysType::Unique, true)));

    let err = mgr
        .publish_txn(&kv, 1, 100, tablet_info(7), Version::single(5))
        .unwrap_err();
    assert!(matches!(err, BasaltError::TxnNotExist(_)));
    assert!(kv.get(b"tbm_7").unwrap().is_none());
}

/// MetaKv wrapper that fails puts while the switch is on.
struct FlakyKv {
    inner: MemMetaKv,
    fail_puts: AtomicBool,
}

impl FlakyKv {
    fn new() -> Self {
        Self {
            inner: MemMetaKv::new(),
            fail_puts: AtomicBool::new(false),
        }
    }
}

impl MetaKv for FlakyKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(BasaltError::Io(std::io::Error::other(
                "injected put failure",
            )));
        }
        self.inner.put(key, value)
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        self.inner.remove(key)
    }

    fn prefix_scan(
        &self,
        prefix: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<()> {
        self.inner.prefix_scan(prefix, visit)
    }
}

#[test]
fn test_publish_retry_after_save_failure() {
    let (mgr, _, _) = manager(TxnConfig::default());
    let kv = FlakyKv::new();
    let ti = tablet_info(7);
    let load = LoadId::new(1, 2);
    let rowset = make_rowset(1, 100, vec![]);

    mgr.commit_txn(&kv, 1, 100, ti, load, &rowset, false).unwrap();

    kv.fail_puts.store(true, Ordering::SeqCst);
    let err = mgr
        .publish_txn(&kv, 1, 100, ti, Version::single(5))
        .unwrap_err();
    assert!(matches!(err, BasaltError::RowsetSaveFailed(_)));
    // The record survives; the version was optimistically assigned.
    assert!(mgr.has_txn(1, 100, ti));
    assert_eq!(rowset.version(), Version::new(5, 5));
    // The store still holds the committed (unpublished) meta.
    let saved = RowsetMetaStore::load(&kv, TABLET_UID, rowset.rowset_id())
        .unwrap()
        .unwrap();
    assert_eq!(saved.version, Version::UNSET);

    // Retry observes the same record and re-assigns the same version.
    kv.fail_puts.store(false, Ordering::SeqCst);
    mgr.publish_txn(&kv, 1, 100, ti, Version::single(5)).unwrap();
    assert!(!mgr.has_txn(1, 100, ti));
    let saved = RowsetMetaStore::load(&kv, TABLET_UID, rowset.rowset_id())
        .unwrap()
        .unwrap();
    assert_eq!(saved.version, Version::new(5, 5));
}

#[test]
fn test_recovery_replay_from_durable_store() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("meta.log");
    let ti = tablet_info(7);

    // First engine incarnation commits two loads durably.
    {
        let kv = LogMetaKv::open(&path).unwrap();
        let (mgr, _, _) = manager(TxnConfig::default());
        for (lo, txn_id) in [(1u64, 100i64), (2, 200)] {
            let rowset = make_rowset(lo, txn_id, vec![]);
            mgr.prepare_txn(1, txn_id, ti, LoadId::new(lo, lo)).unwrap();
            mgr.commit_txn(&kv, 1, txn_id, ti, LoadId::new(lo, lo), &rowset, false)
                .unwrap();
        }
    }

    // Restart: replay persisted rowset metas into a fresh manager with
    // recovery-mode commits.
    let kv = LogMetaKv::open(&path).unwrap();
    let (mgr, _, _) = manager(TxnConfig::default());
    let mut replayed = Vec::new();
    RowsetMetaStore::traverse(&kv, &mut |tablet_uid, rowset_id, _| {
        replayed.push((tablet_uid, rowset_id));
        true
    })
    .unwrap();
    assert_eq!(replayed.len(), 2);

    for (tablet_uid, rowset_id) in replayed {
        let meta = RowsetMetaStore::load(&kv, tablet_uid, rowset_id)
            .unwrap()
            .unwrap();
        let info = TabletInfo::new(meta.tablet_id, 1111, meta.tablet_uid);
        let rowset = Arc::new(Rowset::new(meta.clone(), Vec::new()));
        mgr.commit_txn(
            &kv,
            meta.partition_id,
            meta.txn_id,
            info,
            meta.load_id,
            &rowset,
            true,
        )
        .unwrap();
    }

    assert!(mgr.has_txn(1, 100, ti));
    assert!(mgr.has_txn(1, 200, ti));

    // The replayed transactions publish normally.
    mgr.publish_txn(&kv, 1, 100, ti, Version::single(5)).unwrap();
    assert!(!mgr.has_txn(1, 100, ti));
    assert!(mgr.has_txn(1, 200, ti));
}

/// Delete-bitmap construction must visit every key exactly once whatever
/// the relation between key count and batch size.
#[test]
fn test_delete_bitmap_batch_boundaries() {
    for num_keys in [1usize, 3, 4, 5, 8, 16, 17] {
        let (mgr, registry, _) = manager(TxnConfig {
            delete_bitmap_batch_size: 4,
            ..TxnConfig::default()
        });
        let kv = MemMetaKv::new();
        let ti = tablet_info(7);

        let keys: Vec<String> = (0..num_keys).map(|i| format!("k{i:04}")).collect();

        let tablet = Arc::new(Tablet::new(7, 1111, TABLET_UID, KeysType::Unique, true));
        let prior = make_rowset(1, 50, vec![(0, keys.clone())]);
        prior.make_visible(Version::single(3));
        tablet.add_rowset(prior.clone());
        registry.register(tablet.clone());

        let fresh = make_rowset(2, 100, vec![(0, keys.clone())]);
        mgr.commit_txn(&kv, 1, 100, ti, LoadId::new(1, 1), &fresh, false)
            .unwrap();
        mgr.publish_txn(&kv, 1, 100, ti, Version::single(5)).unwrap();

        let header = tablet.header().read();
        let bitmap = header.delete_bitmap();
        assert_eq!(
            bitmap.num_marked_rows(),
            num_keys as u64,
            "all {num_keys} prior rows must be superseded"
        );
        for row in 0..num_keys as u32 {
            assert!(
                bitmap.contains(
                    &BitmapKey {
                        rowset_id: prior.rowset_id(),
                        segment_id: 0,
                        version: 5,
                    },
                    row
                ),
                "row {row} of the prior rowset must be marked (num_keys={num_keys})"
            );
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// For every key in the published rowset, exactly one of: (a) no prior
    /// live row and no bitmap entry; (b) the most recent prior live row is
    /// marked under the publish version. Keys shared by both new segments
    /// supersede only the earlier segment's row.
    #[test]
    fn prop_delete_bitmap_marks_most_recent_prior_row(
        prior_mask in prop::collection::vec(any::<bool>(), 24),
        seg_a_mask in prop::collection::vec(any::<bool>(), 24),
        seg_b_mask in prop::collection::vec(any::<bool>(), 24),
    ) {
        let universe: Vec<String> = (0..24).map(|i| format!("k{i:02}")).collect();
        let pick = |mask: &[bool]| -> Vec<String> {
            universe
                .iter()
                .zip(mask)
                .filter(|(_, keep)| **keep)
                .map(|(k, _)| k.clone())
                .collect()
        };
        let prior_keys = pick(&prior_mask);
        let seg_a = pick(&seg_a_mask);
        let seg_b = pick(&seg_b_mask);

        let (mgr, registry, _) = manager(TxnConfig {
            delete_bitmap_batch_size: 4,
            ..TxnConfig::default()
        });
        let kv = MemMetaKv::new();
        let ti = tablet_info(7);

        let tablet = Arc::new(Tablet::new(7, 1111, TABLET_UID, KeysType::Unique, true));
        let prior = make_rowset(1, 50, vec![(0, prior_keys.clone())]);
        prior.make_visible(Version::single(3));
        tablet.add_rowset(prior.clone());
        registry.register(tablet.clone());

        let fresh = make_rowset(
            2,
            100,
            vec![(0, seg_a.clone()), (1, seg_b.clone())],
        );
        mgr.commit_txn(&kv, 1, 100, ti, LoadId::new(1, 1), &fresh, false).unwrap();
        mgr.publish_txn(&kv, 1, 100, ti, Version::single(5)).unwrap();

        let header = tablet.header().read();
        let bitmap = header.delete_bitmap();

        let mut expected_marks = 0u64;
        for (row, key) in prior_keys.iter().enumerate() {
            let superseded = seg_a.contains(key) || seg_b.contains(key);
            prop_assert_eq!(
                bitmap.contains(
                    &BitmapKey {
                        rowset_id: prior.rowset_id(),
                        segment_id: 0,
                        version: 5,
                    },
                    row as u32
                ),
                superseded,
                "prior row for {} marked={}", key, superseded
            );
            if superseded {
                expected_marks += 1;
            }
        }
        // Keys in both new segments supersede the earlier segment's row.
        for (row, key) in seg_a.iter().enumerate() {
            let superseded_intra = seg_b.contains(key);
            prop_assert_eq!(
                bitmap.contains(
                    &BitmapKey {
                        rowset_id: fresh.rowset_id(),
                        segment_id: 0,
                        version: 5,
                    },
                    row as u32
                ),
                superseded_intra,
                "intra-rowset mark for {}", key
            );
            if superseded_intra {
                expected_marks += 1;
            }
        }
        // Nothing in the later segment is ever marked.
        for row in 0..seg_b.len() as u32 {
            prop_assert!(
                !bitmap.contains(
                    &BitmapKey {
                        rowset_id: fresh.rowset_id(),
                        segment_id: 1,
                        version: 5,
                    },
                    row
                ),
                "later segment mark for row {}", row
            );
        }
        prop_assert_eq!(bitmap.num_marked_rows(), expected_marks);
    }
}
