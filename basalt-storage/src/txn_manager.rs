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

//! Load transaction manager.
//!
//! Tracks every `(partition, transaction, tablet)` load on this node
//! through prepare, commit and publish. Committed rowset metas are made
//! durable through the rowset meta store before the in-memory transition
//! becomes observable; publish assigns the version, drops the record and,
//! for primary-key merge-on-write tablets, folds the new rowset's keys
//! into the tablet's delete bitmap.
//!
//! State is split across `1 << txn_map_shard_bits` shards indexed by
//! `txn_id & (shards - 1)`. Each shard's tablet map and partition index
//! live under one RwLock so their lockstep invariant is enforced by a
//! single guard. A separate pool of per-transaction mutexes serializes
//! commit and publish of the same transaction; that lock is the one held
//! across metadata-store writes, never the shard lock. Lock order is
//! always txn lock, then shard lock.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use basalt_core::{
    BasaltError, LoadId, PartitionId, Result, TabletId, TabletInfo, TxnConfig, TxnId, TxnKey,
    Version,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::delete_bitmap::BitmapKey;
use crate::meta_store::{MetaKv, RowsetMetaStore};
use crate::rowset::{KeysType, Rowset, RowsetKind, UnusedRowsetSink};
use crate::segment::Segment;
use crate::tablet::{Tablet, TabletMeta, TabletRegistry};

/// Writer-side hook for replicated loads. The load channel registers its
/// writer here so that slave-replica completion reports can be forwarded.
pub trait DeltaWriter: Send + Sync {
    fn finish_slave_replica(&self, node_id: i64, succeeded: bool);
}

/// One tracked load: prepared when `rowset` is `None`, committed once the
/// writer's rowset is attached.
struct TabletTxnInfo {
    load_id: LoadId,
    rowset: Option<Arc<Rowset>>,
    creation_time: i64,
}

impl TabletTxnInfo {
    fn new(load_id: LoadId, rowset: Option<Arc<Rowset>>) -> Self {
        Self {
            load_id,
            rowset,
            creation_time: unix_seconds(),
        }
    }
}

/// Tablet map and partition index of one shard, mutated in lockstep.
#[derive(Default)]
struct MapShard {
    txn_tablet_map: HashMap<TxnKey, HashMap<TabletInfo, TabletTxnInfo>>,
    txn_partition_map: HashMap<TxnId, HashSet<PartitionId>>,
}

impl MapShard {
    fn insert_partition(&mut self, txn_id: TxnId, partition_id: PartitionId) {
        self.txn_partition_map
            .entry(txn_id)
            .or_default()
            .insert(partition_id);
    }

    fn remove_partition(&mut self, txn_id: TxnId, partition_id: PartitionId) {
        if let Some(partitions) = self.txn_partition_map.get_mut(&txn_id) {
            partitions.remove(&partition_id);
            if partitions.is_empty() {
                self.txn_partition_map.remove(&txn_id);
            }
        }
    }
}

type DeltaWriterShard = HashMap<TxnId, HashMap<TabletId, Weak<dyn DeltaWriter>>>;

/// Process-wide coordinator for load transactions, one per backend node.
///
/// Constructed by the storage engine with its tablet registry and
/// unused-rowset sink; no global instance exists.
pub struct TxnManager {
    config: TxnConfig,
    map_shards: Vec<RwLock<MapShard>>,
    txn_locks: Vec<Mutex<()>>,
    delta_writer_shards: Vec<RwLock<DeltaWriterShard>>,
    registry: Arc<TabletRegistry>,
    unused_rowsets: Arc<dyn UnusedRowsetSink>,
}

impl TxnManager {
    pub fn new(
        config: TxnConfig,
        registry: Arc<TabletRegistry>,
        unused_rowsets: Arc<dyn UnusedRowsetSink>,
    ) -> Self {
        debug_assert!(config.txn_map_shard_bits <= 16);
        debug_assert!(config.txn_lock_shard_bits <= 16);
        let map_shards = (0..config.map_shard_count())
            .map(|_| RwLock::new(MapShard::default()))
            .collect();
        let txn_locks = (0..config.lock_shard_count())
            .map(|_| Mutex::new(()))
            .collect();
        let delta_writer_shards = (0..config.map_shard_count())
            .map(|_| RwLock::new(DeltaWriterShard::default()))
            .collect();
        Self {
            config,
            map_shards,
            txn_locks,
            delta_writer_shards,
            registry,
            unused_rowsets,
        }
    }

    pub fn config(&self) -> &TxnConfig {
        &self.config
    }

    fn map_shard(&self, txn_id: TxnId) -> &RwLock<MapShard> {
        let mask = self.map_shards.len() as u64 - 1;
        &self.map_shards[(txn_id as u64 & mask) as usize]
    }

    fn txn_lock(&self, txn_id: TxnId) -> &Mutex<()> {
        let mask = self.txn_locks.len() as u64 - 1;
        &self.txn_locks[(txn_id as u64 & mask) as usize]
    }

    fn delta_writer_shard(&self, txn_id: TxnId) -> &RwLock<DeltaWriterShard> {
        let mask = self.delta_writer_shards.len() as u64 - 1;
        &self.delta_writer_shards[(txn_id as u64 & mask) as usize]
    }

    /// Track a new load against `(partition, txn, tablet)`.
    ///
    /// Idempotent for retries carrying the same load id, including loads
    /// that have already committed. New transactions are refused once the
    /// shard tracks `max_running_txns` of them.
    pub fn prepare_txn(
        &self,
        partition_id: PartitionId,
        txn_id: TxnId,
        tablet_info: TabletInfo,
        load_id: LoadId,
    ) -> Result<()> {
        let key = TxnKey::new(partition_id, txn_id);
        let mut shard = self.map_shard(txn_id).write();

        if let Some(load_info) = shard
            .txn_tablet_map
            .get(&key)
            .and_then(|tablets| tablets.get(&tablet_info))
        {
            // A committed retry with the same load id already carries a
            // rowset; report success without touching the record.
            if load_info.load_id == load_id && load_info.rowset.is_some() {
                warn!(%key, %tablet_info, %load_id, "transaction already exists on prepare");
                return Ok(());
            }
        }

        // Admission applies to transactions the shard does not track yet;
        // retries of a known transaction must stay idempotent at the limit.
        let running = shard.txn_partition_map.len();
        if !shard.txn_partition_map.contains_key(&txn_id) && running >= self.config.max_running_txns
        {
            warn!(
                running,
                limit = self.config.max_running_txns,
                "too many running transactions"
            );
            return Err(BasaltError::TooManyTransactions {
                running,
                limit: self.config.max_running_txns,
            });
        }

        shard
            .txn_tablet_map
            .entry(key)
            .or_default()
            .insert(tablet_info, TabletTxnInfo::new(load_id, None));
        shard.insert_partition(txn_id, partition_id);
        debug!(%key, %tablet_info, %load_id, "prepared transaction");
        Ok(())
    }

    /// Attach the writer's rowset to the prepared record and persist its
    /// meta, moving the load to COMMITTED.
    ///
    /// The per-transaction lock is held across the store write so commit
    /// and publish of one transaction form a single durable transition;
    /// the shard lock is never held during I/O. With `is_recovery` the
    /// store write is skipped: the meta is already there and is being
    /// replayed into memory.
    #[allow(clippy::too_many_arguments)]
    pub fn commit_txn(
        &self,
        kv: &dyn MetaKv,
        partition_id: PartitionId,
        txn_id: TxnId,
        tablet_info: TabletInfo,
        load_id: LoadId,
        rowset: &Arc<Rowset>,
        is_recovery: bool,
    ) -> Result<()> {
        if partition_id < 1 || txn_id < 1 || tablet_info.tablet_id < 1 {
            return Err(BasaltError::Fatal(format!(
                "invalid commit request: partition_id={partition_id}, txn_id={txn_id}, \
                 tablet_id={}",
                tablet_info.tablet_id
            )));
        }
        if rowset.rowset_id().is_nil() {
            warn!(partition_id, txn_id, %tablet_info, "cannot commit txn with nil rowset id");
            return Err(BasaltError::RowsetInvalid(format!(
                "nil rowset id for txn_id={txn_id}, tablet={tablet_info}"
            )));
        }

        let key = TxnKey::new(partition_id, txn_id);
        let _txn_guard = self.txn_lock(txn_id).lock();
        {
            let shard = self.map_shard(txn_id).read();
            if let Some(load_info) = shard
                .txn_tablet_map
                .get(&key)
                .and_then(|tablets| tablets.get(&tablet_info))
            {
                if load_info.load_id == load_id {
                    if let Some(existing) = &load_info.rowset {
                        if existing.rowset_id() == rowset.rowset_id() {
                            // Duplicate call for the same rowset.
                            info!(%key, %tablet_info, rowset_id = %existing.rowset_id(),
                                "rowset already committed");
                            return Ok(());
                        }
                        warn!(%key, %tablet_info,
                            existing_rowset_id = %existing.rowset_id(),
                            new_rowset_id = %rowset.rowset_id(),
                            "commit conflict: same load id, different rowset");
                        return Err(BasaltError::TxnAlreadyExists(format!(
                            "txn_id={txn_id}, tablet={tablet_info}, existing rowset {}, new \
                             rowset {}",
                            existing.rowset_id(),
                            rowset.rowset_id()
                        )));
                    }
                }
            }
        }

        // The store write may be slow; only the per-txn lock covers it.
        if !is_recovery {
            RowsetMetaStore::save(kv, tablet_info.tablet_uid, rowset.rowset_id(), &rowset.meta())
                .map_err(|e| {
                    warn!(%key, %tablet_info, rowset_id = %rowset.rowset_id(), error = %e,
                        "failed to save committed rowset meta");
                    BasaltError::RowsetSaveFailed(format!(
                        "rowset {} for txn_id={txn_id}: {e}",
                        rowset.rowset_id()
                    ))
                })?;
        }

        let mut shard = self.map_shard(txn_id).write();
        shard
            .txn_tablet_map
            .entry(key)
            .or_default()
            .insert(tablet_info, TabletTxnInfo::new(load_id, Some(rowset.clone())));
        shard.insert_partition(txn_id, partition_id);
        debug!(%key, %tablet_info, rowset_id = %rowset.rowset_id(), "committed transaction");
        Ok(())
    }

    /// Assign `version` to the committed rowset, persist the updated meta,
    /// drop the record, and build the delete bitmap for eligible tablets.
    ///
    /// If the meta save fails the record is retained and the rowset keeps
    /// its optimistically assigned version; a retried publish re-assigns
    /// the same version and re-attempts the save.
    pub fn publish_txn(
        &self,
        kv: &dyn MetaKv,
        partition_id: PartitionId,
        txn_id: TxnId,
        tablet_info: TabletInfo,
        version: Version,
    ) -> Result<()> {
        let key = TxnKey::new(partition_id, txn_id);
        let _txn_guard = self.txn_lock(txn_id).lock();

        let rowset = {
            let shard = self.map_shard(txn_id).read();
            shard
                .txn_tablet_map
                .get(&key)
                .and_then(|tablets| tablets.get(&tablet_info))
                .and_then(|load_info| load_info.rowset.clone())
        };
        let Some(rowset) = rowset else {
            return Err(BasaltError::TxnNotExist(format!("{key}, tablet={tablet_info}")));
        };

        // The rowset becomes visible before the save is confirmed; on
        // failure the caller retries and re-assigns the same version.
        rowset.make_visible(version);
        RowsetMetaStore::save(kv, tablet_info.tablet_uid, rowset.rowset_id(), &rowset.meta())
            .map_err(|e| {
                warn!(%key, %tablet_info, rowset_id = %rowset.rowset_id(), error = %e,
                    "failed to save published rowset meta");
                BasaltError::RowsetSaveFailed(format!(
                    "rowset {} for txn_id={txn_id}: {e}",
                    rowset.rowset_id()
                ))
            })?;

        {
            let mut shard = self.map_shard(txn_id).write();
            if let Some(tablets) = shard.txn_tablet_map.get_mut(&key) {
                tablets.remove(&tablet_info);
                info!(%key, %tablet_info, rowset_id = %rowset.rowset_id(), %version,
                    "published transaction");
                if tablets.is_empty() {
                    shard.txn_tablet_map.remove(&key);
                    shard.remove_partition(txn_id, partition_id);
                }
            }
        }

        let Some(tablet) = self.registry.get(tablet_info.tablet_id) else {
            // The tablet may have been dropped between commit and publish;
            // the durable publish itself already succeeded.
            debug!(%tablet_info, "tablet not registered, skipping delete bitmap");
            return Ok(());
        };
        if !tablet.merge_on_write_enabled()
            || rowset.kind() != RowsetKind::Primary
            || rowset.keys_type() != KeysType::Unique
        {
            return Ok(());
        }
        assert!(
            version.begin == version.end,
            "merge-on-write publish must carry a single version, got {version}"
        );
        self.update_delete_bitmap(kv, &tablet, &rowset, version)
    }

    /// For each key in the new rowset, find the key's most recent prior
    /// live row and mark it superseded in the tablet's delete bitmap.
    ///
    /// Keys already seen in an earlier segment of the same rowset are
    /// resolved against those segments (newest first) without consulting
    /// the tablet; everything else is looked up among rowsets visible
    /// before this publication.
    fn update_delete_bitmap(
        &self,
        kv: &dyn MetaKv,
        tablet: &Tablet,
        rowset: &Arc<Rowset>,
        version: Version,
    ) -> Result<()> {
        let start = Instant::now();
        let segments = rowset.load_segments()?;
        let batch_size = self.config.delete_bitmap_batch_size.max(1);
        let rowset_id = rowset.rowset_id();

        let mut meta = tablet.header().write();
        let mut pre_segments: Vec<Arc<Segment>> = Vec::with_capacity(segments.len());
        for segment in segments {
            let total = segment.num_rows();
            let mut remaining = total;
            let mut marked = 0usize;
            let mut last_key: Vec<u8> = Vec::new();
            while remaining > 0 {
                let mut iter = segment.pk_index_iterator();
                iter.seek_at_or_after(&last_key);
                let num_to_read = batch_size.min(remaining);
                let batch = iter.next_batch(num_to_read);
                if batch.len() != num_to_read {
                    return Err(BasaltError::Corruption(format!(
                        "primary-key index of segment {} ended early: wanted {num_to_read} keys, \
                         got {}",
                        segment.id(),
                        batch.len()
                    )));
                }
                last_key = batch[batch.len() - 1].to_vec();
                // The batch's last key is excluded and re-read as the next
                // batch's lower bound, unless this batch is the tail.
                let num_read = if batch.len() == batch_size && batch.len() != remaining {
                    batch.len() - 1
                } else {
                    batch.len()
                };
                for key in &batch[..num_read] {
                    if Self::mark_key_in_pre_segments(
                        &mut meta,
                        &pre_segments,
                        rowset_id,
                        key,
                        version,
                    ) {
                        marked += 1;
                        continue;
                    }
                    let Some(loc) = meta.lookup_row_key(key, version.begin - 1)? else {
                        continue;
                    };
                    meta.delete_bitmap_mut().add(
                        BitmapKey {
                            rowset_id: loc.rowset_id,
                            segment_id: loc.segment_id,
                            version: version.begin,
                        },
                        loc.row_id,
                    );
                    marked += 1;
                }
                remaining -= num_read;
            }
            info!(
                tablet_id = tablet.tablet_id(),
                rowset_id = %rowset_id,
                segment_id = segment.id(),
                %version,
                marked,
                total,
                "constructed delete bitmap for segment"
            );
            pre_segments.push(segment);
        }
        tablet.save_meta_locked(&meta, kv)?;
        info!(
            tablet_id = tablet.tablet_id(),
            %version,
            elapsed_us = start.elapsed().as_micros() as u64,
            "finished updating delete bitmap"
        );
        Ok(())
    }

    /// Scan earlier segments of the same rowset newest-first; the first
    /// hit is the most recent intra-rowset occurrence and is the one
    /// superseded.
    fn mark_key_in_pre_segments(
        meta: &mut TabletMeta,
        pre_segments: &[Arc<Segment>],
        rowset_id: basalt_core::RowsetId,
        key: &[u8],
        version: Version,
    ) -> bool {
        for segment in pre_segments.iter().rev() {
            if let Some(row_id) = segment.lookup_row_key(key) {
                meta.delete_bitmap_mut().add(
                    BitmapKey {
                        rowset_id,
                        segment_id: segment.id(),
                        version: version.begin,
                    },
                    row_id,
                );
                return true;
            }
        }
        false
    }

    /// Drop an uncommitted record. A record that already carries a rowset
    /// was committed by a racing thread and must be cleared through
    /// [`TxnManager::delete_txn`] instead.
    pub fn rollback_txn(
        &self,
        partition_id: PartitionId,
        txn_id: TxnId,
        tablet_info: TabletInfo,
    ) -> Result<()> {
        let key = TxnKey::new(partition_id, txn_id);
        let mut shard = self.map_shard(txn_id).write();
        let Some(tablets) = shard.txn_tablet_map.get_mut(&key) else {
            return Ok(());
        };
        if let Some(load_info) = tablets.get(&tablet_info) {
            if load_info.rowset.is_some() {
                return Err(BasaltError::TxnAlreadyCommitted(format!(
                    "{key}, tablet={tablet_info}"
                )));
            }
        }
        tablets.remove(&tablet_info);
        info!(%key, %tablet_info, "rolled back transaction");
        if tablets.is_empty() {
            shard.txn_tablet_map.remove(&key);
            shard.remove_partition(txn_id, partition_id);
        }
        Ok(())
    }

    /// Discard a pending transaction on behalf of the frontend. A rowset
    /// that has already been published cannot be discarded; an unpublished
    /// committed rowset has its persisted meta removed and is handed to
    /// the unused-rowset sink for physical reclamation.
    pub fn delete_txn(
        &self,
        kv: &dyn MetaKv,
        partition_id: PartitionId,
        txn_id: TxnId,
        tablet_info: TabletInfo,
    ) -> Result<()> {
        let key = TxnKey::new(partition_id, txn_id);
        let mut shard = self.map_shard(txn_id).write();
        let Some(tablets) = shard.txn_tablet_map.get_mut(&key) else {
            return Err(BasaltError::TxnNotExist(format!("{key}, tablet={tablet_info}")));
        };
        if let Some(load_info) = tablets.get(&tablet_info) {
            if let Some(rowset) = load_info.rowset.clone() {
                if rowset.is_visible() {
                    warn!(%key, %tablet_info, rowset_id = %rowset.rowset_id(),
                        version = %rowset.version(),
                        "cannot delete transaction whose rowset is already published");
                    return Err(BasaltError::TxnAlreadyCommitted(format!(
                        "{key}, tablet={tablet_info}, rowset {} published at {}",
                        rowset.rowset_id(),
                        rowset.version()
                    )));
                }
                RowsetMetaStore::remove(kv, tablet_info.tablet_uid, rowset.rowset_id())?;
                self.unused_rowsets.add_unused_rowset(rowset.clone());
                debug!(%key, %tablet_info, rowset_id = %rowset.rowset_id(),
                    "deleted committed transaction");
            }
        }
        tablets.remove(&tablet_info);
        if tablets.is_empty() {
            shard.txn_tablet_map.remove(&key);
            shard.remove_partition(txn_id, partition_id);
        }
        Ok(())
    }

    /// Administrative sweep removing every record that references a tablet
    /// being destroyed. Persisted metas are removed unconditionally and
    /// per-transaction locks are not taken: the caller guarantees the
    /// tablet's writers are quiescent, and accepts that a racing commit
    /// on the same transaction may be lost.
    pub fn force_rollback_tablet_txns(&self, kv: &dyn MetaKv, tablet_info: TabletInfo) {
        for shard in &self.map_shards {
            let mut shard = shard.write();
            let mut emptied: Vec<TxnKey> = Vec::new();
            for (key, tablets) in shard.txn_tablet_map.iter_mut() {
                if let Some(load_info) = tablets.get(&tablet_info) {
                    if let Some(rowset) = &load_info.rowset {
                        if let Err(e) =
                            RowsetMetaStore::remove(kv, tablet_info.tablet_uid, rowset.rowset_id())
                        {
                            warn!(%key, rowset_id = %rowset.rowset_id(), error = %e,
                                "failed to remove rowset meta during force rollback");
                        }
                    }
                    tablets.remove(&tablet_info);
                    info!(%key, %tablet_info, "force rolled back tablet-related transaction");
                }
                if tablets.is_empty() {
                    emptied.push(*key);
                }
            }
            for key in emptied {
                shard.txn_tablet_map.remove(&key);
                shard.remove_partition(key.txn_id, key.partition_id);
            }
        }
    }

    pub fn has_txn(
        &self,
        partition_id: PartitionId,
        txn_id: TxnId,
        tablet_info: TabletInfo,
    ) -> bool {
        let key = TxnKey::new(partition_id, txn_id);
        let shard = self.map_shard(txn_id).read();
        shard
            .txn_tablet_map
            .get(&key)
            .is_some_and(|tablets| tablets.contains_key(&tablet_info))
    }

    /// Tablets of one `(partition, txn)` with their committed rowsets;
    /// prepared-only tablets map to `None`, which makes a publish against
    /// them fail.
    pub fn txn_related_tablets(
        &self,
        txn_id: TxnId,
        partition_id: PartitionId,
    ) -> HashMap<TabletInfo, Option<Arc<Rowset>>> {
        let key = TxnKey::new(partition_id, txn_id);
        let shard = self.map_shard(txn_id).read();
        let Some(tablets) = shard.txn_tablet_map.get(&key) else {
            debug!(%key, "no tablets for transaction");
            return HashMap::new();
        };
        tablets
            .iter()
            .map(|(tablet_info, load_info)| (*tablet_info, load_info.rowset.clone()))
            .collect()
    }

    /// All transactions referencing a tablet, with the partition they run
    /// in; scans every shard.
    pub fn tablet_related_txns(&self, tablet_info: TabletInfo) -> (PartitionId, HashSet<TxnId>) {
        let mut partition_id = 0;
        let mut txn_ids = HashSet::new();
        for shard in &self.map_shards {
            let shard = shard.read();
            for (key, tablets) in &shard.txn_tablet_map {
                if tablets.contains_key(&tablet_info) {
                    partition_id = key.partition_id;
                    txn_ids.insert(key.txn_id);
                }
            }
        }
        (partition_id, txn_ids)
    }

    /// Every tablet referenced by any live transaction.
    pub fn all_related_tablets(&self) -> HashSet<TabletInfo> {
        let mut tablet_infos = HashSet::new();
        for shard in &self.map_shards {
            let shard = shard.read();
            for tablets in shard.txn_tablet_map.values() {
                tablet_infos.extend(tablets.keys().copied());
            }
        }
        tablet_infos
    }

    /// Transactions older than `pending_data_expire_sec` as of `now`,
    /// grouped by tablet. Polled by the engine's garbage sweeper.
    pub fn expired_txns(&self, now: i64) -> HashMap<TabletInfo, Vec<TxnId>> {
        let mut expired: HashMap<TabletInfo, Vec<TxnId>> = HashMap::new();
        for shard in &self.map_shards {
            let shard = shard.read();
            for (key, tablets) in &shard.txn_tablet_map {
                for (tablet_info, load_info) in tablets {
                    let age = now - load_info.creation_time;
                    if age >= self.config.pending_data_expire_sec {
                        debug!(%tablet_info, txn_id = key.txn_id, age, "found expired transaction");
                        expired.entry(*tablet_info).or_default().push(key.txn_id);
                    }
                }
            }
        }
        expired
    }

    /// Partitions the driver must publish for a transaction.
    pub fn partition_ids(&self, txn_id: TxnId) -> Vec<PartitionId> {
        let shard = self.map_shard(txn_id).read();
        shard
            .txn_partition_map
            .get(&txn_id)
            .map(|partitions| partitions.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Register the delta writer handling `(txn, tablet)`. The registry
    /// holds a weak handle only; writer lifetime stays with the load
    /// channel, which calls [`TxnManager::clear_delta_writers`] before
    /// tearing a writer down.
    pub fn register_delta_writer(
        &self,
        txn_id: TxnId,
        tablet_id: TabletId,
        writer: Weak<dyn DeltaWriter>,
    ) {
        let mut shard = self.delta_writer_shard(txn_id).write();
        shard.entry(txn_id).or_default().insert(tablet_id, writer);
    }

    /// Forward a slave replica's completion report to the registered
    /// writer; logged and dropped when no live writer is registered.
    pub fn finish_slave_replica(
        &self,
        txn_id: TxnId,
        tablet_id: TabletId,
        node_id: i64,
        succeeded: bool,
    ) {
        let shard = self.delta_writer_shard(txn_id).read();
        let Some(writer) = shard.get(&txn_id).and_then(|tablets| tablets.get(&tablet_id)) else {
            warn!(txn_id, tablet_id, "no delta writer registered");
            return;
        };
        let Some(writer) = writer.upgrade() else {
            warn!(txn_id, tablet_id, "delta writer already destroyed");
            return;
        };
        writer.finish_slave_replica(node_id, succeeded);
    }

    /// Drop every delta writer registered for a transaction.
    pub fn clear_delta_writers(&self, txn_id: TxnId) {
        let mut shard = self.delta_writer_shard(txn_id).write();
        shard.remove(&txn_id);
        debug!(txn_id, "cleared delta writer registrations");
    }
}

fn unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
