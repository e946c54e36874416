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

//! Transaction manager configuration.
//!
//! Constructed by the embedding node from its config file and passed into
//! `TxnManager::new`; there is no global config state.

use serde::{Deserialize, Serialize};

/// Tuning knobs for the transaction manager.
///
/// Shard counts are expressed in bits so they are powers of two by
/// construction; the shard index for a transaction is `txn_id & (count - 1)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TxnConfig {
    /// Map shard count = `1 << txn_map_shard_bits`.
    pub txn_map_shard_bits: u32,
    /// Per-transaction lock pool size = `1 << txn_lock_shard_bits`.
    pub txn_lock_shard_bits: u32,
    /// Per-shard ceiling on concurrently tracked transactions.
    pub max_running_txns: usize,
    /// Age in seconds after which a pending load is reported as expired.
    pub pending_data_expire_sec: i64,
    /// Keys read per batch while building the delete bitmap.
    pub delete_bitmap_batch_size: usize,
}

impl Default for TxnConfig {
    fn default() -> Self {
        Self {
            txn_map_shard_bits: 7,
            txn_lock_shard_bits: 10,
            max_running_txns: 100,
            pending_data_expire_sec: 1800,
            delete_bitmap_batch_size: 1024,
        }
    }
}

impl TxnConfig {
    pub fn map_shard_count(&self) -> usize {
        1 << self.txn_map_shard_bits
    }

    pub fn lock_shard_count(&self) -> usize {
        1 << self.txn_lock_shard_bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TxnConfig::default();
        assert_eq!(config.map_shard_count(), 128);
        assert_eq!(config.lock_shard_count(), 1024);
        assert_eq!(config.max_running_txns, 100);
        assert_eq!(config.pending_data_expire_sec, 1800);
        assert_eq!(config.delete_bitmap_batch_size, 1024);
    }

    #[test]
    fn test_shard_counts_are_powers_of_two() {
        let config = TxnConfig {
            txn_map_shard_bits: 3,
            txn_lock_shard_bits: 5,
            ..TxnConfig::default()
        };
        assert_eq!(config.map_shard_count(), 8);
        assert_eq!(config.lock_shard_count(), 32);
        assert_eq!(config.map_shard_count() & (config.map_shard_count() - 1), 0);
    }
}
