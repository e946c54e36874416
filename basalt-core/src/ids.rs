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

//! Identifier types shared across the backend node.
//!
//! Partition, transaction, tablet and schema-hash identifiers are signed
//! 64-bit integers assigned by the frontend; valid requests carry strictly
//! positive values. The 128-bit identifiers (`TabletUid`, `LoadId`,
//! `RowsetId`) are opaque pairs of `u64` rendered as fixed-width hex.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Partition identifier assigned by the frontend.
pub type PartitionId = i64;

/// Load transaction identifier assigned by the frontend.
pub type TxnId = i64;

/// Tablet identifier.
pub type TabletId = i64;

/// Hash of the tablet schema a load was written against.
pub type SchemaHash = i64;

/// 128-bit identifier disambiguating tablet generations.
///
/// A tablet that is dropped and re-created keeps its `TabletId` but gets a
/// fresh `TabletUid`, so metadata keyed by uid never aliases across
/// generations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct TabletUid {
    pub hi: u64,
    pub lo: u64,
}

impl TabletUid {
    pub fn new(hi: u64, lo: u64) -> Self {
        Self { hi, lo }
    }
}

impl fmt::Display for TabletUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}-{:016x}", self.hi, self.lo)
    }
}

impl FromStr for TabletUid {
    type Err = crate::BasaltError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hi, lo) = parse_hex_pair(s)?;
        Ok(Self { hi, lo })
    }
}

/// 128-bit identifier tagging a single client load attempt.
///
/// Retries of the same load carry the same `LoadId`, which is what makes
/// prepare and commit idempotent for the retrying client.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct LoadId {
    pub hi: u64,
    pub lo: u64,
}

impl LoadId {
    pub fn new(hi: u64, lo: u64) -> Self {
        Self { hi, lo }
    }
}

impl fmt::Display for LoadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}-{:016x}", self.hi, self.lo)
    }
}

/// Globally unique rowset identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct RowsetId {
    pub hi: u64,
    pub lo: u64,
}

impl RowsetId {
    pub fn new(hi: u64, lo: u64) -> Self {
        Self { hi, lo }
    }

    /// An all-zero id is the nil sentinel; writers never produce it.
    pub fn is_nil(&self) -> bool {
        self.hi == 0 && self.lo == 0
    }
}

impl fmt::Display for RowsetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}-{:016x}", self.hi, self.lo)
    }
}

impl FromStr for RowsetId {
    type Err = crate::BasaltError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hi, lo) = parse_hex_pair(s)?;
        Ok(Self { hi, lo })
    }
}

fn parse_hex_pair(s: &str) -> Result<(u64, u64), crate::BasaltError> {
    let err = || crate::BasaltError::Corruption(format!("malformed 128-bit id: {s:?}"));
    let (hi, lo) = s.split_once('-').ok_or_else(err)?;
    let hi = u64::from_str_radix(hi, 16).map_err(|_| err())?;
    let lo = u64::from_str_radix(lo, 16).map_err(|_| err())?;
    Ok((hi, lo))
}

/// Version range assigned to a rowset at publish time.
///
/// A freshly written rowset starts at `Version::UNSET`; publication assigns
/// `begin == end` for single-version loads. Cumulative rowsets produced by
/// compaction cover a wider range, but those never pass through the
/// transaction manager.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Version {
    pub begin: i64,
    pub end: i64,
}

impl Version {
    pub const UNSET: Version = Version { begin: 0, end: 0 };

    pub fn new(begin: i64, end: i64) -> Self {
        Self { begin, end }
    }

    pub fn single(v: i64) -> Self {
        Self { begin: v, end: v }
    }

    /// A rowset is visible to readers once a positive begin version is set.
    pub fn is_visible(&self) -> bool {
        self.begin > 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}-{}]", self.begin, self.end)
    }
}

/// Identifies one transaction within one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnKey {
    pub partition_id: PartitionId,
    pub txn_id: TxnId,
}

impl TxnKey {
    pub fn new(partition_id: PartitionId, txn_id: TxnId) -> Self {
        Self {
            partition_id,
            txn_id,
        }
    }
}

impl fmt::Display for TxnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "partition_id={}, txn_id={}",
            self.partition_id, self.txn_id
        )
    }
}

/// Identifies one tablet generation participating in a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TabletInfo {
    pub tablet_id: TabletId,
    pub schema_hash: SchemaHash,
    pub tablet_uid: TabletUid,
}

impl TabletInfo {
    pub fn new(tablet_id: TabletId, schema_hash: SchemaHash, tablet_uid: TabletUid) -> Self {
        Self {
            tablet_id,
            schema_hash,
            tablet_uid,
        }
    }
}

impl fmt::Display for TabletInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tablet_id={}, schema_hash={}, tablet_uid={}",
            self.tablet_id, self.schema_hash, self.tablet_uid
        )
    }
}
