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

//! Delete bitmap for primary-key merge-on-write tablets.
//!
//! Each entry maps `(rowset_id, segment_id, version)` to the set of row
//! ids superseded as of that version. A reader at version `V` treats a row
//! as deleted when any entry for its `(rowset, segment)` with
//! `version <= V` contains it. Row-id sets are roaring bitmaps; a segment
//! holds at most `u32::MAX` rows.

use std::collections::BTreeMap;

use basalt_core::{BasaltError, Result, RowsetId};
use roaring::RoaringBitmap;

/// Key of one bitmap entry: the superseded row's location plus the
/// publication version that superseded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BitmapKey {
    pub rowset_id: RowsetId,
    pub segment_id: u32,
    pub version: i64,
}

/// Set of `(rowset_id, segment_id, version) -> row ids` tuples marking
/// rows superseded by later publications.
#[derive(Debug, Clone, Default)]
pub struct DeleteBitmap {
    bitmaps: BTreeMap<BitmapKey, RoaringBitmap>,
}

impl DeleteBitmap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `row_id` deleted. Set semantics: re-adding is a no-op.
    pub fn add(&mut self, key: BitmapKey, row_id: u32) {
        self.bitmaps.entry(key).or_default().insert(row_id);
    }

    pub fn contains(&self, key: &BitmapKey, row_id: u32) -> bool {
        self.bitmaps
            .get(key)
            .map(|b| b.contains(row_id))
            .unwrap_or(false)
    }

    /// Whether the row at `(rowset_id, segment_id, row_id)` was superseded
    /// at or before `max_version`.
    pub fn is_row_deleted(
        &self,
        rowset_id: RowsetId,
        segment_id: u32,
        row_id: u32,
        max_version: i64,
    ) -> bool {
        let lo = BitmapKey {
            rowset_id,
            segment_id,
            version: i64::MIN,
        };
        let hi = BitmapKey {
            rowset_id,
            segment_id,
            version: max_version,
        };
        self.bitmaps.range(lo..=hi).any(|(_, b)| b.contains(row_id))
    }

    /// Number of `(rowset, segment, version)` entries.
    pub fn num_entries(&self) -> usize {
        self.bitmaps.len()
    }

    /// Total marked rows across all entries.
    pub fn num_marked_rows(&self) -> u64 {
        self.bitmaps.values().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bitmaps.is_empty()
    }

    /// Drop entries older than `version`. Called when compaction rewrites
    /// the rowsets those entries refer to.
    pub fn prune_before(&mut self, version: i64) {
        self.bitmaps.retain(|k, _| k.version >= version);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BitmapKey, &RoaringBitmap)> {
        self.bitmaps.iter()
    }

    /// Stable binary codec used when the bitmap is embedded in persisted
    /// tablet meta. Layout per entry: rowset hi/lo, segment id, version,
    /// serialized roaring bitmap length, bitmap bytes. All little-endian.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend(&(self.bitmaps.len() as u32).to_le_bytes());
        for (key, bitmap) in &self.bitmaps {
            buf.extend(&key.rowset_id.hi.to_le_bytes());
            buf.extend(&key.rowset_id.lo.to_le_bytes());
            buf.extend(&key.segment_id.to_le_bytes());
            buf.extend(&key.version.to_le_bytes());
            let mut body = Vec::with_capacity(bitmap.serialized_size());
            bitmap
                .serialize_into(&mut body)
                .map_err(|e| BasaltError::Serialization(e.to_string()))?;
            buf.extend(&(body.len() as u32).to_le_bytes());
            buf.extend(&body);
        }
        Ok(buf)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let corrupt = || BasaltError::Corruption("truncated delete bitmap".to_string());
        let mut cursor = Cursor { data, offset: 0 };
        let num_entries = cursor.read_u32().ok_or_else(corrupt)?;
        let mut bitmaps = BTreeMap::new();
        for _ in 0..num_entries {
            let hi = cursor.read_u64().ok_or_else(corrupt)?;
            let lo = cursor.read_u64().ok_or_else(corrupt)?;
            let segment_id = cursor.read_u32().ok_or_else(corrupt)?;
            let version = cursor.read_u64().ok_or_else(corrupt)? as i64;
            let len = cursor.read_u32().ok_or_else(corrupt)? as usize;
            let body = cursor.read_bytes(len).ok_or_else(corrupt)?;
            let bitmap = RoaringBitmap::deserialize_from(body)
                .map_err(|e| BasaltError::Corruption(format!("bad roaring bitmap: {e}")))?;
            bitmaps.insert(
                BitmapKey {
                    rowset_id: RowsetId::new(hi, lo),
                    segment_id,
                    version,
                },
                bitmap,
            );
        }
        Ok(Self { bitmaps })
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn read_bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(n)?;
        let slice = self.data.get(self.offset..end)?;
        self.offset = end;
        Some(slice)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.read_bytes(4)
            .map(|b| u32::from_le_bytes(b.try_into().expect("4-byte slice")))
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.read_bytes(8)
            .map(|b| u64::from_le_bytes(b.try_into().expect("8-byte slice")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(rowset: u64, segment: u32, version: i64) -> BitmapKey {
        BitmapKey {
            rowset_id: RowsetId::new(0, rowset),
            segment_id: segment,
            version,
        }
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut bitmap = DeleteBitmap::new();
        bitmap.add(key(1, 0, 5), 7);
        bitmap.add(key(1, 0, 5), 7);
        assert_eq!(bitmap.num_entries(), 1);
        assert_eq!(bitmap.num_marked_rows(), 1);
        assert!(bitmap.contains(&key(1, 0, 5), 7));
    }

    #[test]
    fn test_is_row_deleted_respects_version() {
        let mut bitmap = DeleteBitmap::new();
        bitmap.add(key(1, 0, 5), 7);
        let rid = RowsetId::new(0, 1);
        assert!(!bitmap.is_row_deleted(rid, 0, 7, 4));
        assert!(bitmap.is_row_deleted(rid, 0, 7, 5));
        assert!(bitmap.is_row_deleted(rid, 0, 7, 9));
        assert!(!bitmap.is_row_deleted(rid, 1, 7, 9));
        assert!(!bitmap.is_row_deleted(rid, 0, 8, 9));
    }

    #[test]
    fn test_prune_before() {
        let mut bitmap = DeleteBitmap::new();
        bitmap.add(key(1, 0, 3), 1);
        bitmap.add(key(1, 0, 8), 2);
        bitmap.prune_before(5);
        assert_eq!(bitmap.num_entries(), 1);
        assert!(bitmap.contains(&key(1, 0, 8), 2));
    }

    #[test]
    fn test_codec_roundtrip() {
        let mut bitmap = DeleteBitmap::new();
        bitmap.add(key(1, 0, 5), 7);
        bitmap.add(key(1, 2, 5), 9);
        for row in 0..2000 {
            bitmap.add(key(2, 1, 6), row);
        }

        let bytes = bitmap.to_bytes().unwrap();
        let decoded = DeleteBitmap::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.num_entries(), 3);
        assert_eq!(decoded.num_marked_rows(), bitmap.num_marked_rows());
        assert!(decoded.contains(&key(1, 2, 5), 9));
    }

    #[test]
    fn test_codec_rejects_truncation() {
        let mut bitmap = DeleteBitmap::new();
        bitmap.add(key(1, 0, 5), 7);
        let bytes = bitmap.to_bytes().unwrap();
        assert!(DeleteBitmap::from_bytes(&bytes[..bytes.len() - 3]).is_err());
    }
}
