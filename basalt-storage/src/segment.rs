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

//! Rowset segments and their primary-key index.
//!
//! A segment is the primary-key-sorted container of rows within a rowset.
//! The key index is unique per segment by construction: the writer sorts
//! and de-duplicates before sealing a segment, so a row id is simply the
//! key's ordinal position. The index supports exact lookup and batched
//! ascending iteration with `seek_at_or_after` positioning, which is what
//! the delete-bitmap builder drives.

use basalt_core::{BasaltError, Result};

/// One sealed segment of a primary-key rowset.
#[derive(Debug)]
pub struct Segment {
    id: u32,
    /// Sorted, unique primary keys. Row id == index.
    keys: Vec<Vec<u8>>,
}

impl Segment {
    /// Build a segment from keys already sorted and de-duplicated by the
    /// writer. Rejects unsorted input instead of silently mis-indexing.
    pub fn from_sorted_keys(id: u32, keys: Vec<Vec<u8>>) -> Result<Self> {
        if keys.windows(2).any(|w| w[0] >= w[1]) {
            return Err(BasaltError::Corruption(format!(
                "segment {id} primary-key index is not sorted-unique"
            )));
        }
        Ok(Self { id, keys })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn num_rows(&self) -> usize {
        self.keys.len()
    }

    /// Exact primary-key lookup, returning the row id when present.
    pub fn lookup_row_key(&self, key: &[u8]) -> Option<u32> {
        self.keys
            .binary_search_by(|k| k.as_slice().cmp(key))
            .ok()
            .map(|row| row as u32)
    }

    /// Fresh iterator over the sorted key index.
    pub fn pk_index_iterator(&self) -> PkIndexIterator<'_> {
        PkIndexIterator {
            keys: &self.keys,
            pos: 0,
        }
    }
}

/// Forward iterator over a segment's sorted primary-key index.
///
/// Mirrors the on-disk indexed-column reader: callers position with
/// `seek_at_or_after` and then pull keys in batches.
pub struct PkIndexIterator<'a> {
    keys: &'a [Vec<u8>],
    pos: usize,
}

impl<'a> PkIndexIterator<'a> {
    /// Position at the first key `>= bound`.
    pub fn seek_at_or_after(&mut self, bound: &[u8]) {
        self.pos = self.keys.partition_point(|k| k.as_slice() < bound);
    }

    /// Read up to `n` keys from the current position, advancing past them.
    pub fn next_batch(&mut self, n: usize) -> Vec<&'a [u8]> {
        let end = (self.pos + n).min(self.keys.len());
        let batch: Vec<&[u8]> = self.keys[self.pos..end]
            .iter()
            .map(|k| k.as_slice())
            .collect();
        self.pos = end;
        batch
    }
}
