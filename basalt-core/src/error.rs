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

//! Error types for the Basalt backend node.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BasaltError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("data corruption detected: {0}")]
    Corruption(String),

    /// Admission refusal: the map shard already tracks `running`
    /// transactions against a ceiling of `limit`.
    #[error("too many running transactions: {running}, limit: {limit}")]
    TooManyTransactions { running: usize, limit: usize },

    /// Commit called with a malformed rowset.
    #[error("invalid rowset: {0}")]
    RowsetInvalid(String),

    /// The metadata store refused the rowset meta write.
    #[error("failed to save rowset meta: {0}")]
    RowsetSaveFailed(String),

    /// Publish or delete against an unknown (partition, txn, tablet).
    #[error("transaction not found: {0}")]
    TxnNotExist(String),

    /// Commit conflict: same load id, different rowset id.
    #[error("transaction already exists with a different rowset: {0}")]
    TxnAlreadyExists(String),

    /// Rollback or delete refused because a rowset is attached/published.
    #[error("transaction already committed: {0}")]
    TxnAlreadyCommitted(String),

    /// Contract violation the caller was required to pre-validate.
    #[error("fatal: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, BasaltError>;
