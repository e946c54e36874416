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

//! Basalt Core
//!
//! Shared foundation of the Basalt backend node: identifier types for
//! partitions, transactions, tablets and rowsets, the version type that
//! orders published data, the crate-wide error enum, and the transaction
//! manager configuration.
//!
//! Everything here is plain data. The stateful subsystems (metadata
//! store, tablets, transaction manager) live in `basalt-storage`.

pub mod config;
pub mod error;
pub mod ids;

pub use config::TxnConfig;
pub use error::{BasaltError, Result};
pub use ids::{
    LoadId, PartitionId, RowsetId, SchemaHash, TabletId, TabletInfo, TabletUid, TxnId, TxnKey,
    Version,
};
