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

//! Basalt Storage Layer
//!
//! Backend-node storage for the Basalt analytic engine: the per-directory
//! metadata store, the rowset/segment data model, tablets with their
//! delete bitmaps, and the load transaction manager coordinating
//! prepare/commit/publish of ingested data.
//!
//! # Components
//!
//! - **Metadata store** (`meta_store`): ordered key-value persistence for
//!   rowset and tablet metas, with in-memory and append-only-log backends.
//! - **Rowsets** (`rowset`, `segment`): immutable ingested data units;
//!   primary-key rowsets carry sorted key indexes per segment.
//! - **Tablets** (`tablet`, `delete_bitmap`): visible rowset sets, the
//!   primary-key lookup path and the merge-on-write delete bitmap.
//! - **Transaction manager** (`txn_manager`): sharded tracking of every
//!   `(partition, txn, tablet)` load from prepare to publish.

pub mod delete_bitmap;
pub mod meta_store;
pub mod rowset;
pub mod segment;
pub mod tablet;
pub mod txn_manager;

pub use delete_bitmap::{BitmapKey, DeleteBitmap};
pub use meta_store::{LogMetaKv, MemMetaKv, MetaKv, RowsetMetaStore};
pub use rowset::{KeysType, Rowset, RowsetKind, RowsetMeta, UnusedRowsetQueue, UnusedRowsetSink};
pub use segment::Segment;
pub use tablet::{RowLocation, Tablet, TabletMeta, TabletRegistry};
pub use txn_manager::{DeltaWriter, TxnManager};
