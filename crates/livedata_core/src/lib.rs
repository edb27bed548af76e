//! # LiveData Core
//!
//! Synchronization primitives for LiveData.
//!
//! This crate provides:
//! - Cache keys and per-connection snapshots
//! - The diff engine computing `set`/`unset` deltas between snapshots
//! - Queries, publication options and the publication/collection registry
//! - The [`DataSource`] abstraction and an in-memory implementation with
//!   Mongo-style selectors and update modifiers
//!
//! # Example
//!
//! ```
//! use livedata_core::{diff_snapshots, Snapshot};
//! use serde_json::json;
//!
//! let mut old = Snapshot::new();
//! old.merge_document("items", json!({"_id": "a", "n": 1}).as_object().cloned().unwrap())
//!     .unwrap();
//! let mut new = Snapshot::new();
//! new.merge_document("items", json!({"_id": "a", "n": 2}).as_object().cloned().unwrap())
//!     .unwrap();
//!
//! let events = diff_snapshots(&old, &new);
//! assert_eq!(events.len(), 1);
//! assert_eq!(events[0].set.as_ref().unwrap()["n"], json!(2));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod diff;
mod document;
mod error;
mod query;
mod registry;
mod snapshot;
mod source;

pub use diff::{apply_change, apply_events, diff_snapshots, ChangeEvent, ChangeKind};
pub use document::{document_id, ensure_id, lookup_path, CacheKey, ID_FIELD};
pub use error::{CoreError, CoreResult};
pub use query::{substitute_params, PublicationOptions, Query, QueryParam, SortOrder, SortSpec};
pub use registry::{
    CollectionDef, CollectionMethod, FnMethod, MethodContext, Methods, Publication, QueryFn,
    Registry, RegistryBuilder,
};
pub use snapshot::Snapshot;
pub use source::{selector_document, DataSource, MemoryDataSource, Modifier, Selector};
