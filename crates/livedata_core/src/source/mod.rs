//! Data sources.
//!
//! The engine reads and writes documents only through [`DataSource`].
//! [`MemoryDataSource`] is the reference implementation.

mod memory;
mod modifier;
mod selector;

pub use memory::MemoryDataSource;
pub use modifier::Modifier;
pub use selector::{selector_document, Selector};

use crate::error::CoreResult;
use crate::query::Query;
use async_trait::async_trait;
use livedata_codec::Document;
use livedata_protocol::UpdateOptions;

/// A document store.
///
/// Implementations must be safe to share across connection tasks. Each call
/// may suspend; a suspended call only parks the task that made it.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Returns the documents matching a query, in query order.
    async fn find(&self, query: &Query) -> CoreResult<Vec<Document>>;

    /// Inserts a document that already carries an `_id`.
    ///
    /// Returns the stored document.
    async fn insert(&self, collection: &str, document: Document) -> CoreResult<Document>;

    /// Applies a modifier to matching documents.
    ///
    /// Returns the number of documents modified or upserted.
    async fn update(
        &self,
        collection: &str,
        selector: &Document,
        modifier: &Document,
        options: UpdateOptions,
    ) -> CoreResult<u64>;

    /// Removes matching documents and returns how many were removed.
    async fn remove(&self, collection: &str, selector: &Document) -> CoreResult<u64>;
}
