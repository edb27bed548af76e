//! In-memory data source.

use super::modifier::Modifier;
use super::selector::Selector;
use super::DataSource;
use crate::document::{document_id, ensure_id, ID_FIELD};
use crate::error::{CoreError, CoreResult};
use crate::query::Query;
use async_trait::async_trait;
use livedata_codec::Document;
use livedata_protocol::UpdateOptions;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::debug;

type Collection = BTreeMap<String, Document>;

/// A data source holding every collection in memory.
///
/// Documents of a collection are kept in id order, which is also the order
/// of unsorted query results. Every call holds the store lock for its whole
/// duration, so readers never observe a partially applied write.
#[derive(Debug, Default)]
pub struct MemoryDataSource {
    collections: RwLock<BTreeMap<String, Collection>>,
}

impl MemoryDataSource {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads documents into a collection, allocating ids where missing.
    ///
    /// Returns the number of documents loaded.
    pub fn seed<I>(&self, collection: &str, documents: I) -> CoreResult<usize>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut collections = self.collections.write();
        let target = collections.entry(collection.to_owned()).or_default();
        let mut loaded = 0;
        for document in documents {
            let document = ensure_id(document);
            let id = document_id(collection, &document)?;
            if target.contains_key(&id) {
                return Err(CoreError::DuplicateDocument {
                    collection: collection.to_owned(),
                    id,
                });
            }
            target.insert(id, document);
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Returns the number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections.read().get(collection).map_or(0, BTreeMap::len)
    }

    /// Returns true if no collection holds any document.
    pub fn is_empty(&self) -> bool {
        self.collections.read().values().all(BTreeMap::is_empty)
    }

    /// Returns a document by id.
    pub fn get(&self, collection: &str, id: &str) -> Option<Document> {
        self.collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// Returns the names of all collections that were ever written.
    pub fn collection_names(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }
}

#[async_trait]
impl DataSource for MemoryDataSource {
    async fn find(&self, query: &Query) -> CoreResult<Vec<Document>> {
        let selector = Selector::compile(&query.selector)?;
        let mut results: Vec<Document> = {
            let collections = self.collections.read();
            match collections.get(&query.collection) {
                Some(docs) => docs
                    .values()
                    .filter(|doc| selector.matches(doc))
                    .cloned()
                    .collect(),
                None => Vec::new(),
            }
        };

        if let Some(sort) = &query.sort {
            results.sort_by(|a, b| sort.compare(a, b));
        }
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(results.into_iter().skip(query.skip).take(limit).collect())
    }

    async fn insert(&self, collection: &str, document: Document) -> CoreResult<Document> {
        let id = document_id(collection, &document)?;
        let mut collections = self.collections.write();
        let target = collections.entry(collection.to_owned()).or_default();
        if target.contains_key(&id) {
            return Err(CoreError::DuplicateDocument {
                collection: collection.to_owned(),
                id,
            });
        }
        target.insert(id.clone(), document.clone());
        debug!(collection, id = %id, "document inserted");
        Ok(document)
    }

    async fn update(
        &self,
        collection: &str,
        selector: &Document,
        modifier: &Document,
        options: UpdateOptions,
    ) -> CoreResult<u64> {
        let compiled = Selector::compile(selector)?;
        let modifier = Modifier::parse(modifier)?;

        let mut collections = self.collections.write();
        let target = collections.entry(collection.to_owned()).or_default();

        // Every new version is computed before any is stored.
        let mut updated = Vec::new();
        for (id, doc) in target.iter() {
            if compiled.matches(doc) {
                updated.push((id.clone(), modifier.apply(doc)?));
                if !options.multi {
                    break;
                }
            }
        }

        if updated.is_empty() {
            if !options.upsert {
                return Ok(0);
            }
            let mut seed = compiled.equality_fields();
            if let Some(id) = compiled.pinned_id() {
                seed.insert(ID_FIELD.into(), id.clone());
            }
            let document = if modifier.is_replacement() {
                let mut base = Document::new();
                if let Some(id) = seed.get(ID_FIELD) {
                    base.insert(ID_FIELD.into(), id.clone());
                }
                modifier.apply(&base)?
            } else {
                modifier.apply(&seed)?
            };
            let document = ensure_id(document);
            let id = document_id(collection, &document)?;
            target.insert(id.clone(), document);
            debug!(collection, id = %id, "document upserted");
            return Ok(1);
        }

        let count = updated.len() as u64;
        for (id, doc) in updated {
            target.insert(id, doc);
        }
        debug!(collection, count, "documents updated");
        Ok(count)
    }

    async fn remove(&self, collection: &str, selector: &Document) -> CoreResult<u64> {
        let compiled = Selector::compile(selector)?;
        let mut collections = self.collections.write();
        let Some(target) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = target.len();
        target.retain(|_, doc| !compiled.matches(doc));
        let count = (before - target.len()) as u64;
        debug!(collection, count, "documents removed");
        Ok(count)
    }
}
