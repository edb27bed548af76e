//! Per-connection document snapshots.

use crate::document::CacheKey;
use crate::error::CoreResult;
use livedata_codec::{objects_equal, Document};
use std::collections::btree_map::{self, BTreeMap};

/// The full set of documents a connection is known to hold.
///
/// Entries are keyed by [`CacheKey`] and iterate in key order. A snapshot is
/// built from scratch on every poll and replaces the previous one wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    entries: BTreeMap<CacheKey, Document>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of documents.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the snapshot holds no documents.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the fields of a document.
    pub fn get(&self, key: &CacheKey) -> Option<&Document> {
        self.entries.get(key)
    }

    /// Returns true if the snapshot holds a document under `key`.
    pub fn contains_key(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterates over keys in order.
    pub fn keys(&self) -> btree_map::Keys<'_, CacheKey, Document> {
        self.entries.keys()
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, CacheKey, Document> {
        self.entries.iter()
    }

    /// Merges a document into the entry under `key`.
    ///
    /// Fields of `document` are shallow-extended over any existing entry, so
    /// later contributions win on conflicting fields.
    pub fn merge(&mut self, key: CacheKey, document: Document) {
        match self.entries.entry(key) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(document);
            }
            btree_map::Entry::Occupied(mut slot) => {
                slot.get_mut().extend(document);
            }
        }
    }

    /// Merges a document observed in `collection`, keyed by its `_id`.
    pub fn merge_document(&mut self, collection: &str, document: Document) -> CoreResult<CacheKey> {
        let key = CacheKey::for_document(collection, &document)?;
        self.merge(key.clone(), document);
        Ok(key)
    }

    /// Replaces the entry under `key`.
    pub fn insert(&mut self, key: CacheKey, document: Document) -> Option<Document> {
        self.entries.insert(key, document)
    }

    /// Removes the entry under `key`.
    pub fn remove(&mut self, key: &CacheKey) -> Option<Document> {
        self.entries.remove(key)
    }

    /// Returns true if both snapshots hold the same keys with structurally
    /// equal documents.
    pub fn structurally_equal(&self, other: &Snapshot) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, doc)| other.get(key).is_some_and(|o| objects_equal(doc, o)))
    }
}

impl FromIterator<(CacheKey, Document)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (CacheKey, Document)>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for (key, document) in iter {
            snapshot.merge(key, document);
        }
        snapshot
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = (&'a CacheKey, &'a Document);
    type IntoIter = btree_map::Iter<'a, CacheKey, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
