//! Document identifiers and cache keys.

use crate::error::{CoreError, CoreResult};
use livedata_codec::{type_name, Document, Value};
use std::fmt;
use uuid::Uuid;

/// Name of the identifier field every document carries.
pub const ID_FIELD: &str = "_id";

/// Extracts the identifier of a document as a string.
///
/// String ids are used as-is and numeric ids by their decimal text. Any
/// other id, or a missing one, is rejected.
pub fn document_id(collection: &str, document: &Document) -> CoreResult<String> {
    match document.get(ID_FIELD) {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::String(_)) => Err(CoreError::malformed_cache_key(collection, "empty _id")),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(CoreError::malformed_cache_key(
            collection,
            format!("_id must be a string or number, found {}", type_name(other)),
        )),
        None => Err(CoreError::malformed_cache_key(collection, "missing _id")),
    }
}

/// Gives a document a fresh UUID v4 `_id` if it has none.
///
/// A null or empty-string `_id` counts as none. Other client-supplied ids
/// are preserved. The id is placed first in the field
/// order.
pub fn ensure_id(document: Document) -> Document {
    match document.get(ID_FIELD) {
        None | Some(Value::Null) => {}
        Some(Value::String(id)) if id.is_empty() => {}
        Some(_) => return document,
    }
    let mut with_id = Document::new();
    with_id.insert(ID_FIELD.into(), Value::String(Uuid::new_v4().to_string()));
    with_id.extend(document.into_iter().filter(|(field, _)| field != ID_FIELD));
    with_id
}

/// Resolves a dotted path (`"a.b.0"`) inside a document.
///
/// Path segments step into objects by key and into arrays by index.
pub fn lookup_path<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Identity of one document inside a connection's cache.
///
/// Keys order by collection name, then by document id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey {
    /// Collection name.
    pub collection: String,
    /// Document id.
    pub id: String,
}

impl CacheKey {
    /// Creates a cache key.
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Builds the key of a document observed in `collection`.
    pub fn for_document(collection: &str, document: &Document) -> CoreResult<Self> {
        Ok(Self::new(collection, document_id(collection, document)?))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}
