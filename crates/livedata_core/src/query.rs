//! Queries and publication options.

use crate::document::lookup_path;
use crate::error::{CoreError, CoreResult};
use livedata_codec::{cmp_canonical, type_name, Document, Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Sort direction of one sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// An ordered list of `(path, direction)` sort keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<(String, SortOrder)>,
}

impl SortSpec {
    /// Creates an empty sort specification.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an ascending key.
    #[must_use]
    pub fn ascending(mut self, path: impl Into<String>) -> Self {
        self.keys.push((path.into(), SortOrder::Ascending));
        self
    }

    /// Appends a descending key.
    #[must_use]
    pub fn descending(mut self, path: impl Into<String>) -> Self {
        self.keys.push((path.into(), SortOrder::Descending));
        self
    }

    /// Returns the sort keys.
    pub fn keys(&self) -> &[(String, SortOrder)] {
        &self.keys
    }

    /// Parses `{"field": 1, "other": -1}` or `[["field", "asc"], ...]`.
    pub fn parse(value: &Value) -> CoreResult<Self> {
        let mut spec = SortSpec::new();
        match value {
            Value::Object(map) => {
                for (path, direction) in map {
                    spec.keys.push((path.clone(), parse_direction(direction)?));
                }
            }
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::String(path) => spec.keys.push((path.clone(), SortOrder::Ascending)),
                        Value::Array(pair) => match pair.as_slice() {
                            [Value::String(path), direction] => {
                                spec.keys.push((path.clone(), parse_direction(direction)?));
                            }
                            _ => return Err(CoreError::malformed("sort pair must be [field, direction]")),
                        },
                        other => {
                            return Err(CoreError::malformed(format!(
                                "invalid sort key of type {}",
                                type_name(other)
                            )))
                        }
                    }
                }
            }
            other => {
                return Err(CoreError::malformed(format!(
                    "sort must be an object or array, found {}",
                    type_name(other)
                )))
            }
        }
        Ok(spec)
    }

    /// Compares two documents by this specification.
    ///
    /// Missing fields sort as `null`.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for (path, order) in &self.keys {
            let left = lookup_path(a, path).unwrap_or(&Value::Null);
            let right = lookup_path(b, path).unwrap_or(&Value::Null);
            let ord = match order {
                SortOrder::Ascending => cmp_canonical(left, right),
                SortOrder::Descending => cmp_canonical(right, left),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

fn parse_direction(value: &Value) -> CoreResult<SortOrder> {
    match value {
        Value::Number(n) if n.as_f64().is_some_and(|d| d < 0.0) => Ok(SortOrder::Descending),
        Value::Number(_) => Ok(SortOrder::Ascending),
        Value::String(s) if s == "asc" || s == "ascending" => Ok(SortOrder::Ascending),
        Value::String(s) if s == "desc" || s == "descending" => Ok(SortOrder::Descending),
        other => Err(CoreError::malformed(format!("invalid sort direction: {other}"))),
    }
}

/// A concrete query against one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Collection to read.
    pub collection: String,
    /// Selector documents must match. Empty matches everything.
    pub selector: Document,
    /// Result order. Unsorted results come in id order.
    pub sort: Option<SortSpec>,
    /// Number of leading results to drop.
    pub skip: usize,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

impl Query {
    /// Creates a query matching every document of `collection`.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            selector: Document::new(),
            sort: None,
            skip: 0,
            limit: None,
        }
    }

    /// Sets the selector.
    #[must_use]
    pub fn with_selector(mut self, selector: Document) -> Self {
        self.selector = selector;
        self
    }

    /// Sets the sort order.
    #[must_use]
    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Sets the number of results to skip.
    #[must_use]
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A query parameter that is either fixed or computed from the
/// subscription's params at poll time.
pub enum QueryParam<T> {
    /// A fixed value.
    Literal(T),
    /// A function of the subscription params.
    Computed(Arc<dyn Fn(&Value) -> T + Send + Sync>),
}

impl<T: Clone> QueryParam<T> {
    /// Resolves the parameter for one subscription.
    pub fn resolve(&self, params: &Value) -> T {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Computed(produce) => produce(params),
        }
    }
}

impl<T: Clone> Clone for QueryParam<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Literal(value) => Self::Literal(value.clone()),
            Self::Computed(produce) => Self::Computed(Arc::clone(produce)),
        }
    }
}

impl<T: Default> Default for QueryParam<T> {
    fn default() -> Self {
        Self::Literal(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for QueryParam<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Options for [`RegistryBuilder::publish`](crate::RegistryBuilder::publish).
///
/// Selectors may contain `{"$param": "field"}` placeholders, replaced by
/// `params.field` (dotted paths allowed) when the publication runs.
#[derive(Debug, Clone, Default)]
pub struct PublicationOptions {
    /// Collection to publish. Defaults to the publication's name.
    pub collection: Option<String>,
    /// Selector, default `{}`.
    pub selector: QueryParam<Document>,
    /// Sort order.
    pub sort: Option<QueryParam<SortSpec>>,
    /// Results to skip.
    pub skip: Option<QueryParam<usize>>,
    /// Result limit.
    pub limit: Option<QueryParam<usize>>,
}

impl PublicationOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes the given collection instead of the one named like the
    /// publication.
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Sets a literal selector.
    #[must_use]
    pub fn with_selector(mut self, selector: Document) -> Self {
        self.selector = QueryParam::Literal(selector);
        self
    }

    /// Computes the selector from the subscription params.
    #[must_use]
    pub fn with_selector_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Document + Send + Sync + 'static,
    {
        self.selector = QueryParam::Computed(Arc::new(f));
        self
    }

    /// Sets a literal sort order.
    #[must_use]
    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(QueryParam::Literal(sort));
        self
    }

    /// Computes the sort order from the subscription params.
    #[must_use]
    pub fn with_sort_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> SortSpec + Send + Sync + 'static,
    {
        self.sort = Some(QueryParam::Computed(Arc::new(f)));
        self
    }

    /// Sets a literal skip.
    #[must_use]
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(QueryParam::Literal(skip));
        self
    }

    /// Computes the skip from the subscription params.
    #[must_use]
    pub fn with_skip_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> usize + Send + Sync + 'static,
    {
        self.skip = Some(QueryParam::Computed(Arc::new(f)));
        self
    }

    /// Sets a literal limit.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(QueryParam::Literal(limit));
        self
    }

    /// Computes the limit from the subscription params.
    #[must_use]
    pub fn with_limit_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> usize + Send + Sync + 'static,
    {
        self.limit = Some(QueryParam::Computed(Arc::new(f)));
        self
    }

    /// Parses options from JSON, as found in seed files:
    /// `{"collection", "selector", "sort", "skip", "limit"}`, all optional.
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        let map = match value {
            Value::Object(map) => map,
            Value::Null => return Ok(Self::default()),
            other => {
                return Err(CoreError::malformed(format!(
                    "publication options must be an object, found {}",
                    type_name(other)
                )))
            }
        };

        let mut options = Self::new();
        if let Some(collection) = map.get("collection") {
            let name = collection
                .as_str()
                .ok_or_else(|| CoreError::malformed("collection must be a string"))?;
            options = options.with_collection(name);
        }
        match map.get("selector") {
            None | Some(Value::Null) => {}
            Some(Value::Object(selector)) => options = options.with_selector(selector.clone()),
            Some(other) => {
                return Err(CoreError::invalid_selector(format!(
                    "selector must be an object, found {}",
                    type_name(other)
                )))
            }
        }
        if let Some(sort) = map.get("sort").filter(|v| !v.is_null()) {
            options = options.with_sort(SortSpec::parse(sort)?);
        }
        if let Some(skip) = count_field(map, "skip")? {
            options = options.with_skip(skip);
        }
        if let Some(limit) = count_field(map, "limit")? {
            options = options.with_limit(limit);
        }
        Ok(options)
    }

    /// Builds the query for one subscription.
    pub fn query(&self, collection: &str, params: &Value) -> Query {
        let selector = match substitute_params(&Value::Object(self.selector.resolve(params)), params)
        {
            Value::Object(selector) => selector,
            _ => Document::new(),
        };
        Query {
            collection: collection.to_owned(),
            selector,
            sort: self.sort.as_ref().map(|sort| sort.resolve(params)),
            skip: self.skip.as_ref().map_or(0, |skip| skip.resolve(params)),
            limit: self.limit.as_ref().map(|limit| limit.resolve(params)),
        }
    }
}

fn count_field(map: &Map<String, Value>, name: &str) -> CoreResult<Option<usize>> {
    match map.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| CoreError::malformed(format!("{name} must be a non-negative integer"))),
    }
}

/// Replaces `{"$param": "path"}` placeholders with values from `params`.
///
/// A placeholder whose path is absent from `params` becomes `null`.
pub fn substitute_params(template: &Value, params: &Value) -> Value {
    match template {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(path)) = map.get("$param") {
                    return match params {
                        Value::Object(fields) => lookup_path(fields, path).cloned().unwrap_or(Value::Null),
                        _ => Value::Null,
                    };
                }
            }
            Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), substitute_params(value, params)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute_params(item, params))
                .collect(),
        ),
        other => other.clone(),
    }
}
