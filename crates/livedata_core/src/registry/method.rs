//! Collection methods.

use crate::document::ensure_id;
use crate::error::CoreResult;
use crate::query::Query;
use crate::source::DataSource;
use async_trait::async_trait;
use livedata_codec::{Document, Value};
use livedata_protocol::UpdateOptions;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// What a collection method can reach while it runs.
#[derive(Clone)]
pub struct MethodContext {
    collection: String,
    data_source: Arc<dyn DataSource>,
}

impl MethodContext {
    /// Creates a context for a method of `collection`.
    pub fn new(collection: impl Into<String>, data_source: Arc<dyn DataSource>) -> Self {
        Self {
            collection: collection.into(),
            data_source,
        }
    }

    /// Name of the collection the method belongs to.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The underlying data source.
    pub fn data_source(&self) -> &Arc<dyn DataSource> {
        &self.data_source
    }

    /// Finds documents of this collection.
    pub async fn find(&self, selector: Document) -> CoreResult<Vec<Document>> {
        let query = Query::new(self.collection.as_str()).with_selector(selector);
        self.data_source.find(&query).await
    }

    /// Finds the first matching document of this collection.
    pub async fn find_one(&self, selector: Document) -> CoreResult<Option<Document>> {
        let query = Query::new(self.collection.as_str())
            .with_selector(selector)
            .with_limit(1);
        Ok(self.data_source.find(&query).await?.into_iter().next())
    }

    /// Inserts a document, allocating an `_id` if it has none.
    pub async fn insert(&self, document: Document) -> CoreResult<Document> {
        self.data_source
            .insert(&self.collection, ensure_id(document))
            .await
    }

    /// Updates documents of this collection.
    pub async fn update(
        &self,
        selector: &Document,
        modifier: &Document,
        options: UpdateOptions,
    ) -> CoreResult<u64> {
        self.data_source
            .update(&self.collection, selector, modifier, options)
            .await
    }

    /// Removes documents of this collection.
    pub async fn remove(&self, selector: &Document) -> CoreResult<u64> {
        self.data_source.remove(&self.collection, selector).await
    }
}

impl fmt::Debug for MethodContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodContext")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

/// A named server-side operation on a collection.
#[async_trait]
pub trait CollectionMethod: Send + Sync {
    /// Runs the method with positional arguments.
    async fn invoke(&self, ctx: MethodContext, args: Vec<Value>) -> CoreResult<Value>;
}

/// Adapts an async closure into a [`CollectionMethod`].
pub struct FnMethod<F>(F);

#[async_trait]
impl<F, Fut> CollectionMethod for FnMethod<F>
where
    F: Fn(MethodContext, Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = CoreResult<Value>> + Send + 'static,
{
    async fn invoke(&self, ctx: MethodContext, args: Vec<Value>) -> CoreResult<Value> {
        (self.0)(ctx, args).await
    }
}

/// The method table of a collection.
#[derive(Clone, Default)]
pub struct Methods {
    table: BTreeMap<String, Arc<dyn CollectionMethod>>,
}

impl Methods {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a method.
    #[must_use]
    pub fn with<M>(mut self, name: impl Into<String>, method: M) -> Self
    where
        M: CollectionMethod + 'static,
    {
        self.table.insert(name.into(), Arc::new(method));
        self
    }

    /// Adds a method implemented by an async closure.
    #[must_use]
    pub fn with_fn<F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(MethodContext, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CoreResult<Value>> + Send + 'static,
    {
        self.with(name, FnMethod(f))
    }

    /// Looks up a method.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn CollectionMethod>> {
        self.table.get(name)
    }

    /// Returns the method names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }

    /// Returns the number of methods.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl fmt::Debug for Methods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::source::MemoryDataSource;
    use serde_json::json;

    #[tokio::test]
    async fn closure_method_uses_context() {
        let source: Arc<dyn DataSource> = Arc::new(MemoryDataSource::new());
        let methods = Methods::new().with_fn("add", |ctx: MethodContext, args: Vec<Value>| async move {
            let mut doc = Document::new();
            doc.insert("n".into(), args.first().cloned().unwrap_or(Value::Null));
            let stored = ctx.insert(doc).await?;
            Ok::<_, CoreError>(stored["_id"].clone())
        });
        assert_eq!(methods.names().collect::<Vec<_>>(), vec!["add"]);

        let ctx = MethodContext::new("items", Arc::clone(&source));
        let id = methods
            .get("add")
            .unwrap()
            .invoke(ctx.clone(), vec![json!(5)])
            .await
            .unwrap();
        assert!(id.is_string());

        let found = ctx.find_one(Document::new()).await.unwrap().unwrap();
        assert_eq!(found["n"], json!(5));
        assert!(methods.get("missing").is_none());
    }
}
