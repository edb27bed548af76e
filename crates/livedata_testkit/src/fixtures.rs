//! Test fixtures and server helpers.
//!
//! Provides a recording sink, the `counters` scenario registry, seeded
//! data sources and a failure-injecting data source wrapper.

use async_trait::async_trait;
use livedata_codec::{Document, Value};
use livedata_core::{
    CoreError, CoreResult, DataSource, MemoryDataSource, MethodContext, Methods,
    PublicationOptions, Query, Registry, RegistryBuilder,
};
use livedata_protocol::{ServerMessage, UpdateOptions};
use livedata_server::{ConnectionId, LiveDataServer, MessageSink, ServerConfig, ServerError, ServerResult};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Converts a JSON object literal into a document.
///
/// Panics if `value` is not an object.
pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

/// A sink that records every message it is sent.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<ServerMessage>>,
    closed: AtomicBool,
}

impl RecordingSink {
    /// Creates an open, empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything recorded so far.
    pub fn take(&self) -> Vec<ServerMessage> {
        std::mem::take(&mut *self.messages.lock())
    }

    /// Returns a copy of everything recorded so far.
    pub fn messages(&self) -> Vec<ServerMessage> {
        self.messages.lock().clone()
    }

    /// Returns the number of recorded messages.
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    /// Simulates the client going away.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl MessageSink for RecordingSink {
    fn send(&self, message: ServerMessage) -> ServerResult<()> {
        if self.is_closed() {
            return Err(ServerError::Io(std::io::ErrorKind::BrokenPipe.into()));
        }
        self.messages.lock().push(message);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Returns only the `data` messages.
pub fn data_messages(messages: &[ServerMessage]) -> Vec<&ServerMessage> {
    messages
        .iter()
        .filter(|m| matches!(m, ServerMessage::Data { .. }))
        .collect()
}

/// Returns the ids of `subscription_ready` messages in order.
pub fn ready_ids(messages: &[ServerMessage]) -> Vec<&str> {
    messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::SubscriptionReady { id } => Some(id.as_str()),
            _ => None,
        })
        .collect()
}

/// A store holding `items: [{_id: "a", n: 1}]`.
pub fn counters_store() -> Arc<MemoryDataSource> {
    let store = MemoryDataSource::new();
    store
        .seed("items", vec![doc(json!({"_id": "a", "n": 1}))])
        .expect("Failed to seed counters store");
    Arc::new(store)
}

/// Registry with the `items` collection and these publications:
///
/// - `counters`: every item
/// - `items`: every item, sorted by `n`
/// - `items-above`: items with `n > params.min`
///
/// `items` has one method, `increment`, which adds its first argument
/// (default 1) to `n` of every item and returns the count.
pub fn counters_registry() -> Registry {
    let methods = Methods::new().with_fn("increment", |ctx: MethodContext, args: Vec<Value>| async move {
        let by = args.first().cloned().unwrap_or(json!(1));
        let modifier = doc(json!({"$inc": {"n": by}}));
        let count = ctx
            .update(&Document::new(), &modifier, UpdateOptions::default().with_multi(true))
            .await?;
        Ok::<_, CoreError>(json!(count))
    });

    let mut builder = RegistryBuilder::new();
    builder
        .register_collection("items", methods)
        .expect("Failed to register items");
    builder
        .publish("counters", PublicationOptions::new().with_collection("items"))
        .expect("Failed to publish counters");
    builder
        .publish(
            "items",
            PublicationOptions::from_value(&json!({"sort": {"n": 1}})).expect("Invalid options"),
        )
        .expect("Failed to publish items");
    builder
        .publish(
            "items-above",
            PublicationOptions::new()
                .with_collection("items")
                .with_selector(doc(json!({"n": {"$gt": {"$param": "min"}}}))),
        )
        .expect("Failed to publish items-above");
    builder.build()
}

/// A server over [`counters_registry`] and [`counters_store`].
pub fn counters_server(config: ServerConfig) -> (Arc<LiveDataServer>, Arc<MemoryDataSource>) {
    let store = counters_store();
    let server = LiveDataServer::new(config, Arc::new(counters_registry()), store.clone());
    (Arc::new(server), store)
}

/// Connects a fresh [`RecordingSink`].
pub fn connect_recording(server: &LiveDataServer) -> (ConnectionId, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let id = server
        .connect(sink.clone())
        .expect("Failed to connect recording sink");
    (id, sink)
}

/// Wraps a data source and fails every call while switched on.
pub struct FlakyDataSource {
    inner: Arc<dyn DataSource>,
    failing: AtomicBool,
    finds: AtomicUsize,
}

impl FlakyDataSource {
    /// Wraps `inner`, initially healthy.
    pub fn new(inner: Arc<dyn DataSource>) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
            finds: AtomicUsize::new(0),
        }
    }

    /// Switches failure injection on or off.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns how many `find` calls were made.
    pub fn find_count(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    fn check(&self) -> CoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CoreError::data_source("injected failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DataSource for FlakyDataSource {
    async fn find(&self, query: &Query) -> CoreResult<Vec<Document>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.find(query).await
    }

    async fn insert(&self, collection: &str, document: Document) -> CoreResult<Document> {
        self.check()?;
        self.inner.insert(collection, document).await
    }

    async fn update(
        &self,
        collection: &str,
        selector: &Document,
        modifier: &Document,
        options: UpdateOptions,
    ) -> CoreResult<u64> {
        self.check()?;
        self.inner.update(collection, selector, modifier, options).await
    }

    async fn remove(&self, collection: &str, selector: &Document) -> CoreResult<u64> {
        self.check()?;
        self.inner.remove(collection, selector).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_take() {
        let sink = RecordingSink::new();
        sink.send(ServerMessage::ready("s1")).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.take(), vec![ServerMessage::ready("s1")]);
        assert!(sink.is_empty());

        sink.close();
        assert!(sink.send(ServerMessage::ready("s2")).is_err());
        assert!(sink.is_empty());
    }

    #[test]
    fn counters_registry_publications() {
        let registry = counters_registry();
        assert_eq!(
            registry.publication_names().collect::<Vec<_>>(),
            vec!["counters", "items", "items-above"]
        );
        let query = registry.lookup("items-above").unwrap().query(&json!({"min": 3}));
        assert_eq!(Value::Object(query.selector), json!({"n": {"$gt": 3}}));
    }
}
