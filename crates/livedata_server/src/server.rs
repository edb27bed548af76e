//! The LiveData server.

use crate::config::ServerConfig;
use crate::connection::{spawn_connection, ConnectionHandle, ConnectionId};
use crate::error::{ServerError, ServerResult};
use crate::mutation::{MutationHandler, MutationValidator};
use crate::poller::{deliver, PollReport, Poller};
use crate::sink::MessageSink;
use livedata_core::{DataSource, Registry};
use livedata_protocol::{decode_inbound, ClientMessage, Inbound, MutationRequest, ServerMessage, WireError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

struct ConnectionEntry {
    handle: ConnectionHandle,
    sink: Arc<dyn MessageSink>,
    task: JoinHandle<()>,
}

/// The LiveData server.
///
/// Owns the connection table and routes inbound frames to connection tasks
/// and the mutation handler. Transports attach a [`MessageSink`] per client
/// and feed it frames through [`LiveDataServer::handle_frame`].
///
/// # Example
///
/// ```
/// use livedata_core::{MemoryDataSource, Methods, PublicationOptions, RegistryBuilder};
/// use livedata_server::{ChannelSink, LiveDataServer, ServerConfig};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut builder = RegistryBuilder::new();
/// builder.register_collection("items", Methods::new()).unwrap();
/// builder.publish("items", PublicationOptions::new()).unwrap();
///
/// let server = LiveDataServer::new(
///     ServerConfig::default(),
///     Arc::new(builder.build()),
///     Arc::new(MemoryDataSource::new()),
/// );
///
/// let (sink, mut rx) = ChannelSink::new();
/// let id = server.connect(Arc::new(sink)).unwrap();
/// server
///     .handle_frame(id, r#"{"msg":"sub","id":"s1","name":"items"}"#)
///     .await
///     .unwrap();
/// assert_eq!(rx.recv().await.unwrap().kind(), "subscription_ready");
/// # }
/// ```
pub struct LiveDataServer {
    config: ServerConfig,
    registry: Arc<Registry>,
    data_source: Arc<dyn DataSource>,
    poller: Poller,
    mutations: MutationHandler,
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
}

impl LiveDataServer {
    /// Creates a server over a frozen registry and a data source.
    pub fn new(config: ServerConfig, registry: Arc<Registry>, data_source: Arc<dyn DataSource>) -> Self {
        let poller = Poller::new(Arc::clone(&registry), Arc::clone(&data_source));
        let mutations = MutationHandler::new(Arc::clone(&registry), Arc::clone(&data_source));
        Self {
            config,
            registry,
            data_source,
            poller,
            mutations,
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Installs a mutation validator.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn MutationValidator>) -> Self {
        self.mutations = self.mutations.with_validator(validator);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Returns the data source.
    pub fn data_source(&self) -> &Arc<dyn DataSource> {
        &self.data_source
    }

    /// Registers a client and starts its connection task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, sink: Arc<dyn MessageSink>) -> ServerResult<ConnectionId> {
        let id = ConnectionId::new();
        self.attach(id, sink)?;
        Ok(id)
    }

    /// Like [`connect`](Self::connect) with a caller-chosen id.
    pub fn attach(&self, id: ConnectionId, sink: Arc<dyn MessageSink>) -> ServerResult<()> {
        let mut connections = self.connections.write();
        if connections.len() >= self.config.max_connections {
            return Err(ServerError::TooManyConnections {
                limit: self.config.max_connections,
            });
        }
        let (handle, task) = spawn_connection(
            id,
            &self.config,
            Arc::clone(&self.registry),
            self.poller.clone(),
            Arc::clone(&sink),
        );
        connections.insert(id, ConnectionEntry { handle, sink, task });
        info!(connection = %id, active = connections.len(), "client connected");
        Ok(())
    }

    /// Removes a client and stops its task.
    pub fn disconnect(&self, id: ConnectionId) -> ServerResult<()> {
        let entry = self
            .connections
            .write()
            .remove(&id)
            .ok_or(ServerError::UnknownConnection(id))?;
        entry.handle.close();
        info!(connection = %id, "client disconnected");
        Ok(())
    }

    /// Decodes and handles one inbound frame.
    ///
    /// Frames that cannot be decoded are discarded and the connection stays
    /// open. A malformed mutation that carries an id is answered with a
    /// failed result.
    pub async fn handle_frame(&self, id: ConnectionId, line: &str) -> ServerResult<()> {
        match decode_inbound(line) {
            Ok(inbound) => self.handle_inbound(id, inbound).await,
            Err(err) => {
                let (_, sink) = self.entry(id)?;
                debug!(connection = %id, error = %err, "discarding frame");
                if let Some(request_id) = err.correlation_id() {
                    deliver(
                        sink.as_ref(),
                        ServerMessage::mutation_failed(Some(request_id.to_owned()), WireError::from(&err)),
                    );
                }
                Ok(())
            }
        }
    }

    /// Handles one decoded message.
    pub async fn handle_inbound(&self, id: ConnectionId, inbound: Inbound) -> ServerResult<()> {
        match inbound {
            Inbound::Client(ClientMessage::Sub { id: sub, name, params }) => {
                let (handle, _) = self.entry(id)?;
                handle.subscribe(sub, name, params).await
            }
            Inbound::Client(ClientMessage::Unsub { id: sub }) => {
                let (handle, _) = self.entry(id)?;
                handle.unsubscribe(sub).await
            }
            Inbound::Mutation(request) => self.mutate(id, request).await,
        }
    }

    /// Applies a mutation for `id`, acknowledges it and re-polls every other
    /// connection if the data source may have changed.
    pub async fn mutate(&self, id: ConnectionId, request: MutationRequest) -> ServerResult<()> {
        let (_, sink) = self.entry(id)?;
        let outcome = self.mutations.apply(id, &request).await;

        let ack = match &outcome.result {
            Ok(value) => ServerMessage::mutation_ok(request.id.clone(), value.clone()),
            Err(err) => ServerMessage::mutation_failed(request.id.clone(), WireError::from(err)),
        };
        deliver(sink.as_ref(), ack);

        if outcome.touched {
            let others: Vec<ConnectionHandle> = self
                .connections
                .read()
                .iter()
                .filter(|(other, _)| **other != id)
                .map(|(_, entry)| entry.handle.clone())
                .collect();
            debug!(connection = %id, others = others.len(), "re-polling after mutation");
            for handle in others {
                handle.request_poll();
            }
        }
        Ok(())
    }

    /// Polls a connection now and waits for the report.
    pub async fn poll(&self, id: ConnectionId) -> ServerResult<PollReport> {
        let (handle, _) = self.entry(id)?;
        handle.poll_now().await
    }

    /// Asks a connection for a throttled poll.
    pub fn request_poll(&self, id: ConnectionId) -> ServerResult<()> {
        let (handle, _) = self.entry(id)?;
        handle.request_poll();
        Ok(())
    }

    /// Returns the ids of all connected clients, in order.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.connections.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Returns the number of connected clients.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Disconnects every client and waits for their tasks to stop.
    pub async fn shutdown(&self) {
        let entries: Vec<_> = self.connections.write().drain().collect();
        info!(connections = entries.len(), "shutting down");
        for (_, entry) in &entries {
            entry.handle.close();
        }
        for (id, entry) in entries {
            if let Err(err) = entry.task.await {
                debug!(connection = %id, error = %err, "connection task ended abnormally");
            }
        }
    }

    fn entry(&self, id: ConnectionId) -> ServerResult<(ConnectionHandle, Arc<dyn MessageSink>)> {
        self.connections
            .read()
            .get(&id)
            .map(|entry| (entry.handle.clone(), Arc::clone(&entry.sink)))
            .ok_or(ServerError::UnknownConnection(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ChannelSink;
    use livedata_core::{MemoryDataSource, Methods, PublicationOptions, RegistryBuilder};
    use serde_json::json;

    fn server(config: ServerConfig) -> LiveDataServer {
        let store = Arc::new(MemoryDataSource::new());
        let mut builder = RegistryBuilder::new();
        builder.register_collection("items", Methods::new()).unwrap();
        builder.publish("items", PublicationOptions::new()).unwrap();
        LiveDataServer::new(config, Arc::new(builder.build()), store)
    }

    #[tokio::test]
    async fn server_lifecycle() {
        let server = server(ServerConfig::default());
        let (sink, _rx) = ChannelSink::new();
        let id = server.connect(Arc::new(sink)).unwrap();
        assert_eq!(server.connection_ids(), vec![id]);

        server.disconnect(id).unwrap();
        assert_eq!(server.connection_count(), 0);
        assert!(matches!(
            server.disconnect(id),
            Err(ServerError::UnknownConnection(_))
        ));
    }

    #[tokio::test]
    async fn connection_limit() {
        let server = server(ServerConfig::default().with_max_connections(1));
        let (first, _rx1) = ChannelSink::new();
        let (second, _rx2) = ChannelSink::new();
        server.connect(Arc::new(first)).unwrap();
        assert!(matches!(
            server.connect(Arc::new(second)),
            Err(ServerError::TooManyConnections { limit: 1 })
        ));
    }

    #[tokio::test]
    async fn malformed_frames_are_discarded() {
        let server = server(ServerConfig::default());
        let (sink, mut rx) = ChannelSink::new();
        let id = server.connect(Arc::new(sink)).unwrap();

        server.handle_frame(id, "not json").await.unwrap();
        server.handle_frame(id, "[1, 2]").await.unwrap();
        server.handle_frame(id, r#"{"msg":"ping"}"#).await.unwrap();
        server
            .handle_frame(id, r#"{"collection":"items","type":"update","id":"m1"}"#)
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            ServerMessage::MutationResult { id, result, error } => {
                assert_eq!(id.as_deref(), Some("m1"));
                assert!(result.is_none());
                assert_eq!(error.unwrap().error, livedata_protocol::codes::MALFORMED);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn mutation_is_acknowledged() {
        let server = server(ServerConfig::default());
        let (sink, mut rx) = ChannelSink::new();
        let id = server.connect(Arc::new(sink)).unwrap();

        server
            .handle_frame(
                id,
                r#"{"collection":"items","type":"insert","id":"m1","args":{"_id":"a","n":1}}"#,
            )
            .await
            .unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerMessage::mutation_ok(Some("m1".into()), json!({"_id": "a", "n": 1}))
        );

        server
            .handle_frame(id, r#"{"collection":"nope","type":"remove","id":"m2"}"#)
            .await
            .unwrap();
        match rx.recv().await.unwrap() {
            ServerMessage::MutationResult { error, .. } => {
                assert_eq!(error.unwrap().error, livedata_protocol::codes::NOT_FOUND);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_connection() {
        let server = server(ServerConfig::default());
        let err = server
            .handle_frame(ConnectionId::new(), r#"{"msg":"unsub","id":"s1"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::UnknownConnection(_)));
    }

    #[tokio::test]
    async fn shutdown_stops_everything() {
        let server = server(ServerConfig::default());
        let (sink, _rx) = ChannelSink::new();
        server.connect(Arc::new(sink)).unwrap();
        server.shutdown().await;
        assert_eq!(server.connection_count(), 0);
    }
}
