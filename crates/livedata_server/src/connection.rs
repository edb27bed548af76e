//! Connection actors.
//!
//! Every connection is served by one task that owns its [`ConnectionState`].
//! Everything that touches that state arrives as a [`Command`] on the
//! task's queue, so polls and subscription changes never interleave.
//! Closing bypasses the queue.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::poller::{deliver, PollReport, Poller};
use crate::sink::MessageSink;
use crate::state::{ConnectionState, Subscription};
use crate::throttle::{Throttle, ThrottleDecision};
use livedata_codec::Value;
use livedata_core::{CoreResult, Registry};
use livedata_protocol::{ServerMessage, WireError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

/// Identifies one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocates a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Work for a connection task.
#[derive(Debug)]
pub enum Command {
    /// Subscribe to a publication and poll.
    Subscribe {
        /// Subscription id.
        id: String,
        /// Publication name.
        name: String,
        /// Publication params.
        params: Value,
    },
    /// Drop subscriptions with this id and poll.
    Unsubscribe {
        /// Subscription id.
        id: String,
    },
    /// Poll through the throttle.
    RequestPoll,
    /// Poll now and report back.
    PollNow(oneshot::Sender<CoreResult<PollReport>>),
}

/// Sending side of a connection task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    commands: mpsc::Sender<Command>,
    closing: Arc<Notify>,
}

impl ConnectionHandle {
    /// Returns the connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Subscribes to a publication.
    pub async fn subscribe(&self, id: String, name: String, params: Value) -> ServerResult<()> {
        self.send(Command::Subscribe { id, name, params }).await
    }

    /// Drops a subscription.
    pub async fn unsubscribe(&self, id: String) -> ServerResult<()> {
        self.send(Command::Unsubscribe { id }).await
    }

    /// Asks for a throttled poll without waiting.
    ///
    /// If the queue is full the request is dropped: the task is busy with
    /// commands that each poll anyway.
    pub fn request_poll(&self) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.commands.try_send(Command::RequestPoll) {
            debug!(connection = %self.id, "poll request dropped, queue full");
        }
    }

    /// Polls immediately and waits for the report.
    pub async fn poll_now(&self) -> ServerResult<PollReport> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::PollNow(reply)).await?;
        let report = rx.await.map_err(|_| ServerError::ConnectionClosed(self.id))?;
        Ok(report?)
    }

    /// Stops the task once its current command finishes. Queued commands
    /// are discarded.
    pub fn close(&self) {
        self.closing.notify_one();
    }

    /// Returns true if the task has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn send(&self, command: Command) -> ServerResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ServerError::ConnectionClosed(self.id))
    }
}

/// Starts the task serving one connection.
pub fn spawn_connection(
    id: ConnectionId,
    config: &ServerConfig,
    registry: Arc<Registry>,
    poller: Poller,
    sink: Arc<dyn MessageSink>,
) -> (ConnectionHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
    let actor = ConnectionActor {
        state: ConnectionState::new(id),
        registry,
        poller,
        sink,
        throttle: Throttle::new(config.throttle_window),
        poll_interval: config.poll_interval.max(Duration::from_millis(1)),
    };
    let closing = Arc::new(Notify::new());
    let task = tokio::spawn(actor.run(rx, Arc::clone(&closing)));
    (
        ConnectionHandle {
            id,
            commands: tx,
            closing,
        },
        task,
    )
}

struct ConnectionActor {
    state: ConnectionState,
    registry: Arc<Registry>,
    poller: Poller,
    sink: Arc<dyn MessageSink>,
    throttle: Throttle,
    poll_interval: Duration,
}

impl ConnectionActor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, closing: Arc<Notify>) {
        let id = self.state.id();
        debug!(connection = %id, "connection task started");

        let mut timer = time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.throttle.deadline();
            tokio::select! {
                biased;
                _ = closing.notified() => break,
                command = commands.recv() => match command {
                    None => break,
                    Some(command) => self.handle(command).await,
                },
                _ = timer.tick() => self.trigger().await,
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let _ = self.poll().await;
                }
            }
        }

        info!(connection = %id, "connection task stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Subscribe { id, name, params } => {
                if self.registry.lookup(&name).is_none() {
                    debug!(
                        connection = %self.state.id(),
                        subscription = %id,
                        publication = %name,
                        "subscribe to unknown publication"
                    );
                    deliver(
                        self.sink.as_ref(),
                        ServerMessage::nosub_error(id, WireError::unknown_publication()),
                    );
                    return;
                }
                debug!(connection = %self.state.id(), subscription = %id, publication = %name, "subscribed");
                self.state.subscribe(Subscription::new(id, name, params));
                let _ = self.poll().await;
            }
            Command::Unsubscribe { id } => {
                deliver(self.sink.as_ref(), ServerMessage::nosub(id.as_str()));
                let removed = self.state.unsubscribe(&id);
                debug!(connection = %self.state.id(), subscription = %id, removed, "unsubscribed");
                let _ = self.poll().await;
            }
            Command::RequestPoll => self.trigger().await,
            Command::PollNow(reply) => {
                let report = self.poll().await;
                let _ = reply.send(report);
            }
        }
    }

    async fn trigger(&mut self) {
        match self.throttle.request(Instant::now()) {
            ThrottleDecision::RunNow => {
                let _ = self.poll().await;
            }
            ThrottleDecision::Scheduled(at) => {
                debug!(connection = %self.state.id(), delay = ?at.saturating_duration_since(Instant::now()), "trailing poll scheduled");
            }
            ThrottleDecision::AlreadyScheduled => {}
        }
    }

    async fn poll(&mut self) -> CoreResult<PollReport> {
        let result = self.poller.poll(&mut self.state, self.sink.as_ref()).await;
        self.throttle.record_run(Instant::now());
        result
    }
}
