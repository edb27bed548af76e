//! Outbound message sinks.

use crate::connection::ConnectionId;
use crate::error::{ServerError, ServerResult};
use livedata_protocol::ServerMessage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::warn;

/// Default capacity of a [`ChannelSink`].
pub const DEFAULT_OUTBOUND_BUFFER: usize = 1024;

/// Where a connection's outbound messages go.
///
/// Sends never block. A sink that reports closed has lost its client, and
/// anything still sent to it is discarded.
pub trait MessageSink: Send + Sync {
    /// Queues a message for the client.
    fn send(&self, message: ServerMessage) -> ServerResult<()>;

    /// Returns true if the client is gone.
    fn is_closed(&self) -> bool;
}

/// A sink backed by a bounded channel.
///
/// The receiving half is drained by the transport. A client that falls a
/// full buffer behind has missed state it cannot recover from, so the sink
/// closes itself on overflow and wakes [`ChannelSink::overflowed`].
#[derive(Debug, Clone)]
pub struct ChannelSink {
    connection: Option<ConnectionId>,
    tx: mpsc::Sender<ServerMessage>,
    overflow: Arc<Overflow>,
}

#[derive(Debug, Default)]
struct Overflow {
    hit: AtomicBool,
    notify: Notify,
}

impl ChannelSink {
    /// Creates a sink holding up to [`DEFAULT_OUTBOUND_BUFFER`] messages.
    pub fn new() -> (Self, mpsc::Receiver<ServerMessage>) {
        Self::with_capacity(DEFAULT_OUTBOUND_BUFFER)
    }

    /// Creates a sink holding up to `capacity` undelivered messages.
    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                connection: None,
                tx,
                overflow: Arc::new(Overflow::default()),
            },
            rx,
        )
    }

    /// Tags the sink with its connection id for error reporting.
    pub fn for_connection(mut self, connection: ConnectionId) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Returns true if a send found the buffer full.
    pub fn has_overflowed(&self) -> bool {
        self.overflow.hit.load(Ordering::Acquire)
    }

    /// Completes once the buffer has overflowed.
    pub async fn overflowed(&self) {
        while !self.has_overflowed() {
            self.overflow.notify.notified().await;
        }
    }

    fn closed_error(&self) -> ServerError {
        match self.connection {
            Some(id) => ServerError::ConnectionClosed(id),
            None => ServerError::Io(std::io::ErrorKind::BrokenPipe.into()),
        }
    }
}

impl MessageSink for ChannelSink {
    fn send(&self, message: ServerMessage) -> ServerResult<()> {
        if self.has_overflowed() {
            return Err(self.closed_error());
        }
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                if !self.overflow.hit.swap(true, Ordering::AcqRel) {
                    warn!(
                        connection = ?self.connection,
                        capacity = self.tx.max_capacity(),
                        "outbound buffer full, closing client"
                    );
                    self.overflow.notify.notify_one();
                }
                Err(self.closed_error())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(self.closed_error()),
        }
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed() || self.has_overflowed()
    }
}
