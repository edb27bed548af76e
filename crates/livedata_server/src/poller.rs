//! The poll cycle.
//!
//! A poll re-runs every subscription of a connection against the data
//! source, builds a fresh snapshot, diffs it against the last one and sends
//! the resulting `data` messages, followed by `subscription_ready` for every
//! subscription that was not ready yet.

use crate::sink::MessageSink;
use crate::state::ConnectionState;
use livedata_core::{diff_snapshots, CoreResult, DataSource, Registry, Snapshot};
use livedata_protocol::ServerMessage;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Summary of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Subscriptions that were evaluated.
    pub subscriptions: usize,
    /// Documents in the new snapshot.
    pub documents: usize,
    /// `data` messages sent.
    pub events: usize,
    /// Subscriptions that became ready in this cycle.
    pub ready: usize,
}

/// Runs poll cycles against a registry and data source.
#[derive(Clone)]
pub struct Poller {
    registry: Arc<Registry>,
    data_source: Arc<dyn DataSource>,
}

impl Poller {
    /// Creates a poller.
    pub fn new(registry: Arc<Registry>, data_source: Arc<dyn DataSource>) -> Self {
        Self {
            registry,
            data_source,
        }
    }

    /// Evaluates every subscription of `state` into a new snapshot.
    ///
    /// Unknown publications are skipped and documents without a usable
    /// `_id` are dropped, both with a warning. A data source failure aborts
    /// the whole evaluation.
    pub async fn build_snapshot(&self, state: &ConnectionState) -> CoreResult<(Snapshot, usize)> {
        let mut snapshot = Snapshot::new();
        let mut evaluated = 0;

        for sub in state.subscriptions() {
            let Some(publication) = self.registry.lookup(&sub.publication) else {
                warn!(
                    connection = %state.id(),
                    subscription = %sub.id,
                    publication = %sub.publication,
                    "skipping subscription to unknown publication"
                );
                continue;
            };

            let query = publication.query(&sub.params);
            let documents = self.data_source.find(&query).await?;
            evaluated += 1;

            for document in documents {
                if let Err(err) = snapshot.merge_document(&query.collection, document) {
                    warn!(
                        connection = %state.id(),
                        publication = %sub.publication,
                        collection = %query.collection,
                        error = %err,
                        "dropping document without identifier"
                    );
                }
            }
        }

        Ok((snapshot, evaluated))
    }

    /// Runs one poll cycle.
    ///
    /// On a data source failure the previous snapshot is kept and nothing
    /// is sent.
    pub async fn poll(&self, state: &mut ConnectionState, sink: &dyn MessageSink) -> CoreResult<PollReport> {
        let (snapshot, evaluated) = match self.build_snapshot(state).await {
            Ok(built) => built,
            Err(err) => {
                error!(connection = %state.id(), error = %err, "poll abandoned");
                return Err(err);
            }
        };

        let events = diff_snapshots(state.snapshot(), &snapshot);
        let report_events = events.len();
        for event in events {
            deliver(sink, event.into_message());
        }

        let documents = snapshot.len();
        state.replace_snapshot(snapshot);

        let mut ready = 0;
        let mut newly_ready = Vec::new();
        for sub in state.subscriptions_mut() {
            if !sub.ready {
                sub.ready = true;
                ready += 1;
                newly_ready.push(sub.id.clone());
            }
        }
        for id in newly_ready {
            deliver(sink, ServerMessage::ready(id));
        }

        debug!(
            connection = %state.id(),
            subscriptions = evaluated,
            documents,
            events = report_events,
            ready,
            "poll complete"
        );

        Ok(PollReport {
            subscriptions: evaluated,
            documents,
            events: report_events,
            ready,
        })
    }
}

/// Sends a message unless the client is gone.
pub(crate) fn deliver(sink: &dyn MessageSink, message: ServerMessage) {
    if sink.is_closed() {
        return;
    }
    if let Err(err) = sink.send(message) {
        debug!(error = %err, "dropping message for closed connection");
    }
}
