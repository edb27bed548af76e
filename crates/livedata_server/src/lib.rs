//! # LiveData Server
//!
//! Live query synchronization server.
//!
//! This crate provides:
//! - One actor task per client connection, owning its subscriptions and
//!   last-known snapshot
//! - The poll cycle: re-run subscriptions, diff, stream `data` messages
//! - Mutation handling with acknowledgements and re-polls of other clients
//! - A leading-plus-trailing throttle for triggered polls
//! - A TCP transport speaking newline-delimited JSON
//!
//! # Architecture
//!
//! The server holds an immutable [`Registry`](livedata_core::Registry) and a
//! shared [`DataSource`](livedata_core::DataSource). Transports register a
//! [`MessageSink`] per client with [`LiveDataServer::connect`] and pass every
//! inbound line to [`LiveDataServer::handle_frame`]:
//!
//! 1. `sub` / `unsub` are queued on the connection task, which polls at once
//! 2. Mutations are applied, acknowledged with a `result` message, and every
//!    other connection is asked for a throttled poll
//! 3. A periodic timer re-polls each connection so it converges even when no
//!    mutation signal arrives
//!
//! # Protocol
//!
//! ```text
//! -> {"msg":"sub","id":"s1","name":"items","params":{}}
//! <- {"msg":"data","collection":"items","id":"a","set":{"n":1}}
//! <- {"msg":"subscription_ready","id":"s1"}
//! -> {"collection":"items","type":"update","id":"m1","selector":"a","mutator":{"$inc":{"n":1}}}
//! <- {"msg":"result","id":"m1","result":1}
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod connection;
mod error;
mod mutation;
mod poller;
mod server;
mod sink;
mod state;
mod throttle;

pub mod tcp;

pub use config::ServerConfig;
pub use connection::{spawn_connection, Command, ConnectionHandle, ConnectionId};
pub use error::{ServerError, ServerResult};
pub use mutation::{AcceptAll, MutationHandler, MutationOutcome, MutationValidator};
pub use poller::{PollReport, Poller};
pub use server::LiveDataServer;
pub use sink::{ChannelSink, MessageSink, DEFAULT_OUTBOUND_BUFFER};
pub use state::{ConnectionState, Subscription};
pub use throttle::{Throttle, ThrottleDecision};
