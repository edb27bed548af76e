//! # LiveData Protocol
//!
//! Wire messages exchanged between LiveData clients and the server.
//!
//! This crate provides:
//! - Subscription messages (`sub`, `unsub`)
//! - Server messages (`data`, `nosub`, `subscription_ready`, `result`)
//! - Mutation envelopes (`insert`, `update`, `remove`, `method`)
//! - Classification of inbound frames
//!
//! Every message is one JSON object per line. This is a pure protocol crate
//! with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod inbound;
mod messages;
mod mutation;

pub use error::{codes, ProtocolError, ProtocolResult, WireError};
pub use inbound::{classify, decode_inbound, Inbound};
pub use messages::{ClientMessage, ServerMessage};
pub use mutation::{MutationOp, MutationRequest, UpdateOptions};
