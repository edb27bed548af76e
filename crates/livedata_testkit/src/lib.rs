//! # LiveData Testkit
//!
//! Test utilities for LiveData.
//!
//! This crate provides:
//! - A recording [`MessageSink`](livedata_server::MessageSink) and other
//!   fixtures for driving a server without sockets
//! - The `counters` registry and seeded data sources
//! - A data source wrapper that can be told to fail
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use livedata_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn counters() {
//!     let (server, _store) = counters_server(ServerConfig::default());
//!     let (id, sink) = connect_recording(&server);
//!     // ... drive frames and inspect sink.take()
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
