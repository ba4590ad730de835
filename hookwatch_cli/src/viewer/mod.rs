//! Live request viewer
//!
//! Keeps a local, deduplicated copy of a session's captured requests. The
//! historical listing and the live event feed both write into one
//! `RequestStore`; the feed is kept alive by `EventStreamConsumer`, which
//! reconnects with exponential backoff.

pub mod client;
pub mod consumer;
pub mod policy;
pub mod store;
pub mod transport;

pub use client::RelayClient;
pub use consumer::{ConnectionState, ConsumerError, EventStreamConsumer};
pub use store::{RequestStore, StoreEvent};
pub use transport::SseTransport;
