#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Remote side of the sync engine: a bounded-retry GraphQL transport
//! and the typed adapter for the five chat-service operations.
//!
//! Retry is gated per operation: reads and deletes are idempotent and
//! get the full budget, while create/continue have no dedup key at the
//! protocol layer and are never blind-retried.

mod adapter;
pub mod retry;
mod transport;

pub use adapter::RemoteSyncAdapter;
pub use transport::{GraphqlRequest, GraphqlTransport, Idempotency, TransportError};
