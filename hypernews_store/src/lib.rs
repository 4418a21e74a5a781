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

//! Local durable record of conversations and their chat turns.
//!
//! The store owns a key-value substrate exclusively and defines the
//! schema written there: one index record, one active-pointer record,
//! and one item log per conversation. If the substrate cannot be opened
//! the store degrades to memory-only operation for the session instead
//! of failing the surface.

mod store;
mod substrate;

pub use store::{ConversationStore, StorageMode, StoreError, StoreEvent};
pub use substrate::{FileStore, KeyValueStore, MemoryStore, SubstrateError};
