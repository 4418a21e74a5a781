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

//! Synchronization between the local conversation store and the remote
//! chat service, plus decoding of article results out of agent replies.

mod coordinator;
mod reconciler;

pub use coordinator::{SubmitOutcome, SyncCoordinator, SyncError};
pub use reconciler::SearchResultReconciler;
