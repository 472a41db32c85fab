//! Pipeline runner for importkit.
//!
//! This crate drives a built transform tree over a batch of elements and
//! their rows, commits each successful row through a
//! [`Persister`](importkit_shared::Persister), and summarizes the outcome in a
//! [`RunReport`].

pub mod cancel;
pub mod memory;
pub mod pipeline;
pub mod report;

pub use cancel::CancelToken;
pub use memory::MemoryStore;
pub use pipeline::{Pipeline, ProgressReporter, SilentProgress};
pub use report::{RowError, RowFailure, RunReport};
