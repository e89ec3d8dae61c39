//! Bounded-concurrency fetch, batched commit, and scoring.
//! [`Fetcher`] drives a set of URLs through a `WebClient`, funnels completed
//! snapshots into a batcher that commits and scores them against a
//! [`moku_tracker::Tracker`], and marks unreachable endpoints in the
//! [`moku_index::EndpointIndex`].

pub mod error;
pub mod fetcher;
pub mod types;

pub use error::{FetcherError, Result};
pub use fetcher::Fetcher;
pub use types::{new_snapshot_from_response, no_progress, FetchSummary, ProgressCallback};
