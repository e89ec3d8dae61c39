//! Snapshot/version DAG, HEAD ref, commit, diff, and security-diff
//! computation. [`Tracker`] is the entry point; `store.rs` is
//! its private SQLite access layer.

pub mod diff;
pub mod error;
pub mod security_diff;
mod store;
pub mod tracker;
pub mod types;

pub use error::{Result, TrackerError};
pub use tracker::Tracker;
pub use types::{
    AttackSurfaceChange, BodyLineDiff, ChangedHeader, CombinedFileDiff, CommitResult, HeaderDiff,
    NewSnapshot, SecurityDiff, SecurityDiffOverview, SecurityDiffOverviewEntry, Snapshot, Version,
};
