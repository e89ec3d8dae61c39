//! Public domain types for the version DAG, diffs, and security diffs
//!.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use moku_core::{Headers, SnapshotId, VersionId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    pub parent_id: Option<VersionId>,
    pub message: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

/// One observed response, not yet assigned to a version. Built by
/// `new_snapshot_from_response`; `version_id` is filled in by `commit_batch`.
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub url: String,
    pub status_code: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub version_id: VersionId,
    pub url: String,
    pub status_code: u16,
    pub headers: Headers,
    pub blob_sha256: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitResult {
    pub version_id: VersionId,
    pub parent_id: Option<VersionId>,
    /// Per-URL combined diff against the parent version's snapshot for the
    /// same URL, keyed by URL. Empty on the first commit (no parent) and
    /// missing an entry for any URL that didn't exist in the parent version.
    pub diffs: BTreeMap<String, CombinedFileDiff>,
    pub snapshots: Vec<Snapshot>,
}

/// An added/removed/changed header diff.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeaderDiff {
    pub added: BTreeMap<String, Vec<String>>,
    pub removed: BTreeMap<String, Vec<String>>,
    pub changed: BTreeMap<String, ChangedHeader>,
    /// Sensitive header names present in `added`/`removed`/`changed` whose
    /// values were replaced with `<redacted>`.
    pub redacted: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangedHeader {
    pub from: Vec<String>,
    pub to: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BodyLineDiff {
    pub added_lines: usize,
    pub removed_lines: usize,
    pub unified: String,
}

/// Per-URL combined diff between a base and head snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedFileDiff {
    pub url: String,
    pub base_snapshot_id: Option<SnapshotId>,
    pub head_snapshot_id: SnapshotId,
    pub status_code_changed: bool,
    pub base_status_code: Option<u16>,
    pub head_status_code: u16,
    pub headers: HeaderDiff,
    pub body: BodyLineDiff,
}

/// Per-URL security delta between two score results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityDiff {
    pub url: String,
    pub base_version_id: Option<VersionId>,
    pub head_version_id: VersionId,
    pub base_snapshot_id: Option<SnapshotId>,
    pub head_snapshot_id: SnapshotId,
    pub score_delta: f64,
    pub feature_deltas: BTreeMap<String, f64>,
    pub rule_deltas: BTreeMap<String, f64>,
    pub attack_surface_changes: Vec<AttackSurfaceChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackSurfaceChange {
    pub kind: String,
    pub detail: String,
    pub dom_index: Option<usize>,
    pub header_name: Option<String>,
    pub cookie_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityDiffOverviewEntry {
    pub file_path: String,
    pub base_snapshot_id: Option<SnapshotId>,
    pub head_snapshot_id: Option<SnapshotId>,
    pub score_base: f64,
    pub score_head: f64,
    pub score_delta: f64,
    pub attack_surface_changed: bool,
    pub num_attack_surface_changes: usize,
    pub regressed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityDiffOverview {
    pub base_version_id: VersionId,
    pub head_version_id: VersionId,
    pub entries: Vec<SecurityDiffOverviewEntry>,
}
