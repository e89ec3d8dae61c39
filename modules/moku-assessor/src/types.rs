//! Domain types shared by attack-surface extraction and scoring.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use moku_core::{EvidenceItemId, ScoreResultId, SnapshotId, VersionId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub field_type: String,
    pub required: bool,
    pub dom_index: usize,
    pub id: Option<String>,
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    pub action: String,
    pub method: String,
    pub dom_index: usize,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRef {
    pub src: Option<String>,
    pub inline: bool,
    pub dom_index: usize,
}

/// Structured, security-relevant view of one response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackSurface {
    pub url: String,
    pub snapshot_id: SnapshotId,
    pub collected_at: DateTime<Utc>,
    pub status_code: u16,
    pub headers: moku_core::Headers,
    pub cookies: Vec<Cookie>,
    pub get_params: Vec<String>,
    pub post_params: Vec<String>,
    pub forms: Vec<Form>,
    pub scripts: Vec<ScriptRef>,
    pub content_type: Option<String>,
    /// Left as an empty extension point; no detector implemented.
    pub error_indicators: Vec<String>,
    /// Left as an empty extension point; no detector implemented.
    pub framework_hints: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// A concrete location in the attack surface that evidence points back to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceLocation {
    #[serde(rename = "type")]
    pub location_type: String,
    pub snapshot_id: SnapshotId,
    pub selector: Option<String>,
    pub xpath: Option<String>,
    pub regex: Option<String>,
    pub file_path: Option<String>,
    pub dom_index: Option<usize>,
    pub parent_dom_index: Option<usize>,
    pub byte_start: Option<usize>,
    pub byte_end: Option<usize>,
    pub line_start: Option<usize>,
    pub line_end: Option<usize>,
    pub header_name: Option<String>,
    pub cookie_name: Option<String>,
    pub param_name: Option<String>,
    pub note: Option<String>,
}

impl EvidenceLocation {
    pub fn new(location_type: impl Into<String>, snapshot_id: SnapshotId) -> Self {
        Self {
            location_type: location_type.into(),
            snapshot_id,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: EvidenceItemId,
    pub key: String,
    pub rule_id: String,
    pub severity: Severity,
    pub description: String,
    pub value: serde_json::Value,
    pub locations: Vec<EvidenceLocation>,
    pub contribution: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResult {
    pub id: ScoreResultId,
    pub snapshot_id: SnapshotId,
    pub version_id: VersionId,
    pub url: String,
    pub score: f64,
    pub normalized: u8,
    pub confidence: f64,
    pub scoring_version: String,
    pub evidence: Vec<EvidenceItem>,
    pub matched_rules: Vec<String>,
    pub raw_features: BTreeMap<String, f64>,
    pub contrib_by_rule: BTreeMap<String, f64>,
    pub attack_surface: AttackSurface,
    pub timestamp: DateTime<Utc>,
}
