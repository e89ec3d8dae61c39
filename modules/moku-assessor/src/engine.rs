//! Ties attack-surface extraction, feature extraction, and rule scoring
//! into the single `Assessor::assess` entry point.

use std::time::Duration;

use moku_core::{config::AssessorConfig, Headers, SnapshotId, VersionId};
use tracing::warn;

use crate::error::{AssessorError, Result};
use crate::rule::{self, Rule, RuleBounds};
use crate::rules::{self, ScoringOptions};
use crate::types::ScoreResult;
use crate::{attack_surface, features};

pub struct Assessor {
    config: AssessorConfig,
    rules: Vec<Rule>,
}

impl Assessor {
    pub fn new(config: AssessorConfig) -> Self {
        Self { config, rules: Vec::new() }
    }

    pub fn with_rules(config: AssessorConfig, rules: Vec<Rule>) -> Self {
        Self { config, rules }
    }

    /// Score one response. Never fails on malformed HTML or an empty
    /// body — only a timeout or an I/O-level issue surfaces as an error.
    pub async fn assess(
        &self,
        url: &str,
        snapshot_id: SnapshotId,
        version_id: VersionId,
        status_code: u16,
        headers: &Headers,
        body: &[u8],
    ) -> Result<ScoreResult> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let url = url.to_string();
        let headers = headers.clone();
        let body = body.to_vec();
        let scoring_opts = ScoringOptions {
            scoring_version: self.config.scoring_version.clone(),
            default_confidence: self.config.default_confidence,
            request_locations: self.config.request_locations,
        };
        let bounds = RuleBounds {
            max_regex_evidence_samples: self.config.max_regex_evidence_samples,
            max_regex_match_value_len: self.config.max_regex_match_value_len,
            max_css_evidence_samples: self.config.max_css_evidence_samples,
        };

        let rules = &self.rules;
        let work = async move {
            let surface = attack_surface::extract(&url, snapshot_id, status_code, &headers, &body);
            let raw_features = features::extract(&surface);
            let mut result = rules::score(&surface, &raw_features, version_id, &scoring_opts);

            let body_text = String::from_utf8_lossy(&body);
            let custom = rule::apply(rules, &body_text, snapshot_id, &bounds);
            for item in custom {
                result.matched_rules.push(item.rule_id.clone());
                result.evidence.push(item);
            }
            result
        };

        match tokio::time::timeout(timeout, work).await {
            Ok(result) => Ok(result),
            Err(_) => {
                warn!(timeout_secs = self.config.timeout_secs, "scoring timed out");
                Err(AssessorError::Timeout(self.config.timeout_secs))
            }
        }
    }

    /// Evidence fired by the user-declared rules, run in isolation from the
    /// built-in feature scoring (used by callers that only need custom
    /// rule output, e.g. a rule-authoring preview endpoint).
    pub fn custom_evidence(&self, body: &str, snapshot_id: SnapshotId) -> Vec<crate::types::EvidenceItem> {
        let bounds = RuleBounds {
            max_regex_evidence_samples: self.config.max_regex_evidence_samples,
            max_regex_match_value_len: self.config.max_regex_match_value_len,
            max_css_evidence_samples: self.config.max_css_evidence_samples,
        };
        rule::apply(&self.rules, body, snapshot_id, &bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moku_core::{Headers, SnapshotId, VersionId};

    #[tokio::test]
    async fn assess_scores_a_plain_response() {
        let assessor = Assessor::new(AssessorConfig::default());
        let result = assessor
            .assess(
                "https://example.com/",
                SnapshotId::new(),
                VersionId::new(),
                200,
                &Headers::default(),
                b"<html></html>",
            )
            .await
            .unwrap();
        assert!(result.score > 0.0);
    }

    #[tokio::test]
    async fn assess_handles_empty_body_as_neutral() {
        let assessor = Assessor::new(AssessorConfig::default());
        let result = assessor
            .assess(
                "https://example.com/",
                SnapshotId::new(),
                VersionId::new(),
                200,
                &Headers::default(),
                b"",
            )
            .await
            .unwrap();
        assert_eq!(result.attack_surface.forms.len(), 0);
    }

    #[tokio::test]
    async fn custom_rules_fire_alongside_built_in_scoring() {
        let rule = Rule::css("has-iframe", "embedded iframe present", crate::types::Severity::Medium, "iframe").unwrap();
        let assessor = Assessor::with_rules(AssessorConfig::default(), vec![rule]);
        let evidence = assessor.custom_evidence("<html><iframe src=\"x\"></iframe></html>", SnapshotId::new());
        assert_eq!(evidence.len(), 1);
    }

    #[tokio::test]
    async fn assess_merges_custom_rule_evidence_into_the_score_result() {
        let rule = Rule::css("has-iframe", "embedded iframe present", crate::types::Severity::Medium, "iframe").unwrap();
        let assessor = Assessor::with_rules(AssessorConfig::default(), vec![rule]);
        let result = assessor
            .assess(
                "https://example.com/",
                SnapshotId::new(),
                VersionId::new(),
                200,
                &Headers::default(),
                b"<html><iframe src=\"x\"></iframe></html>",
            )
            .await
            .unwrap();
        assert!(result.matched_rules.contains(&"has-iframe".to_string()));
        assert!(result.evidence.iter().any(|e| e.rule_id == "has-iframe"));
    }
}
