//! Static per-feature weights, evidence descriptions, and the scoring
//! function that turns a feature map into a `ScoreResult`.

use std::collections::BTreeMap;

use moku_core::{EvidenceItemId, SnapshotId, VersionId};

use crate::types::{AttackSurface, EvidenceItem, EvidenceLocation, ScoreResult, Severity};

/// `(feature, weight, description)`. Weight of `0.0` means the feature
/// contributes to `raw_features` but never to the score on its own.
const FEATURE_TABLE: &[(&str, f64, &str)] = &[
    ("status_2xx", 0.0, "response succeeded"),
    ("status_3xx", 0.0, "response redirected"),
    ("status_4xx", 0.0, "response was a client error"),
    ("status_5xx", 0.0, "response was a server error"),
    ("is_html", 0.0, "response is HTML"),
    ("is_json", 0.0, "response is JSON"),
    ("csp_missing", 0.15, "no Content-Security-Policy header present"),
    ("csp_unsafe_inline", 0.08, "Content-Security-Policy allows 'unsafe-inline'"),
    ("csp_unsafe_eval", 0.08, "Content-Security-Policy allows 'unsafe-eval'"),
    ("xfo_missing", 0.06, "no X-Frame-Options header present"),
    ("xcto_missing", 0.03, "no X-Content-Type-Options header present"),
    ("hsts_missing", 0.06, "no Strict-Transport-Security header present"),
    ("referrer_policy_missing", 0.02, "no Referrer-Policy header present"),
    ("xxp_present", 0.0, "X-XSS-Protection header present (deprecated)"),
    ("num_cookies", 0.0, "cookies set by this response"),
    ("num_cookies_missing_httponly", 0.04, "cookie set without HttpOnly"),
    ("num_cookies_missing_secure", 0.04, "cookie set without Secure"),
    ("has_session_cookie_no_httponly", 0.15, "session-like cookie set without HttpOnly"),
    ("num_forms", 0.0, "forms present on the page"),
    ("num_inputs", 0.0, "form inputs present on the page"),
    ("num_password_inputs", 0.0, "password inputs present on the page"),
    ("num_file_inputs", 0.0, "file inputs present on the page"),
    ("num_hidden_inputs", 0.0, "hidden inputs present on the page"),
    ("has_password_input", 0.05, "page has a password input"),
    ("has_file_upload", 0.18, "page has a file upload form"),
    ("has_admin_form", 0.18, "form submits to what looks like an admin endpoint"),
    ("has_auth_form", 0.04, "form submits to what looks like an auth endpoint"),
    ("has_upload_form", 0.1, "form submits to what looks like an upload endpoint"),
    ("has_csrf_input", -0.05, "form carries a CSRF token field"),
    ("num_params", 0.0, "query/form parameters present"),
    ("num_suspicious_params", 0.03, "parameter name matches a sensitive-name pattern"),
    ("has_admin_param", 0.15, "a parameter name looks admin-related"),
    ("has_upload_param", 0.08, "a parameter name looks upload-related"),
    ("has_debug_param", 0.1, "a parameter name looks debug-related"),
    ("has_id_param", 0.0, "an 'id' parameter is present"),
    ("num_scripts", 0.0, "scripts present on the page"),
    ("num_inline_scripts", 0.0, "inline scripts present on the page"),
    ("num_external_scripts", 0.0, "externally-sourced scripts present on the page"),
    ("has_error_indicators", 0.1, "response body carries error/stack-trace indicators"),
    ("num_error_indicators", 0.0, "count of error indicators found"),
    ("num_framework_hints", 0.0, "count of framework fingerprints found"),
];

fn weight_of(feature: &str) -> f64 {
    FEATURE_TABLE
        .iter()
        .find(|(name, _, _)| *name == feature)
        .map(|(_, w, _)| *w)
        .unwrap_or(0.0)
}

fn description_of(feature: &str) -> &'static str {
    FEATURE_TABLE
        .iter()
        .find(|(name, _, _)| *name == feature)
        .map(|(_, _, d)| *d)
        .unwrap_or("no description on record")
}

fn severity_of(feature: &str) -> Severity {
    const HIGH: &[&str] = &[
        "csp_missing",
        "has_file_upload",
        "has_admin_form",
        "has_admin_param",
        "has_session_cookie_no_httponly",
    ];
    const MEDIUM: &[&str] = &[
        "csp_unsafe_inline",
        "csp_unsafe_eval",
        "hsts_missing",
        "xfo_missing",
        "has_upload_form",
        "has_upload_param",
        "has_error_indicators",
        "num_suspicious_params",
    ];
    if HIGH.contains(&feature) {
        Severity::High
    } else if MEDIUM.contains(&feature) {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Populate an `EvidenceItem`'s locations from the attack surface for the
/// features that have a natural structural home (forms, inputs, scripts,
/// headers, cookies, params). Returns an empty vec when a feature has no
/// single obvious location (e.g. aggregate counters).
fn locations_for(feature: &str, surface: &AttackSurface, snapshot_id: SnapshotId) -> Vec<EvidenceLocation> {
    match feature {
        "csp_missing" | "csp_unsafe_inline" | "csp_unsafe_eval" => {
            let mut loc = EvidenceLocation::new("header", snapshot_id);
            loc.header_name = Some("content-security-policy".to_string());
            vec![loc]
        }
        "xfo_missing" => header_location(snapshot_id, "x-frame-options"),
        "xcto_missing" => header_location(snapshot_id, "x-content-type-options"),
        "hsts_missing" => header_location(snapshot_id, "strict-transport-security"),
        "referrer_policy_missing" => header_location(snapshot_id, "referrer-policy"),
        "num_cookies_missing_httponly" | "num_cookies_missing_secure" | "has_session_cookie_no_httponly" => surface
            .cookies
            .iter()
            .map(|c| {
                let mut loc = EvidenceLocation::new("cookie", snapshot_id);
                loc.cookie_name = Some(c.name.clone());
                loc
            })
            .collect(),
        "has_admin_form" | "has_auth_form" | "has_upload_form" => surface
            .forms
            .iter()
            .map(|f| {
                let mut loc = EvidenceLocation::new("form", snapshot_id);
                loc.dom_index = Some(f.dom_index);
                loc.note = Some(format!("{}:{}", f.action, f.method));
                loc
            })
            .collect(),
        "has_password_input" | "has_file_upload" | "has_csrf_input" => surface
            .forms
            .iter()
            .flat_map(|f| f.fields.iter().map(move |field| (f, field)))
            .map(|(f, field)| {
                let mut loc = EvidenceLocation::new("input", snapshot_id);
                loc.dom_index = Some(field.dom_index);
                loc.parent_dom_index = Some(f.dom_index);
                loc
            })
            .collect(),
        "has_admin_param" | "has_upload_param" | "has_debug_param" | "has_id_param" | "num_suspicious_params" => {
            surface
                .get_params
                .iter()
                .chain(surface.post_params.iter())
                .map(|p| {
                    let mut loc = EvidenceLocation::new("param", snapshot_id);
                    loc.param_name = Some(p.clone());
                    loc
                })
                .collect()
        }
        _ => Vec::new(),
    }
}

fn header_location(snapshot_id: SnapshotId, name: &str) -> Vec<EvidenceLocation> {
    let mut loc = EvidenceLocation::new("header", snapshot_id);
    loc.header_name = Some(name.to_string());
    vec![loc]
}

pub struct ScoringOptions {
    pub scoring_version: String,
    pub default_confidence: f64,
    pub request_locations: bool,
}

impl Default for ScoringOptions {
    fn default() -> Self {
        Self {
            scoring_version: "v1".to_string(),
            default_confidence: 0.7,
            request_locations: true,
        }
    }
}

/// Score a feature map into evidence, contributions, and a clamped score.
/// Pure and deterministic: identical input yields bit-identical output.
pub fn score(
    surface: &AttackSurface,
    raw_features: &BTreeMap<String, f64>,
    version_id: VersionId,
    opts: &ScoringOptions,
) -> ScoreResult {
    let mut contrib_by_rule = BTreeMap::new();
    let mut evidence = Vec::new();
    let mut matched_rules = Vec::new();
    let mut total = 0.0;

    for (feature, value) in raw_features {
        let weight = weight_of(feature);
        let contribution = value * weight;
        contrib_by_rule.insert(feature.clone(), contribution);
        total += contribution;

        if contribution != 0.0 {
            matched_rules.push(feature.clone());
            let locations = if opts.request_locations {
                locations_for(feature, surface, surface.snapshot_id)
            } else {
                Vec::new()
            };
            evidence.push(EvidenceItem {
                id: EvidenceItemId::new(),
                key: feature.clone(),
                rule_id: feature.clone(),
                severity: severity_of(feature),
                description: description_of(feature).to_string(),
                value: serde_json::json!(value),
                locations,
                contribution,
            });
        }
    }

    let score = total.clamp(0.0, 1.0);
    let normalized = (score * 100.0).round() as u8;

    ScoreResult {
        id: moku_core::ScoreResultId::new(),
        snapshot_id: surface.snapshot_id,
        version_id,
        url: surface.url.clone(),
        score,
        normalized,
        confidence: opts.default_confidence,
        scoring_version: opts.scoring_version.clone(),
        evidence,
        matched_rules,
        raw_features: raw_features.clone(),
        contrib_by_rule,
        attack_surface: surface.clone(),
        timestamp: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{attack_surface, features};
    use moku_core::{Headers, SnapshotId};

    fn surface() -> AttackSurface {
        attack_surface::extract("https://example.com/", SnapshotId::new(), 200, &Headers::default(), b"")
    }

    #[test]
    fn missing_security_headers_drive_a_nonzero_score() {
        let s = surface();
        let raw = features::extract(&s);
        let result = score(&s, &raw, VersionId::new(), &ScoringOptions::default());
        assert!(result.score > 0.0);
        assert!(result.normalized > 0);
        assert!(result.matched_rules.contains(&"csp_missing".to_string()));
    }

    #[test]
    fn empty_body_with_full_headers_is_neutral() {
        let mut headers = Headers::default();
        headers.push("Content-Security-Policy", "default-src 'self'");
        headers.push("X-Frame-Options", "DENY");
        headers.push("X-Content-Type-Options", "nosniff");
        headers.push("Strict-Transport-Security", "max-age=31536000");
        headers.push("Referrer-Policy", "no-referrer");
        let s = attack_surface::extract("https://example.com/", SnapshotId::new(), 200, &headers, b"");
        let raw = features::extract(&s);
        let result = score(&s, &raw, VersionId::new(), &ScoringOptions::default());
        assert_eq!(result.score, 0.0);
        assert_eq!(result.normalized, 0);
        assert!(result.evidence.is_empty());
    }

    #[test]
    fn scoring_is_deterministic() {
        let s = surface();
        let raw = features::extract(&s);
        let a = score(&s, &raw, VersionId::new(), &ScoringOptions::default());
        let b = score(&s, &raw, VersionId::new(), &ScoringOptions::default());
        assert_eq!(a.score, b.score);
        assert_eq!(a.contrib_by_rule, b.contrib_by_rule);
    }

    #[test]
    fn request_locations_false_omits_evidence_locations() {
        let s = surface();
        let raw = features::extract(&s);
        let opts = ScoringOptions {
            request_locations: false,
            ..ScoringOptions::default()
        };
        let result = score(&s, &raw, VersionId::new(), &opts);
        assert!(result.evidence.iter().all(|e| e.locations.is_empty()));
    }
}
