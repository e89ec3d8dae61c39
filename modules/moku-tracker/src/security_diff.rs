//! Security diff computation: per-URL deltas of score, features, rule
//! contributions, and attack-surface items between two score results for the
//! same URL.

use std::collections::{BTreeMap, BTreeSet};

use moku_assessor::{AttackSurface, ScoreResult};

use crate::types::{AttackSurfaceChange, SecurityDiff};

const SECURITY_HEADERS: &[&str] = &[
    "content-security-policy",
    "x-frame-options",
    "x-content-type-options",
    "strict-transport-security",
    "referrer-policy",
];

/// `head.raw_features[f] - base.raw_features[f]` (or `contrib_by_rule`,
/// analogously) over the union of keys present on either side, with exact
/// zero deltas pruned.
fn deltas(base: &BTreeMap<String, f64>, head: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    let keys: BTreeSet<&String> = base.keys().chain(head.keys()).collect();
    let mut out = BTreeMap::new();
    for key in keys {
        let b = base.get(key).copied().unwrap_or(0.0);
        let h = head.get(key).copied().unwrap_or(0.0);
        let delta = h - b;
        if delta != 0.0 {
            out.insert(key.clone(), delta);
        }
    }
    out
}

/// Compute the security diff between a base and head `ScoreResult` for the
/// same URL. Panics only if called with results for different URLs —
/// callers (`Tracker::get_security_diff`) validate this first.
pub fn compute(base: &ScoreResult, head: &ScoreResult) -> SecurityDiff {
    debug_assert_eq!(base.url, head.url, "security diff requires matching URLs");

    SecurityDiff {
        url: head.url.clone(),
        base_version_id: Some(base.version_id),
        head_version_id: head.version_id,
        base_snapshot_id: Some(base.snapshot_id),
        head_snapshot_id: head.snapshot_id,
        score_delta: head.score - base.score,
        feature_deltas: deltas(&base.raw_features, &head.raw_features),
        rule_deltas: deltas(&base.contrib_by_rule, &head.contrib_by_rule),
        attack_surface_changes: diff_attack_surface(&base.attack_surface, &head.attack_surface),
    }
}

fn form_key(form: &moku_assessor::Form) -> String {
    format!("{}:{}", form.action, form.method)
}

fn diff_attack_surface(base: &AttackSurface, head: &AttackSurface) -> Vec<AttackSurfaceChange> {
    let mut changes = Vec::new();

    diff_forms(base, head, &mut changes);
    diff_cookies(base, head, &mut changes);
    diff_scripts(base, head, &mut changes);
    diff_security_headers(base, head, &mut changes);

    changes
}

fn diff_forms(base: &AttackSurface, head: &AttackSurface, changes: &mut Vec<AttackSurfaceChange>) {
    let base_by_key: BTreeMap<String, &moku_assessor::Form> =
        base.forms.iter().map(|f| (form_key(f), f)).collect();
    let head_by_key: BTreeMap<String, &moku_assessor::Form> =
        head.forms.iter().map(|f| (form_key(f), f)).collect();

    for (key, form) in &head_by_key {
        if !base_by_key.contains_key(key) {
            changes.push(AttackSurfaceChange {
                kind: "form_added".to_string(),
                detail: key.clone(),
                dom_index: Some(form.dom_index),
                header_name: None,
                cookie_name: None,
            });
        }
    }
    for (key, form) in &base_by_key {
        if !head_by_key.contains_key(key) {
            changes.push(AttackSurfaceChange {
                kind: "form_removed".to_string(),
                detail: key.clone(),
                dom_index: Some(form.dom_index),
                header_name: None,
                cookie_name: None,
            });
        }
    }

    // Inputs within forms present on both sides, keyed by field name.
    for (key, head_form) in &head_by_key {
        let Some(base_form) = base_by_key.get(key) else {
            continue;
        };
        let base_fields: BTreeSet<&str> = base_form.fields.iter().map(|f| f.name.as_str()).collect();
        let head_fields: BTreeSet<&str> = head_form.fields.iter().map(|f| f.name.as_str()).collect();

        for field in &head_form.fields {
            if !base_fields.contains(field.name.as_str()) {
                changes.push(AttackSurfaceChange {
                    kind: "form_input_added".to_string(),
                    detail: format!("{key}:{}", field.name),
                    dom_index: Some(field.dom_index),
                    header_name: None,
                    cookie_name: None,
                });
            }
        }
        for field in &base_form.fields {
            if !head_fields.contains(field.name.as_str()) {
                changes.push(AttackSurfaceChange {
                    kind: "form_input_removed".to_string(),
                    detail: format!("{key}:{}", field.name),
                    dom_index: Some(field.dom_index),
                    header_name: None,
                    cookie_name: None,
                });
            }
        }
    }
}

fn diff_cookies(base: &AttackSurface, head: &AttackSurface, changes: &mut Vec<AttackSurfaceChange>) {
    let base_by_name: BTreeMap<&str, &moku_assessor::Cookie> =
        base.cookies.iter().map(|c| (c.name.as_str(), c)).collect();
    let head_by_name: BTreeMap<&str, &moku_assessor::Cookie> =
        head.cookies.iter().map(|c| (c.name.as_str(), c)).collect();

    for (name, cookie) in &head_by_name {
        match base_by_name.get(name) {
            None => changes.push(AttackSurfaceChange {
                kind: "cookie_added".to_string(),
                detail: name.to_string(),
                dom_index: None,
                header_name: None,
                cookie_name: Some(name.to_string()),
            }),
            Some(base_cookie) => {
                if base_cookie.secure != cookie.secure || base_cookie.http_only != cookie.http_only {
                    changes.push(AttackSurfaceChange {
                        kind: "cookie_flags_changed".to_string(),
                        detail: format!(
                            "secure {}->{}, httponly {}->{}",
                            base_cookie.secure, cookie.secure, base_cookie.http_only, cookie.http_only
                        ),
                        dom_index: None,
                        header_name: None,
                        cookie_name: Some(name.to_string()),
                    });
                }
            }
        }
    }
    for name in base_by_name.keys() {
        if !head_by_name.contains_key(name) {
            changes.push(AttackSurfaceChange {
                kind: "cookie_removed".to_string(),
                detail: name.to_string(),
                dom_index: None,
                header_name: None,
                cookie_name: Some(name.to_string()),
            });
        }
    }
}

fn diff_scripts(base: &AttackSurface, head: &AttackSurface, changes: &mut Vec<AttackSurfaceChange>) {
    let base_srcs: BTreeSet<&str> = base
        .scripts
        .iter()
        .filter_map(|s| s.src.as_deref())
        .collect();
    let head_srcs: BTreeSet<&str> = head
        .scripts
        .iter()
        .filter_map(|s| s.src.as_deref())
        .collect();

    for src in head_srcs.difference(&base_srcs) {
        changes.push(AttackSurfaceChange {
            kind: "script_added".to_string(),
            detail: src.to_string(),
            dom_index: None,
            header_name: None,
            cookie_name: None,
        });
    }
    for src in base_srcs.difference(&head_srcs) {
        changes.push(AttackSurfaceChange {
            kind: "script_removed".to_string(),
            detail: src.to_string(),
            dom_index: None,
            header_name: None,
            cookie_name: None,
        });
    }

    let base_inline = base.scripts.iter().filter(|s| s.inline).count();
    let head_inline = head.scripts.iter().filter(|s| s.inline).count();
    if base_inline != head_inline {
        changes.push(AttackSurfaceChange {
            kind: "inline_script_count_changed".to_string(),
            detail: format!("{base_inline} -> {head_inline}"),
            dom_index: None,
            header_name: None,
            cookie_name: None,
        });
    }
}

fn diff_security_headers(base: &AttackSurface, head: &AttackSurface, changes: &mut Vec<AttackSurfaceChange>) {
    for name in SECURITY_HEADERS {
        let base_val = base.headers.get(name);
        let head_val = head.headers.get(name);
        if base_val != head_val {
            changes.push(AttackSurfaceChange {
                kind: "security_header_changed".to_string(),
                detail: format!("{:?} -> {:?}", base_val, head_val),
                dom_index: None,
                header_name: Some((*name).to_string()),
                cookie_name: None,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moku_assessor::{attack_surface, features, rules, ScoringOptions};
    use moku_core::{Headers, SnapshotId, VersionId};

    fn result_for(headers: Headers, body: &[u8]) -> ScoreResult {
        let surface = attack_surface::extract("https://example.com/", SnapshotId::new(), 200, &headers, body);
        let raw = features::extract(&surface);
        rules::score(&surface, &raw, VersionId::new(), &ScoringOptions::default())
    }

    #[test]
    fn score_delta_matches_head_minus_base() {
        let base = result_for(Headers::default(), b"");
        let head = result_for(Headers::default(), b"");
        let diff = compute(&base, &head);
        assert_eq!(diff.score_delta, head.score - base.score);
    }

    #[test]
    fn csp_regression_shows_in_feature_and_rule_deltas() {
        let mut base_headers = Headers::default();
        base_headers.push("Content-Security-Policy", "default-src 'self'");
        let base = result_for(base_headers, b"");
        let head = result_for(Headers::default(), b"");

        let diff = compute(&base, &head);
        assert_eq!(diff.feature_deltas["csp_missing"], 1.0);
        assert!(diff.rule_deltas["csp_missing"] > 0.0);
        assert!(diff.score_delta > 0.0);
    }

    #[test]
    fn form_added_is_reported_with_action_and_method() {
        let base = result_for(Headers::default(), b"<html></html>");
        let html = br#"<form action="/admin/login" method="post"><input name="u"></form>"#;
        let head = result_for(Headers::default(), html);

        let diff = compute(&base, &head);
        let added = diff
            .attack_surface_changes
            .iter()
            .find(|c| c.kind == "form_added")
            .unwrap();
        assert!(added.detail.contains("/admin/login"));
        assert_eq!(diff.feature_deltas["has_admin_form"], 1.0);
    }
}
