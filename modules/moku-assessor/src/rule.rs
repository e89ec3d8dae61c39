//! User-declared rules: CSS selectors or regexes that fire additional
//! evidence items on top of the built-in feature scoring.

use regex::Regex;
use scraper::{Html, Selector};

use moku_core::EvidenceItemId;

use crate::types::{EvidenceItem, EvidenceLocation, Severity};

pub enum Matcher {
    Css { selector: Selector, raw: String },
    Regex(Regex),
}

pub struct Rule {
    pub id: String,
    pub description: String,
    pub severity: Severity,
    pub matcher: Matcher,
}

impl Rule {
    pub fn css(id: impl Into<String>, description: impl Into<String>, severity: Severity, selector: &str) -> Result<Self, String> {
        Ok(Self {
            id: id.into(),
            description: description.into(),
            severity,
            matcher: Matcher::Css {
                selector: Selector::parse(selector).map_err(|e| e.to_string())?,
                raw: selector.to_string(),
            },
        })
    }

    pub fn regex(id: impl Into<String>, description: impl Into<String>, severity: Severity, pattern: &str) -> Result<Self, String> {
        Ok(Self {
            id: id.into(),
            description: description.into(),
            severity,
            matcher: Matcher::Regex(Regex::new(pattern).map_err(|e| e.to_string())?),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RuleBounds {
    pub max_regex_evidence_samples: usize,
    pub max_regex_match_value_len: usize,
    pub max_css_evidence_samples: usize,
}

impl Default for RuleBounds {
    fn default() -> Self {
        Self {
            max_regex_evidence_samples: 10,
            max_regex_match_value_len: 200,
            max_css_evidence_samples: 10,
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s[..cut].to_string()
    }
}

/// Evaluate user-declared rules against the raw body, bounded by
/// `bounds`. Never panics on an empty body or a selector/regex that
/// matches nothing.
pub fn apply(
    rules: &[Rule],
    body: &str,
    snapshot_id: moku_core::SnapshotId,
    bounds: &RuleBounds,
) -> Vec<EvidenceItem> {
    let document = Html::parse_document(body);
    let mut items = Vec::new();

    for rule in rules {
        match &rule.matcher {
            Matcher::Css { selector, raw } => {
                let mut locations = Vec::new();
                for (index, element) in document.select(selector).enumerate() {
                    if index >= bounds.max_css_evidence_samples {
                        break;
                    }
                    let mut loc = EvidenceLocation::new("css", snapshot_id);
                    loc.selector = Some(raw.clone());
                    loc.dom_index = Some(index);
                    loc.note = Some(truncate(&element.html(), bounds.max_regex_match_value_len));
                    locations.push(loc);
                }
                if !locations.is_empty() {
                    items.push(EvidenceItem {
                        id: EvidenceItemId::new(),
                        key: rule.id.clone(),
                        rule_id: rule.id.clone(),
                        severity: rule.severity,
                        description: rule.description.clone(),
                        value: serde_json::json!(locations.len()),
                        locations,
                        contribution: 0.0,
                    });
                }
            }
            Matcher::Regex(re) => {
                let mut locations = Vec::new();
                for (index, m) in re.find_iter(body).enumerate() {
                    if index >= bounds.max_regex_evidence_samples {
                        break;
                    }
                    let mut loc = EvidenceLocation::new("regex", snapshot_id);
                    loc.regex = Some(re.as_str().to_string());
                    loc.byte_start = Some(m.start());
                    loc.byte_end = Some(m.end());
                    loc.note = Some(truncate(m.as_str(), bounds.max_regex_match_value_len));
                    locations.push(loc);
                }
                if !locations.is_empty() {
                    items.push(EvidenceItem {
                        id: EvidenceItemId::new(),
                        key: rule.id.clone(),
                        rule_id: rule.id.clone(),
                        severity: rule.severity,
                        description: rule.description.clone(),
                        value: serde_json::json!(locations.len()),
                        locations,
                        contribution: 0.0,
                    });
                }
            }
        }
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use moku_core::SnapshotId;

    #[test]
    fn css_rule_matches_and_is_bounded() {
        let rule = Rule::css("many-divs", "flags pages with many divs", Severity::Low, "div").unwrap();
        let html = "<html><body>".to_string() + &"<div></div>".repeat(20) + "</body></html>";
        let bounds = RuleBounds {
            max_css_evidence_samples: 3,
            ..RuleBounds::default()
        };
        let items = apply(&[rule], &html, SnapshotId::new(), &bounds);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].locations.len(), 3);
    }

    #[test]
    fn regex_rule_matches_and_is_bounded() {
        let rule = Rule::regex("api-key", "flags hardcoded api keys", Severity::High, r"api_key=\w+").unwrap();
        let body = "api_key=aaa api_key=bbb api_key=ccc";
        let bounds = RuleBounds {
            max_regex_evidence_samples: 2,
            ..RuleBounds::default()
        };
        let items = apply(&[rule], body, SnapshotId::new(), &bounds);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].locations.len(), 2);
    }

    #[test]
    fn rule_with_no_matches_produces_no_evidence() {
        let rule = Rule::css("nothing", "never matches", Severity::Low, "marquee").unwrap();
        let items = apply(&[rule], "<html></html>", SnapshotId::new(), &RuleBounds::default());
        assert!(items.is_empty());
    }
}
