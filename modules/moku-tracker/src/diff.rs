//! Pure diff functions: an added/removed/changed header diff and a
//! line-oriented body diff. Neither touches the database; `tracker.rs` calls
//! these with rows already loaded.

use std::collections::BTreeMap;

use moku_core::Headers;

use crate::types::{BodyLineDiff, ChangedHeader, HeaderDiff};

const REDACTED: &str = "<redacted>";

/// Diff two header sets by lower-cased name, comparing values as ordered
/// multi-value lists. Any sensitive header name (case-insensitive) that
/// changed has its `from`/`to` values replaced with `<redacted>` and its
/// name recorded in `redacted`.
pub fn diff_headers(base: &Headers, head: &Headers, sensitive_names: &[String]) -> HeaderDiff {
    let mut diff = HeaderDiff::default();
    let is_sensitive = |name: &str| sensitive_names.iter().any(|s| s.eq_ignore_ascii_case(name));

    let mut names: Vec<&str> = base.names().chain(head.names()).collect();
    names.sort_unstable();
    names.dedup();

    for name in names {
        let base_values = base.get_all(name);
        let head_values = head.get_all(name);

        match (base_values.is_empty(), head_values.is_empty()) {
            (true, false) => {
                diff.added.insert(name.to_string(), head_values.to_vec());
            }
            (false, true) => {
                diff.removed.insert(name.to_string(), base_values.to_vec());
            }
            (false, false) if base_values != head_values => {
                if is_sensitive(name) {
                    diff.redacted.push(name.to_string());
                    diff.changed.insert(
                        name.to_string(),
                        ChangedHeader {
                            from: vec![REDACTED.to_string()],
                            to: vec![REDACTED.to_string()],
                        },
                    );
                } else {
                    diff.changed.insert(
                        name.to_string(),
                        ChangedHeader {
                            from: base_values.to_vec(),
                            to: head_values.to_vec(),
                        },
                    );
                }
            }
            _ => {}
        }
    }

    // Added/removed can also carry sensitive values; redact those too.
    for name in diff.added.keys().cloned().collect::<Vec<_>>() {
        if is_sensitive(&name) {
            diff.added.insert(name.clone(), vec![REDACTED.to_string()]);
            if !diff.redacted.contains(&name) {
                diff.redacted.push(name);
            }
        }
    }
    for name in diff.removed.keys().cloned().collect::<Vec<_>>() {
        if is_sensitive(&name) {
            diff.removed.insert(name.clone(), vec![REDACTED.to_string()]);
            if !diff.redacted.contains(&name) {
                diff.redacted.push(name);
            }
        }
    }

    diff
}

/// A minimal line-oriented diff: longest-common-subsequence backed, used to
/// count added/removed lines and render a compact unified view. Bodies this
/// large are snapshots of fetched pages, not source trees, so an O(n*m) LCS
/// table is acceptable.
pub fn diff_body(base: &[u8], head: &[u8]) -> BodyLineDiff {
    let base_str = String::from_utf8_lossy(base);
    let head_str = String::from_utf8_lossy(head);
    let base_lines: Vec<&str> = base_str.lines().collect();
    let head_lines: Vec<&str> = head_str.lines().collect();

    let ops = lcs_diff(&base_lines, &head_lines);

    let mut added_lines = 0;
    let mut removed_lines = 0;
    let mut unified = String::new();

    for op in ops {
        match op {
            LineOp::Equal(line) => {
                unified.push_str("  ");
                unified.push_str(line);
                unified.push('\n');
            }
            LineOp::Removed(line) => {
                removed_lines += 1;
                unified.push_str("- ");
                unified.push_str(line);
                unified.push('\n');
            }
            LineOp::Added(line) => {
                added_lines += 1;
                unified.push_str("+ ");
                unified.push_str(line);
                unified.push('\n');
            }
        }
    }

    BodyLineDiff {
        added_lines,
        removed_lines,
        unified,
    }
}

enum LineOp<'a> {
    Equal(&'a str),
    Removed(&'a str),
    Added(&'a str),
}

/// Classic dynamic-programming LCS backtrace, producing an edit script.
fn lcs_diff<'a>(a: &[&'a str], b: &[&'a str]) -> Vec<LineOp<'a>> {
    let (n, m) = (a.len(), b.len());
    let mut table = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if a[i] == b[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut ops = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            ops.push(LineOp::Equal(a[i]));
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            ops.push(LineOp::Removed(a[i]));
            i += 1;
        } else {
            ops.push(LineOp::Added(b[j]));
            j += 1;
        }
    }
    while i < n {
        ops.push(LineOp::Removed(a[i]));
        i += 1;
    }
    while j < m {
        ops.push(LineOp::Added(b[j]));
        j += 1;
    }
    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_from(pairs: &[(&str, &str)]) -> Headers {
        let mut h = Headers::new();
        for (k, v) in pairs {
            h.push(k, *v);
        }
        h
    }

    #[test]
    fn detects_added_removed_and_changed_headers() {
        let base = headers_from(&[("x-old", "1"), ("content-type", "text/html")]);
        let head = headers_from(&[("content-type", "application/json"), ("x-new", "2")]);
        let diff = diff_headers(&base, &head, &[]);
        assert!(diff.added.contains_key("x-new"));
        assert!(diff.removed.contains_key("x-old"));
        assert_eq!(
            diff.changed.get("content-type").unwrap().to,
            vec!["application/json".to_string()]
        );
    }

    #[test]
    fn redacts_sensitive_headers_that_changed() {
        let base = headers_from(&[("set-cookie", "a=1")]);
        let head = headers_from(&[("set-cookie", "a=2")]);
        let sensitive = vec!["set-cookie".to_string()];
        let diff = diff_headers(&base, &head, &sensitive);
        let changed = diff.changed.get("set-cookie").unwrap();
        assert_eq!(changed.from, vec!["<redacted>".to_string()]);
        assert_eq!(changed.to, vec!["<redacted>".to_string()]);
        assert!(diff.redacted.contains(&"set-cookie".to_string()));
    }

    #[test]
    fn sensitive_headers_only_present_on_one_side_are_also_redacted() {
        let base = Headers::new();
        let head = headers_from(&[("authorization", "Bearer abc")]);
        let sensitive = vec!["authorization".to_string()];
        let diff = diff_headers(&base, &head, &sensitive);
        assert_eq!(diff.added.get("authorization").unwrap(), &vec!["<redacted>".to_string()]);
        assert!(diff.redacted.contains(&"authorization".to_string()));
    }

    #[test]
    fn identical_bodies_have_no_added_or_removed_lines() {
        let diff = diff_body(b"a\nb\nc", b"a\nb\nc");
        assert_eq!(diff.added_lines, 0);
        assert_eq!(diff.removed_lines, 0);
    }

    #[test]
    fn counts_added_and_removed_lines() {
        let diff = diff_body(b"a\nb\nc", b"a\nx\nc\nd");
        assert_eq!(diff.removed_lines, 1);
        assert_eq!(diff.added_lines, 2);
    }
}
