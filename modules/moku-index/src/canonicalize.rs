//! Deterministic URL canonicalization. Pure function of a raw URL
//! string plus `CanonicalizeOptions`; idempotent by construction since every
//! step either normalizes to a fixed point or is already a no-op on a
//! previously-canonicalized URL.

use url::Url;

#[derive(Debug, Clone)]
pub struct CanonicalizeOptions {
    pub drop_tracking_params: bool,
    pub strip_trailing_slash: bool,
    pub default_scheme: String,
    pub tracking_param_allowlist: Vec<String>,
}

impl Default for CanonicalizeOptions {
    fn default() -> Self {
        Self {
            drop_tracking_params: true,
            strip_trailing_slash: true,
            default_scheme: "https".to_string(),
            tracking_param_allowlist: Vec::new(),
        }
    }
}

impl From<&moku_core::UrlConfig> for CanonicalizeOptions {
    fn from(cfg: &moku_core::UrlConfig) -> Self {
        Self {
            drop_tracking_params: cfg.drop_tracking_params,
            strip_trailing_slash: cfg.strip_trailing_slash,
            default_scheme: cfg.default_scheme.clone(),
            tracking_param_allowlist: cfg.tracking_param_allowlist.clone(),
        }
    }
}

/// Well-known tracking query parameters dropped unless allow-listed.
const TRACKING_PARAM_PREFIXES: &[&str] = &["utm_"];
const TRACKING_PARAM_EXACT: &[&str] = &["fbclid", "gclid", "msclkid", "mc_eid", "igshid"];

fn is_tracking_param(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    TRACKING_PARAM_EXACT.contains(&lower.as_str())
        || TRACKING_PARAM_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Canonicalize a raw URL. Returns `None` if the input cannot be
/// parsed even after applying `default_scheme`.
pub fn canonicalize(raw: &str, opts: &CanonicalizeOptions) -> Option<String> {
    let with_scheme = ensure_scheme(raw, &opts.default_scheme);
    let mut url = Url::parse(&with_scheme).ok()?;

    // 1/4: `Url::parse` already lower-cases scheme and host, and punycodes
    // non-ASCII hostnames (WHATWG URL host parsing) — nothing further to do.

    // 3. Drop default port.
    let default_port = match url.scheme() {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    };
    if url.port() == default_port {
        let _ = url.set_port(None);
    }

    // 5. Resolve `/./` and `/../` in the path. `Url::parse`/`join` already
    // collapse dot segments per RFC 3986 as part of path parsing, but a path
    // handed in post-parse (e.g. via `set_path`) would not be re-normalized,
    // so do it explicitly to keep the function's result independent of how
    // the caller assembled `raw`.
    let normalized_path = normalize_dot_segments(url.path());
    url.set_path(&normalized_path);

    // 6. Sort query parameters lexicographically; drop tracking params.
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .filter(|(k, _)| {
            !opts.drop_tracking_params
                || !is_tracking_param(k)
                || opts
                    .tracking_param_allowlist
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(k))
        })
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &pairs {
            serializer.append_pair(k, v);
        }
        url.set_query(Some(&serializer.finish()));
    }

    // 7. Strip fragment.
    url.set_fragment(None);

    let mut result = url.to_string();

    // 8. Optionally strip trailing slash, never for root `/`.
    if opts.strip_trailing_slash {
        result = strip_trailing_slash(&result);
    }

    Some(result)
}

fn ensure_scheme(raw: &str, default_scheme: &str) -> String {
    if raw.contains("://") {
        raw.to_string()
    } else {
        format!("{default_scheme}://{raw}")
    }
}

fn normalize_dot_segments(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "." => continue,
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    let joined = out.join("/");
    if joined.is_empty() {
        "/".to_string()
    } else {
        joined
    }
}

fn strip_trailing_slash(url: &str) -> String {
    // Never touch the query/fragment-less root `scheme://host/`.
    if let Some(stripped) = url.strip_suffix('/') {
        let without_scheme = stripped.splitn(2, "://").nth(1).unwrap_or(stripped);
        if without_scheme.contains('/') {
            return stripped.to_string();
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(raw: &str) -> String {
        canonicalize(raw, &CanonicalizeOptions::default()).unwrap()
    }

    #[test]
    fn lower_cases_scheme_and_host() {
        assert_eq!(c("HTTPS://Example.COM/Path"), "https://example.com/Path");
    }

    #[test]
    fn applies_default_scheme_when_missing() {
        assert_eq!(c("example.com/a"), "https://example.com/a");
    }

    #[test]
    fn drops_default_ports() {
        assert_eq!(c("https://example.com:443/a"), "https://example.com/a");
        assert_eq!(c("http://example.com:80/a"), "http://example.com/a");
        assert_eq!(c("https://example.com:8443/a").as_str(), "https://example.com:8443/a");
    }

    #[test]
    fn resolves_dot_segments() {
        assert_eq!(c("https://example.com/a/./b/../c"), "https://example.com/a/c");
    }

    #[test]
    fn sorts_query_params_and_drops_tracking_params() {
        assert_eq!(
            c("https://example.com/a?b=2&a=1&utm_source=x"),
            "https://example.com/a?a=1&b=2"
        );
    }

    #[test]
    fn tracking_param_allowlist_is_respected() {
        let opts = CanonicalizeOptions {
            tracking_param_allowlist: vec!["utm_source".to_string()],
            ..CanonicalizeOptions::default()
        };
        let out = canonicalize("https://example.com/a?utm_source=keep&gclid=drop", &opts).unwrap();
        assert_eq!(out, "https://example.com/a?utm_source=keep");
    }

    #[test]
    fn strips_fragment() {
        assert_eq!(c("https://example.com/a#section"), "https://example.com/a");
    }

    #[test]
    fn strips_trailing_slash_except_root() {
        assert_eq!(c("https://example.com/a/"), "https://example.com/a");
        assert_eq!(c("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let opts = CanonicalizeOptions::default();
        let once = canonicalize("HTTPS://Example.com:443/a/./b/?z=1&a=2&utm_x=y#frag", &opts).unwrap();
        let twice = canonicalize(&once, &opts).unwrap();
        assert_eq!(once, twice);
    }
}
