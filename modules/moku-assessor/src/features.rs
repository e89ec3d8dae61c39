//! `AttackSurface` to numeric feature map. Detection is
//! textual: substring matching on names/values, never HTML re-parsing.

use std::collections::BTreeMap;

use crate::types::AttackSurface;

const SUSPICIOUS_PARAM_SUBSTRINGS: &[&str] = &["admin", "debug", "upload", "id", "token", "key", "secret"];
const ADMIN_SUBSTRINGS: &[&str] = &["admin", "dashboard", "manage"];
const AUTH_SUBSTRINGS: &[&str] = &["login", "signin", "auth", "password"];
const UPLOAD_SUBSTRINGS: &[&str] = &["upload", "file"];
const CSRF_SUBSTRINGS: &[&str] = &["csrf", "_token", "authenticity_token"];
const SESSION_COOKIE_SUBSTRINGS: &[&str] = &["session", "sessid", "sid", "auth"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_ascii_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

/// Extract the fixed feature map from an attack surface. Every feature
/// named in the catalog is always present, defaulting to `0.0`.
pub fn extract(surface: &AttackSurface) -> BTreeMap<String, f64> {
    let mut f = BTreeMap::new();
    let mut set = |name: &str, value: f64| {
        f.insert(name.to_string(), value);
    };

    // Status class and content type.
    set("status_2xx", bool01((200..300).contains(&surface.status_code)));
    set("status_3xx", bool01((300..400).contains(&surface.status_code)));
    set("status_4xx", bool01((400..500).contains(&surface.status_code)));
    set("status_5xx", bool01((500..600).contains(&surface.status_code)));

    let content_type = surface.content_type.clone().unwrap_or_default().to_ascii_lowercase();
    set("is_html", bool01(content_type.contains("html")));
    set("is_json", bool01(content_type.contains("json")));

    // Header-derived security posture.
    let csp = surface.headers.get("content-security-policy").unwrap_or("").to_ascii_lowercase();
    set("csp_missing", bool01(csp.is_empty()));
    set("csp_unsafe_inline", bool01(csp.contains("unsafe-inline")));
    set("csp_unsafe_eval", bool01(csp.contains("unsafe-eval")));
    set("xfo_missing", bool01(!surface.headers.contains("x-frame-options")));
    set("xcto_missing", bool01(!surface.headers.contains("x-content-type-options")));
    set("hsts_missing", bool01(!surface.headers.contains("strict-transport-security")));
    set("referrer_policy_missing", bool01(!surface.headers.contains("referrer-policy")));
    set("xxp_present", bool01(surface.headers.contains("x-xss-protection")));

    // Cookies.
    let num_cookies_missing_httponly = surface.cookies.iter().filter(|c| !c.http_only).count();
    let num_cookies_missing_secure = surface.cookies.iter().filter(|c| !c.secure).count();
    let has_session_cookie_no_httponly = surface
        .cookies
        .iter()
        .any(|c| contains_any(&c.name, SESSION_COOKIE_SUBSTRINGS) && !c.http_only);
    set("num_cookies", surface.cookies.len() as f64);
    set("num_cookies_missing_httponly", num_cookies_missing_httponly as f64);
    set("num_cookies_missing_secure", num_cookies_missing_secure as f64);
    set("has_session_cookie_no_httponly", bool01(has_session_cookie_no_httponly));

    // Forms and inputs.
    let all_fields = surface.forms.iter().flat_map(|form| form.fields.iter());
    let num_inputs = all_fields.clone().count();
    let num_password_inputs = all_fields.clone().filter(|i| i.field_type == "password").count();
    let num_file_inputs = all_fields.clone().filter(|i| i.field_type == "file").count();
    let num_hidden_inputs = all_fields.clone().filter(|i| i.field_type == "hidden").count();
    let has_csrf_input = all_fields.clone().any(|i| contains_any(&i.name, CSRF_SUBSTRINGS));
    let has_admin_form = surface.forms.iter().any(|f| contains_any(&f.action, ADMIN_SUBSTRINGS));
    let has_auth_form = surface.forms.iter().any(|f| contains_any(&f.action, AUTH_SUBSTRINGS));
    let has_upload_form = surface.forms.iter().any(|f| contains_any(&f.action, UPLOAD_SUBSTRINGS));

    set("num_forms", surface.forms.len() as f64);
    set("num_inputs", num_inputs as f64);
    set("num_password_inputs", num_password_inputs as f64);
    set("num_file_inputs", num_file_inputs as f64);
    set("num_hidden_inputs", num_hidden_inputs as f64);
    set("has_password_input", bool01(num_password_inputs > 0));
    set("has_file_upload", bool01(num_file_inputs > 0));
    set("has_admin_form", bool01(has_admin_form));
    set("has_auth_form", bool01(has_auth_form));
    set("has_upload_form", bool01(has_upload_form));
    set("has_csrf_input", bool01(has_csrf_input));

    // GET/POST params (union, by name, for the "param" features).
    let all_params = surface
        .get_params
        .iter()
        .chain(surface.post_params.iter())
        .collect::<Vec<_>>();
    let num_suspicious_params = all_params
        .iter()
        .filter(|p| contains_any(p, SUSPICIOUS_PARAM_SUBSTRINGS))
        .count();
    let has_admin_param = all_params.iter().any(|p| contains_any(p, &["admin"]));
    let has_upload_param = all_params.iter().any(|p| contains_any(p, &["upload", "file"]));
    let has_debug_param = all_params.iter().any(|p| contains_any(p, &["debug"]));
    let has_id_param = all_params.iter().any(|p| p.eq_ignore_ascii_case("id"));

    set("num_params", all_params.len() as f64);
    set("num_suspicious_params", num_suspicious_params as f64);
    set("has_admin_param", bool01(has_admin_param));
    set("has_upload_param", bool01(has_upload_param));
    set("has_debug_param", bool01(has_debug_param));
    set("has_id_param", bool01(has_id_param));

    // Scripts.
    let num_inline_scripts = surface.scripts.iter().filter(|s| s.inline).count();
    let num_external_scripts = surface.scripts.iter().filter(|s| !s.inline).count();
    set("num_scripts", surface.scripts.len() as f64);
    set("num_inline_scripts", num_inline_scripts as f64);
    set("num_external_scripts", num_external_scripts as f64);

    // Extension points: always zero, no detector implemented.
    set("has_error_indicators", bool01(!surface.error_indicators.is_empty()));
    set("num_error_indicators", surface.error_indicators.len() as f64);
    set("num_framework_hints", surface.framework_hints.len() as f64);

    f
}

fn bool01(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attack_surface;
    use moku_core::{Headers, SnapshotId};

    fn surface_with_headers(headers: Headers) -> AttackSurface {
        attack_surface::extract("https://example.com/", SnapshotId::new(), 200, &headers, b"<html></html>")
    }

    #[test]
    fn missing_security_headers_are_flagged() {
        let features = extract(&surface_with_headers(Headers::default()));
        assert_eq!(features["csp_missing"], 1.0);
        assert_eq!(features["xfo_missing"], 1.0);
        assert_eq!(features["hsts_missing"], 1.0);
    }

    #[test]
    fn csp_present_without_unsafe_directives_is_not_flagged() {
        let mut headers = Headers::default();
        headers.push("Content-Security-Policy", "default-src 'self'");
        let features = extract(&surface_with_headers(headers));
        assert_eq!(features["csp_missing"], 0.0);
        assert_eq!(features["csp_unsafe_inline"], 0.0);
    }

    #[test]
    fn admin_form_action_sets_has_admin_form() {
        let html = br#"<form action="/admin/login" method="post"><input name="u"></form>"#;
        let surface = attack_surface::extract(
            "https://example.com/",
            SnapshotId::new(),
            200,
            &Headers::default(),
            html,
        );
        let features = extract(&surface);
        assert_eq!(features["has_admin_form"], 1.0);
        assert_eq!(features["has_auth_form"], 1.0);
    }

    #[test]
    fn status_class_is_derived_from_status_code() {
        let surface = attack_surface::extract(
            "https://example.com/",
            SnapshotId::new(),
            404,
            &Headers::default(),
            b"",
        );
        let features = extract(&surface);
        assert_eq!(features["status_4xx"], 1.0);
        assert_eq!(features["status_2xx"], 0.0);
    }
}
