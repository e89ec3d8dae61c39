//! Parse HTML + headers into an `AttackSurface`.
//!
//! Parse failures are tolerant: a malformed document yields whatever could
//! be extracted before the failure, never an error.

use std::sync::LazyLock;

use chrono::Utc;
use moku_core::{Headers, SnapshotId};
use scraper::{Html, Selector};
use url::Url;

use crate::types::{AttackSurface, Cookie, Form, FormField, ScriptRef};

static FORM_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("form").unwrap());
static FIELD_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input, textarea, select").unwrap());
static SCRIPT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script").unwrap());

fn classes_of(el: &scraper::ElementRef) -> Vec<String> {
    el.value()
        .attr("class")
        .map(|c| c.split_whitespace().map(|s| s.to_string()).collect())
        .unwrap_or_default()
}

/// Parse a single `Set-Cookie` header value into a `Cookie`.
fn parse_set_cookie(raw: &str) -> Option<Cookie> {
    let mut parts = raw.split(';');
    let name_value = parts.next()?.trim();
    let (name, _value) = name_value.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = Cookie {
        name: name.to_string(),
        domain: None,
        path: None,
        secure: false,
        http_only: false,
        same_site: None,
    };

    for attr in parts {
        let attr = attr.trim();
        let lower = attr.to_ascii_lowercase();
        if lower == "secure" {
            cookie.secure = true;
        } else if lower == "httponly" {
            cookie.http_only = true;
        } else if let Some(v) = lower.strip_prefix("domain=") {
            cookie.domain = Some(v.to_string());
        } else if let Some(stripped) = attr.strip_prefix("Path=").or_else(|| attr.strip_prefix("path=")) {
            cookie.path = Some(stripped.to_string());
        } else if let Some(stripped) = lower.strip_prefix("samesite=") {
            cookie.same_site = Some(stripped.to_string());
        }
    }

    Some(cookie)
}

/// Extract GET parameter names (values ignored) from a URL's raw query string.
fn get_params(url: &str) -> Vec<String> {
    let Ok(parsed) = Url::parse(url) else {
        return Vec::new();
    };
    parsed.query_pairs().map(|(k, _)| k.into_owned()).collect()
}

fn extract_forms(document: &Html) -> Vec<Form> {
    let mut forms = Vec::new();
    for (form_index, form_el) in document.select(&FORM_SELECTOR).enumerate() {
        let action = form_el.value().attr("action").unwrap_or("").to_string();
        let method = form_el
            .value()
            .attr("method")
            .map(|m| m.to_ascii_uppercase())
            .unwrap_or_else(|| "GET".to_string());
        let id = form_el.value().attr("id").map(|s| s.to_string());
        let classes = classes_of(&form_el);

        let mut fields = Vec::new();
        for (field_index, field_el) in form_el.select(&FIELD_SELECTOR).enumerate() {
            let name = match field_el.value().attr("name") {
                Some(n) if !n.is_empty() => n.to_string(),
                _ => continue,
            };
            let field_type = field_el
                .value()
                .attr("type")
                .map(|t| t.to_ascii_lowercase())
                .unwrap_or_else(|| "text".to_string());
            let required = field_el.value().attr("required").is_some();
            let field_id = field_el.value().attr("id").map(|s| s.to_string());
            let field_classes = classes_of(&field_el);

            fields.push(FormField {
                name,
                field_type,
                required,
                dom_index: field_index,
                id: field_id,
                classes: field_classes,
            });
        }

        forms.push(Form {
            action,
            method,
            dom_index: form_index,
            id,
            classes,
            fields,
        });
    }
    forms
}

fn extract_scripts(document: &Html) -> Vec<ScriptRef> {
    document
        .select(&SCRIPT_SELECTOR)
        .enumerate()
        .map(|(index, el)| {
            let src = el.value().attr("src").map(|s| s.to_string());
            ScriptRef {
                inline: src.is_none(),
                src,
                dom_index: index,
            }
        })
        .collect()
}

pub fn extract(
    url: &str,
    snapshot_id: SnapshotId,
    status_code: u16,
    headers: &Headers,
    body: &[u8],
) -> AttackSurface {
    let content_type = headers.get("content-type").map(|s| s.to_string());
    let get_params = get_params(url);

    let cookies = headers
        .get_all("set-cookie")
        .iter()
        .filter_map(|raw| parse_set_cookie(raw))
        .collect::<Vec<_>>();

    let body_str = String::from_utf8_lossy(body);
    let document = Html::parse_document(&body_str);
    let forms = extract_forms(&document);
    let scripts = extract_scripts(&document);

    let post_params = forms
        .iter()
        .flat_map(|f| f.fields.iter().map(|field| field.name.clone()))
        .collect();

    AttackSurface {
        url: url.to_string(),
        snapshot_id,
        collected_at: Utc::now(),
        status_code,
        headers: headers.clone(),
        cookies,
        get_params,
        post_params,
        forms,
        scripts,
        content_type,
        error_indicators: Vec::new(),
        framework_hints: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(name: &str, value: &str) -> Headers {
        let mut h = Headers::default();
        h.push(name, value);
        h
    }

    #[test]
    fn extracts_form_and_named_inputs_as_post_params() {
        let html = br#"<html><body>
            <form action="/login" method="post" id="f1" class="auth">
                <input name="username" type="text" required>
                <input name="" type="hidden">
                <textarea name="bio"></textarea>
            </form>
        </body></html>"#;
        let surface = extract(
            "https://example.com/login",
            SnapshotId::new(),
            200,
            &Headers::default(),
            html,
        );
        assert_eq!(surface.forms.len(), 1);
        let form = &surface.forms[0];
        assert_eq!(form.action, "/login");
        assert_eq!(form.method, "POST");
        assert_eq!(form.fields.len(), 2);
        assert!(surface.post_params.contains(&"username".to_string()));
        assert!(surface.post_params.contains(&"bio".to_string()));
    }

    #[test]
    fn parses_set_cookie_attributes() {
        let headers = headers_with(
            "set-cookie",
            "session=abc123; Domain=example.com; Path=/; Secure; HttpOnly; SameSite=Strict",
        );
        let surface = extract("https://example.com/", SnapshotId::new(), 200, &headers, b"");
        assert_eq!(surface.cookies.len(), 1);
        let cookie = &surface.cookies[0];
        assert_eq!(cookie.name, "session");
        assert!(cookie.secure);
        assert!(cookie.http_only);
        assert_eq!(cookie.same_site.as_deref(), Some("strict"));
    }

    #[test]
    fn get_params_come_from_raw_query_names_only() {
        let surface = extract(
            "https://example.com/search?q=rust&page=2",
            SnapshotId::new(),
            200,
            &Headers::default(),
            b"",
        );
        assert_eq!(surface.get_params, vec!["q".to_string(), "page".to_string()]);
    }

    #[test]
    fn malformed_html_still_yields_whatever_was_parseable() {
        let html = b"<html><body><form action=\"/x\"><input name=\"a\"></body>";
        let surface = extract("https://example.com/x", SnapshotId::new(), 200, &Headers::default(), html);
        assert_eq!(surface.forms.len(), 1);
    }

    #[test]
    fn scripts_are_classified_inline_vs_external() {
        let html = br#"<html><body>
            <script src="/app.js"></script>
            <script>console.log('x')</script>
        </body></html>"#;
        let surface = extract("https://example.com/", SnapshotId::new(), 200, &Headers::default(), html);
        assert_eq!(surface.scripts.len(), 2);
        assert!(!surface.scripts[0].inline);
        assert!(surface.scripts[1].inline);
    }
}
