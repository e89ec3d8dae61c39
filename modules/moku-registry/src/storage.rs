//! Storage-path derivation: `storage_root/<project_dir>/<origin_dir>/`.

use std::path::{Path, PathBuf};

/// Sanitize a slug or origin string into a single path component: lower-case,
/// non-alphanumeric runs collapsed to a single underscore, trimmed of leading
/// and trailing underscores. Deterministic, so the same project/origin always
/// resolves to the same directory.
pub fn sanitize_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_underscore = false;
    for ch in raw.to_ascii_lowercase().chars() {
        if ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' {
            out.push(ch);
            last_was_underscore = false;
        } else if !last_was_underscore {
            out.push('_');
            last_was_underscore = true;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `storage_root/<project_slug>/<origin>/`.
pub fn website_storage_path(storage_root: &Path, project_slug: &str, origin: &str) -> PathBuf {
    storage_root
        .join(sanitize_component(project_slug))
        .join(sanitize_component(origin))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_scheme_and_port_into_one_component() {
        assert_eq!(sanitize_component("https://example.com:8443"), "https_example.com_8443");
    }

    #[test]
    fn is_deterministic() {
        assert_eq!(sanitize_component("Example.COM"), sanitize_component("example.com"));
    }

    #[test]
    fn website_storage_path_nests_under_project() {
        let root = Path::new("/data");
        let path = website_storage_path(root, "acme-corp", "https://example.com");
        assert_eq!(path, root.join("acme-corp").join("https_example.com"));
    }
}
