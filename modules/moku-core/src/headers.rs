use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Multi-valued, lower-cased HTTP headers: the one representation used
/// everywhere a response's headers are stored or diffed, so `Set-Cookie`
/// and other repeated headers survive instead of being flattened away.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(BTreeMap<String, Vec<String>>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, lower-casing the name and appending to any existing
    /// values under that name (headers may repeat, e.g. `Set-Cookie`).
    pub fn push(&mut self, name: &str, value: impl Into<String>) {
        self.0
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// All values for a lower-cased header name, in insertion order.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.0
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First value for a header name, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut h = Headers::new();
        for (k, v) in iter {
            h.push(&k, v);
        }
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_names_are_lower_cased_and_repeats_preserved() {
        let mut h = Headers::new();
        h.push("Set-Cookie", "a=1");
        h.push("set-cookie", "b=2");
        assert_eq!(h.get_all("SET-COOKIE"), &["a=1".to_string(), "b=2".to_string()]);
    }

    #[test]
    fn missing_header_returns_empty_slice() {
        let h = Headers::new();
        assert!(h.get_all("x-missing").is_empty());
        assert_eq!(h.get("x-missing"), None);
    }
}
