use std::env;
use std::path::PathBuf;

/// Which `WebClient` backend a website's `SiteComponents` should construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebClientBackend {
    /// Plain HTTP GET/POST, no JavaScript execution.
    NetHttp,
    /// Headless-browser backend; waits for network idle, GET only.
    Chromedp,
}

impl std::str::FromStr for WebClientBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nethttp" => Ok(Self::NetHttp),
            "chromedp" => Ok(Self::Chromedp),
            other => Err(format!("unknown webclient backend: {other}")),
        }
    }
}

/// URL canonicalization options.
#[derive(Debug, Clone)]
pub struct UrlConfig {
    pub drop_tracking_params: bool,
    pub strip_trailing_slash: bool,
    pub default_scheme: String,
    pub tracking_param_allowlist: Vec<String>,
}

impl Default for UrlConfig {
    fn default() -> Self {
        Self {
            drop_tracking_params: true,
            strip_trailing_slash: true,
            default_scheme: "https".to_string(),
            tracking_param_allowlist: Vec::new(),
        }
    }
}

/// Fetcher tuning.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub max_concurrency: usize,
    pub commit_size: usize,
    pub score_timeout_secs: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            commit_size: 50,
            score_timeout_secs: 10,
        }
    }
}

/// Tracker tuning.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub redact_sensitive_headers: bool,
    pub sensitive_header_names: Vec<String>,
    /// Skip the `site.db` project-id mismatch check on open.
    pub force_project_id: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            redact_sensitive_headers: true,
            sensitive_header_names: vec![
                "authorization".to_string(),
                "cookie".to_string(),
                "set-cookie".to_string(),
                "proxy-authorization".to_string(),
            ],
            force_project_id: false,
        }
    }
}

/// Assessor/scoring tuning.
#[derive(Debug, Clone)]
pub struct AssessorConfig {
    pub scoring_version: String,
    pub default_confidence: f64,
    pub request_locations: bool,
    pub max_regex_evidence_samples: usize,
    pub max_regex_match_value_len: usize,
    pub max_css_evidence_samples: usize,
    pub timeout_secs: u64,
}

impl Default for AssessorConfig {
    fn default() -> Self {
        Self {
            scoring_version: "1.0.0".to_string(),
            default_confidence: 0.7,
            request_locations: true,
            max_regex_evidence_samples: 5,
            max_regex_match_value_len: 256,
            max_css_evidence_samples: 5,
            timeout_secs: 5,
        }
    }
}

/// Root application configuration, assembled from environment variables with
/// defaults for everything optional.
#[derive(Debug, Clone)]
pub struct Config {
    pub storage_root: PathBuf,
    pub webclient_backend: WebClientBackend,
    pub fetcher: FetcherConfig,
    pub tracker: TrackerConfig,
    pub assessor: AssessorConfig,
    pub url: UrlConfig,
    pub job_retention_secs: u64,
    pub sched_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            webclient_backend: WebClientBackend::NetHttp,
            fetcher: FetcherConfig::default(),
            tracker: TrackerConfig::default(),
            assessor: AssessorConfig::default(),
            url: UrlConfig::default(),
            job_retention_secs: 3600,
            sched_concurrency: 4,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset. Mirrors the env-var names above.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let storage_root = env::var("MOKU_STORAGE_ROOT")
            .ok()
            .map(expand_home)
            .unwrap_or(defaults.storage_root);

        let webclient_backend = env::var("MOKU_WEBCLIENT_BACKEND")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.webclient_backend);

        let sched_concurrency = env::var("MOKU_SCHED_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.sched_concurrency);

        let max_concurrency = env::var("MOKU_FETCHER_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.fetcher.max_concurrency);

        Self {
            storage_root,
            webclient_backend,
            fetcher: FetcherConfig {
                max_concurrency,
                ..defaults.fetcher
            },
            ..defaults
        }
    }
}

fn default_storage_root() -> PathBuf {
    env::var("MOKU_DB_PATH")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs_home().unwrap_or_else(|| PathBuf::from(".")).join(".moku")
        })
}

fn expand_home(raw: String) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

fn dirs_home() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webclient_backend_parses_known_values() {
        assert_eq!(
            "nethttp".parse::<WebClientBackend>().unwrap(),
            WebClientBackend::NetHttp
        );
        assert_eq!(
            "chromedp".parse::<WebClientBackend>().unwrap(),
            WebClientBackend::Chromedp
        );
        assert!("bogus".parse::<WebClientBackend>().is_err());
    }

    #[test]
    fn expand_home_substitutes_tilde() {
        let path = expand_home("~/moku-data".to_string());
        if let Some(home) = dirs_home() {
            assert_eq!(path, home.join("moku-data"));
        }
    }
}
