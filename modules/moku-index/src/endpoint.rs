use chrono::{DateTime, Utc};
use moku_core::WebsiteId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    New,
    Fetched,
    Error,
    Skipped,
}

impl EndpointStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EndpointStatus::New => "new",
            EndpointStatus::Fetched => "fetched",
            EndpointStatus::Error => "error",
            EndpointStatus::Skipped => "skipped",
        }
    }
}

impl std::str::FromStr for EndpointStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "fetched" => Ok(Self::Fetched),
            "error" => Ok(Self::Error),
            "skipped" => Ok(Self::Skipped),
            other => Err(format!("unknown endpoint status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub canonical_url: String,
    pub website_id: WebsiteId,
    pub status: EndpointStatus,
    pub source: String,
    pub discovered_at: DateTime<Utc>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}
