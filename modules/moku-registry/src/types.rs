use chrono::{DateTime, Utc};
use moku_core::{ProjectId, WebsiteId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// One origin (scheme+host+port) under a project. `storage_path`
/// is the absolute directory this website exclusively owns: `site.db` plus
/// its `blobs/` subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Website {
    pub id: WebsiteId,
    pub project_id: ProjectId,
    pub slug: String,
    pub origin: String,
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}
