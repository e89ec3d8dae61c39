pub mod cancel;
pub mod config;
pub mod error;
pub mod headers;
pub mod ids;

pub use cancel::CancellationToken;
pub use config::{
    AssessorConfig, Config, FetcherConfig, TrackerConfig, UrlConfig, WebClientBackend,
};
pub use error::CoreError;
pub use headers::Headers;
pub use ids::{
    EvidenceItemId, JobId, ProjectId, ScoreResultId, SnapshotId, VersionId, WebsiteId,
};
