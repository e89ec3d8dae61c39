//! Job lifecycle types. `Job` is the external-facing snapshot
//! handed back by `list_jobs`/`get_job`; `JobEvent` is what flows over a job's
//! events channel. States are monotonic and one-shot: `pending -> running ->
//! {done | failed | canceled}`, never reverting.

use chrono::{DateTime, Utc};
use moku_core::JobId;
use moku_tracker::SecurityDiffOverview;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Fetch,
    Enumerate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Canceled)
    }
}

/// Wire/external snapshot of a job (`Job`). Cloned out of the
/// registry's internal state on every `list_jobs`/`get_job` call.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub project: String,
    pub website: String,
    pub status: JobStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub security_overview: Option<SecurityDiffOverview>,
    pub enumerated_urls: Option<Vec<String>>,
}

impl Job {
    pub fn new(id: JobId, job_type: JobType, project: impl Into<String>, website: impl Into<String>) -> Self {
        Self {
            id,
            job_type,
            project: project.into(),
            website: website.into(),
            status: JobStatus::Pending,
            error: None,
            started_at: Utc::now(),
            ended_at: None,
            security_overview: None,
            enumerated_urls: None,
        }
    }
}

/// One event on a job's events channel (`JobEvent`). Serializes with
/// an adjacently-tagged `type` field plus whichever of `status`/`processed`/
/// `total`/`error` applies, matching the wire shape above.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEventKind {
    Status { status: JobStatus },
    Progress { processed: usize, total: usize },
    Result { error: Option<String> },
}

#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub job_id: JobId,
    #[serde(flatten)]
    pub kind: JobEventKind,
}

impl JobEvent {
    pub fn status(job_id: JobId, status: JobStatus) -> Self {
        Self {
            job_id,
            kind: JobEventKind::Status { status },
        }
    }

    pub fn progress(job_id: JobId, processed: usize, total: usize) -> Self {
        Self {
            job_id,
            kind: JobEventKind::Progress { processed, total },
        }
    }

    pub fn result(job_id: JobId, error: Option<String>) -> Self {
        Self {
            job_id,
            kind: JobEventKind::Result { error },
        }
    }
}
