use std::sync::Arc;

use moku_tracker::NewSnapshot;
use moku_webclient::WebResponse;

/// Reports `(processed, total)` as each URL finishes fetching; progress is
/// reported through a callback supplied by the orchestrator.
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

pub fn no_progress() -> ProgressCallback {
    Arc::new(|_, _| {})
}

#[derive(Debug, Clone, Default)]
pub struct FetchSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub commits: usize,
}

/// Build a not-yet-committed snapshot from a fetched response.
/// The blob write and version assignment happen later, in `Tracker::commit_batch`.
pub fn new_snapshot_from_response(response: WebResponse) -> NewSnapshot {
    NewSnapshot {
        url: response.request_url,
        status_code: response.status_code,
        headers: response.headers,
        body: response.body,
        fetched_at: response.fetched_at,
    }
}
