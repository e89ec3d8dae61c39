//! Bounded-concurrency fetch, batcher, and scoring: a `Semaphore`-bounded,
//! `buffer_unordered`-driven worker pool draining into commit-sized batches.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use moku_core::config::FetcherConfig;
use moku_core::CancellationToken;
use moku_index::{EndpointIndex, EndpointStatus};
use moku_tracker::{NewSnapshot, Tracker};
use moku_webclient::WebClient;
use tokio::sync::mpsc;
use tracing::{info, info_span, warn, Instrument};

use crate::error::{FetcherError, Result};
use crate::types::{new_snapshot_from_response, FetchSummary, ProgressCallback};
#[cfg(test)]
use crate::types::no_progress;

pub struct Fetcher {
    webclient: Arc<dyn WebClient>,
    index: Arc<EndpointIndex>,
    tracker: Arc<Tracker>,
    config: FetcherConfig,
}

impl Fetcher {
    pub fn new(
        webclient: Arc<dyn WebClient>,
        index: Arc<EndpointIndex>,
        tracker: Arc<Tracker>,
        config: FetcherConfig,
    ) -> Self {
        Self {
            webclient,
            index,
            tracker,
            config,
        }
    }

    /// Fetch every URL with concurrency bounded by `FetcherConfig::max_concurrency`,
    /// streaming completed snapshots into a batcher that commits and scores
    /// every `commit_size` of them. Cancelling `cancel` stops new fetches from
    /// starting and causes the batcher to flush whatever it currently holds
    /// before returning.
    pub async fn fetch(
        &self,
        cancel: CancellationToken,
        urls: Vec<String>,
        progress: ProgressCallback,
    ) -> Result<FetchSummary> {
        let total = urls.len();
        if total == 0 {
            return Ok(FetchSummary::default());
        }

        let (tx, rx) = mpsc::channel::<NewSnapshot>(self.config.commit_size.max(1));
        let processed = Arc::new(AtomicUsize::new(0));
        let succeeded = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));

        let worker_task = {
            let webclient = self.webclient.clone();
            let index = self.index.clone();
            let cancel = cancel.clone();
            let processed = processed.clone();
            let succeeded = succeeded.clone();
            let failed = failed.clone();
            let progress = progress.clone();
            let max_concurrency = self.config.max_concurrency.max(1);

            tokio::spawn(
                async move {
                    let fetches = stream::iter(urls.into_iter().map(|url| {
                        let webclient = webclient.clone();
                        let index = index.clone();
                        let tx = tx.clone();
                        let cancel = cancel.clone();
                        let processed = processed.clone();
                        let succeeded = succeeded.clone();
                        let failed = failed.clone();
                        let progress = progress.clone();

                        async move {
                            if cancel.is_cancelled() {
                                return;
                            }
                            fetch_one(&webclient, &index, &url, &tx, &succeeded, &failed).await;
                            let n = processed.fetch_add(1, Ordering::SeqCst) + 1;
                            progress(n, total);
                        }
                    }))
                    .buffer_unordered(max_concurrency);

                    tokio::pin!(fetches);
                    while fetches.next().await.is_some() {}
                }
                .instrument(info_span!("fetch_workers", total)),
            )
        };

        let batcher_task = {
            let tracker = self.tracker.clone();
            let commit_size = self.config.commit_size.max(1);
            let cancel = cancel.clone();
            tokio::spawn(
                async move { run_batcher(tracker, rx, commit_size, cancel).await }
                    .instrument(info_span!("fetch_batcher")),
            )
        };

        worker_task
            .await
            .map_err(|e| FetcherError::Commit(e.to_string()))?;
        let commits = batcher_task
            .await
            .map_err(|e| FetcherError::Commit(e.to_string()))??;

        Ok(FetchSummary {
            attempted: total,
            succeeded: succeeded.load(Ordering::SeqCst),
            failed: failed.load(Ordering::SeqCst),
            commits,
        })
    }
}

async fn fetch_one(
    webclient: &Arc<dyn WebClient>,
    index: &EndpointIndex,
    url: &str,
    tx: &mpsc::Sender<NewSnapshot>,
    succeeded: &AtomicUsize,
    failed: &AtomicUsize,
) {
    match webclient.get(url).await {
        Ok(response) => {
            succeeded.fetch_add(1, Ordering::SeqCst);
            let snapshot = new_snapshot_from_response(response);
            if tx.send(snapshot).await.is_err() {
                warn!(url, "batcher channel closed before snapshot could be queued");
            }
        }
        Err(e) => {
            failed.fetch_add(1, Ordering::SeqCst);
            warn!(url, error = %e, "fetch failed, marking endpoint as error");
            if let Err(mark_err) = index.mark(url, EndpointStatus::Error, Utc::now()).await {
                warn!(url, error = %mark_err, "failed to mark endpoint as error");
            }
        }
    }
}

/// Drains `rx` into buffers of `commit_size`, committing and scoring each as
/// it fills. On cancellation, stops accepting new snapshots and flushes
/// whatever is currently buffered. Returns the commit count.
async fn run_batcher(
    tracker: Arc<Tracker>,
    mut rx: mpsc::Receiver<NewSnapshot>,
    commit_size: usize,
    cancel: CancellationToken,
) -> Result<usize> {
    let mut buf = Vec::with_capacity(commit_size);
    let mut commits = 0usize;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            maybe = rx.recv() => {
                match maybe {
                    Some(snapshot) => {
                        buf.push(snapshot);
                        if buf.len() >= commit_size {
                            flush(&tracker, &mut buf).await?;
                            commits += 1;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    if !buf.is_empty() {
        flush(&tracker, &mut buf).await?;
        commits += 1;
    }

    Ok(commits)
}

async fn flush(tracker: &Tracker, buf: &mut Vec<NewSnapshot>) -> Result<()> {
    let batch = std::mem::take(buf);
    let n = batch.len();
    let result = tracker
        .commit_batch(batch, "fetch", "fetcher")
        .await
        .map_err(|e| FetcherError::Commit(e.to_string()))?;

    if let Err(e) = tracker.score_and_attribute(&result).await {
        warn!(version_id = %result.version_id, error = %e, "scoring failed for committed batch");
    }

    info!(snapshots = n, version_id = %result.version_id, "batch committed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use moku_core::{AssessorConfig, TrackerConfig};
    use moku_webclient::test_support::TestServer;
    use moku_webclient::NetHttpClient;

    async fn fetcher() -> (Fetcher, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("site.db");
        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let blob_root = dir.path().join("blobs");

        let tracker = Arc::new(
            Tracker::open(
                &db_url,
                blob_root,
                moku_core::ProjectId::new(),
                TrackerConfig::default(),
                AssessorConfig::default(),
            )
            .await
            .unwrap(),
        );
        let index = Arc::new(
            moku_index::EndpointIndex::open(
                &db_url,
                moku_core::WebsiteId::new(),
                moku_index::CanonicalizeOptions::default(),
            )
            .await
            .unwrap(),
        );
        let webclient: Arc<dyn WebClient> = Arc::new(NetHttpClient::new());
        let config = FetcherConfig {
            max_concurrency: 4,
            commit_size: 10,
            score_timeout_secs: 5,
        };
        (Fetcher::new(webclient, index, tracker, config), dir)
    }

    #[tokio::test]
    async fn fetching_zero_urls_is_a_no_op() {
        let (fetcher, _dir) = fetcher().await;
        let summary = fetcher
            .fetch(CancellationToken::new(), Vec::new(), no_progress())
            .await
            .unwrap();
        assert_eq!(summary.attempted, 0);
        assert_eq!(summary.commits, 0);
    }

    #[tokio::test]
    async fn fetch_commits_a_batch_and_reports_progress() {
        let server = TestServer::start().await;
        server.set("/a", moku_webclient::test_support::StubResponse::ok_html("<html>a</html>"));
        server.set("/b", moku_webclient::test_support::StubResponse::ok_html("<html>b</html>"));
        let (fetcher, _dir) = fetcher().await;

        let urls = vec![server.url("/a"), server.url("/b")];

        let progress_calls = Arc::new(AtomicUsize::new(0));
        let progress_calls_clone = progress_calls.clone();
        let progress: ProgressCallback = Arc::new(move |_n, _total| {
            progress_calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        let summary = fetcher.fetch(CancellationToken::new(), urls, progress).await.unwrap();

        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.commits, 1);
        assert_eq!(progress_calls.load(Ordering::SeqCst), 2);
        assert!(fetcher.tracker.head_exists().await.unwrap());
        server.stop();
    }

    #[tokio::test]
    async fn unreachable_url_is_marked_error_and_does_not_block_the_batch() {
        let server = TestServer::start().await;
        server.set("/a", moku_webclient::test_support::StubResponse::ok_html("<html>a</html>"));
        let (fetcher, _dir) = fetcher().await;

        let urls = vec![server.url("/a"), "http://127.0.0.1:1/unreachable".to_string()];

        let summary = fetcher.fetch(CancellationToken::new(), urls, no_progress()).await.unwrap();

        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.commits, 1);
        server.stop();
    }
}
