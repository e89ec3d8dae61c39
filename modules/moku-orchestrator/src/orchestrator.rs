//! The orchestrator: job lifecycle, cancellation, event streaming, and the
//! per-site component cache. Builds on the same `Semaphore`/channel-driven
//! worker pattern used elsewhere in this codebase, generalized from "one
//! locked run" to "many concurrent, cancelable jobs".

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use moku_core::config::Config;
use moku_core::{CancellationToken, JobId};
use moku_fetcher::ProgressCallback;
use moku_registry::{Registry, Website};
use moku_tracker::SecurityDiffOverview;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};

use crate::enumerator::Enumerator;
use crate::error::{OrchestratorError, Result};
use crate::job::{Job, JobEvent, JobStatus, JobType};
use crate::site_components::SiteComponentsCache;

const JANITOR_INTERVAL: Duration = Duration::from_secs(60);
const EVENTS_CHANNEL_CAPACITY: usize = 16;

struct JobHandle {
    record: Arc<TokioMutex<Job>>,
    cancel: CancellationToken,
    events_rx: StdMutex<Option<mpsc::Receiver<JobEvent>>>,
    task: StdMutex<Option<JoinHandle<()>>>,
}

/// An in-flight or terminated job's outcome, used internally to route to the
/// right terminal status without duplicating the branching at every call site.
enum JobOutcome {
    Canceled,
    Failed(String),
}

pub struct Orchestrator {
    registry: Arc<Registry>,
    config: Config,
    site_components: SiteComponentsCache,
    jobs: StdMutex<HashMap<JobId, Arc<JobHandle>>>,
    closed: AtomicBool,
    enumerator: Arc<dyn Enumerator>,
    janitor: StdMutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(registry: Arc<Registry>, config: Config, enumerator: Arc<dyn Enumerator>) -> Arc<Self> {
        let orch = Arc::new(Self {
            registry,
            config,
            site_components: SiteComponentsCache::new(),
            jobs: StdMutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            enumerator,
            janitor: StdMutex::new(None),
        });

        let janitor_orch = orch.clone();
        let handle = tokio::spawn(async move { janitor_orch.run_janitor().await });
        *orch.janitor.lock().expect("janitor lock poisoned") = Some(handle);
        orch
    }

    async fn run_janitor(self: Arc<Self>) {
        loop {
            tokio::time::sleep(JANITOR_INTERVAL).await;
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            self.evict_expired_jobs().await;
        }
    }

    async fn evict_expired_jobs(&self) {
        let retention = chrono::Duration::seconds(self.config.job_retention_secs as i64);
        let now = Utc::now();

        let snapshot: Vec<(JobId, Arc<TokioMutex<Job>>)> = {
            let jobs = self.jobs.lock().expect("jobs lock poisoned");
            jobs.iter().map(|(id, h)| (*id, h.record.clone())).collect()
        };

        let mut expired = Vec::new();
        for (id, record) in snapshot {
            let job = record.lock().await;
            if let Some(ended_at) = job.ended_at {
                if now - ended_at >= retention {
                    expired.push(id);
                }
            }
        }

        if !expired.is_empty() {
            let mut jobs = self.jobs.lock().expect("jobs lock poisoned");
            for id in &expired {
                jobs.remove(id);
            }
            info!(evicted = expired.len(), "janitor evicted terminated jobs");
        }
    }

    /// Start a fetch job: pull a bounded slice of endpoints for `website_slug`
    /// by `status`, fetch them, commit, score, and report a security-diff
    /// overview if a new version was produced.
    pub async fn start_fetch_job(
        self: &Arc<Self>,
        project_slug: &str,
        website_slug: &str,
        status: &str,
        limit: Option<usize>,
    ) -> Result<Job> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Closed);
        }

        let website = self.resolve_website(project_slug, website_slug).await?;
        let job_id = JobId::new();
        let job = Job::new(job_id, JobType::Fetch, project_slug, website_slug);
        let (tx, rx) = mpsc::channel(EVENTS_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let record = Arc::new(TokioMutex::new(job.clone()));

        let handle = Arc::new(JobHandle {
            record: record.clone(),
            cancel: cancel.clone(),
            events_rx: StdMutex::new(Some(rx)),
            task: StdMutex::new(None),
        });
        self.jobs.lock().expect("jobs lock poisoned").insert(job_id, handle.clone());

        let orch = self.clone();
        let status = status.to_string();
        let task = tokio::spawn(
            async move { run_fetch_job(orch, job_id, website, status, limit, cancel, tx).await }
                .instrument(info_span!("fetch_job", %job_id)),
        );
        *handle.task.lock().expect("job task lock poisoned") = Some(task);

        Ok(job)
    }

    /// Start an enumerate job: invoke the enumerator to discover URLs for
    /// `website_slug`'s origin, then add them to the endpoint index.
    pub async fn start_enumerate_job(
        self: &Arc<Self>,
        project_slug: &str,
        website_slug: &str,
        concurrency: usize,
    ) -> Result<Job> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Closed);
        }

        let website = self.resolve_website(project_slug, website_slug).await?;
        let job_id = JobId::new();
        let job = Job::new(job_id, JobType::Enumerate, project_slug, website_slug);
        let (tx, rx) = mpsc::channel(EVENTS_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let record = Arc::new(TokioMutex::new(job.clone()));

        let handle = Arc::new(JobHandle {
            record: record.clone(),
            cancel: cancel.clone(),
            events_rx: StdMutex::new(Some(rx)),
            task: StdMutex::new(None),
        });
        self.jobs.lock().expect("jobs lock poisoned").insert(job_id, handle.clone());

        let orch = self.clone();
        let task = tokio::spawn(
            async move { run_enumerate_job(orch, job_id, website, concurrency, cancel, tx).await }
                .instrument(info_span!("enumerate_job", %job_id)),
        );
        *handle.task.lock().expect("job task lock poisoned") = Some(task);

        Ok(job)
    }

    async fn resolve_website(&self, project_slug: &str, website_slug: &str) -> Result<Website> {
        let project = self
            .registry
            .get_project_by_slug(project_slug)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("project {project_slug}")))?;
        self.registry
            .get_website_by_slug(project.id, website_slug)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("website {website_slug}")))
    }

    /// Cancel a running job's context. Idempotent; a no-op if `job_id` is
    /// unknown.
    pub fn cancel_job(&self, job_id: JobId) {
        let jobs = self.jobs.lock().expect("jobs lock poisoned");
        if let Some(handle) = jobs.get(&job_id) {
            handle.cancel.cancel();
        }
    }

    /// Take this job's events receiver. Only the first caller receives it;
    /// later calls (or an unknown job id) return `None`.
    pub fn subscribe(&self, job_id: JobId) -> Option<mpsc::Receiver<JobEvent>> {
        let jobs = self.jobs.lock().expect("jobs lock poisoned");
        let handle = jobs.get(&job_id)?;
        handle.events_rx.lock().expect("events lock poisoned").take()
    }

    pub async fn get_job(&self, job_id: JobId) -> Option<Job> {
        let record = {
            let jobs = self.jobs.lock().expect("jobs lock poisoned");
            jobs.get(&job_id)?.record.clone()
        };
        Some(record.lock().await.clone())
    }

    pub async fn list_jobs(&self) -> Vec<Job> {
        let records: Vec<Arc<TokioMutex<Job>>> = {
            let jobs = self.jobs.lock().expect("jobs lock poisoned");
            jobs.values().map(|h| h.record.clone()).collect()
        };
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            out.push(record.lock().await.clone());
        }
        out
    }

    /// Cancel every running job, wait for its task to exit, then close and
    /// drop every cached `SiteComponents`.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(janitor) = self.janitor.lock().expect("janitor lock poisoned").take() {
            janitor.abort();
        }

        let handles: Vec<Arc<JobHandle>> = {
            let jobs = self.jobs.lock().expect("jobs lock poisoned");
            jobs.values().cloned().collect()
        };
        for handle in &handles {
            handle.cancel.cancel();
        }
        for handle in handles {
            let task = handle.task.lock().expect("job task lock poisoned").take();
            if let Some(task) = task {
                let _ = task.await;
            }
        }

        self.site_components.close_all().await;
    }
}

async fn set_status(record: &Arc<TokioMutex<Job>>, status: JobStatus) {
    record.lock().await.status = status;
}

fn send_event(tx: &mpsc::Sender<JobEvent>, event: JobEvent) {
    // Non-blocking; progress/status events are advisory.
    let _ = tx.try_send(event);
}

async fn run_fetch_job(
    orch: Arc<Orchestrator>,
    job_id: JobId,
    website: Website,
    status_filter: String,
    limit: Option<usize>,
    cancel: CancellationToken,
    tx: mpsc::Sender<JobEvent>,
) {
    let record = {
        let jobs = orch.jobs.lock().expect("jobs lock poisoned");
        jobs.get(&job_id).expect("job just inserted").record.clone()
    };

    send_event(&tx, JobEvent::status(job_id, JobStatus::Pending));
    set_status(&record, JobStatus::Running).await;
    send_event(&tx, JobEvent::status(job_id, JobStatus::Running));

    let outcome = fetch_website_endpoints(&orch, &website, &status_filter, limit, cancel, job_id, &tx).await;

    let mut job = record.lock().await;
    job.ended_at = Some(Utc::now());
    match outcome {
        Ok(overview) => {
            job.status = JobStatus::Done;
            job.security_overview = overview;
            drop(job);
            if let Err(e) = orch.registry.touch_last_seen(website.id, Utc::now()).await {
                warn!(website_id = %website.id, error = %e, "failed to update website last_seen_at");
            }
            send_event(&tx, JobEvent::result(job_id, None));
            info!(%job_id, "fetch job done");
        }
        Err(JobOutcome::Canceled) => {
            job.status = JobStatus::Canceled;
            drop(job);
            send_event(&tx, JobEvent::result(job_id, None));
            info!(%job_id, "fetch job canceled");
        }
        Err(JobOutcome::Failed(message)) => {
            job.status = JobStatus::Failed;
            job.error = Some(message.clone());
            drop(job);
            send_event(&tx, JobEvent::result(job_id, Some(message.clone())));
            warn!(%job_id, error = %message, "fetch job failed");
        }
    }
    // `tx` is dropped here, closing the job's events channel (the
    // final result is emitted before close, so rangers over the channel
    // always observe terminal state).
}

async fn fetch_website_endpoints(
    orch: &Arc<Orchestrator>,
    website: &Website,
    status_filter: &str,
    limit: Option<usize>,
    cancel: CancellationToken,
    job_id: JobId,
    tx: &mpsc::Sender<JobEvent>,
) -> std::result::Result<Option<SecurityDiffOverview>, JobOutcome> {
    let components = orch
        .site_components
        .get_or_open(website, &orch.config)
        .await
        .map_err(|e| JobOutcome::Failed(e.to_string()))?;

    let prev_head = components
        .tracker
        .read_head()
        .await
        .map_err(|e| JobOutcome::Failed(e.to_string()))?;

    let endpoints = components
        .index
        .list_endpoints(status_filter, limit)
        .await
        .map_err(|e| JobOutcome::Failed(e.to_string()))?;
    let urls: Vec<String> = endpoints.into_iter().map(|e| e.canonical_url).collect();

    let tx_progress = tx.clone();
    let progress: ProgressCallback = Arc::new(move |processed, total| {
        send_event(&tx_progress, JobEvent::progress(job_id, processed, total));
    });

    components
        .fetcher
        .fetch(cancel.clone(), urls, progress)
        .await
        .map_err(|e| JobOutcome::Failed(e.to_string()))?;

    if cancel.is_cancelled() {
        return Err(JobOutcome::Canceled);
    }

    let Some(prev) = prev_head else {
        // First fetch for this website: no prior version to diff against.
        return Ok(None);
    };

    let new_head = components
        .tracker
        .read_head()
        .await
        .map_err(|e| JobOutcome::Failed(e.to_string()))?;

    if new_head == Some(prev) {
        // Nothing committed (e.g. an empty endpoint list).
        return Ok(None);
    }
    let new_head = new_head.expect("head moved away from Some(prev), must now be Some");

    let overview = components
        .tracker
        .get_security_diff_overview(prev, new_head)
        .await
        .map_err(|e| JobOutcome::Failed(e.to_string()))?;
    Ok(Some(overview))
}

async fn run_enumerate_job(
    orch: Arc<Orchestrator>,
    job_id: JobId,
    website: Website,
    concurrency: usize,
    cancel: CancellationToken,
    tx: mpsc::Sender<JobEvent>,
) {
    let record = {
        let jobs = orch.jobs.lock().expect("jobs lock poisoned");
        jobs.get(&job_id).expect("job just inserted").record.clone()
    };

    send_event(&tx, JobEvent::status(job_id, JobStatus::Pending));
    set_status(&record, JobStatus::Running).await;
    send_event(&tx, JobEvent::status(job_id, JobStatus::Running));

    let outcome = enumerate_website(&orch, &website, concurrency, cancel.clone()).await;

    let mut job = record.lock().await;
    job.ended_at = Some(Utc::now());
    match outcome {
        Ok(urls) if cancel.is_cancelled() => {
            job.status = JobStatus::Canceled;
            job.enumerated_urls = Some(urls);
            drop(job);
            send_event(&tx, JobEvent::result(job_id, None));
        }
        Ok(urls) => {
            job.status = JobStatus::Done;
            job.enumerated_urls = Some(urls);
            drop(job);
            send_event(&tx, JobEvent::result(job_id, None));
            info!(%job_id, "enumerate job done");
        }
        Err(message) => {
            job.status = JobStatus::Failed;
            job.error = Some(message.clone());
            drop(job);
            send_event(&tx, JobEvent::result(job_id, Some(message.clone())));
            warn!(%job_id, error = %message, "enumerate job failed");
        }
    }
}

async fn enumerate_website(
    orch: &Arc<Orchestrator>,
    website: &Website,
    concurrency: usize,
    cancel: CancellationToken,
) -> std::result::Result<Vec<String>, String> {
    let urls = orch
        .enumerator
        .enumerate(cancel, &website.origin, concurrency)
        .await?;

    if urls.is_empty() {
        return Ok(urls);
    }

    let components = orch
        .site_components
        .get_or_open(website, &orch.config)
        .await
        .map_err(|e| e.to_string())?;
    components
        .index
        .add_endpoints(&urls, "enumerator")
        .await
        .map_err(|e| e.to_string())?;

    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use moku_core::Config;
    use moku_index::{CanonicalizeOptions, EndpointIndex};
    use moku_registry::Registry;
    use moku_webclient::test_support::{StubResponse, TestServer};
    use std::time::Duration as StdDuration;

    struct Fixture {
        orch: Arc<Orchestrator>,
        _dir: tempfile::TempDir,
        server: TestServer,
        db_url: String,
        website_id: moku_core::WebsiteId,
    }

    async fn setup() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::open(dir.path()).await.unwrap());
        let project = registry.create_project("acme", "Acme", "").await.unwrap();
        let server = TestServer::start().await;
        let origin = server.url("");
        let website = registry.create_website(project.id, "main", &origin).await.unwrap();
        let db_url = format!("sqlite://{}/site.db?mode=rwc", website.storage_path);

        let config = Config::default();
        let orch = Orchestrator::new(registry, config, Arc::new(crate::enumerator::NullEnumerator));

        Fixture {
            orch,
            _dir: dir,
            server,
            db_url,
            website_id: website.id,
        }
    }

    async fn seed_endpoint(fixture: &Fixture, path: &str) {
        let index = EndpointIndex::open(&fixture.db_url, fixture.website_id, CanonicalizeOptions::default())
            .await
            .unwrap();
        index.add_endpoints(&[fixture.server.url(path)], "seed").await.unwrap();
    }

    async fn wait_terminal(orch: &Orchestrator, job_id: moku_core::JobId) -> Job {
        for _ in 0..200 {
            if let Some(job) = orch.get_job(job_id).await {
                if job.status.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        panic!("job did not reach a terminal state in time");
    }

    #[tokio::test]
    async fn first_fetch_on_empty_site_sets_head_with_no_overview() {
        let fixture = setup().await;
        fixture.server.set("/", StubResponse::ok_html("<html></html>"));
        seed_endpoint(&fixture, "/").await;

        let job = fixture.orch.start_fetch_job("acme", "main", "new", None).await.unwrap();
        let job = wait_terminal(&fixture.orch, job.id).await;

        assert_eq!(job.status, JobStatus::Done);
        assert!(job.error.is_none());
        assert!(job.security_overview.is_none());
    }

    #[tokio::test]
    async fn second_fetch_with_no_change_yields_zero_delta_overview() {
        let fixture = setup().await;
        fixture.server.set("/", StubResponse::ok_html("<html></html>"));
        seed_endpoint(&fixture, "/").await;

        let first = fixture.orch.start_fetch_job("acme", "main", "*", None).await.unwrap();
        wait_terminal(&fixture.orch, first.id).await;

        let second = fixture.orch.start_fetch_job("acme", "main", "*", None).await.unwrap();
        let second = wait_terminal(&fixture.orch, second.id).await;

        assert_eq!(second.status, JobStatus::Done);
        let overview = second.security_overview.expect("second fetch should diff against first");
        assert_eq!(overview.entries.len(), 1);
        assert_eq!(overview.entries[0].score_delta, 0.0);
    }

    #[tokio::test]
    async fn unknown_project_is_not_found() {
        let fixture = setup().await;
        let err = fixture.orch.start_fetch_job("nope", "main", "new", None).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancel_job_is_a_no_op_for_unknown_id() {
        let fixture = setup().await;
        fixture.orch.cancel_job(moku_core::JobId::new());
    }

    #[tokio::test]
    async fn cancelling_a_job_drives_it_to_a_terminal_state() {
        let fixture = setup().await;
        fixture.server.set("/", StubResponse::ok_html("<html></html>"));
        seed_endpoint(&fixture, "/").await;

        let job = fixture.orch.start_fetch_job("acme", "main", "new", None).await.unwrap();
        fixture.orch.cancel_job(job.id);
        let job = wait_terminal(&fixture.orch, job.id).await;

        assert!(matches!(job.status, JobStatus::Done | JobStatus::Canceled));
    }

    #[tokio::test]
    async fn events_are_observed_in_order_ending_in_result() {
        let fixture = setup().await;
        fixture.server.set("/", StubResponse::ok_html("<html></html>"));
        seed_endpoint(&fixture, "/").await;

        let job = fixture.orch.start_fetch_job("acme", "main", "new", None).await.unwrap();
        let mut rx = fixture.orch.subscribe(job.id).expect("first subscriber gets the receiver");
        assert!(fixture.orch.subscribe(job.id).is_none());

        let mut saw_pending = false;
        let mut saw_running = false;
        let mut saw_result = false;
        while let Some(event) = rx.recv().await {
            match event.kind {
                crate::job::JobEventKind::Status { status: JobStatus::Pending } => saw_pending = true,
                crate::job::JobEventKind::Status { status: JobStatus::Running } => saw_running = true,
                crate::job::JobEventKind::Result { .. } => saw_result = true,
                _ => {}
            }
        }
        assert!(saw_pending && saw_running && saw_result);
    }

    #[tokio::test]
    async fn enumerate_job_adds_discovered_urls_to_the_index() {
        let fixture = setup().await;
        let urls = vec![fixture.server.url("/a"), fixture.server.url("/b")];

        // Reopen the same registry (same storage dir: project/website already
        // exist) behind a second orchestrator wired to a static enumerator.
        let registry = Arc::new(Registry::open(fixture._dir.path()).await.unwrap());
        let orch = Orchestrator::new(
            registry,
            Config::default(),
            Arc::new(crate::enumerator::StaticEnumerator(urls.clone())),
        );

        let job = orch.start_enumerate_job("acme", "main", 4).await.unwrap();
        let job = wait_terminal(&orch, job.id).await;

        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.enumerated_urls, Some(urls));

        let index = EndpointIndex::open(&fixture.db_url, fixture.website_id, CanonicalizeOptions::default())
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 2);
    }
}
