//! The tracker: snapshot/version DAG, HEAD ref, commit, diff,
//! and security-diff computation, backed by one SQLite database per website
//! plus the shared blob store.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use moku_assessor::Assessor;
use moku_blobstore::BlobStore;
use moku_core::config::{AssessorConfig, TrackerConfig};
use moku_core::{Headers, ProjectId, SnapshotId, VersionId};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{info, info_span, warn, Instrument};

use crate::diff;
use crate::error::{Result, TrackerError};
use crate::security_diff;
use crate::store::{self, TrackerStore};
use crate::types::{
    CombinedFileDiff, CommitResult, NewSnapshot, SecurityDiff, SecurityDiffOverview,
    SecurityDiffOverviewEntry, Snapshot, Version,
};

pub struct Tracker {
    store: TrackerStore,
    blobs: Arc<BlobStore>,
    assessor: Assessor,
    config: TrackerConfig,
    /// Serializes commits to this website ("commits are
    /// serialized by one tracker writer"). A plain `tokio::sync::Mutex`
    /// plays the role of the single-writer token the design notes describe.
    commit_lock: Mutex<()>,
}

impl Tracker {
    /// Open (creating if absent) a website's `site.db` + blob root.
    /// `project_id` is stamped into the `meta` table on first open; on later
    /// opens it must match what's stored, unless `config.force_project_id`
    /// is set, in which case the mismatch is silently overwritten.
    pub async fn open(
        db_url: &str,
        blob_root: impl Into<std::path::PathBuf>,
        project_id: ProjectId,
        config: TrackerConfig,
        assessor_config: AssessorConfig,
    ) -> Result<Self> {
        let pool = SqlitePoolOptions::new().connect(db_url).await?;
        Self::with_pool(pool, blob_root, project_id, config, assessor_config).await
    }

    pub async fn with_pool(
        pool: SqlitePool,
        blob_root: impl Into<std::path::PathBuf>,
        project_id: ProjectId,
        config: TrackerConfig,
        assessor_config: AssessorConfig,
    ) -> Result<Self> {
        let store = TrackerStore::new(pool);
        store.migrate().await?;

        match store.read_meta("project_id").await? {
            Some(stored) if stored != project_id.to_string() && !config.force_project_id => {
                return Err(TrackerError::Validation(format!(
                    "site.db belongs to project {stored}, refusing to open as project {project_id}"
                )));
            }
            _ => store.write_meta("project_id", &project_id.to_string()).await?,
        }

        let blobs = Arc::new(BlobStore::open(blob_root)?);
        Ok(Self {
            store,
            blobs,
            assessor: Assessor::new(assessor_config),
            config,
            commit_lock: Mutex::new(()),
        })
    }

    pub async fn head_exists(&self) -> Result<bool> {
        Ok(self.store.read_head().await?.is_some())
    }

    pub async fn read_head(&self) -> Result<Option<VersionId>> {
        self.store.read_head().await
    }

    pub async fn get_parent_version_id(&self, version_id: VersionId) -> Result<Option<VersionId>> {
        self.store.parent_of(version_id).await
    }

    pub async fn get_snapshot_by_url(&self, url: &str) -> Result<Snapshot> {
        let head = self
            .store
            .read_head()
            .await?
            .ok_or_else(|| TrackerError::NotFound("no HEAD commit yet".to_string()))?;
        self.store
            .snapshot_by_url_and_version(url, head)
            .await?
            .ok_or_else(|| store::map_not_found("snapshot for url", url))
    }

    pub async fn get_snapshot_by_url_and_version(
        &self,
        url: &str,
        version_id: VersionId,
    ) -> Result<Option<Snapshot>> {
        self.store.snapshot_by_url_and_version(url, version_id).await
    }

    /// Commit a batch of freshly-fetched snapshots as one new version, child
    /// of current HEAD. Deduplicates by URL within the batch —
    /// a later entry supersedes an earlier one for the same URL. Runs in a
    /// single transaction: any failure leaves no trace.
    pub async fn commit_batch(
        &self,
        snapshots: Vec<NewSnapshot>,
        message: impl Into<String>,
        author: impl Into<String>,
    ) -> Result<CommitResult> {
        let _permit = self.commit_lock.lock().await;
        let span = info_span!("commit_batch", snapshot_count = snapshots.len());

        async {
            let message = message.into();
            let author = author.into();

            // Dedup by URL within the batch: later entries win.
            let mut by_url: BTreeMap<String, NewSnapshot> = BTreeMap::new();
            for snapshot in snapshots {
                by_url.insert(snapshot.url.clone(), snapshot);
            }

            let parent_id = self.store.read_head().await?;
            let version_id = VersionId::new();
            let version = Version {
                id: version_id,
                parent_id,
                message,
                author,
                timestamp: Utc::now(),
            };

            // The head side of each diff is computed against the in-memory body
            // and headers here, before the snapshot row exists — `diff_snapshots`
            // (which reads both sides back from the store) only applies to
            // snapshots that are already committed.
            let mut persisted = Vec::with_capacity(by_url.len());
            let mut diffs = BTreeMap::new();
            for new_snapshot in by_url.into_values() {
                let blob_id = {
                    let blobs = self.blobs.clone();
                    let bytes = new_snapshot.body.clone();
                    tokio::task::spawn_blocking(move || blobs.put(&bytes))
                        .await
                        .map_err(|e| TrackerError::Commit(e.to_string()))??
                };
                let snapshot = Snapshot {
                    id: SnapshotId::new(),
                    version_id,
                    url: new_snapshot.url.clone(),
                    status_code: new_snapshot.status_code,
                    headers: new_snapshot.headers.clone(),
                    blob_sha256: blob_id.as_str().to_string(),
                    fetched_at: new_snapshot.fetched_at,
                };

                if let Some(parent) = parent_id {
                    if let Some(base) = self
                        .store
                        .snapshot_by_url_and_version(&snapshot.url, parent)
                        .await?
                    {
                        let base_bytes = self.read_blob(&base.blob_sha256).await?;
                        let headers = diff::diff_headers(
                            &base.headers,
                            &snapshot.headers,
                            &self.config.sensitive_header_names,
                        );
                        let body = diff::diff_body(&base_bytes, &new_snapshot.body);
                        diffs.insert(
                            snapshot.url.clone(),
                            CombinedFileDiff {
                                url: snapshot.url.clone(),
                                base_snapshot_id: Some(base.id),
                                head_snapshot_id: snapshot.id,
                                status_code_changed: base.status_code != snapshot.status_code,
                                base_status_code: Some(base.status_code),
                                head_status_code: snapshot.status_code,
                                headers,
                                body,
                            },
                        );
                    }
                }

                persisted.push(snapshot);
            }

            let mut tx = self.store.begin().await?;
            let result: Result<()> = async {
                TrackerStore::insert_version(&mut tx, &version).await?;
                for snapshot in &persisted {
                    TrackerStore::insert_snapshot(&mut tx, snapshot).await?;
                }
                TrackerStore::set_head(&mut tx, version_id).await?;
                Ok(())
            }
            .await;

            match result {
                Ok(()) => tx.commit().await?,
                Err(e) => {
                    tx.rollback().await.ok();
                    return Err(e);
                }
            }

            info!(version_id = %version_id, parent_id = ?parent_id, snapshots = persisted.len(), "committed version");

            Ok(CommitResult {
                version_id,
                parent_id,
                diffs,
                snapshots: persisted,
            })
        }
        .instrument(span)
        .await
    }

    /// Per-URL status/header/body diff between two snapshots.
    pub async fn diff_snapshots(&self, base_id: SnapshotId, head_id: SnapshotId) -> Result<CombinedFileDiff> {
        let head = self
            .store
            .snapshot_by_id(head_id)
            .await?
            .ok_or_else(|| store::map_not_found("snapshot", head_id))?;
        let base = self.store.snapshot_by_id(base_id).await?;

        let head_bytes = self.read_blob(&head.blob_sha256).await?;
        let base_bytes = match &base {
            Some(b) => Some(self.read_blob(&b.blob_sha256).await?),
            None => None,
        };

        let headers = diff::diff_headers(
            base.as_ref().map(|b| &b.headers).unwrap_or(&Headers::new()),
            &head.headers,
            &self.config.sensitive_header_names,
        );
        let body = diff::diff_body(base_bytes.as_deref().unwrap_or(&[]), &head_bytes);

        Ok(CombinedFileDiff {
            url: head.url.clone(),
            base_snapshot_id: base.as_ref().map(|b| b.id),
            head_snapshot_id: head.id,
            status_code_changed: base.as_ref().map(|b| b.status_code) != Some(head.status_code),
            base_status_code: base.as_ref().map(|b| b.status_code),
            head_status_code: head.status_code,
            headers,
            body,
        })
    }

    async fn read_blob(&self, sha256: &str) -> Result<Vec<u8>> {
        let blobs = self.blobs.clone();
        let id = moku_blobstore::BlobId::from_hex(sha256.to_string());
        let bytes = tokio::task::spawn_blocking(move || blobs.get(&id))
            .await
            .map_err(|e| TrackerError::Commit(e.to_string()))??;
        Ok(bytes)
    }

    /// Score every snapshot in `commit_result` and persist the attribution.
    /// Per-snapshot failures are logged and skipped; the batch
    /// is never rolled back for a scoring failure, and each snapshot's
    /// scoring happens in its own transaction.
    pub async fn score_and_attribute(&self, commit_result: &CommitResult) -> Result<()> {
        let span = info_span!("score_and_attribute", version_id = %commit_result.version_id);
        async {
            for snapshot in &commit_result.snapshots {
                if let Err(e) = self.score_one_snapshot(snapshot).await {
                    warn!(url = %snapshot.url, snapshot_id = %snapshot.id, error = %e, "scoring failed, skipping snapshot");
                }
            }
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn score_one_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let body = self.read_blob(&snapshot.blob_sha256).await?;
        let score = self
            .assessor
            .assess(
                &snapshot.url,
                snapshot.id,
                snapshot.version_id,
                snapshot.status_code,
                &snapshot.headers,
                &body,
            )
            .await
            .map_err(|e| TrackerError::Commit(e.to_string()))?;

        let mut tx = self.store.begin().await?;
        match TrackerStore::insert_score_result(&mut tx, &score).await {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                tx.rollback().await.ok();
                Err(e)
            }
        }
    }

    pub async fn get_score_result_from_snapshot_id(
        &self,
        snapshot_id: SnapshotId,
    ) -> Result<Option<moku_assessor::ScoreResult>> {
        self.store.score_result_by_snapshot(snapshot_id).await
    }

    pub async fn get_score_results_from_version_id(
        &self,
        version_id: VersionId,
    ) -> Result<Vec<moku_assessor::ScoreResult>> {
        self.store.score_results_by_version(version_id).await
    }

    /// Security diff between two snapshots' score results.
    /// Requires both snapshots' URLs to match.
    pub async fn get_security_diff(
        &self,
        base_snapshot_id: SnapshotId,
        head_snapshot_id: SnapshotId,
    ) -> Result<SecurityDiff> {
        let base = self
            .store
            .score_result_by_snapshot(base_snapshot_id)
            .await?
            .ok_or_else(|| store::map_not_found("score result for snapshot", base_snapshot_id))?;
        let head = self
            .store
            .score_result_by_snapshot(head_snapshot_id)
            .await?
            .ok_or_else(|| store::map_not_found("score result for snapshot", head_snapshot_id))?;

        if base.url != head.url {
            return Err(TrackerError::Validation(format!(
                "security diff requires matching URLs, got {} and {}",
                base.url, head.url
            )));
        }

        Ok(security_diff::compute(&base, &head))
    }

    /// Per-version rollup of security diffs across every URL present in
    /// base or head, left-outer-joined by URL.
    pub async fn get_security_diff_overview(
        &self,
        base_version_id: VersionId,
        head_version_id: VersionId,
    ) -> Result<SecurityDiffOverview> {
        let base_results = self.store.score_results_by_version(base_version_id).await?;
        let head_results = self.store.score_results_by_version(head_version_id).await?;

        let base_by_url: BTreeMap<String, moku_assessor::ScoreResult> =
            base_results.into_iter().map(|r| (r.url.clone(), r)).collect();
        let head_by_url: BTreeMap<String, moku_assessor::ScoreResult> =
            head_results.into_iter().map(|r| (r.url.clone(), r)).collect();

        let mut urls: Vec<&String> = base_by_url.keys().chain(head_by_url.keys()).collect();
        urls.sort();
        urls.dedup();

        let mut entries = Vec::with_capacity(urls.len());
        for url in urls {
            let base = base_by_url.get(url);
            let head = head_by_url.get(url);

            let score_base = base.map(|r| r.score).unwrap_or(0.0);
            let score_head = head.map(|r| r.score).unwrap_or(0.0);
            let score_delta = score_head - score_base;

            let (attack_surface_changed, num_attack_surface_changes) = match (base, head) {
                (Some(b), Some(h)) => {
                    let diff = security_diff::compute(b, h);
                    (!diff.attack_surface_changes.is_empty(), diff.attack_surface_changes.len())
                }
                _ => (base.is_none() != head.is_none(), 0),
            };

            entries.push(SecurityDiffOverviewEntry {
                file_path: url.clone(),
                base_snapshot_id: base.map(|r| r.snapshot_id),
                head_snapshot_id: head.map(|r| r.snapshot_id),
                score_base,
                score_head,
                score_delta,
                attack_surface_changed,
                num_attack_surface_changes,
                regressed: score_delta > 0.0,
            });
        }

        Ok(SecurityDiffOverview {
            base_version_id,
            head_version_id,
            entries,
        })
    }

    pub async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moku_core::Headers;

    async fn tracker() -> (Tracker, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("site.db");
        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let blob_root = dir.path().join("blobs");
        let tracker = Tracker::open(
            &db_url,
            blob_root,
            moku_core::ProjectId::new(),
            TrackerConfig::default(),
            AssessorConfig::default(),
        )
        .await
        .unwrap();
        (tracker, dir)
    }

    fn snapshot(url: &str, body: &[u8]) -> NewSnapshot {
        NewSnapshot {
            url: url.to_string(),
            status_code: 200,
            headers: Headers::new(),
            body: body.to_vec(),
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn first_commit_has_no_parent_and_sets_head() {
        let (tracker, _dir) = tracker().await;
        assert!(!tracker.head_exists().await.unwrap());

        let result = tracker
            .commit_batch(vec![snapshot("https://example.com/", b"<html></html>")], "first fetch", "fetcher")
            .await
            .unwrap();

        assert!(result.parent_id.is_none());
        assert_eq!(tracker.read_head().await.unwrap(), Some(result.version_id));
        assert_eq!(result.snapshots.len(), 1);
    }

    #[tokio::test]
    async fn second_commit_is_a_child_of_head() {
        let (tracker, _dir) = tracker().await;
        let first = tracker
            .commit_batch(vec![snapshot("https://example.com/", b"v1")], "v1", "fetcher")
            .await
            .unwrap();

        let second = tracker
            .commit_batch(vec![snapshot("https://example.com/", b"v2")], "v2", "fetcher")
            .await
            .unwrap();

        assert_eq!(second.parent_id, Some(first.version_id));
        assert_eq!(tracker.read_head().await.unwrap(), Some(second.version_id));
    }

    #[tokio::test]
    async fn batch_dedups_by_url_and_later_entry_wins() {
        let (tracker, _dir) = tracker().await;
        let result = tracker
            .commit_batch(
                vec![
                    snapshot("https://example.com/", b"old"),
                    snapshot("https://example.com/", b"new"),
                ],
                "dup",
                "fetcher",
            )
            .await
            .unwrap();

        assert_eq!(result.snapshots.len(), 1);
        let body = tracker.read_blob(&result.snapshots[0].blob_sha256).await.unwrap();
        assert_eq!(body, b"new");
    }

    #[tokio::test]
    async fn score_and_attribute_persists_a_readable_score_result() {
        let (tracker, _dir) = tracker().await;
        let result = tracker
            .commit_batch(vec![snapshot("https://example.com/", b"<html></html>")], "first", "fetcher")
            .await
            .unwrap();

        tracker.score_and_attribute(&result).await.unwrap();

        let snapshot_id = result.snapshots[0].id;
        let score = tracker
            .get_score_result_from_snapshot_id(snapshot_id)
            .await
            .unwrap()
            .expect("score result should be persisted");
        assert_eq!(score.snapshot_id, snapshot_id);
        assert_eq!(score.version_id, result.version_id);
    }

    #[tokio::test]
    async fn security_diff_overview_reports_zero_delta_for_unchanged_body() {
        let (tracker, _dir) = tracker().await;
        let first = tracker
            .commit_batch(vec![snapshot("https://example.com/", b"<html></html>")], "v1", "fetcher")
            .await
            .unwrap();
        tracker.score_and_attribute(&first).await.unwrap();

        let second = tracker
            .commit_batch(vec![snapshot("https://example.com/", b"<html></html>")], "v2", "fetcher")
            .await
            .unwrap();
        tracker.score_and_attribute(&second).await.unwrap();

        let overview = tracker
            .get_security_diff_overview(first.version_id, second.version_id)
            .await
            .unwrap();

        assert_eq!(overview.entries.len(), 1);
        assert_eq!(overview.entries[0].score_delta, 0.0);
        assert!(!overview.entries[0].attack_surface_changed);
    }

    #[tokio::test]
    async fn csp_regression_is_reflected_in_overview_as_regressed() {
        let (tracker, _dir) = tracker().await;

        let mut base_headers = Headers::new();
        base_headers.push("Content-Security-Policy", "default-src 'self'");
        let base_snapshot = NewSnapshot {
            url: "https://example.com/".to_string(),
            status_code: 200,
            headers: base_headers,
            body: b"<html></html>".to_vec(),
            fetched_at: Utc::now(),
        };
        let first = tracker.commit_batch(vec![base_snapshot], "v1", "fetcher").await.unwrap();
        tracker.score_and_attribute(&first).await.unwrap();

        let second = tracker
            .commit_batch(vec![snapshot("https://example.com/", b"<html></html>")], "v2", "fetcher")
            .await
            .unwrap();
        tracker.score_and_attribute(&second).await.unwrap();

        let overview = tracker
            .get_security_diff_overview(first.version_id, second.version_id)
            .await
            .unwrap();

        assert_eq!(overview.entries.len(), 1);
        assert!(overview.entries[0].score_delta > 0.0);
        assert!(overview.entries[0].regressed);
    }

    #[tokio::test]
    async fn reopening_site_db_under_a_different_project_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("site.db");
        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let blob_root = dir.path().join("blobs");
        let original = moku_core::ProjectId::new();

        Tracker::open(&db_url, &blob_root, original, TrackerConfig::default(), AssessorConfig::default())
            .await
            .unwrap();

        let mismatched = moku_core::ProjectId::new();
        let err = Tracker::open(&db_url, &blob_root, mismatched, TrackerConfig::default(), AssessorConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));

        let forced = TrackerConfig {
            force_project_id: true,
            ..TrackerConfig::default()
        };
        Tracker::open(&db_url, &blob_root, mismatched, forced, AssessorConfig::default())
            .await
            .unwrap();
    }
}
