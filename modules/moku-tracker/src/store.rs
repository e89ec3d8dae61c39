//! Raw SQLite access. Internal to the tracker crate — `tracker.rs` is the
//! public API; this module only knows how to read and write rows.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use moku_assessor::{AttackSurface, EvidenceItem, ScoreResult};
use moku_core::{EvidenceItemId, Headers, ScoreResultId, SnapshotId, VersionId};
use sqlx::{Row, SqlitePool};

use crate::error::{Result, TrackerError};
use crate::types::{Snapshot, Version};

#[derive(Clone)]
pub(crate) struct TrackerStore {
    pool: SqlitePool,
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_version_id(s: &str) -> VersionId {
    VersionId::from_str(s).unwrap_or_default()
}

fn parse_snapshot_id(s: &str) -> SnapshotId {
    SnapshotId::from_str(s).unwrap_or_default()
}

/// First two hex characters, matching `moku-blobstore`'s shard layout, so
/// the `snapshots.file_path` column is resolvable without importing the
/// blob store's private path logic.
pub(crate) fn blob_relative_path(sha256_hex: &str) -> String {
    let shard = &sha256_hex[..sha256_hex.len().min(2)];
    format!("{shard}/{sha256_hex}")
}

impl TrackerStore {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub(crate) async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub(crate) async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    pub(crate) async fn read_meta(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM meta WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    pub(crate) async fn write_meta(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO meta (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub(crate) async fn read_head(&self) -> Result<Option<VersionId>> {
        let row = sqlx::query("SELECT version_id FROM head WHERE k = 'HEAD'")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| parse_version_id(r.get::<String, _>("version_id").as_str())))
    }

    pub(crate) async fn set_head(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version_id: VersionId,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO head (k, version_id) VALUES ('HEAD', ?1) \
             ON CONFLICT(k) DO UPDATE SET version_id = excluded.version_id",
        )
        .bind(version_id.to_string())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub(crate) async fn insert_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: &Version,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO versions (id, parent_id, message, author, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(version.id.to_string())
        .bind(version.parent_id.map(|p| p.to_string()))
        .bind(&version.message)
        .bind(&version.author)
        .bind(version.timestamp.to_rfc3339())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub(crate) async fn parent_of(&self, version_id: VersionId) -> Result<Option<VersionId>> {
        let row = sqlx::query("SELECT parent_id FROM versions WHERE id = ?1")
            .bind(version_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => Ok(r.get::<Option<String>, _>("parent_id").map(|s| parse_version_id(&s))),
            None => Ok(None),
        }
    }

    pub(crate) async fn insert_snapshot(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        snapshot: &Snapshot,
    ) -> Result<()> {
        let headers_json = serde_json::to_string(&snapshot.headers)?;
        sqlx::query(
            "INSERT INTO snapshots (id, version_id, url, status_code, headers_json, blob_sha256, file_path, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(snapshot.id.to_string())
        .bind(snapshot.version_id.to_string())
        .bind(&snapshot.url)
        .bind(snapshot.status_code as i64)
        .bind(headers_json)
        .bind(&snapshot.blob_sha256)
        .bind(blob_relative_path(&snapshot.blob_sha256))
        .bind(snapshot.fetched_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub(crate) async fn snapshots_for_version(&self, version_id: VersionId) -> Result<Vec<Snapshot>> {
        let rows = sqlx::query(
            "SELECT id, version_id, url, status_code, headers_json, blob_sha256, created_at \
             FROM snapshots WHERE version_id = ?1",
        )
        .bind(version_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_snapshot).collect()
    }

    pub(crate) async fn snapshot_by_url_and_version(
        &self,
        url: &str,
        version_id: VersionId,
    ) -> Result<Option<Snapshot>> {
        let row = sqlx::query(
            "SELECT id, version_id, url, status_code, headers_json, blob_sha256, created_at \
             FROM snapshots WHERE url = ?1 AND version_id = ?2",
        )
        .bind(url)
        .bind(version_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_snapshot).transpose()
    }

    pub(crate) async fn snapshot_by_id(&self, id: SnapshotId) -> Result<Option<Snapshot>> {
        let row = sqlx::query(
            "SELECT id, version_id, url, status_code, headers_json, blob_sha256, created_at \
             FROM snapshots WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_snapshot).transpose()
    }

    fn row_to_snapshot(row: sqlx::sqlite::SqliteRow) -> Result<Snapshot> {
        let headers_json: String = row.get("headers_json");
        let headers: Headers = serde_json::from_str(&headers_json)?;
        Ok(Snapshot {
            id: parse_snapshot_id(row.get::<String, _>("id").as_str()),
            version_id: parse_version_id(row.get::<String, _>("version_id").as_str()),
            url: row.get("url"),
            status_code: row.get::<i64, _>("status_code") as u16,
            headers,
            blob_sha256: row.get("blob_sha256"),
            fetched_at: parse_ts(row.get::<String, _>("created_at").as_str()),
        })
    }

    /// Persist one score result plus its evidence items and their locations,
    /// all within the caller's transaction (each snapshot's
    /// scoring runs in its own transaction).
    pub(crate) async fn insert_score_result(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        score: &ScoreResult,
    ) -> Result<()> {
        let matched_rules_json = serde_json::to_string(&score.matched_rules)?;
        let raw_features_json = serde_json::to_string(&score.raw_features)?;
        let meta_json = serde_json::to_string(&score.attack_surface)?;
        let evidence_json = serde_json::to_string(&score.evidence)?;
        let contrib_by_rule_json = serde_json::to_string(&score.contrib_by_rule)?;

        sqlx::query(
            "INSERT INTO score_results \
             (id, snapshot_id, version_id, url, score, normalized, confidence, scoring_version, \
              created_at, score_json, matched_rules_json, meta_json, raw_features_json, contrib_by_rule_json) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )
        .bind(score.id.to_string())
        .bind(score.snapshot_id.to_string())
        .bind(score.version_id.to_string())
        .bind(&score.url)
        .bind(score.score)
        .bind(score.normalized as i64)
        .bind(score.confidence)
        .bind(&score.scoring_version)
        .bind(score.timestamp.to_rfc3339())
        .bind(evidence_json)
        .bind(matched_rules_json)
        .bind(meta_json)
        .bind(raw_features_json)
        .bind(contrib_by_rule_json)
        .execute(&mut **tx)
        .await?;

        for item in &score.evidence {
            sqlx::query(
                "INSERT INTO evidence_items \
                 (id, score_result_id, evidence_uid, item_key, rule_id, severity, description, value_json, contribution) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .bind(item.id.to_string())
            .bind(score.id.to_string())
            .bind(item.id.to_string())
            .bind(&item.key)
            .bind(&item.rule_id)
            .bind(item.severity.as_str())
            .bind(&item.description)
            .bind(serde_json::to_string(&item.value)?)
            .bind(item.contribution)
            .execute(&mut **tx)
            .await?;

            for loc in &item.locations {
                sqlx::query(
                    "INSERT INTO evidence_locations \
                     (id, evidence_item_id, location_type, snapshot_id, selector, xpath, regex, file_path, \
                      dom_index, parent_dom_index, byte_start, byte_end, line_start, line_end, \
                      header_name, cookie_name, param_name, note) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                )
                .bind(uuid::Uuid::new_v4().to_string())
                .bind(item.id.to_string())
                .bind(&loc.location_type)
                .bind(loc.snapshot_id.to_string())
                .bind(&loc.selector)
                .bind(&loc.xpath)
                .bind(&loc.regex)
                .bind(&loc.file_path)
                .bind(loc.dom_index.map(|v| v as i64))
                .bind(loc.parent_dom_index.map(|v| v as i64))
                .bind(loc.byte_start.map(|v| v as i64))
                .bind(loc.byte_end.map(|v| v as i64))
                .bind(loc.line_start.map(|v| v as i64))
                .bind(loc.line_end.map(|v| v as i64))
                .bind(&loc.header_name)
                .bind(&loc.cookie_name)
                .bind(&loc.param_name)
                .bind(&loc.note)
                .execute(&mut **tx)
                .await?;
            }
        }

        Ok(())
    }

    pub(crate) async fn score_result_by_snapshot(&self, snapshot_id: SnapshotId) -> Result<Option<ScoreResult>> {
        let row = sqlx::query(
            "SELECT id, snapshot_id, version_id, url, score, normalized, confidence, scoring_version, \
             created_at, score_json, matched_rules_json, meta_json, raw_features_json, contrib_by_rule_json \
             FROM score_results WHERE snapshot_id = ?1",
        )
        .bind(snapshot_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_score_result).transpose()
    }

    pub(crate) async fn score_results_by_version(&self, version_id: VersionId) -> Result<Vec<ScoreResult>> {
        let rows = sqlx::query(
            "SELECT id, snapshot_id, version_id, url, score, normalized, confidence, scoring_version, \
             created_at, score_json, matched_rules_json, meta_json, raw_features_json, contrib_by_rule_json \
             FROM score_results WHERE version_id = ?1",
        )
        .bind(version_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_score_result).collect()
    }

    fn row_to_score_result(row: sqlx::sqlite::SqliteRow) -> Result<ScoreResult> {
        let evidence_json: String = row.get("score_json");
        let evidence: Vec<EvidenceItem> = serde_json::from_str(&evidence_json)?;
        let matched_rules_json: String = row.get("matched_rules_json");
        let matched_rules: Vec<String> = serde_json::from_str(&matched_rules_json)?;
        let meta_json: String = row.get("meta_json");
        let attack_surface: AttackSurface = serde_json::from_str(&meta_json)?;
        let raw_features_json: String = row.get("raw_features_json");
        let raw_features = serde_json::from_str(&raw_features_json)?;
        let contrib_by_rule_json: String = row.get("contrib_by_rule_json");
        let contrib_by_rule = serde_json::from_str(&contrib_by_rule_json)?;

        Ok(ScoreResult {
            id: ScoreResultId::from_str(row.get::<String, _>("id").as_str()).unwrap_or_default(),
            snapshot_id: parse_snapshot_id(row.get::<String, _>("snapshot_id").as_str()),
            version_id: parse_version_id(row.get::<String, _>("version_id").as_str()),
            url: row.get("url"),
            score: row.get("score"),
            normalized: row.get::<i64, _>("normalized") as u8,
            confidence: row.get("confidence"),
            scoring_version: row.get("scoring_version"),
            evidence,
            matched_rules,
            raw_features,
            contrib_by_rule,
            attack_surface,
            timestamp: parse_ts(row.get::<String, _>("created_at").as_str()),
        })
    }
}

pub(crate) fn map_not_found(label: &str, id: impl std::fmt::Display) -> TrackerError {
    TrackerError::NotFound(format!("{label} {id}"))
}
