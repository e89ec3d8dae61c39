//! Endpoint index: canonical-URL deduplication and status
//! tracking, backed by the site database.

pub mod canonicalize;
pub mod endpoint;
pub mod error;

pub use canonicalize::{canonicalize as canonicalize_url, CanonicalizeOptions};
pub use endpoint::{Endpoint, EndpointStatus};
pub use error::{IndexError, Result};

use std::str::FromStr;

use chrono::{DateTime, Utc};
use moku_core::WebsiteId;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

#[derive(sqlx::FromRow)]
struct EndpointRow {
    canonical_url: String,
    website_id: String,
    status: String,
    source: String,
    discovered_at: String,
    last_fetched_at: Option<String>,
}

impl EndpointRow {
    fn into_endpoint(self) -> Endpoint {
        Endpoint {
            canonical_url: self.canonical_url,
            website_id: WebsiteId::from_str(&self.website_id).unwrap_or_default(),
            status: EndpointStatus::from_str(&self.status).unwrap_or(EndpointStatus::New),
            source: self.source,
            discovered_at: parse_ts(&self.discovered_at),
            last_fetched_at: self.last_fetched_at.as_deref().map(parse_ts),
        }
    }
}

async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS endpoints (
            canonical_url TEXT PRIMARY KEY,
            website_id TEXT NOT NULL,
            status TEXT NOT NULL,
            source TEXT NOT NULL,
            discovered_at TEXT NOT NULL,
            last_fetched_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_endpoints_status ON endpoints (status)")
        .execute(pool)
        .await?;
    Ok(())
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub struct EndpointIndex {
    pool: SqlitePool,
    website_id: WebsiteId,
    url_opts: CanonicalizeOptions,
}

impl EndpointIndex {
    /// Open the index against `db_url`. The `endpoints` table is part of
    /// the site database's own schema (created by `moku-tracker`'s tracked
    /// migrations, since both crates open the same `site.db`); this just
    /// makes sure the table is there when the index is opened on its own,
    /// via plain idempotent DDL rather than a second migration set racing
    /// the tracker's for the same version-tracking table.
    pub async fn open(
        db_url: &str,
        website_id: WebsiteId,
        url_opts: CanonicalizeOptions,
    ) -> Result<Self> {
        let pool = SqlitePoolOptions::new().connect(db_url).await?;
        ensure_schema(&pool).await?;
        Ok(Self {
            pool,
            website_id,
            url_opts,
        })
    }

    pub fn with_pool(pool: SqlitePool, website_id: WebsiteId, url_opts: CanonicalizeOptions) -> Self {
        Self {
            pool,
            website_id,
            url_opts,
        }
    }

    /// Canonicalize and insert any URLs not already present, defaulting their
    /// status to `new`. Returns the canonical URLs that were newly added
    /// (URLs already in the index are silently skipped, not errors).
    pub async fn add_endpoints(&self, urls: &[String], source: &str) -> Result<Vec<String>> {
        let mut added = Vec::new();
        let now = Utc::now().to_rfc3339();

        for raw in urls {
            let Some(canonical) = canonicalize::canonicalize(raw, &self.url_opts) else {
                debug!(url = raw.as_str(), "skipping unparseable URL");
                continue;
            };

            let result = sqlx::query(
                r#"
                INSERT INTO endpoints (canonical_url, website_id, status, source, discovered_at, last_fetched_at)
                VALUES (?1, ?2, 'new', ?3, ?4, NULL)
                ON CONFLICT(canonical_url) DO NOTHING
                "#,
            )
            .bind(&canonical)
            .bind(self.website_id.to_string())
            .bind(source)
            .bind(&now)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                added.push(canonical);
            }
        }

        info!(added = added.len(), total = urls.len(), source, "endpoints added");
        Ok(added)
    }

    /// List endpoints by status. An empty string or `"*"` matches any status.
    pub async fn list_endpoints(&self, status: &str, limit: Option<usize>) -> Result<Vec<Endpoint>> {
        let any = status.is_empty() || status == "*";
        let limit = limit.filter(|l| *l > 0).map(|l| l as i64).unwrap_or(-1);

        let rows: Vec<EndpointRow> = if any {
            sqlx::query_as(
                "SELECT canonical_url, website_id, status, source, discovered_at, last_fetched_at \
                 FROM endpoints WHERE website_id = ?1 ORDER BY discovered_at ASC LIMIT ?2",
            )
            .bind(self.website_id.to_string())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as(
                "SELECT canonical_url, website_id, status, source, discovered_at, last_fetched_at \
                 FROM endpoints WHERE website_id = ?1 AND status = ?2 ORDER BY discovered_at ASC LIMIT ?3",
            )
            .bind(self.website_id.to_string())
            .bind(status)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(rows.into_iter().map(EndpointRow::into_endpoint).collect())
    }

    /// Update an endpoint's status (used by the fetcher after each attempt).
    pub async fn mark(&self, endpoint_url: &str, new_status: EndpointStatus, ts: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE endpoints SET status = ?1, last_fetched_at = ?2 WHERE canonical_url = ?3 AND website_id = ?4",
        )
        .bind(new_status.as_str())
        .bind(ts.to_rfc3339())
        .bind(endpoint_url)
        .bind(self.website_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as c FROM endpoints WHERE website_id = ?1")
            .bind(self.website_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("c"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn index() -> (EndpointIndex, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("site.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let idx = EndpointIndex::open(&url, WebsiteId::new(), CanonicalizeOptions::default())
            .await
            .unwrap();
        (idx, dir)
    }

    #[tokio::test]
    async fn add_endpoints_canonicalizes_and_dedupes() {
        let (idx, _dir) = index().await;
        let added = idx
            .add_endpoints(
                &[
                    "https://example.com/a".to_string(),
                    "https://EXAMPLE.com/a/".to_string(),
                ],
                "seed",
            )
            .await
            .unwrap();
        // Both canonicalize to the same URL ("https://example.com/a"); second is a dup.
        assert_eq!(added.len(), 1);
        assert_eq!(idx.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_endpoints_filters_by_status() {
        let (idx, _dir) = index().await;
        idx.add_endpoints(&["https://example.com/a".to_string()], "seed")
            .await
            .unwrap();

        let new = idx.list_endpoints("new", None).await.unwrap();
        assert_eq!(new.len(), 1);

        idx.mark("https://example.com/a", EndpointStatus::Fetched, Utc::now())
            .await
            .unwrap();

        let new = idx.list_endpoints("new", None).await.unwrap();
        assert!(new.is_empty());
        let fetched = idx.list_endpoints("fetched", None).await.unwrap();
        assert_eq!(fetched.len(), 1);
    }

    #[tokio::test]
    async fn empty_index_fetch_is_a_no_op() {
        let (idx, _dir) = index().await;
        let any = idx.list_endpoints("*", None).await.unwrap();
        assert!(any.is_empty());
    }
}
