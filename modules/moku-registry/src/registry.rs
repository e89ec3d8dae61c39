//! The registry: opaque project/website metadata storage keyed
//! by slug, backed by `storage_root/registry.db`. Out of the core pipeline's
//! concern, but the orchestrator depends on it to resolve a website's storage
//! path before opening its `SiteComponents`.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use moku_core::{ProjectId, WebsiteId};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::{RegistryError, Result};
use crate::storage::website_storage_path;
use crate::types::{Project, Website};

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: String,
    slug: String,
    name: String,
    description: String,
    created_at: String,
}

impl ProjectRow {
    fn into_project(self) -> Project {
        Project {
            id: ProjectId::from_str(&self.id).unwrap_or_default(),
            slug: self.slug,
            name: self.name,
            description: self.description,
            created_at: parse_ts(&self.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct WebsiteRow {
    id: String,
    project_id: String,
    slug: String,
    origin: String,
    storage_path: String,
    created_at: String,
    last_seen_at: Option<String>,
}

impl WebsiteRow {
    fn into_website(self) -> Website {
        Website {
            id: WebsiteId::from_str(&self.id).unwrap_or_default(),
            project_id: ProjectId::from_str(&self.project_id).unwrap_or_default(),
            slug: self.slug,
            origin: self.origin,
            storage_path: self.storage_path,
            created_at: parse_ts(&self.created_at),
            last_seen_at: self.last_seen_at.as_deref().map(parse_ts),
        }
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub struct Registry {
    pool: SqlitePool,
    storage_root: PathBuf,
}

impl Registry {
    /// Open (creating if absent) `storage_root/registry.db`.
    pub async fn open(storage_root: impl Into<PathBuf>) -> Result<Self> {
        let storage_root = storage_root.into();
        std::fs::create_dir_all(&storage_root).map_err(|e| RegistryError::Validation(e.to_string()))?;
        let db_path = storage_root.join("registry.db");
        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new().connect(&db_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool, storage_root })
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub async fn create_project(
        &self,
        slug: &str,
        name: &str,
        description: &str,
    ) -> Result<Project> {
        if slug.trim().is_empty() {
            return Err(RegistryError::Validation("project slug must not be empty".to_string()));
        }
        if self.get_project_by_slug(slug).await?.is_some() {
            return Err(RegistryError::Conflict(slug.to_string()));
        }

        let project = Project {
            id: ProjectId::new(),
            slug: slug.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO projects (id, slug, name, description, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(project.id.to_string())
        .bind(&project.slug)
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        info!(project_id = %project.id, slug = %project.slug, "project created");
        Ok(project)
    }

    pub async fn get_project_by_slug(&self, slug: &str) -> Result<Option<Project>> {
        let row: Option<ProjectRow> = sqlx::query_as(
            "SELECT id, slug, name, description, created_at FROM projects WHERE slug = ?1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ProjectRow::into_project))
    }

    pub async fn get_project(&self, id: ProjectId) -> Result<Project> {
        let row: Option<ProjectRow> = sqlx::query_as(
            "SELECT id, slug, name, description, created_at FROM projects WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(ProjectRow::into_project)
            .ok_or_else(|| RegistryError::NotFound(format!("project {id}")))
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let rows: Vec<ProjectRow> = sqlx::query_as(
            "SELECT id, slug, name, description, created_at FROM projects ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ProjectRow::into_project).collect())
    }

    /// Create a website under a project. `slug` must be unique within the
    /// project. `storage_path` is derived deterministically from
    /// the project slug and origin and the directory is created
    /// eagerly so `SiteComponents` can open `site.db`/`blobs/` beneath it.
    pub async fn create_website(&self, project_id: ProjectId, slug: &str, origin: &str) -> Result<Website> {
        if slug.trim().is_empty() || origin.trim().is_empty() {
            return Err(RegistryError::Validation("website slug and origin must not be empty".to_string()));
        }
        let project = self.get_project(project_id).await?;
        if self.get_website_by_slug(project_id, slug).await?.is_some() {
            return Err(RegistryError::Conflict(slug.to_string()));
        }

        let storage_path = website_storage_path(&self.storage_root, &project.slug, origin);
        std::fs::create_dir_all(&storage_path).map_err(|e| RegistryError::Validation(e.to_string()))?;

        let website = Website {
            id: WebsiteId::new(),
            project_id,
            slug: slug.to_string(),
            origin: origin.to_string(),
            storage_path: storage_path.display().to_string(),
            created_at: Utc::now(),
            last_seen_at: None,
        };

        sqlx::query(
            "INSERT INTO websites (id, project_id, slug, origin, storage_path, created_at, last_seen_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
        )
        .bind(website.id.to_string())
        .bind(website.project_id.to_string())
        .bind(&website.slug)
        .bind(&website.origin)
        .bind(&website.storage_path)
        .bind(website.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        info!(website_id = %website.id, origin = %website.origin, "website created");
        Ok(website)
    }

    pub async fn get_website(&self, id: WebsiteId) -> Result<Website> {
        let row: Option<WebsiteRow> = sqlx::query_as(
            "SELECT id, project_id, slug, origin, storage_path, created_at, last_seen_at \
             FROM websites WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(WebsiteRow::into_website)
            .ok_or_else(|| RegistryError::NotFound(format!("website {id}")))
    }

    pub async fn get_website_by_slug(&self, project_id: ProjectId, slug: &str) -> Result<Option<Website>> {
        let row: Option<WebsiteRow> = sqlx::query_as(
            "SELECT id, project_id, slug, origin, storage_path, created_at, last_seen_at \
             FROM websites WHERE project_id = ?1 AND slug = ?2",
        )
        .bind(project_id.to_string())
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(WebsiteRow::into_website))
    }

    pub async fn list_websites(&self, project_id: ProjectId) -> Result<Vec<Website>> {
        let rows: Vec<WebsiteRow> = sqlx::query_as(
            "SELECT id, project_id, slug, origin, storage_path, created_at, last_seen_at \
             FROM websites WHERE project_id = ?1 ORDER BY created_at ASC",
        )
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(WebsiteRow::into_website).collect())
    }

    /// Record that a website was just acted on (called by the orchestrator
    /// after a fetch job completes).
    pub async fn touch_last_seen(&self, website_id: WebsiteId, ts: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE websites SET last_seen_at = ?1 WHERE id = ?2")
            .bind(ts.to_rfc3339())
            .bind(website_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry() -> (Registry, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path()).await.unwrap();
        (registry, dir)
    }

    #[tokio::test]
    async fn create_project_then_find_by_slug() {
        let (registry, _dir) = registry().await;
        let created = registry.create_project("acme", "Acme Corp", "desc").await.unwrap();
        let found = registry.get_project_by_slug("acme").await.unwrap().unwrap();
        assert_eq!(created.id, found.id);
    }

    #[tokio::test]
    async fn duplicate_project_slug_is_a_conflict() {
        let (registry, _dir) = registry().await;
        registry.create_project("acme", "Acme Corp", "desc").await.unwrap();
        let err = registry.create_project("acme", "Acme Again", "desc").await.unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));
    }

    #[tokio::test]
    async fn website_slug_is_unique_within_project_only() {
        let (registry, _dir) = registry().await;
        let p1 = registry.create_project("acme", "Acme", "").await.unwrap();
        let p2 = registry.create_project("globex", "Globex", "").await.unwrap();

        registry.create_website(p1.id, "main", "https://acme.example.com").await.unwrap();
        // Same slug, different project: allowed.
        registry.create_website(p2.id, "main", "https://globex.example.com").await.unwrap();

        let err = registry
            .create_website(p1.id, "main", "https://acme-2.example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));
    }

    #[tokio::test]
    async fn website_storage_path_is_created_on_disk() {
        let (registry, _dir) = registry().await;
        let project = registry.create_project("acme", "Acme", "").await.unwrap();
        let website = registry
            .create_website(project.id, "main", "https://example.com")
            .await
            .unwrap();
        assert!(Path::new(&website.storage_path).is_dir());
    }
}
