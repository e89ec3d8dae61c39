//! Lazy, single-flight, per-website component cache. Opening a tracker is
//! expensive (SQLite + blob-store root); `SiteComponentsCache` makes sure two
//! jobs racing to touch the same website end up sharing one `SiteComponents`
//! instance instead of each opening their own.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};

use moku_core::config::Config;
use moku_core::WebsiteId;
use moku_index::{CanonicalizeOptions, EndpointIndex};
use moku_registry::Website;
use moku_tracker::Tracker;
use moku_webclient::WebClient;
use tokio::sync::OnceCell;
use tracing::info;

use crate::error::Result;

pub struct SiteComponents {
    pub tracker: Arc<Tracker>,
    pub index: Arc<EndpointIndex>,
    pub fetcher: Arc<moku_fetcher::Fetcher>,
    pub webclient: Arc<dyn WebClient>,
}

impl SiteComponents {
    async fn open(website: &Website, config: &Config) -> Result<Self> {
        let storage_path = Path::new(&website.storage_path);
        let db_path = storage_path.join("site.db");
        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let blob_root = storage_path.join("blobs");

        let tracker = Arc::new(
            Tracker::open(
                &db_url,
                blob_root,
                website.project_id,
                config.tracker.clone(),
                config.assessor.clone(),
            )
            .await?,
        );

        let url_opts = CanonicalizeOptions::from(&config.url);
        let index = Arc::new(EndpointIndex::open(&db_url, website.id, url_opts).await?);

        let webclient = moku_webclient::factory::new(config.webclient_backend);
        let fetcher = Arc::new(moku_fetcher::Fetcher::new(
            webclient.clone(),
            index.clone(),
            tracker.clone(),
            config.fetcher.clone(),
        ));

        info!(website_id = %website.id, origin = %website.origin, "opened site components");
        Ok(Self {
            tracker,
            index,
            fetcher,
            webclient,
        })
    }

    pub async fn close(&self) -> Result<()> {
        self.tracker.close().await?;
        self.webclient.close().await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct SiteComponentsCache {
    cells: StdMutex<HashMap<WebsiteId, Arc<OnceCell<Arc<SiteComponents>>>>>,
}

impl SiteComponentsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `website`'s components, constructing them on first reference.
    /// Concurrent callers for the same website id share one construction
    /// (`OnceCell::get_or_try_init`), guaranteeing the instances returned are
    /// the same `Arc`.
    pub async fn get_or_open(&self, website: &Website, config: &Config) -> Result<Arc<SiteComponents>> {
        let cell = {
            let mut cells = self.cells.lock().expect("site components cache lock poisoned");
            cells.entry(website.id).or_insert_with(|| Arc::new(OnceCell::new())).clone()
        };

        let components = cell
            .get_or_try_init(|| async { SiteComponents::open(website, config).await.map(Arc::new) })
            .await?;
        Ok(components.clone())
    }

    /// Close every component that was actually constructed and drop the
    /// cache.
    pub async fn close_all(&self) {
        let cells: Vec<_> = {
            let mut cells = self.cells.lock().expect("site components cache lock poisoned");
            cells.drain().map(|(_, v)| v).collect()
        };
        for cell in cells {
            if let Some(components) = cell.get() {
                if let Err(e) = components.close().await {
                    tracing::warn!(error = %e, "failed to close site components");
                }
            }
        }
    }
}
