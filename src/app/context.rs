use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::Registry;
use crate::app::error::{Result, TrendError};
use crate::cache::TieredCache;
use crate::config::Config;
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::{Fetcher, Transport};
use crate::orchestrator::{Orchestrator, Settings};
use crate::store::{SnapshotStore, SqliteStore};

/// Service objects built once at startup and shared by every consumer.
pub struct AppContext {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub orchestrator: Orchestrator,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let workers = config.orchestrator.workers;
        Self::with_workers(config, workers)
    }

    pub fn with_workers(mut config: Config, workers: usize) -> Result<Self> {
        config.orchestrator.workers = workers;
        let db_path = match &config.cache.db_path {
            Some(p) => p.clone(),
            None => Self::default_db_path()?,
        };

        let store = Arc::new(SqliteStore::new(&db_path)?);
        Self::build(config, store)
    }

    /// Snapshot tier in memory; nothing is written to disk.
    pub fn in_memory(config: Config) -> Result<Self> {
        let store = Arc::new(SqliteStore::in_memory()?);
        Self::build(config, store)
    }

    fn build(config: Config, store: Arc<SqliteStore>) -> Result<Self> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(
            HttpFetcher::new(&config.http).map_err(|e| TrendError::Config(e.to_string()))?,
        );
        let transport = Transport::new(fetcher, &config.http);
        let snapshots: Arc<dyn SnapshotStore> = store.clone();
        let cache = Arc::new(TieredCache::new(snapshots));
        let orchestrator = Orchestrator::new(
            Registry::from_config(&config),
            transport,
            cache,
            Settings::from_config(&config),
        );

        Ok(Self {
            config,
            store,
            orchestrator,
        })
    }

    pub fn registry(&self) -> &Registry {
        self.orchestrator.registry()
    }

    fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| TrendError::Config("Could not find data directory".into()))?;
        let trendfeed_dir = data_dir.join("trendfeed");
        std::fs::create_dir_all(&trendfeed_dir)?;
        Ok(trendfeed_dir.join("cache.db"))
    }
}
