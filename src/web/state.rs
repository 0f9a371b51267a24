use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::{DuckDbPool, ViewStore};
use crate::export::{BatchExporter, ExportError};
use crate::interpreter::{DateFilter, Interpreter};
use crate::llm::LlmManager;
use crate::query::{DuckDbStore, QueryCache, QueryStore, ReadOnlyGuard};

/// Shared application state for the web server and the export job
pub struct AppState {
    pub config: AppConfig,
    pub views: ViewStore,
    pub interpreter: Arc<Interpreter>,
    /// Guarded but uncached, for the SQL playground.
    pub playground: Arc<ReadOnlyGuard>,
    pub exporter: Option<BatchExporter>,
    pub llm_manager: LlmManager,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(config: AppConfig, db_pool: DuckDbPool, llm_manager: LlmManager) -> Result<Self, ExportError> {
        let store: Arc<dyn QueryStore> = Arc::new(DuckDbStore::new(db_pool.clone()));
        let guard = Arc::new(ReadOnlyGuard::new(store));
        let cache = Arc::new(QueryCache::new(guard.clone(), config.cache.ttl()));

        let date_filter = DateFilter::new(
            config.render.post_query_date_filter,
            config.render.date_column_hints.clone(),
        );

        let exporter = config
            .export
            .webhook()
            .map(|url| BatchExporter::new(url, config.export.timeout()))
            .transpose()?;

        Ok(Self {
            views: ViewStore::new(db_pool),
            interpreter: Arc::new(Interpreter::new(cache, date_filter)),
            playground: guard,
            exporter,
            llm_manager,
            startup_time: chrono::Utc::now(),
            config,
        })
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        self.interpreter.cache()
    }
}
