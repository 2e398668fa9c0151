use std::sync::Arc;

use crate::config::Config;
use crate::errors::AppResult;
use crate::services::auth::TokenKeys;
use crate::services::{Database, JobQueue, PageRenderer};

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub jobs: JobQueue,
    pub keys: TokenKeys,
    pub pages: PageRenderer,
}

impl AppState {
    pub fn new(config: Config, db: Database, jobs: JobQueue) -> AppResult<Self> {
        let keys = TokenKeys::new(&config.auth.secret_key, &config.auth.algorithm)?;
        let pages = PageRenderer::new(config.storage.templates_dir.clone());
        Ok(Self {
            db,
            config: Arc::new(config),
            jobs,
            keys,
            pages,
        })
    }
}
