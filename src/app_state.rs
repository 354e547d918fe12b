use std::sync::Arc;

use crate::{
    config::Config,
    database::{EavDatabase, EavStore},
    error::AppResult,
    services::RecordService,
    web::views::Views,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EavStore>,
    pub records: RecordService,
    pub views: Arc<Views>,
}

impl AppState {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        // Initialize database
        let database =
            EavDatabase::new(&config.database.url, config.database.max_connections).await?;
        database.init().await?;

        Ok(Self::with_store(Arc::new(database))?)
    }

    pub fn with_store(store: Arc<dyn EavStore>) -> AppResult<Self> {
        Ok(Self {
            records: RecordService::new(store.clone()),
            views: Arc::new(Views::new()?),
            store,
        })
    }
}
