pub mod algorithms;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{EngineError, EngineResult};
pub use models::*;
pub use services::recommendation::RecommendationEngine;
pub use services::store::{InMemoryStore, InteractionStore, PostgresStore};

use anyhow::Result;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: Arc<RecommendationEngine>,
    pub serving: Arc<services::serving::ServingService>,
}

impl AppState {
    /// Connects to Postgres and wires the engine on top of it.
    pub async fn new(config: Config) -> Result<Self> {
        let store = Arc::new(PostgresStore::connect(&config.postgres).await?);
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: Config, store: Arc<dyn InteractionStore>) -> Self {
        let config = Arc::new(config);

        let engine = Arc::new(RecommendationEngine::new(store, config.clone()));

        let serving = Arc::new(services::serving::ServingService::new(
            engine.clone(),
            config.clone(),
        ));

        Self {
            config,
            engine,
            serving,
        }
    }
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
