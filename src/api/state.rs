use std::sync::Arc;

use crate::config::Config;
use crate::services::{
    providers::{InMemoryCatalog, InMemoryInteractionLog, InteractionLog, ProductCatalog},
    RecommendationApi, RecommendationCache, RecommendationEngine,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub recommendations: Arc<RecommendationApi>,
}

impl AppState {
    pub fn new(recommendations: RecommendationApi) -> Self {
        Self {
            recommendations: Arc::new(recommendations),
        }
    }

    /// Wires engine, cache and API over the given data sources
    pub fn with_sources(
        catalog: Arc<dyn ProductCatalog>,
        interactions: Arc<dyn InteractionLog>,
        config: &Config,
    ) -> Self {
        let engine = Arc::new(RecommendationEngine::new(
            catalog,
            interactions,
            config.scoring_policy(),
        ));
        Self::with_engine(engine, config)
    }

    pub fn with_engine(engine: Arc<RecommendationEngine>, config: &Config) -> Self {
        let cache = RecommendationCache::new(engine.clone(), config.cache_settings());
        Self::new(RecommendationApi::new(
            engine,
            cache,
            config.limit_policy(),
            config.request_timeout(),
        ))
    }

    /// State backed by empty in-process collaborators
    pub fn in_memory(config: &Config) -> Self {
        Self::with_sources(
            Arc::new(InMemoryCatalog::new()),
            Arc::new(InMemoryInteractionLog::new()),
            config,
        )
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::in_memory(&Config::default())
    }
}
