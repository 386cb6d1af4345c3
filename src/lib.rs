pub mod algorithms;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::{Config, InterestBackend};
pub use error::{EngineError, EngineResult};
pub use models::*;

use anyhow::Result;
use services::discovery::DiscoveryService;
use services::interest::InterestProfiler;
use services::recommendation::RecommendationService;
use services::similarity::SimilarityEstimator;
use services::store::{InterestStore, MemoryStore, RedisInterestStore};
use services::tracker::BehaviorTracker;
use services::worker::RecommendationWorker;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<MemoryStore>,
    pub tracker: Arc<BehaviorTracker>,
    pub similarity: Arc<SimilarityEstimator>,
    pub profiler: Arc<InterestProfiler>,
    pub recommendation_service: Arc<RecommendationService>,
    pub discovery: Arc<DiscoveryService>,
    pub worker: Arc<RecommendationWorker>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let interests: Arc<dyn InterestStore> = match config.storage.interest_backend {
            InterestBackend::Memory => store.clone(),
            InterestBackend::Redis => {
                let client = redis::Client::open(config.redis.url.as_str())?;
                info!("Using Redis interest store at {}", config.redis.url);
                Arc::new(RedisInterestStore::new(client, config.redis.ttl_seconds))
            }
        };
        Ok(Self::with_stores(config, store, interests))
    }

    /// Wires every service over `store`, with interests kept in `interests`.
    pub fn with_stores(config: Config, store: Arc<MemoryStore>, interests: Arc<dyn InterestStore>) -> Self {
        let config = Arc::new(config);

        let profiler = Arc::new(InterestProfiler::new(
            store.clone(),
            store.clone(),
            interests.clone(),
            config.clone(),
        ));

        let similarity = Arc::new(SimilarityEstimator::new(
            store.clone(),
            store.clone(),
            config.clone(),
        ));

        let recommendation_service = Arc::new(RecommendationService::new(
            store.clone(),
            interests,
            store.clone(),
            store.clone(),
            config.clone(),
        ));

        let tracker = Arc::new(BehaviorTracker::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            profiler.clone(),
            config.clone(),
        ));

        let discovery = Arc::new(DiscoveryService::new(store.clone(), config.clone()));

        let worker = Arc::new(RecommendationWorker::new(
            similarity.clone(),
            profiler.clone(),
            recommendation_service.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            config.clone(),
        ));

        Self {
            config,
            store,
            tracker,
            similarity,
            profiler,
            recommendation_service,
            discovery,
            worker,
        }
    }

    pub fn in_memory(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::with_stores(config, store.clone(), store)
    }
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
