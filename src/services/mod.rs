pub mod cache;
pub mod engine;
pub mod providers;
pub mod recommendations;
pub mod scoring;

pub use cache::{CacheSettings, CacheStats, RecommendationCache};
pub use engine::{Clock, FixedClock, RecommendationEngine, Recommender, SystemClock};
pub use recommendations::{
    Homepage, LimitPolicy, RawRecommendationRequest, RecommendationApi, ServiceStats,
};
pub use scoring::ScoringPolicy;
