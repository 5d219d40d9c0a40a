use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    models::{
        InteractionEvent, Product, ProductId, Reason, Recommendation, RecommendationRequest,
        RecommendationResult, Strategy, UserId,
    },
    services::{
        cache::{CacheStats, RecommendationCache},
        engine::RecommendationEngine,
    },
};

/// Items per section of the homepage bundle
const HOMEPAGE_LIMIT: usize = 8;

/// Default and maximum result counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitPolicy {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for LimitPolicy {
    fn default() -> Self {
        Self {
            default_limit: 6,
            max_limit: 50,
        }
    }
}

/// A recommendation query as received from a caller, before validation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRecommendationRequest {
    pub strategy: Option<String>,
    pub subject: Option<String>,
    pub limit: Option<String>,
}

/// Sections shown on the marketplace homepage
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Homepage {
    pub for_you: RecommendationResult,
    pub trending: RecommendationResult,
    pub new_arrivals: Vec<Recommendation>,
}

/// Catalog and interaction totals alongside cache counters
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub total_products: u64,
    pub total_interactions: u64,
    pub total_users: u64,
    pub cache_size: usize,
    pub cache: CacheStats,
}

/// Client-facing recommendation service
///
/// Validates raw requests, serves them through the cache, and turns expected
/// conditions (an unknown product for `similar`) into empty results instead
/// of errors. Holds no state of its own beyond its collaborators.
pub struct RecommendationApi {
    engine: Arc<RecommendationEngine>,
    cache: RecommendationCache,
    limits: LimitPolicy,
    timeout: Duration,
}

impl RecommendationApi {
    pub fn new(
        engine: Arc<RecommendationEngine>,
        cache: RecommendationCache,
        limits: LimitPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            engine,
            cache,
            limits,
            timeout,
        }
    }

    /// Validates and serves a raw recommendation query
    pub async fn handle(&self, raw: RawRecommendationRequest) -> AppResult<RecommendationResult> {
        let request = self.validate(&raw)?;
        self.fetch(request).await
    }

    /// Turns a raw query into a typed request, rejecting anything malformed
    pub fn validate(&self, raw: &RawRecommendationRequest) -> AppResult<RecommendationRequest> {
        let strategy: Strategy = non_empty(&raw.strategy)
            .ok_or_else(|| AppError::InvalidArgument("strategy is required".to_string()))?
            .parse()
            .map_err(AppError::InvalidArgument)?;

        let limit = self.parse_limit(non_empty(&raw.limit))?;
        let subject = non_empty(&raw.subject);

        match strategy {
            Strategy::Similar => Ok(RecommendationRequest::Similar {
                product_id: ProductId(parse_subject(strategy, subject)?),
                limit,
            }),
            Strategy::ForYou => Ok(RecommendationRequest::ForYou {
                user_id: UserId(parse_subject(strategy, subject)?),
                limit,
            }),
            Strategy::Popular => match subject {
                Some(_) => Err(AppError::InvalidArgument(
                    "strategy popular does not take a subject".to_string(),
                )),
                None => Ok(RecommendationRequest::Popular { limit }),
            },
        }
    }

    fn parse_limit(&self, raw: Option<&str>) -> AppResult<usize> {
        let Some(raw) = raw else {
            return Ok(self.limits.default_limit);
        };

        let limit: usize = raw.parse().map_err(|_| {
            AppError::InvalidArgument(format!("limit must be a positive integer, got '{}'", raw))
        })?;

        if limit == 0 || limit > self.limits.max_limit {
            return Err(AppError::InvalidArgument(format!(
                "limit must be between 1 and {}, got {}",
                self.limits.max_limit, limit
            )));
        }

        Ok(limit)
    }

    /// Serves an already validated request through the cache
    pub async fn fetch(&self, request: RecommendationRequest) -> AppResult<RecommendationResult> {
        match self.with_timeout(self.cache.get_or_compute(request)).await {
            Err(AppError::NotFound(msg)) if request.strategy() == Strategy::Similar => {
                tracing::info!(reason = %msg, "Similar requested for unknown product");
                Ok(RecommendationResult::empty(
                    Strategy::Similar,
                    Reason::UnknownProduct,
                ))
            }
            other => other,
        }
    }

    /// Personalized (or anonymous) homepage sections
    pub async fn homepage(&self, user_id: Option<UserId>) -> AppResult<Homepage> {
        let limit = HOMEPAGE_LIMIT.min(self.limits.max_limit);

        let personal = match user_id {
            Some(user_id) if user_id.is_valid() => RecommendationRequest::ForYou { user_id, limit },
            Some(user_id) => {
                return Err(AppError::InvalidArgument(format!(
                    "user must be a positive integer, got {}",
                    user_id
                )))
            }
            None => RecommendationRequest::Popular { limit },
        };

        let (for_you, trending, new_arrivals) = tokio::try_join!(
            self.fetch(personal),
            self.fetch(RecommendationRequest::Popular { limit }),
            self.with_timeout(self.engine.new_arrivals(limit)),
        )?;

        Ok(Homepage {
            for_you,
            trending,
            new_arrivals,
        })
    }

    /// Appends an interaction and drops the user's now-stale `forYou` entries
    ///
    /// Computes already in flight for that user may still cache a result that
    /// predates the event; it ages out within the personal TTL.
    pub async fn record_interaction(&self, event: InteractionEvent) -> AppResult<usize> {
        if !event.user_id.is_valid() {
            return Err(AppError::InvalidArgument(
                "userId must be a positive integer".to_string(),
            ));
        }
        if let Some(weight) = event.weight {
            if !weight.is_finite() || weight < 0.0 {
                return Err(AppError::InvalidArgument(format!(
                    "weight must be a non-negative number, got {}",
                    weight
                )));
            }
        }

        self.engine.catalog().get_product(event.product_id).await?;
        self.engine.interactions().append(event.clone()).await?;

        let invalidated = self.cache.invalidate_user(event.user_id);
        tracing::info!(
            user_id = %event.user_id,
            product_id = %event.product_id,
            kind = %event.kind,
            invalidated,
            "Recorded interaction"
        );

        Ok(invalidated)
    }

    /// Publishes a product to the catalog
    pub async fn publish_product(&self, product: Product) -> AppResult<()> {
        let product_id = product.id;
        self.engine.catalog().publish(product).await?;
        self.cache.invalidate_product(product_id);
        tracing::info!(product_id = %product_id, "Published product");
        Ok(())
    }

    pub async fn stats(&self) -> AppResult<ServiceStats> {
        let catalog = self.engine.catalog();
        let interactions = self.engine.interactions();

        let (total_products, total_interactions, total_users) = self
            .with_timeout(async {
                tokio::try_join!(
                    catalog.count(),
                    interactions.count(),
                    interactions.user_count(),
                )
            })
            .await?;

        let cache = self.cache.stats();
        Ok(ServiceStats {
            total_products,
            total_interactions,
            total_users,
            cache_size: cache.entries,
            cache,
        })
    }

    pub fn clear_cache(&self) -> usize {
        let cleared = self.cache.clear();
        tracing::info!(cleared, "Recommendation cache cleared");
        cleared
    }

    async fn with_timeout<T>(&self, work: impl Future<Output = AppResult<T>>) -> AppResult<T> {
        match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Recommendation request timed out"
                );
                Err(AppError::Unavailable(format!(
                    "recommendations did not complete within {}ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_subject(strategy: Strategy, subject: Option<&str>) -> AppResult<u64> {
    let subject = subject.ok_or_else(|| {
        AppError::InvalidArgument(format!("subject is required for strategy {}", strategy))
    })?;

    match subject.parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(AppError::InvalidArgument(format!(
            "subject must be a positive integer id, got '{}'",
            subject
        ))),
    }
}
