use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use crate::{
    error::{AppError, AppResult},
    models::{
        ProductId, Reason, Recommendation, RecommendationRequest, RecommendationResult, UserId,
    },
    services::{
        providers::{InteractionLog, ProductCatalog},
        scoring::{rank, ScoringPolicy},
    },
};

/// Source of "now" for age-based scoring
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant, for reproducible scoring
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Anything that can turn a validated request into a ranked result
///
/// The cache depends on this seam rather than on the concrete engine so
/// compute calls can be counted and delayed in tests.
#[async_trait::async_trait]
pub trait Recommender: Send + Sync {
    async fn compute(&self, request: RecommendationRequest) -> AppResult<RecommendationResult>;
}

/// Computes ranked candidate lists from catalog and interaction data
///
/// Reads its two collaborators and never writes to them.
pub struct RecommendationEngine {
    catalog: Arc<dyn ProductCatalog>,
    interactions: Arc<dyn InteractionLog>,
    policy: ScoringPolicy,
    clock: Arc<dyn Clock>,
}

impl RecommendationEngine {
    pub fn new(
        catalog: Arc<dyn ProductCatalog>,
        interactions: Arc<dyn InteractionLog>,
        policy: ScoringPolicy,
    ) -> Self {
        Self {
            catalog,
            interactions,
            policy,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn catalog(&self) -> &Arc<dyn ProductCatalog> {
        &self.catalog
    }

    pub fn interactions(&self) -> &Arc<dyn InteractionLog> {
        &self.interactions
    }

    /// Products related to `product_id`
    ///
    /// Candidates share the subject's category or were interacted with by the
    /// same users inside the lookback window. Fails with `NotFound` when the
    /// subject is not in the catalog.
    pub async fn similar(
        &self,
        product_id: ProductId,
        limit: usize,
    ) -> AppResult<Vec<Recommendation>> {
        let subject = self.catalog.get_product(product_id).await?;
        let since = self.clock.now() - self.policy.similar_lookback;

        let (co_occurrences, same_category) = tokio::try_join!(
            self.interactions.co_occurrences(product_id, since),
            self.catalog.list_by_category(&subject.category),
        )?;

        let mut candidates: HashMap<ProductId, (f64, Reason)> = HashMap::new();

        for (other, count) in co_occurrences {
            if other == product_id || count == 0 {
                continue;
            }
            let score = self.policy.co_occurrence_weight * count as f64;
            candidates.insert(other, (score, Reason::CoInteracted));
        }

        for product in same_category {
            if product.id == product_id {
                continue;
            }
            let bonus = self.policy.category_bonus
                + self.policy.price_bonus * subject.price_proximity(&product)
                + self.policy.condition_bonus * subject.condition_proximity(&product);
            let candidate = candidates
                .entry(product.id)
                .or_insert((0.0, Reason::SameCategory));
            candidate.0 += bonus;
        }

        tracing::debug!(
            product_id = %product_id,
            candidates = candidates.len(),
            "Scored similar-item candidates"
        );

        Ok(rank(candidates, limit))
    }

    /// Products personalized to a user's recent history
    ///
    /// A valid user with no history gets exactly the `popular` ranking.
    pub async fn for_you(&self, user_id: UserId, limit: usize) -> AppResult<Vec<Recommendation>> {
        if !user_id.is_valid() {
            return Err(AppError::NotFound(format!("user {}", user_id)));
        }

        let now = self.clock.now();
        let history = self
            .interactions
            .events_for(user_id, now - self.policy.history_window)
            .await?;

        if history.is_empty() {
            tracing::debug!(user_id = %user_id, "No interaction history, falling back to popular");
            return self.popular(limit).await;
        }

        let seen: HashSet<ProductId> = history.iter().map(|e| e.product_id).collect();

        let mut categories: HashMap<ProductId, String> = HashMap::new();
        for product_id in &seen {
            match self.catalog.get_product(*product_id).await {
                Ok(product) => {
                    categories.insert(*product_id, product.category);
                }
                Err(AppError::NotFound(_)) => {
                    tracing::debug!(product_id = %product_id, "Skipping history event for unknown product");
                }
                Err(e) => return Err(e),
            }
        }

        let mut affinity: HashMap<String, f64> = HashMap::new();
        for event in &history {
            if let Some(category) = categories.get(&event.product_id) {
                let strength =
                    self.policy.event_strength(event) * self.policy.decay(event.occurred_at, now);
                *affinity.entry(category.clone()).or_insert(0.0) += strength;
            }
        }

        let popularity = self.popularity_scores(now).await?;
        let max_popularity = popularity.values().copied().fold(0.0, f64::max);
        let popularity_norm = |id: &ProductId| match popularity.get(id) {
            Some(score) if max_popularity > 0.0 => score / max_popularity,
            _ => 0.0,
        };

        let mut candidates: HashMap<ProductId, (f64, Reason)> = HashMap::new();

        let max_affinity = affinity.values().copied().fold(0.0, f64::max);
        if max_affinity > 0.0 {
            for (category, strength) in &affinity {
                for product in self.catalog.list_by_category(category).await? {
                    if seen.contains(&product.id) {
                        continue;
                    }
                    let score = strength / max_affinity
                        + self.policy.popularity_boost * popularity_norm(&product.id);
                    candidates.insert(product.id, (score, Reason::CategoryAffinity));
                }
            }
        }

        for product_id in popularity.keys() {
            if seen.contains(product_id) || candidates.contains_key(product_id) {
                continue;
            }
            let score = self.policy.popularity_boost * popularity_norm(product_id);
            candidates.insert(*product_id, (score, Reason::Popular));
        }

        tracing::debug!(
            user_id = %user_id,
            history = history.len(),
            categories = affinity.len(),
            candidates = candidates.len(),
            "Scored personalized candidates"
        );

        Ok(rank(candidates, limit))
    }

    /// Products ranked by decayed interaction count over the trailing window
    pub async fn popular(&self, limit: usize) -> AppResult<Vec<Recommendation>> {
        let scores = self.popularity_scores(self.clock.now()).await?;
        let candidates = scores
            .into_iter()
            .map(|(id, score)| (id, (score, Reason::Popular)))
            .collect();
        Ok(rank(candidates, limit))
    }

    /// Most recently published products, newer ones scoring higher
    pub async fn new_arrivals(&self, limit: usize) -> AppResult<Vec<Recommendation>> {
        let now = self.clock.now();
        let recent = self.catalog.list_recent(limit).await?;
        let candidates = recent
            .into_iter()
            .map(|p| (p.id, (self.policy.decay(p.created_at, now), Reason::NewArrival)))
            .collect();
        Ok(rank(candidates, limit))
    }

    async fn popularity_scores(&self, now: DateTime<Utc>) -> AppResult<HashMap<ProductId, f64>> {
        let events = self
            .interactions
            .events_since(now - self.policy.popular_window)
            .await?;

        let mut scores: HashMap<ProductId, f64> = HashMap::new();
        for event in &events {
            *scores.entry(event.product_id).or_insert(0.0) +=
                self.policy.decay(event.occurred_at, now);
        }
        Ok(scores)
    }
}

#[async_trait::async_trait]
impl Recommender for RecommendationEngine {
    async fn compute(&self, request: RecommendationRequest) -> AppResult<RecommendationResult> {
        let start = Instant::now();

        let items = match request {
            RecommendationRequest::Similar { product_id, limit } => {
                self.similar(product_id, limit).await?
            }
            RecommendationRequest::ForYou { user_id, limit } => self.for_you(user_id, limit).await?,
            RecommendationRequest::Popular { limit } => self.popular(limit).await?,
        };

        tracing::info!(
            strategy = %request.strategy(),
            limit = request.limit(),
            returned = items.len(),
            catalog = self.catalog.name(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Computed recommendations"
        );

        Ok(RecommendationResult::new(request.strategy(), items))
    }
}
