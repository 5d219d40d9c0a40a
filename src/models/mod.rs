use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

mod interaction;
mod product;

pub use interaction::{EventKind, InteractionEvent};
pub use product::Product;

/// Catalog identifier for a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub u64);

impl Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a marketplace user
///
/// Zero is never assigned and is treated as malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl UserId {
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Recommendation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Strategy {
    /// Items related to a product
    Similar,
    /// Items personalized to a user's history
    ForYou,
    /// Items trending across all users
    Popular,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Similar => "similar",
            Strategy::ForYou => "forYou",
            Strategy::Popular => "popular",
        }
    }
}

impl Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "similar" => Ok(Strategy::Similar),
            "forYou" => Ok(Strategy::ForYou),
            "popular" => Ok(Strategy::Popular),
            other => Err(format!(
                "unknown strategy '{}', expected one of: similar, forYou, popular",
                other
            )),
        }
    }
}

/// Why an item was recommended, or why a result is empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// Other users interacted with both products
    CoInteracted,
    /// Shares the subject product's category
    SameCategory,
    /// Matches categories the user engaged with
    CategoryAffinity,
    /// Trending over the recent window
    Popular,
    /// Recently published
    NewArrival,
    /// The subject product does not exist
    UnknownProduct,
}

/// One ranked item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub product_id: ProductId,
    pub score: f64,
    pub reason: Reason,
}

/// Ranked output of a strategy
///
/// Items are ordered by descending score, ties by ascending product id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResult {
    pub strategy: Strategy,
    pub items: Vec<Recommendation>,
    /// Explains an empty result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
}

impl RecommendationResult {
    pub fn new(strategy: Strategy, items: Vec<Recommendation>) -> Self {
        Self {
            strategy,
            items,
            reason: None,
        }
    }

    /// An empty result annotated with why nothing was returned
    pub fn empty(strategy: Strategy, reason: Reason) -> Self {
        Self {
            strategy,
            items: Vec::new(),
            reason: Some(reason),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn product_ids(&self) -> Vec<ProductId> {
        self.items.iter().map(|item| item.product_id).collect()
    }
}

/// A validated recommendation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecommendationRequest {
    Similar { product_id: ProductId, limit: usize },
    ForYou { user_id: UserId, limit: usize },
    Popular { limit: usize },
}

impl RecommendationRequest {
    pub fn strategy(&self) -> Strategy {
        match self {
            RecommendationRequest::Similar { .. } => Strategy::Similar,
            RecommendationRequest::ForYou { .. } => Strategy::ForYou,
            RecommendationRequest::Popular { .. } => Strategy::Popular,
        }
    }

    pub fn limit(&self) -> usize {
        match *self {
            RecommendationRequest::Similar { limit, .. }
            | RecommendationRequest::ForYou { limit, .. }
            | RecommendationRequest::Popular { limit } => limit,
        }
    }

    /// Raw subject key: product id for `similar`, user id for `forYou`
    pub fn subject(&self) -> Option<u64> {
        match *self {
            RecommendationRequest::Similar { product_id, .. } => Some(product_id.0),
            RecommendationRequest::ForYou { user_id, .. } => Some(user_id.0),
            RecommendationRequest::Popular { .. } => None,
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey {
            strategy: self.strategy(),
            subject: self.subject(),
            limit: self.limit(),
        }
    }
}

/// Identity of a cached result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub strategy: Strategy,
    pub subject: Option<u64>,
    pub limit: usize,
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.subject {
            Some(subject) => write!(f, "{}:{}:{}", self.strategy, subject, self.limit),
            None => write!(f, "{}:{}", self.strategy, self.limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parse() {
        assert_eq!("similar".parse::<Strategy>(), Ok(Strategy::Similar));
        assert_eq!("forYou".parse::<Strategy>(), Ok(Strategy::ForYou));
        assert_eq!("popular".parse::<Strategy>(), Ok(Strategy::Popular));
        assert!("trending".parse::<Strategy>().is_err());
        assert!("foryou".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_strategy_serde_matches_wire_names() {
        assert_eq!(serde_json::to_string(&Strategy::ForYou).unwrap(), "\"forYou\"");
        assert_eq!(serde_json::to_string(&Strategy::Similar).unwrap(), "\"similar\"");
    }

    #[test]
    fn test_reason_serialization() {
        assert_eq!(
            serde_json::to_string(&Reason::UnknownProduct).unwrap(),
            "\"unknown_product\""
        );
        assert_eq!(
            serde_json::to_string(&Reason::CoInteracted).unwrap(),
            "\"co_interacted\""
        );
    }

    #[test]
    fn test_cache_key_display() {
        let similar = RecommendationRequest::Similar {
            product_id: ProductId(42),
            limit: 5,
        };
        assert_eq!(similar.cache_key().to_string(), "similar:42:5");

        let popular = RecommendationRequest::Popular { limit: 6 };
        assert_eq!(popular.cache_key().to_string(), "popular:6");
    }

    #[test]
    fn test_cache_key_distinguishes_strategy_for_same_subject() {
        let similar = RecommendationRequest::Similar {
            product_id: ProductId(7),
            limit: 6,
        };
        let for_you = RecommendationRequest::ForYou {
            user_id: UserId(7),
            limit: 6,
        };
        assert_ne!(similar.cache_key(), for_you.cache_key());
    }

    #[test]
    fn test_recommendation_serializes_camel_case() {
        let item = Recommendation {
            product_id: ProductId(3),
            score: 1.5,
            reason: Reason::Popular,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["productId"], 3);
        assert_eq!(json["score"], 1.5);
        assert_eq!(json["reason"], "popular");
    }

    #[test]
    fn test_empty_result_carries_reason() {
        let result = RecommendationResult::empty(Strategy::Similar, Reason::UnknownProduct);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["items"].as_array().unwrap().len(), 0);
        assert_eq!(json["reason"], "unknown_product");

        let full = RecommendationResult::new(Strategy::Popular, vec![]);
        let json = serde_json::to_value(&full).unwrap();
        assert!(json.get("reason").is_none());
    }
}
