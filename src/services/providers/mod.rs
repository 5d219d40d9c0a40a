//! Recommendation data providers
//!
//! The engine reads from two collaborators: a product catalog and an
//! append-only interaction log. Each has an in-memory implementation for tests
//! and single-node deployments, and a Postgres implementation for production.
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::{
    error::AppResult,
    models::{InteractionEvent, Product, ProductId, UserId},
};

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryCatalog, InMemoryInteractionLog};
pub use postgres::{PgCatalog, PgInteractionLog};

/// Source of truth for product records
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Fetch a single product
    ///
    /// Returns `AppError::NotFound` when the product has never been published.
    async fn get_product(&self, id: ProductId) -> AppResult<Product>;

    /// All products in a category, in ascending id order
    async fn list_by_category(&self, category: &str) -> AppResult<Vec<Product>>;

    /// Most recently published products, newest first
    async fn list_recent(&self, limit: usize) -> AppResult<Vec<Product>>;

    /// Publish a new product
    ///
    /// Products are immutable once published, so re-publishing an existing id
    /// is rejected with `AppError::InvalidArgument`.
    async fn publish(&self, product: Product) -> AppResult<()>;

    /// Number of published products
    async fn count(&self) -> AppResult<u64>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Append-only record of user/product events
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait InteractionLog: Send + Sync {
    /// A user's events at or after `since`, oldest first
    async fn events_for(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<InteractionEvent>>;

    /// Other products the subject's users also interacted with since `since`
    ///
    /// Counts distinct users per co-occurring product. The subject itself is
    /// never included.
    async fn co_occurrences(
        &self,
        product_id: ProductId,
        since: DateTime<Utc>,
    ) -> AppResult<HashMap<ProductId, u64>>;

    /// Every event at or after `since`, used for popularity ranking
    async fn events_since(&self, since: DateTime<Utc>) -> AppResult<Vec<InteractionEvent>>;

    /// Append an event
    async fn append(&self, event: InteractionEvent) -> AppResult<()>;

    /// Number of recorded events
    async fn count(&self) -> AppResult<u64>;

    /// Number of distinct users with at least one event
    async fn user_count(&self) -> AppResult<u64>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
