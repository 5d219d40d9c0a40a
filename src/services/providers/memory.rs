use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;

use crate::{
    error::{AppError, AppResult},
    models::{InteractionEvent, Product, ProductId, UserId},
    services::providers::{InteractionLog, ProductCatalog},
};

/// Catalog held in process memory
#[derive(Default)]
pub struct InMemoryCatalog {
    products: RwLock<BTreeMap<ProductId, Product>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog pre-populated with `products`
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let products = products.into_iter().map(|p| (p.id, p)).collect();
        Self {
            products: RwLock::new(products),
        }
    }

    pub async fn len(&self) -> usize {
        self.products.read().await.len()
    }
}

#[async_trait::async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn get_product(&self, id: ProductId) -> AppResult<Product> {
        self.products
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("product {}", id)))
    }

    async fn list_by_category(&self, category: &str) -> AppResult<Vec<Product>> {
        let products = self.products.read().await;
        Ok(products
            .values()
            .filter(|p| p.category == category)
            .cloned()
            .collect())
    }

    async fn list_recent(&self, limit: usize) -> AppResult<Vec<Product>> {
        let products = self.products.read().await;
        let mut recent: Vec<Product> = products.values().cloned().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        recent.truncate(limit);
        Ok(recent)
    }

    async fn publish(&self, product: Product) -> AppResult<()> {
        let mut products = self.products.write().await;
        if products.contains_key(&product.id) {
            return Err(AppError::InvalidArgument(format!(
                "product {} is already published",
                product.id
            )));
        }
        products.insert(product.id, product);
        Ok(())
    }

    async fn count(&self) -> AppResult<u64> {
        Ok(self.len().await as u64)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Interaction log held in process memory
#[derive(Default)]
pub struct InMemoryInteractionLog {
    events: RwLock<Vec<InteractionEvent>>,
}

impl InMemoryInteractionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: impl IntoIterator<Item = InteractionEvent>) -> Self {
        Self {
            events: RwLock::new(events.into_iter().collect()),
        }
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }
}

#[async_trait::async_trait]
impl InteractionLog for InMemoryInteractionLog {
    async fn events_for(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<InteractionEvent>> {
        let events = self.events.read().await;
        let mut history: Vec<InteractionEvent> = events
            .iter()
            .filter(|e| e.user_id == user_id && e.occurred_at >= since)
            .cloned()
            .collect();
        history.sort_by_key(|e| e.occurred_at);
        Ok(history)
    }

    async fn co_occurrences(
        &self,
        product_id: ProductId,
        since: DateTime<Utc>,
    ) -> AppResult<HashMap<ProductId, u64>> {
        let events = self.events.read().await;

        let subject_users: HashSet<UserId> = events
            .iter()
            .filter(|e| e.product_id == product_id && e.occurred_at >= since)
            .map(|e| e.user_id)
            .collect();

        let pairs: HashSet<(UserId, ProductId)> = events
            .iter()
            .filter(|e| {
                e.product_id != product_id
                    && e.occurred_at >= since
                    && subject_users.contains(&e.user_id)
            })
            .map(|e| (e.user_id, e.product_id))
            .collect();

        let mut counts = HashMap::new();
        for (_, other) in pairs {
            *counts.entry(other).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn events_since(&self, since: DateTime<Utc>) -> AppResult<Vec<InteractionEvent>> {
        let events = self.events.read().await;
        let mut recent: Vec<InteractionEvent> = events
            .iter()
            .filter(|e| e.occurred_at >= since)
            .cloned()
            .collect();
        recent.sort_by_key(|e| e.occurred_at);
        Ok(recent)
    }

    async fn append(&self, event: InteractionEvent) -> AppResult<()> {
        self.events.write().await.push(event);
        Ok(())
    }

    async fn count(&self) -> AppResult<u64> {
        Ok(self.len().await as u64)
    }

    async fn user_count(&self) -> AppResult<u64> {
        let events = self.events.read().await;
        let users: HashSet<UserId> = events.iter().map(|e| e.user_id).collect();
        Ok(users.len() as u64)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventKind;
    use chrono::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn at(hours_ago: i64) -> DateTime<Utc> {
        Utc::now() - Duration::hours(hours_ago)
    }

    fn view(user: u64, product: u64, hours_ago: i64) -> InteractionEvent {
        InteractionEvent::new(UserId(user), ProductId(product), EventKind::View, at(hours_ago))
    }

    #[tokio::test]
    async fn test_get_product_not_found() {
        let catalog = InMemoryCatalog::new();
        let result = catalog.get_product(ProductId(42)).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_publish_rejects_duplicate() {
        let catalog = InMemoryCatalog::new();
        let product = Product::new(ProductId(1), "cafe", 450, Utc::now());

        assert_ok!(catalog.publish(product.clone()).await);
        let err = assert_err!(catalog.publish(product).await);

        assert!(matches!(err, AppError::InvalidArgument(_)));
        assert_eq!(catalog.len().await, 1);
    }

    #[tokio::test]
    async fn test_list_by_category_filters() {
        let catalog = InMemoryCatalog::with_products(vec![
            Product::new(ProductId(3), "kids", 100, at(1)),
            Product::new(ProductId(1), "kids", 100, at(2)),
            Product::new(ProductId(2), "cafe", 100, at(3)),
        ]);

        let kids = catalog.list_by_category("kids").await.unwrap();
        let ids: Vec<ProductId> = kids.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![ProductId(1), ProductId(3)]);
    }

    #[tokio::test]
    async fn test_list_recent_newest_first() {
        let catalog = InMemoryCatalog::with_products(vec![
            Product::new(ProductId(1), "kids", 100, at(30)),
            Product::new(ProductId(2), "kids", 100, at(1)),
            Product::new(ProductId(3), "cafe", 100, at(10)),
        ]);

        let recent = catalog.list_recent(2).await.unwrap();
        let ids: Vec<ProductId> = recent.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![ProductId(2), ProductId(3)]);
    }

    #[tokio::test]
    async fn test_co_occurrences_counts_distinct_users() {
        let log = InMemoryInteractionLog::with_events(vec![
            view(1, 10, 1),
            view(1, 11, 1),
            view(1, 11, 2),
            view(2, 10, 1),
            view(2, 11, 1),
            view(2, 12, 1),
            view(3, 12, 1),
        ]);

        let counts = log.co_occurrences(ProductId(10), at(24)).await.unwrap();

        assert_eq!(counts.get(&ProductId(11)), Some(&2));
        assert_eq!(counts.get(&ProductId(12)), Some(&1));
        assert!(!counts.contains_key(&ProductId(10)));
    }

    #[tokio::test]
    async fn test_co_occurrences_respects_window() {
        let log = InMemoryInteractionLog::with_events(vec![
            view(1, 10, 1),
            view(1, 11, 100),
        ]);

        let counts = log.co_occurrences(ProductId(10), at(24)).await.unwrap();
        assert!(counts.is_empty());
    }

    #[tokio::test]
    async fn test_events_for_filters_user_and_window() {
        let log = InMemoryInteractionLog::with_events(vec![
            view(7, 1, 1),
            view(7, 2, 5),
            view(7, 3, 500),
            view(8, 4, 1),
        ]);

        let events = log.events_for(UserId(7), at(24)).await.unwrap();
        let ids: Vec<ProductId> = events.iter().map(|e| e.product_id).collect();
        assert_eq!(ids, vec![ProductId(2), ProductId(1)]);
    }

    #[tokio::test]
    async fn test_append_is_visible() {
        let log = InMemoryInteractionLog::new();
        assert_ok!(log.append(view(1, 1, 0)).await);
        assert_eq!(log.len().await, 1);
        assert_eq!(assert_ok!(log.events_since(at(1)).await).len(), 1);
    }

    #[tokio::test]
    async fn test_counts() {
        let catalog = InMemoryCatalog::with_products(vec![
            Product::new(ProductId(1), "kids", 100, at(1)),
            Product::new(ProductId(2), "cafe", 100, at(1)),
        ]);
        let log = InMemoryInteractionLog::with_events(vec![
            view(1, 1, 1),
            view(1, 2, 1),
            view(2, 1, 1),
        ]);

        assert_eq!(assert_ok!(catalog.count().await), 2);
        assert_eq!(assert_ok!(log.count().await), 3);
        assert_eq!(assert_ok!(log.user_count().await), 2);
    }

    #[tokio::test]
    async fn test_events_since_oldest_first() {
        let log = InMemoryInteractionLog::with_events(vec![
            view(1, 1, 1),
            view(2, 2, 5),
            view(3, 3, 3),
        ]);

        let events = assert_ok!(log.events_since(at(24)).await);
        let ids: Vec<ProductId> = events.iter().map(|e| e.product_id).collect();
        assert_eq!(ids, vec![ProductId(2), ProductId(3), ProductId(1)]);
    }
}
