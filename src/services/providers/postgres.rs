//! Postgres-backed catalog and interaction log
//!
//! Queries are checked at runtime (`query_as`) so the crate builds without a
//! live database. Schema lives in `migrations/`.
use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgPool};
use std::collections::{BTreeMap, HashMap};

use crate::{
    error::{AppError, AppResult},
    models::{EventKind, InteractionEvent, Product, ProductId, UserId},
    services::providers::{InteractionLog, ProductCatalog},
};

#[derive(Debug, FromRow)]
struct ProductRow {
    id: i64,
    category: String,
    price_cents: i64,
    attributes: Json<BTreeMap<String, String>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = AppError;

    fn try_from(row: ProductRow) -> AppResult<Self> {
        Ok(Product {
            id: ProductId(to_u64(row.id, "products.id")?),
            category: row.category,
            price_cents: to_u64(row.price_cents, "products.price_cents")?,
            attributes: row.attributes.0,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct EventRow {
    user_id: i64,
    product_id: i64,
    kind: String,
    occurred_at: DateTime<Utc>,
    weight: Option<f64>,
}

impl TryFrom<EventRow> for InteractionEvent {
    type Error = AppError;

    fn try_from(row: EventRow) -> AppResult<Self> {
        let kind: EventKind = row
            .kind
            .parse()
            .map_err(|e: String| AppError::Internal(format!("Corrupt interaction row: {}", e)))?;

        Ok(InteractionEvent {
            user_id: UserId(to_u64(row.user_id, "interaction_events.user_id")?),
            product_id: ProductId(to_u64(row.product_id, "interaction_events.product_id")?),
            kind,
            occurred_at: row.occurred_at,
            weight: row.weight,
        })
    }
}

fn to_u64(value: i64, column: &str) -> AppResult<u64> {
    u64::try_from(value)
        .map_err(|_| AppError::Internal(format!("Negative value {} in {}", value, column)))
}

fn to_i64(value: u64, field: &str) -> AppResult<i64> {
    i64::try_from(value)
        .map_err(|_| AppError::InvalidArgument(format!("{} is out of range", field)))
}

/// Product catalog stored in the `products` table
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProductCatalog for PgCatalog {
    async fn get_product(&self, id: ProductId) -> AppResult<Product> {
        let row: Option<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, category, price_cents, attributes, created_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(to_i64(id.0, "product id")?)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(AppError::NotFound(format!("product {}", id))),
        }
    }

    async fn list_by_category(&self, category: &str) -> AppResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, category, price_cents, attributes, created_at
            FROM products
            WHERE category = $1
            ORDER BY id
            "#,
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Product::try_from).collect()
    }

    async fn list_recent(&self, limit: usize) -> AppResult<Vec<Product>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, category, price_cents, attributes, created_at
            FROM products
            ORDER BY created_at DESC, id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Product::try_from).collect()
    }

    async fn publish(&self, product: Product) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO products (id, category, price_cents, attributes, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(to_i64(product.id.0, "product id")?)
        .bind(&product.category)
        .bind(to_i64(product.price_cents, "priceCents")?)
        .bind(Json(&product.attributes))
        .bind(product.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::InvalidArgument(format!(
                "product {} is already published",
                product.id
            )));
        }

        tracing::debug!(product_id = %product.id, "Published product");
        Ok(())
    }

    async fn count(&self) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        to_u64(count, "products count")
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

/// Interaction log stored in the `interaction_events` table
#[derive(Clone)]
pub struct PgInteractionLog {
    pool: PgPool,
}

impl PgInteractionLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl InteractionLog for PgInteractionLog {
    async fn events_for(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<InteractionEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            r#"
            SELECT user_id, product_id, kind, occurred_at, weight
            FROM interaction_events
            WHERE user_id = $1 AND occurred_at >= $2
            ORDER BY occurred_at, id
            "#,
        )
        .bind(to_i64(user_id.0, "user id")?)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(InteractionEvent::try_from).collect()
    }

    async fn co_occurrences(
        &self,
        product_id: ProductId,
        since: DateTime<Utc>,
    ) -> AppResult<HashMap<ProductId, u64>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT other.product_id, COUNT(DISTINCT other.user_id)
            FROM interaction_events AS subject
            JOIN interaction_events AS other
              ON other.user_id = subject.user_id
             AND other.product_id <> subject.product_id
            WHERE subject.product_id = $1
              AND subject.occurred_at >= $2
              AND other.occurred_at >= $2
            GROUP BY other.product_id
            "#,
        )
        .bind(to_i64(product_id.0, "product id")?)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(other, count)| -> AppResult<(ProductId, u64)> {
                Ok((
                    ProductId(to_u64(other, "interaction_events.product_id")?),
                    to_u64(count, "co-occurrence count")?,
                ))
            })
            .collect()
    }

    async fn events_since(&self, since: DateTime<Utc>) -> AppResult<Vec<InteractionEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            r#"
            SELECT user_id, product_id, kind, occurred_at, weight
            FROM interaction_events
            WHERE occurred_at >= $1
            ORDER BY occurred_at, id
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(InteractionEvent::try_from).collect()
    }

    async fn append(&self, event: InteractionEvent) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO interaction_events (user_id, product_id, kind, occurred_at, weight)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(to_i64(event.user_id.0, "user id")?)
        .bind(to_i64(event.product_id.0, "product id")?)
        .bind(event.kind.as_str())
        .bind(event.occurred_at)
        .bind(event.weight)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count(&self) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM interaction_events")
            .fetch_one(&self.pool)
            .await?;
        to_u64(count, "interaction_events count")
    }

    async fn user_count(&self) -> AppResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT user_id) FROM interaction_events")
                .fetch_one(&self.pool)
                .await?;
        to_u64(count, "interaction_events users")
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
