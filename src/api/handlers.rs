use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{EventKind, InteractionEvent, Product, ProductId, RecommendationResult, UserId},
    services::{Homepage, RawRecommendationRequest, ServiceStats},
};

use super::AppState;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct HomepageQuery {
    pub user: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub id: u64,
    pub category: String,
    pub price_cents: u64,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<CreateProductRequest> for Product {
    fn from(request: CreateProductRequest) -> Self {
        Product {
            id: ProductId(request.id),
            category: request.category,
            price_cents: request.price_cents,
            attributes: request.attributes,
            created_at: request.created_at.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordInteractionRequest {
    pub user_id: u64,
    pub product_id: u64,
    pub kind: EventKind,
    pub occurred_at: Option<DateTime<Utc>>,
    pub weight: Option<f64>,
}

impl From<RecordInteractionRequest> for InteractionEvent {
    fn from(request: RecordInteractionRequest) -> Self {
        InteractionEvent {
            user_id: UserId(request.user_id),
            product_id: ProductId(request.product_id),
            kind: request.kind,
            occurred_at: request.occurred_at.unwrap_or_else(Utc::now),
            weight: request.weight,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecordInteractionResponse {
    pub invalidated: usize,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Ranked recommendations for one strategy
pub async fn get_recommendations(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<RawRecommendationRequest>,
) -> AppResult<Json<RecommendationResult>> {
    tracing::info!(
        request_id = %request_id,
        strategy = query.strategy.as_deref().unwrap_or(""),
        subject = query.subject.as_deref().unwrap_or(""),
        limit = query.limit.as_deref().unwrap_or(""),
        "Processing recommendation request"
    );

    let result = state.recommendations.handle(query).await?;

    tracing::info!(
        request_id = %request_id,
        strategy = %result.strategy,
        returned = result.len(),
        "Recommendations served"
    );

    Ok(Json(result))
}

/// Homepage bundle: for-you (or trending for anonymous visitors), trending, new arrivals
pub async fn get_homepage(
    State(state): State<AppState>,
    Query(query): Query<HomepageQuery>,
) -> AppResult<Json<Homepage>> {
    let user_id = match query.user.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(UserId(raw.parse().map_err(|_| {
            AppError::InvalidArgument(format!("user must be a positive integer, got '{}'", raw))
        })?)),
        None => None,
    };

    let homepage = state.recommendations.homepage(user_id).await?;
    Ok(Json(homepage))
}

/// Catalog and interaction totals plus cache counters
pub async fn get_stats(State(state): State<AppState>) -> AppResult<Json<ServiceStats>> {
    let stats = state.recommendations.stats().await?;
    Ok(Json(stats))
}

/// Drop every cached recommendation
pub async fn clear_cache(State(state): State<AppState>) -> Json<Value> {
    let cleared = state.recommendations.clear_cache();
    Json(json!({ "cleared": cleared }))
}

/// Publish a product to the catalog
pub async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<CreateProductRequest>,
) -> AppResult<(StatusCode, Json<Product>)> {
    if request.id == 0 {
        return Err(AppError::InvalidArgument(
            "id must be a positive integer".to_string(),
        ));
    }

    let product = Product::from(request);
    state.recommendations.publish_product(product.clone()).await?;

    Ok((StatusCode::CREATED, Json(product)))
}

/// Record a user/product interaction
pub async fn record_interaction(
    State(state): State<AppState>,
    Json(request): Json<RecordInteractionRequest>,
) -> AppResult<(StatusCode, Json<RecordInteractionResponse>)> {
    let invalidated = state
        .recommendations
        .record_interaction(InteractionEvent::from(request))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RecordInteractionResponse { invalidated }),
    ))
}
