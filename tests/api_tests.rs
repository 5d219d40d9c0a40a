use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use recommend_api::api::{create_router, AppState};

fn create_test_server() -> TestServer {
    let state = AppState::default();
    let app = create_router(state);
    TestServer::new(app).unwrap()
}

async fn publish(server: &TestServer, id: u64, category: &str) {
    server
        .post("/api/v1/products")
        .json(&json!({
            "id": id,
            "category": category,
            "priceCents": 1000
        }))
        .await
        .assert_status(StatusCode::CREATED);
}

async fn record(server: &TestServer, user: u64, product: u64, at: DateTime<Utc>) {
    server
        .post("/api/v1/interactions")
        .json(&json!({
            "userId": user,
            "productId": product,
            "kind": "view",
            "occurredAt": at
        }))
        .await
        .assert_status(StatusCode::CREATED);
}

fn product_ids(body: &Value) -> Vec<u64> {
    body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["productId"].as_u64().unwrap())
        .collect()
}

/// Products 1..=4 with view counts {1: 10, 2: 10, 3: 5, 4: 1} at one shared instant
async fn seed_popularity(server: &TestServer) {
    let at = Utc::now() - Duration::hours(1);
    for (product, count) in [(1, 10), (2, 10), (3, 5), (4, 1)] {
        publish(server, product, "kids").await;
        for user in 0..count {
            record(server, 100 + user, product, at).await;
        }
    }
}

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server();
    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_popular_breaks_ties_by_product_id() {
    let server = create_test_server();
    seed_popularity(&server).await;

    let response = server
        .get("/api/v1/recommendations")
        .add_query_param("strategy", "popular")
        .add_query_param("limit", "3")
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["strategy"], "popular");
    assert_eq!(product_ids(&body), vec![1, 2, 3]);
    assert_eq!(body["items"][0]["reason"], "popular");
    assert_eq!(body["items"][0]["score"], body["items"][1]["score"]);
}

#[tokio::test]
async fn test_similar_unknown_product_is_empty_with_reason() {
    let server = create_test_server();

    let response = server
        .get("/api/v1/recommendations")
        .add_query_param("strategy", "similar")
        .add_query_param("subject", "42")
        .add_query_param("limit", "5")
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["items"].as_array().unwrap().len(), 0);
    assert_eq!(body["reason"], "unknown_product");
}

#[tokio::test]
async fn test_similar_returns_same_category_products() {
    let server = create_test_server();
    publish(&server, 1, "cafe").await;
    publish(&server, 2, "cafe").await;
    publish(&server, 3, "classes").await;

    let response = server
        .get("/api/v1/recommendations")
        .add_query_param("strategy", "similar")
        .add_query_param("subject", "1")
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(product_ids(&body), vec![2]);
    assert_eq!(body["items"][0]["reason"], "same_category");
}

#[tokio::test]
async fn test_for_you_without_history_matches_popular() {
    let server = create_test_server();
    seed_popularity(&server).await;

    let for_you: Value = server
        .get("/api/v1/recommendations")
        .add_query_param("strategy", "forYou")
        .add_query_param("subject", "7")
        .add_query_param("limit", "6")
        .await
        .json();
    let popular: Value = server
        .get("/api/v1/recommendations")
        .add_query_param("strategy", "popular")
        .add_query_param("limit", "6")
        .await
        .json();

    assert_eq!(for_you["items"], popular["items"]);
    assert_eq!(product_ids(&for_you), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_rejects_malformed_requests() {
    let server = create_test_server();

    let cases = [
        vec![("strategy", "trending")],
        vec![("strategy", "popular"), ("limit", "0")],
        vec![("strategy", "popular"), ("limit", "51")],
        vec![("strategy", "popular"), ("limit", "ten")],
        vec![("strategy", "similar")],
        vec![("strategy", "forYou"), ("subject", "abc")],
        vec![],
    ];

    for params in cases {
        let mut request = server.get("/api/v1/recommendations");
        for (key, value) in &params {
            request = request.add_query_param(key, value);
        }
        let response = request.await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["code"], "invalid_argument", "params: {:?}", params);
    }

    let stats: Value = server.get("/api/v1/recommendations/stats").await.json();
    assert_eq!(stats["cache"]["computes"], 0);
}

#[tokio::test]
async fn test_repeated_requests_are_served_from_cache() {
    let server = create_test_server();
    seed_popularity(&server).await;

    let first = server
        .get("/api/v1/recommendations")
        .add_query_param("strategy", "popular")
        .await;
    let second = server
        .get("/api/v1/recommendations")
        .add_query_param("strategy", "popular")
        .await;

    assert_eq!(first.as_bytes(), second.as_bytes());

    let stats: Value = server.get("/api/v1/recommendations/stats").await.json();
    assert_eq!(stats["cache"]["computes"], 1);
    assert_eq!(stats["cache"]["hits"], 1);
    assert_eq!(stats["cacheSize"], 1);
}

#[tokio::test]
async fn test_recorded_interaction_refreshes_for_you() {
    let server = create_test_server();
    publish(&server, 1, "kids").await;
    publish(&server, 2, "kids").await;
    publish(&server, 3, "cafe").await;

    let before: Value = server
        .get("/api/v1/recommendations")
        .add_query_param("strategy", "forYou")
        .add_query_param("subject", "7")
        .await
        .json();
    assert!(product_ids(&before).is_empty());

    let response = server
        .post("/api/v1/interactions")
        .json(&json!({ "userId": 7, "productId": 1, "kind": "purchase" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["invalidated"], 1);

    let after: Value = server
        .get("/api/v1/recommendations")
        .add_query_param("strategy", "forYou")
        .add_query_param("subject", "7")
        .await
        .json();
    assert_eq!(product_ids(&after), vec![2]);
    assert_eq!(after["items"][0]["reason"], "category_affinity");
}

#[tokio::test]
async fn test_interaction_for_unknown_product_is_not_found() {
    let server = create_test_server();

    let response = server
        .post("/api/v1/interactions")
        .json(&json!({ "userId": 7, "productId": 99, "kind": "view" }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_products_are_immutable_once_published() {
    let server = create_test_server();
    publish(&server, 1, "kids").await;

    let response = server
        .post("/api/v1/products")
        .json(&json!({ "id": 1, "category": "cafe", "priceCents": 50 }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stats_report_catalog_and_interaction_totals() {
    let server = create_test_server();
    seed_popularity(&server).await;

    let response = server.get("/api/v1/recommendations/stats").await;
    response.assert_status_ok();

    let stats: Value = response.json();
    assert_eq!(stats["totalProducts"], 4);
    assert_eq!(stats["totalInteractions"], 26);
    assert_eq!(stats["totalUsers"], 10);
    assert_eq!(stats["cacheSize"], 0);
}

#[tokio::test]
async fn test_clear_cache() {
    let server = create_test_server();

    server
        .get("/api/v1/recommendations")
        .add_query_param("strategy", "popular")
        .await
        .assert_status_ok();

    let response = server.delete("/api/v1/recommendations/cache").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["cleared"], 1);

    let stats: Value = server.get("/api/v1/recommendations/stats").await.json();
    assert_eq!(stats["cacheSize"], 0);
}

#[tokio::test]
async fn test_homepage_for_anonymous_visitor() {
    let server = create_test_server();
    seed_popularity(&server).await;

    let response = server.get("/api/v1/recommendations/homepage").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["forYou"], body["trending"]);
    assert_eq!(product_ids(&body["trending"]), vec![1, 2, 3, 4]);
    assert_eq!(body["newArrivals"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_homepage_rejects_malformed_user() {
    let server = create_test_server();
    let response = server
        .get("/api/v1/recommendations/homepage")
        .add_query_param("user", "me")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let server = create_test_server();

    let response = server
        .get("/health")
        .add_header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("storefront-123"),
        )
        .await;

    assert_eq!(response.header("x-request-id"), "storefront-123");
}
