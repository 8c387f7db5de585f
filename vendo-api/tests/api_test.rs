use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use vendo_api::middleware::auth::CustomerClaims;
use vendo_api::{app, AppState, AuthConfig};
use vendo_core::identity::{IdentityResolver, StaticIdentityResolver};
use vendo_core::notify::LoggingNotifier;
use vendo_core::payment::SimulatedGateway;
use vendo_core::retry::RetryingGatewayClient;
use vendo_order::memory::MemoryOrderStore;
use vendo_order::{OrderOrchestrator, OrderStore, RefundCoordinator};

const SECRET: &str = "test-secret";

struct Harness {
    state: AppState,
    store: Arc<MemoryOrderStore>,
    user_id: Uuid,
    product_id: Uuid,
}

fn harness_with_currency(default_currency: &str) -> Harness {
    let store = Arc::new(MemoryOrderStore::new());
    let user_id = Uuid::new_v4();
    let product_id = Uuid::new_v4();
    store.add_user(user_id);
    store.add_product(product_id, 5);

    let gateway = Arc::new(RetryingGatewayClient::new(Arc::new(SimulatedGateway)));
    let dyn_store: Arc<dyn OrderStore> = Arc::clone(&store) as Arc<dyn OrderStore>;
    let identity: Arc<dyn IdentityResolver> = Arc::new(StaticIdentityResolver::new());

    let state = AppState {
        orchestrator: Arc::new(OrderOrchestrator::new(
            Arc::clone(&gateway),
            Arc::clone(&dyn_store),
            Arc::clone(&identity),
            Arc::new(LoggingNotifier),
        )),
        refunds: Arc::new(RefundCoordinator::new(
            gateway,
            Arc::clone(&dyn_store),
            Arc::new(LoggingNotifier),
        )),
        store: dyn_store,
        identity,
        auth: AuthConfig { secret: SECRET.into(), expiration: 3600 },
        default_currency: default_currency.into(),
    };

    Harness { state, store, user_id, product_id }
}

fn harness() -> Harness {
    harness_with_currency("USD")
}

fn token_for(user_id: Uuid) -> String {
    let claims = CustomerClaims {
        sub: user_id.to_string(),
        email: None,
        role: "CUSTOMER".into(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn checkout_body(product_id: Uuid, card_number: &str) -> Value {
    json!({
        "items": [{
            "product_id": product_id,
            "product_name": "Widget",
            "quantity": 2,
            "unit_price": "12.50",
            "image_url": null
        }],
        "method": "card",
        "card": {
            "number": card_number,
            "exp_month": 12,
            "exp_year": 2030,
            "cvc": "123"
        },
        "customer_email": "buyer@example.com",
        "shipping_address": {
            "full_name": "Ada Lovelace",
            "address_line1": "1 Analytical Way",
            "address_line2": null,
            "city": "London",
            "state": "LDN",
            "postal_code": "EC1A",
            "country": "GB"
        },
        "currency": "USD"
    })
}

fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn guest_login_issues_token() {
    let h = harness();
    let response = app(h.state)
        .oneshot(post("/v1/auth/guest", None, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
}

#[tokio::test]
async fn checkout_requires_auth() {
    let h = harness();
    let body = checkout_body(h.product_id, "4242424242424242");
    let response = app(h.state)
        .oneshot(post("/v1/checkout", None, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn checkout_rejects_empty_items() {
    let h = harness();
    let token = token_for(h.user_id);
    let mut body = checkout_body(h.product_id, "4242424242424242");
    body["items"] = json!([]);
    let response = app(h.state)
        .oneshot(post("/v1/checkout", Some(&token), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn checkout_succeeds_and_order_is_readable() {
    let h = harness();
    let token = token_for(h.user_id);
    let app = app(h.state);

    let response = app
        .clone()
        .oneshot(post("/v1/checkout", Some(&token), checkout_body(h.product_id, "4242424242424242")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "succeeded");
    let order_id = body["order_id"].as_str().unwrap().to_string();
    assert!(body["order_number"].as_str().unwrap().starts_with("ORD-"));
    assert!(body["transaction_id"].as_str().unwrap().starts_with("txn_"));
    assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));

    assert_eq!(h.store.stock_of(&h.product_id), Some(3));

    let response = app
        .clone()
        .oneshot(get(&format!("/v1/orders/{order_id}"), &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "SUCCEEDED");
    assert_eq!(body["total_amount"], "25.00");
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    let response = app.oneshot(get("/v1/orders", &token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn checkout_declined_card_is_bad_request() {
    let h = harness();
    let token = token_for(h.user_id);
    let response = app(h.state)
        .oneshot(post("/v1/checkout", Some(&token), checkout_body(h.product_id, "4000000000000002")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["status"], "payment_failed");
    assert_eq!(body["code"], "card_declined");
}

#[tokio::test]
async fn checkout_requires_action_returns_client_secret() {
    let h = harness();
    let token = token_for(h.user_id);
    let response = app(h.state)
        .oneshot(post("/v1/checkout", Some(&token), checkout_body(h.product_id, "4000000000003155")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "requires_action");
    assert!(body["client_secret"].as_str().unwrap().starts_with("seti_"));
}

#[tokio::test]
async fn insufficient_stock_is_bad_request() {
    let h = harness();
    let token = token_for(h.user_id);
    let mut body = checkout_body(h.product_id, "4242424242424242");
    body["items"][0]["quantity"] = json!(50);
    let response = app(h.state)
        .oneshot(post("/v1/checkout", Some(&token), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["status"], "insufficient_stock");
}

#[tokio::test]
async fn order_of_another_user_is_forbidden() {
    let h = harness();
    let owner_token = token_for(h.user_id);
    let app = app(h.state);

    let response = app
        .clone()
        .oneshot(post("/v1/checkout", Some(&owner_token), checkout_body(h.product_id, "4242424242424242")))
        .await
        .unwrap();
    let body = json_body(response).await;
    let order_id = body["order_id"].as_str().unwrap().to_string();

    let intruder_token = token_for(Uuid::new_v4());
    let response = app
        .oneshot(get(&format!("/v1/orders/{order_id}"), &intruder_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn refund_records_and_rejects_bad_amount() {
    let h = harness();
    let token = token_for(h.user_id);
    let app = app(h.state);

    let response = app
        .clone()
        .oneshot(post("/v1/checkout", Some(&token), checkout_body(h.product_id, "4242424242424242")))
        .await
        .unwrap();
    let body = json_body(response).await;
    let order_id = body["order_id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post(
            &format!("/v1/orders/{order_id}/refund"),
            Some(&token),
            json!({"amount": "-1.00"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error_code"], "invalid_amount");
    assert!(body["message"].as_str().is_some());

    let response = app
        .oneshot(post(
            &format!("/v1/orders/{order_id}/refund"),
            Some(&token),
            json!({"amount": "25.00", "reason": "requested_by_customer"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["refund_id"].as_str().is_some());
    assert!(body["message"].as_str().unwrap().contains("re_"));
    assert_eq!(h.store.refunds().len(), 1);
}

#[tokio::test]
async fn refund_of_unknown_order_is_not_found() {
    let h = harness();
    let token = token_for(h.user_id);
    let response = app(h.state)
        .oneshot(post(
            &format!("/v1/orders/{}/refund", Uuid::new_v4()),
            Some(&token),
            json!({"amount": "5.00"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_currency_falls_back_to_configured_default() {
    let h = harness_with_currency("EUR");
    let token = token_for(h.user_id);
    let app = app(h.state);

    let mut body = checkout_body(h.product_id, "4242424242424242");
    body.as_object_mut().unwrap().remove("currency");
    let response = app
        .clone()
        .oneshot(post("/v1/checkout", Some(&token), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let order_id = body["order_id"].as_str().unwrap().to_string();

    let response = app.oneshot(get(&format!("/v1/orders/{order_id}"), &token)).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["currency"], "EUR");
}

#[tokio::test]
async fn out_of_range_totals_are_rejected_with_bad_request() {
    let h = harness();
    let token = token_for(h.user_id);

    let mut body = checkout_body(h.product_id, "4242424242424242");
    body["items"][0]["quantity"] = json!(i32::MAX);
    body["items"][0]["unit_price"] = json!("79228162514264337593543950335");
    let response = app(h.state)
        .oneshot(post("/v1/checkout", Some(&token), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json["error"].as_str().is_some());
}
