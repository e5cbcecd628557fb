//! Tests for the AutoRenew unlock:
//! create/capture, GET /autorenew/check-purchase and the admin grant.

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

#[path = "../common/mod.rs"]
mod common;
use common::*;

const CREATE: &str = "/autorenew/create-order";
const CAPTURE: &str = "/autorenew/capture-order";
const ADMIN: &str = "/admin/activate-autorenew";

fn purchases(shop: &TestShop, label: &str, owner: &str) -> Vec<AutoRenewPurchase> {
    queries::list_autorenew_purchases(&shop.conn(label), owner).unwrap()
}

#[tokio::test]
async fn test_create_charges_fixed_price() {
    let shop = TestShop::start().await;
    create_order_mock(ORDER_ID).expect(1).mount(&shop.paypal).await;

    let (status, body) = shop
        .post(CREATE, json!({"ownerId": "5005", "shard": "ds1"}))
        .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["orderId"], ORDER_ID);

    let sent = created_order_bodies(&shop.paypal).await;
    let unit = &sent[0]["purchase_units"][0];
    assert_eq!(unit["amount"]["value"], "5.00");
    assert_eq!(unit["custom_id"], "autorenew:5005:DS1");
    assert_eq!(unit["description"], "AutoRenew Unlock");
}

#[tokio::test]
async fn test_sixth_order_in_a_minute_is_rate_limited() {
    let shop = TestShop::start().await;
    create_order_mock(ORDER_ID).expect(6).mount(&shop.paypal).await;

    for _ in 0..5 {
        let (status, _) = shop.post(CREATE, json!({"ownerId": "5005"})).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = shop.post(CREATE, json!({"ownerId": "5005"})).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // Other owners have their own window
    let (status, _) = shop.post(CREATE, json!({"ownerId": "6006"})).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_capture_unlocks_on_order_shard() {
    let shop = TestShop::start().await;
    let custom_id = "autorenew:5005:DS1";
    get_order_mock(ORDER_ID, approved_order(ORDER_ID, custom_id, "5.00"))
        .mount(&shop.paypal)
        .await;
    capture_mock(ORDER_ID, completed_order(ORDER_ID, custom_id, "5.00"))
        .expect(1)
        .mount(&shop.paypal)
        .await;

    let (status, body) = shop
        .post(CAPTURE, json!({"token": ORDER_ID, "discordId": "5005"}))
        .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["activated"], true);

    let rows = purchases(&shop, SECONDARY, "5005");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].payment_id, CAPTURE_ID);
    assert!(rows[0].is_active);

    let (_, body) = shop
        .get("/autorenew/check-purchase?discordId=5005&server=DS1")
        .await;
    assert_eq!(body["hasPurchased"], true);
    let (_, body) = shop.get("/autorenew/check-purchase?ownerId=5005").await;
    assert_eq!(body["hasPurchased"], false);
}

#[tokio::test]
async fn test_retried_capture_does_not_duplicate_unlock() {
    let shop = TestShop::start().await;
    let custom_id = "autorenew:5005:S0";
    get_order_mock(ORDER_ID, completed_order(ORDER_ID, custom_id, "5.00"))
        .mount(&shop.paypal)
        .await;
    capture_mock(ORDER_ID, completed_order(ORDER_ID, custom_id, "5.00"))
        .up_to_n_times(1)
        .mount(&shop.paypal)
        .await;
    already_captured_mock(ORDER_ID).mount(&shop.paypal).await;

    for _ in 0..2 {
        let (status, _) = shop
            .post(CAPTURE, json!({"token": ORDER_ID, "ownerId": "5005"}))
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(purchases(&shop, PRIMARY, "5005").len(), 1);
}

#[tokio::test]
async fn test_capture_rejects_wrong_amount_and_type() {
    let shop = TestShop::start().await;
    let custom_id = "autorenew:5005:S0";
    get_order_mock(ORDER_ID, approved_order(ORDER_ID, custom_id, "4.00"))
        .mount(&shop.paypal)
        .await;
    capture_mock(ORDER_ID, completed_order(ORDER_ID, custom_id, "4.00"))
        .mount(&shop.paypal)
        .await;

    let (status, body) = shop
        .post(CAPTURE, json!({"token": ORDER_ID, "ownerId": "5005"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"], "Payment amount verification failed");
    assert!(purchases(&shop, PRIMARY, "5005").is_empty());

    let other = "8Y4403128M6482517";
    get_order_mock(other, approved_order(other, "subscription:1:1:5005:S0", "5.00"))
        .mount(&shop.paypal)
        .await;
    let (status, body) = shop
        .post(CAPTURE, json!({"token": other, "ownerId": "5005"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"], "Invalid purchase type");
}

#[tokio::test]
async fn test_capture_by_another_owner_is_forbidden() {
    let shop = TestShop::start().await;
    let custom_id = "autorenew:5005:S0";
    get_order_mock(ORDER_ID, approved_order(ORDER_ID, custom_id, "5.00"))
        .mount(&shop.paypal)
        .await;
    capture_mock(ORDER_ID, completed_order(ORDER_ID, custom_id, "5.00"))
        .expect(0)
        .mount(&shop.paypal)
        .await;

    let (status, _) = shop
        .post(CAPTURE, json!({"token": ORDER_ID, "ownerId": "6006"}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ============================================================================
// Admin grant
// ============================================================================

#[tokio::test]
async fn test_admin_grant_requires_matching_key() {
    let shop = TestShop::start().await;
    let request = json!({"ownerId": "5005", "paymentId": "support-1234"});

    let (status, _) = shop.post(ADMIN, request.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = shop
        .post_with(ADMIN, request.clone(), &[("x-admin-key", "wrong-key")])
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(purchases(&shop, PRIMARY, "5005").is_empty());

    let (status, body) = shop
        .post_with(ADMIN, request, &[("x-admin-key", ADMIN_KEY)])
        .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["activated"], true);

    let rows = purchases(&shop, PRIMARY, "5005");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].payment_id, "support-1234");
}

#[tokio::test]
async fn test_admin_grant_defaults_payment_id_and_shard() {
    let shop = TestShop::start().await;

    let (status, _) = shop
        .post_with(
            ADMIN,
            json!({"discordId": "5005", "server": "DS1"}),
            &[("x-admin-key", ADMIN_KEY)],
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let rows = purchases(&shop, SECONDARY, "5005");
    assert_eq!(rows.len(), 1);
    assert!(rows[0].payment_id.starts_with("admin-"));
    assert!(purchases(&shop, PRIMARY, "5005").is_empty());
}

#[tokio::test]
async fn test_admin_grant_disabled_without_configured_key() {
    let mut shop = TestShop::start().await;
    shop.state.admin_api_key = None;

    let (status, _) = shop
        .post_with(
            ADMIN,
            json!({"ownerId": "5005"}),
            &[("x-admin-key", ADMIN_KEY)],
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_grant_validates_owner() {
    let shop = TestShop::start().await;

    let (status, _) = shop
        .post_with(
            ADMIN,
            json!({"ownerId": "55 05"}),
            &[("x-admin-key", ADMIN_KEY)],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_slow_order_lookup_times_out() {
    let shop =
        TestShop::start_with(Duration::from_secs(1), InMemoryRateLimitStore::default()).await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .and(wiremock::matchers::path(format!("/v2/checkout/orders/{}", ORDER_ID)))
        .respond_with(
            wiremock::ResponseTemplate::new(200)
                .set_body_json(approved_order(ORDER_ID, "autorenew:5005:S0", "5.00"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&shop.paypal)
        .await;

    let (status, _) = shop
        .post(CAPTURE, json!({"token": ORDER_ID, "ownerId": "5005"}))
        .await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(purchases(&shop, PRIMARY, "5005").is_empty());
}
