//! Tests for subscription checkout and status:
//! POST /subscriptions/create-order, POST /subscriptions/capture-order,
//! GET /subscriptions/status.

use axum::http::StatusCode;
use chrono::{DateTime, Months, Utc};
use serde_json::json;

#[path = "../common/mod.rs"]
mod common;
use common::*;

const CREATE: &str = "/subscriptions/create-order";
const CAPTURE: &str = "/subscriptions/capture-order";

/// Activates a subscription directly through the ledger.
fn activate(shop: &TestShop, label: &str, owner: &str, tier: i64, order_id: &str) -> Subscription {
    let tier = coinshop::pricing::find_tier(tier).unwrap();
    let mut conn = shop.conn(label);
    ledger::activate_subscription(
        &mut conn,
        &ActivateSubscription {
            user_id: owner.to_string(),
            tier: tier.id,
            tier_name: tier.name.to_string(),
            qi_boost_percent: tier.boost_percent,
            duration_months: 1,
            price_paid_cents: tier.monthly_price_cents,
            payment_id: format!("CAP-{}", order_id),
            order_id: order_id.to_string(),
        },
        Utc::now(),
    )
    .unwrap()
}

// ============================================================================
// Order creation
// ============================================================================

#[tokio::test]
async fn test_create_applies_duration_discount() {
    let shop = TestShop::start().await;
    create_order_mock(ORDER_ID).expect(1).mount(&shop.paypal).await;

    // Dao Seeker: 6 x $10.00 less 10%
    let (status, body) = shop
        .post(
            CREATE,
            json!({"tierId": 2, "duration": 6, "amount": 54, "discordId": "3003"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["orderId"], ORDER_ID);
    assert!(body["approvalUrl"].is_string());

    let sent = created_order_bodies(&shop.paypal).await;
    let unit = &sent[0]["purchase_units"][0];
    assert_eq!(unit["amount"]["value"], "54.00");
    assert_eq!(unit["custom_id"], "subscription:2:6:3003:S0");
    assert_eq!(unit["description"], "Dao Seeker Subscription - 6 months");
    assert_eq!(
        sent[0]["application_context"]["cancel_url"],
        "https://shop.test/subscription/cancel"
    );
}

#[tokio::test]
async fn test_create_rejects_bad_tier_duration_and_price() {
    let shop = TestShop::start().await;
    create_order_mock(ORDER_ID).expect(0).mount(&shop.paypal).await;

    let cases = [
        (json!({"tierId": 9, "months": 1, "amount": 5, "ownerId": "3003"}), "Invalid tier"),
        (json!({"tierId": 1, "months": 3, "amount": 15, "ownerId": "3003"}), "Invalid duration"),
        (json!({"tierId": 1, "months": 1, "amount": 4.99, "ownerId": "3003"}), "Price mismatch"),
    ];
    for (request, expected) in cases {
        let (status, body) = shop.post(CREATE, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"], expected);
    }
}

#[tokio::test]
async fn test_downgrade_is_refused_before_paypal() {
    let shop = TestShop::start().await;
    activate(&shop, PRIMARY, "3003", 3, "EXISTING-ORDER-1");
    create_order_mock(ORDER_ID).expect(0).mount(&shop.paypal).await;

    let (status, body) = shop
        .post(
            CREATE,
            json!({"tierId": 1, "months": 1, "amount": 5, "ownerId": "3003"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["details"],
        "You already have a higher subscription tier active. Downgrades are not allowed."
    );
    assert_eq!(provider_request_count(&shop.paypal).await, 0);
}

#[tokio::test]
async fn test_same_tier_and_upgrade_are_allowed() {
    let shop = TestShop::start().await;
    activate(&shop, PRIMARY, "3003", 3, "EXISTING-ORDER-1");
    create_order_mock(ORDER_ID).expect(2).mount(&shop.paypal).await;

    let (status, _) = shop
        .post(
            CREATE,
            json!({"tierId": 3, "months": 1, "amount": 15, "ownerId": "3003"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = shop
        .post(
            CREATE,
            json!({"tierId": 4, "months": 12, "amount": 211.2, "ownerId": "3003"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_downgrade_check_is_per_shard() {
    let shop = TestShop::start().await;
    activate(&shop, SECONDARY, "3003", 4, "EXISTING-ORDER-1");
    create_order_mock(ORDER_ID).expect(1).mount(&shop.paypal).await;

    let (status, _) = shop
        .post(
            CREATE,
            json!({"tierId": 1, "months": 1, "amount": 5, "ownerId": "3003", "shard": "S0"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================================
// Capture
// ============================================================================

#[tokio::test]
async fn test_capture_extends_running_subscription() {
    let shop = TestShop::start().await;
    let existing = activate(&shop, PRIMARY, "3003", 2, "EXISTING-ORDER-1");
    let custom_id = "subscription:2:1:3003:S0";
    get_order_mock(ORDER_ID, approved_order(ORDER_ID, custom_id, "10.00"))
        .mount(&shop.paypal)
        .await;
    capture_mock(ORDER_ID, completed_order(ORDER_ID, custom_id, "10.00"))
        .expect(1)
        .mount(&shop.paypal)
        .await;

    let (status, body) = shop
        .post(CAPTURE, json!({"token": ORDER_ID, "ownerId": "3003"}))
        .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["subscription"]["tier"], 2);
    assert_eq!(body["subscription"]["tierName"], "Dao Seeker");
    assert_eq!(body["subscription"]["boostPercent"], 200);
    assert_eq!(body["subscription"]["months"], 1);

    let expected = DateTime::from_timestamp(existing.expires_at, 0)
        .unwrap()
        .checked_add_months(Months::new(1))
        .unwrap();
    let conn = shop.conn(PRIMARY);
    let active = queries::get_active_subscription(&conn, "3003")
        .unwrap()
        .unwrap();
    assert_eq!(active.expires_at, expected.timestamp());
    assert_eq!(active.order_id, ORDER_ID);
    assert_eq!(active.payment_id, CAPTURE_ID);
    assert_eq!(active.price_paid_cents, 1_000);

    let all = queries::list_subscriptions_for_user(&conn, "3003").unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all.iter().filter(|s| s.is_active).count(), 1);
}

#[tokio::test]
async fn test_capture_without_running_subscription_starts_now() {
    let shop = TestShop::start().await;
    let custom_id = "subscription:1:12:3003:DS1";
    get_order_mock(ORDER_ID, approved_order(ORDER_ID, custom_id, "48.00"))
        .mount(&shop.paypal)
        .await;
    capture_mock(ORDER_ID, completed_order(ORDER_ID, custom_id, "48.00"))
        .mount(&shop.paypal)
        .await;

    let before = Utc::now();
    let (status, _) = shop
        .post(CAPTURE, json!({"orderId": ORDER_ID, "ownerId": "3003"}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let active = queries::get_active_subscription(&shop.conn(SECONDARY), "3003")
        .unwrap()
        .unwrap();
    let earliest = before.checked_add_months(Months::new(12)).unwrap().timestamp();
    assert!(active.expires_at >= earliest);
    assert!(active.expires_at <= earliest + 60);
    assert!(
        queries::get_active_subscription(&shop.conn(PRIMARY), "3003")
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_capture_by_another_owner_is_forbidden() {
    let shop = TestShop::start().await;
    let custom_id = "subscription:2:1:3003:S0";
    get_order_mock(ORDER_ID, approved_order(ORDER_ID, custom_id, "10.00"))
        .mount(&shop.paypal)
        .await;
    capture_mock(ORDER_ID, completed_order(ORDER_ID, custom_id, "10.00"))
        .expect(0)
        .mount(&shop.paypal)
        .await;

    let (status, body) = shop
        .post(CAPTURE, json!({"token": ORDER_ID, "ownerId": "4004"}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["details"], "Unauthorized payment");
    assert!(
        queries::get_active_subscription(&shop.conn(PRIMARY), "4004")
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_capture_of_coin_order_is_wrong_purchase_type() {
    let shop = TestShop::start().await;
    get_order_mock(ORDER_ID, approved_order(ORDER_ID, "coins:3003:S0", "10.00"))
        .mount(&shop.paypal)
        .await;
    capture_mock(ORDER_ID, completed_order(ORDER_ID, "coins:3003:S0", "10.00"))
        .expect(0)
        .mount(&shop.paypal)
        .await;

    let (status, body) = shop
        .post(CAPTURE, json!({"token": ORDER_ID, "ownerId": "3003"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"], "Invalid purchase type");
}

#[tokio::test]
async fn test_repeated_capture_is_conflict() {
    let shop = TestShop::start().await;
    let custom_id = "subscription:2:1:3003:S0";
    get_order_mock(ORDER_ID, approved_order(ORDER_ID, custom_id, "10.00"))
        .mount(&shop.paypal)
        .await;
    capture_mock(ORDER_ID, completed_order(ORDER_ID, custom_id, "10.00"))
        .expect(1)
        .mount(&shop.paypal)
        .await;

    let (status, _) = shop
        .post(CAPTURE, json!({"token": ORDER_ID, "ownerId": "3003"}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = shop
        .post(CAPTURE, json!({"token": ORDER_ID, "ownerId": "3003"}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let all = queries::list_subscriptions_for_user(&shop.conn(PRIMARY), "3003").unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn test_already_captured_reuses_fetched_order() {
    let shop = TestShop::start().await;
    let custom_id = "subscription:1:1:3003:S0";
    // The lookup already carries the capture, so it is the only GET
    get_order_mock(ORDER_ID, completed_order(ORDER_ID, custom_id, "5.00"))
        .expect(1)
        .mount(&shop.paypal)
        .await;
    already_captured_mock(ORDER_ID).expect(1).mount(&shop.paypal).await;

    let (status, body) = shop
        .post(CAPTURE, json!({"token": ORDER_ID, "ownerId": "3003"}))
        .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["subscription"]["tierName"], "Cultivator");
}

#[tokio::test]
async fn test_already_captured_refetches_order_without_capture() {
    let shop = TestShop::start().await;
    let custom_id = "subscription:1:1:3003:S0";
    get_order_mock(ORDER_ID, approved_order(ORDER_ID, custom_id, "5.00"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&shop.paypal)
        .await;
    get_order_mock(ORDER_ID, completed_order(ORDER_ID, custom_id, "5.00"))
        .expect(1)
        .mount(&shop.paypal)
        .await;
    already_captured_mock(ORDER_ID).expect(1).mount(&shop.paypal).await;

    let (status, body) = shop
        .post(CAPTURE, json!({"token": ORDER_ID, "ownerId": "3003"}))
        .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["subscription"]["tierName"], "Cultivator");
    let all = queries::list_subscriptions_for_user(&shop.conn(PRIMARY), "3003").unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn test_underpaid_capture_activates_nothing() {
    let shop = TestShop::start().await;
    let custom_id = "subscription:3:1:3003:S0";
    get_order_mock(ORDER_ID, approved_order(ORDER_ID, custom_id, "5.00"))
        .mount(&shop.paypal)
        .await;
    capture_mock(ORDER_ID, completed_order(ORDER_ID, custom_id, "5.00"))
        .mount(&shop.paypal)
        .await;

    let (status, body) = shop
        .post(CAPTURE, json!({"token": ORDER_ID, "ownerId": "3003"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"], "Payment amount verification failed");
    assert!(
        queries::list_subscriptions_for_user(&shop.conn(PRIMARY), "3003")
            .unwrap()
            .is_empty()
    );
}

// ============================================================================
// Status
// ============================================================================

#[tokio::test]
async fn test_status_reports_active_subscription() {
    let shop = TestShop::start().await;

    let (status, body) = shop.get("/subscriptions/status?ownerId=3003").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hasActiveSubscription"], false);
    assert!(body.get("subscription").is_none());

    activate(&shop, PRIMARY, "3003", 3, "EXISTING-ORDER-1");

    let (status, body) = shop.get("/subscriptions/status?discordId=3003&server=S0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hasActiveSubscription"], true);
    assert_eq!(body["subscription"]["tierName"], "Immortal");
    assert_eq!(body["subscription"]["boostPercent"], 400);
    assert!(body["subscription"]["expiresAt"].as_str().unwrap().ends_with('Z'));

    let (_, body) = shop.get("/subscriptions/status?ownerId=3003&shard=DS1").await;
    assert_eq!(body["hasActiveSubscription"], false);
}
