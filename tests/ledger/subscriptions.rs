//! Tests for subscription activation and AutoRenew unlocks.

use chrono::{Duration, Months, TimeZone, Utc};

#[path = "../common/mod.rs"]
mod common;
use common::*;

use coinshop::ledger::{LedgerError, ReplayCheck};

const OWNER: &str = "3003";

fn purchase(tier: i64, months: u32, order_id: &str) -> ActivateSubscription {
    ActivateSubscription {
        user_id: OWNER.to_string(),
        tier,
        tier_name: format!("Tier {}", tier),
        qi_boost_percent: 100 * tier,
        duration_months: months,
        price_paid_cents: 500,
        payment_id: format!("CAP-{}", order_id),
        order_id: order_id.to_string(),
    }
}

#[test]
fn test_activation_stacks_time_and_keeps_one_active_row() {
    let registry = test_registry();
    let mut conn = registry.primary().pool.get().unwrap();
    let now = Utc::now();

    let first = ledger::activate_subscription(&mut conn, &purchase(1, 1, "ORDER-A-00001"), now)
        .unwrap();
    assert_eq!(
        first.expires_at,
        now.checked_add_months(Months::new(1)).unwrap().timestamp()
    );

    let second = ledger::activate_subscription(&mut conn, &purchase(2, 6, "ORDER-B-00002"), now)
        .unwrap();
    let stacked = Utc
        .timestamp_opt(first.expires_at, 0)
        .unwrap()
        .checked_add_months(Months::new(6))
        .unwrap();
    assert_eq!(second.expires_at, stacked.timestamp());
    assert_eq!(second.tier, 2);

    let all = queries::list_subscriptions_for_user(&conn, OWNER).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all.iter().filter(|s| s.is_active).count(), 1);
    assert_eq!(
        queries::get_active_subscription(&conn, OWNER).unwrap().unwrap().id,
        second.id
    );
}

#[test]
fn test_lapsed_subscription_restarts_from_now() {
    let registry = test_registry();
    let mut conn = registry.primary().pool.get().unwrap();
    let long_ago = Utc::now() - Duration::days(90);

    let old = ledger::activate_subscription(&mut conn, &purchase(1, 1, "ORDER-A-00001"), long_ago)
        .unwrap();
    assert!(old.expires_at < Utc::now().timestamp());
    assert!(queries::get_active_subscription(&conn, OWNER).unwrap().is_none());

    let now = Utc::now();
    let renewed = ledger::activate_subscription(&mut conn, &purchase(1, 1, "ORDER-B-00002"), now)
        .unwrap();
    assert_eq!(
        renewed.expires_at,
        now.checked_add_months(Months::new(1)).unwrap().timestamp()
    );
}

#[test]
fn test_same_order_cannot_activate_twice() {
    let registry = test_registry();
    let mut conn = registry.primary().pool.get().unwrap();
    let now = Utc::now();

    let first = ledger::activate_subscription(&mut conn, &purchase(2, 1, "ORDER-A-00001"), now)
        .unwrap();
    let err = ledger::activate_subscription(&mut conn, &purchase(2, 1, "ORDER-A-00001"), now)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Duplicate), "got {:?}", err);

    // Deactivation of the first row was rolled back with the failed insert
    let active = queries::get_active_subscription(&conn, OWNER).unwrap().unwrap();
    assert_eq!(active.id, first.id);
    assert_eq!(
        ledger::check_subscription_replay(&conn, "ORDER-A-00001", OWNER).unwrap(),
        ReplayCheck::SameOwner
    );
    assert_eq!(
        ledger::check_subscription_replay(&conn, "ORDER-A-00001", "4004").unwrap(),
        ReplayCheck::OtherOwner(OWNER.to_string())
    );
}

#[test]
fn test_autorenew_activation_is_idempotent_per_payment() {
    let registry = test_registry();
    let conn = registry.primary().pool.get().unwrap();

    assert!(!queries::has_autorenew_purchase(&conn, OWNER).unwrap());
    ledger::activate_autorenew(&conn, OWNER, CAPTURE_ID).unwrap();
    conn.execute(
        "UPDATE autorenew_purchases SET is_active = 0, last_renewed_at = 0 WHERE user_id = ?1",
        [OWNER],
    )
    .unwrap();
    assert!(!queries::has_autorenew_purchase(&conn, OWNER).unwrap());

    ledger::activate_autorenew(&conn, OWNER, CAPTURE_ID).unwrap();
    let rows = queries::list_autorenew_purchases(&conn, OWNER).unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_active);
    assert!(rows[0].last_renewed_at > 0);

    ledger::activate_autorenew(&conn, OWNER, "admin-1700000000").unwrap();
    assert_eq!(queries::list_autorenew_purchases(&conn, OWNER).unwrap().len(), 2);
}
