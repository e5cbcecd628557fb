use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::Result;
use crate::models::*;

use super::from_row::{
    AUTORENEW_COLS, COUPON_COLS, ORDER_METADATA_COLS, PLAYER_COLS, SUBSCRIPTION_COLS,
    TRANSACTION_COLS, query_all, query_one,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

// ============ Players ============

pub fn get_player(conn: &Connection, id: &str) -> Result<Option<Player>> {
    query_one(
        conn,
        &format!("SELECT {} FROM players WHERE id = ?1", PLAYER_COLS),
        &[&id],
    )
}

/// Insert a player row. Accounts normally come from the game server; this
/// exists for seeding and tests.
pub fn create_player(conn: &Connection, id: &str, dao_coins: i64) -> Result<Player> {
    conn.execute(
        "INSERT INTO players (id, dao_coins, dao_coins_spent) VALUES (?1, ?2, 0)",
        params![id, dao_coins],
    )?;
    Ok(Player {
        id: id.to_string(),
        dao_coins,
        dao_coins_spent: 0,
    })
}

// ============ Coupons ============

/// Look up a coupon by its normalized (uppercase) code.
pub fn get_coupon_by_code(conn: &Connection, code: &str) -> Result<Option<Coupon>> {
    query_one(
        conn,
        &format!("SELECT {} FROM dao_coupons WHERE code = ?1", COUPON_COLS),
        &[&code],
    )
}

/// Create a coupon, or reset an existing one with the same code to the given
/// terms (uses counter untouched).
pub fn upsert_coupon(conn: &Connection, input: &CreateCoupon) -> Result<Coupon> {
    conn.execute(
        "INSERT INTO dao_coupons (code, bonus_percentage, min_purchase_cents, max_uses, current_uses, active, valid_from, valid_until, created_at)
         VALUES (?1, ?2, ?3, ?4, 0, 1, ?5, ?6, ?7)
         ON CONFLICT(code) DO UPDATE SET
            bonus_percentage = excluded.bonus_percentage,
            min_purchase_cents = excluded.min_purchase_cents,
            max_uses = excluded.max_uses,
            active = 1,
            valid_from = excluded.valid_from,
            valid_until = excluded.valid_until",
        params![
            &input.code,
            input.bonus_percentage,
            input.min_purchase_cents,
            input.max_uses,
            input.valid_from,
            input.valid_until,
            now(),
        ],
    )?;

    get_coupon_by_code(conn, &input.code)?
        .ok_or_else(|| crate::error::AppError::Internal("coupon vanished after upsert".into()))
}

// ============ Order Metadata ============

pub fn create_order_metadata(conn: &Connection, input: &CreateOrderMetadata) -> Result<()> {
    let now = now();
    let packages = input
        .packages
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO paypal_order_metadata
            (order_id, user_id, shard, amount_cents, base_coins, bonus_coins, coupon_code, bonus_percentage, packages, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            &input.order_id,
            &input.user_id,
            &input.shard,
            input.amount_cents,
            input.base_coins,
            input.bonus_coins,
            &input.coupon_code,
            input.bonus_percentage,
            packages,
            now,
            now + ORDER_METADATA_TTL_SECS,
        ],
    )?;
    Ok(())
}

/// Read the live (non-expired) terms for an order. Does not consume the row;
/// callers delete it once the credit has committed.
pub fn get_live_order_metadata(conn: &Connection, order_id: &str) -> Result<Option<OrderMetadata>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM paypal_order_metadata WHERE order_id = ?1 AND expires_at > ?2",
            ORDER_METADATA_COLS
        ),
        &[&order_id, &now()],
    )
}

pub fn delete_order_metadata(conn: &Connection, order_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM paypal_order_metadata WHERE order_id = ?1",
        params![order_id],
    )?;
    Ok(affected > 0)
}

/// Drop expired order terms. Returns the number of rows removed.
pub fn delete_expired_order_metadata(conn: &Connection) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM paypal_order_metadata WHERE expires_at < ?1",
        params![now()],
    )?;
    Ok(deleted)
}

// ============ Transaction Log ============

/// Escapes LIKE wildcards so `value` only matches itself under `ESCAPE '\'`.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Owner of the ledger entry already recorded for a provider order, if any.
/// Matches the dedicated column first, then the description text that rows
/// written before that column existed still carry.
pub fn find_order_transaction_owner(conn: &Connection, order_id: &str) -> Result<Option<String>> {
    let pattern = format!("%PayPal Order {} - %", escape_like(order_id));
    let owner = conn
        .query_row(
            "SELECT user_id FROM dao_transactions
             WHERE provider_order_id = ?1 OR description LIKE ?2 ESCAPE '\\'
             ORDER BY id LIMIT 1",
            params![order_id, pattern],
            |row| row.get(0),
        )
        .optional()?;
    Ok(owner)
}

pub fn get_transaction(conn: &Connection, id: i64) -> Result<Option<LedgerEntry>> {
    query_one(
        conn,
        &format!("SELECT {} FROM dao_transactions WHERE id = ?1", TRANSACTION_COLS),
        &[&id],
    )
}

pub fn list_transactions_for_user(conn: &Connection, user_id: &str) -> Result<Vec<LedgerEntry>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM dao_transactions WHERE user_id = ?1 ORDER BY id",
            TRANSACTION_COLS
        ),
        &[&user_id],
    )
}

// ============ Subscriptions ============

/// The active, unexpired subscription with the latest expiry.
pub fn get_active_subscription(conn: &Connection, user_id: &str) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM player_subscriptions
             WHERE user_id = ?1 AND is_active = 1 AND expires_at > ?2
             ORDER BY expires_at DESC LIMIT 1",
            SUBSCRIPTION_COLS
        ),
        &[&user_id, &now()],
    )
}

pub fn list_subscriptions_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Subscription>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM player_subscriptions WHERE user_id = ?1 ORDER BY id",
            SUBSCRIPTION_COLS
        ),
        &[&user_id],
    )
}

pub fn find_subscription_order_owner(conn: &Connection, order_id: &str) -> Result<Option<String>> {
    let owner = conn
        .query_row(
            "SELECT user_id FROM player_subscriptions WHERE order_id = ?1",
            params![order_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(owner)
}

// ============ AutoRenew ============

pub fn has_autorenew_purchase(conn: &Connection, user_id: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM autorenew_purchases WHERE user_id = ?1 AND is_active = 1",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn list_autorenew_purchases(conn: &Connection, user_id: &str) -> Result<Vec<AutoRenewPurchase>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM autorenew_purchases WHERE user_id = ?1 ORDER BY id",
            AUTORENEW_COLS
        ),
        &[&user_id],
    )
}
