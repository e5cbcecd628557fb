//! Row mapping trait and helpers for reducing boilerplate in queries.
//!
//! Models implement `FromRow` against the column order of the matching
//! `*_COLS` constant below, which lets `query_one`/`query_all` stay generic.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Parse an optional JSON text column.
fn parse_json<T: serde::de::DeserializeOwned>(
    row: &Row,
    col: usize,
) -> rusqlite::Result<Option<T>> {
    row.get::<_, Option<String>>(col)?
        .map(|s| {
            serde_json::from_str(&s).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    col,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
        })
        .transpose()
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const PLAYER_COLS: &str = "id, dao_coins, dao_coins_spent";

pub const COUPON_COLS: &str = "id, code, bonus_percentage, min_purchase_cents, max_uses, current_uses, active, valid_from, valid_until";

pub const ORDER_METADATA_COLS: &str = "order_id, user_id, shard, amount_cents, base_coins, bonus_coins, coupon_code, bonus_percentage, packages, created_at, expires_at";

pub const TRANSACTION_COLS: &str = "id, user_id, amount, type, description, coupon_code, bonus_coins, package_type, provider_order_id, created_at";

pub const SUBSCRIPTION_COLS: &str = "id, user_id, tier, tier_name, qi_boost_percent, duration_months, price_paid_cents, payment_id, order_id, expires_at, is_active, created_at";

pub const AUTORENEW_COLS: &str =
    "id, user_id, payment_id, is_active, created_at, last_renewed_at";

// ============ FromRow Implementations ============

impl FromRow for Player {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Player {
            id: row.get(0)?,
            dao_coins: row.get(1)?,
            dao_coins_spent: row.get(2)?,
        })
    }
}

impl FromRow for Coupon {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Coupon {
            id: row.get(0)?,
            code: row.get(1)?,
            bonus_percentage: row.get(2)?,
            min_purchase_cents: row.get(3)?,
            max_uses: row.get(4)?,
            current_uses: row.get(5)?,
            active: row.get::<_, i32>(6)? != 0,
            valid_from: row.get(7)?,
            valid_until: row.get(8)?,
        })
    }
}

impl FromRow for OrderMetadata {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(OrderMetadata {
            order_id: row.get(0)?,
            user_id: row.get(1)?,
            shard: row.get(2)?,
            amount_cents: row.get(3)?,
            base_coins: row.get(4)?,
            bonus_coins: row.get(5)?,
            coupon_code: row.get(6)?,
            bonus_percentage: row.get(7)?,
            packages: parse_json(row, 8)?,
            created_at: row.get(9)?,
            expires_at: row.get(10)?,
        })
    }
}

impl FromRow for LedgerEntry {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(LedgerEntry {
            id: row.get(0)?,
            user_id: row.get(1)?,
            amount: row.get(2)?,
            transaction_type: parse_enum(row, 3, "type")?,
            description: row.get(4)?,
            coupon_code: row.get(5)?,
            bonus_coins: row.get(6)?,
            package_type: row.get(7)?,
            provider_order_id: row.get(8)?,
            created_at: row.get(9)?,
        })
    }
}

impl FromRow for Subscription {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Subscription {
            id: row.get(0)?,
            user_id: row.get(1)?,
            tier: row.get(2)?,
            tier_name: row.get(3)?,
            qi_boost_percent: row.get(4)?,
            duration_months: row.get(5)?,
            price_paid_cents: row.get(6)?,
            payment_id: row.get(7)?,
            order_id: row.get(8)?,
            expires_at: row.get(9)?,
            is_active: row.get::<_, i32>(10)? != 0,
            created_at: row.get(11)?,
        })
    }
}

impl FromRow for AutoRenewPurchase {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(AutoRenewPurchase {
            id: row.get(0)?,
            user_id: row.get(1)?,
            payment_id: row.get(2)?,
            is_active: row.get::<_, i32>(3)? != 0,
            created_at: row.get(4)?,
            last_renewed_at: row.get(5)?,
        })
    }
}
