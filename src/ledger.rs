//! Ledger transaction engine and replay guard.
//!
//! Every balance or subscription mutation runs inside one `IMMEDIATE`
//! transaction on the target shard. The write lock is taken at `BEGIN`, so
//! concurrent captures for the same player serialize there. On any failure
//! the transaction is rolled back; a failed rollback is logged and the
//! original error is returned.

use chrono::{DateTime, Months, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use thiserror::Error;

use crate::db::queries;
use crate::error::{AppError, Result, msg};
use crate::models::{ActivateSubscription, Subscription, TransactionType};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("player not found")]
    PlayerNotFound,

    #[error("provider order already recorded")]
    Duplicate,

    #[error("subscription expiry out of range")]
    ExpiryOutOfRange,

    #[error(transparent)]
    Database(rusqlite::Error),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        if is_unique_violation(&e) {
            LedgerError::Duplicate
        } else {
            LedgerError::Database(e)
        }
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Run `f` inside an immediate transaction, committing on success.
fn with_immediate_tx<T>(
    conn: &mut Connection,
    f: impl FnOnce(&Transaction) -> std::result::Result<T, LedgerError>,
) -> std::result::Result<T, LedgerError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    match f(&tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback() {
                tracing::error!("Rollback failed after {}: {}", e, rollback_err);
            }
            Err(e)
        }
    }
}

// ============ Replay guard ============

/// Result of probing a shard for an earlier capture of the same provider order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayCheck {
    Fresh,
    /// Recorded for the same owner: a benign retry
    SameOwner,
    /// Recorded for someone else: collision or cross-account replay
    OtherOwner(String),
}

impl ReplayCheck {
    fn classify(existing_owner: Option<String>, owner_id: &str) -> Self {
        match existing_owner {
            None => ReplayCheck::Fresh,
            Some(existing) if existing == owner_id => ReplayCheck::SameOwner,
            Some(existing) => ReplayCheck::OtherOwner(existing),
        }
    }

    /// Fresh orders pass; retries are 409 and collisions are 400.
    pub fn into_result(self, order_id: &str, owner_id: &str) -> Result<()> {
        match self {
            ReplayCheck::Fresh => Ok(()),
            ReplayCheck::SameOwner => {
                tracing::warn!(
                    "Duplicate capture attempt for order {} by {}",
                    order_id,
                    owner_id
                );
                Err(AppError::Conflict(msg::ORDER_ALREADY_PROCESSED.into()))
            }
            ReplayCheck::OtherOwner(existing) => {
                tracing::warn!(
                    "Order {} already credited to {}, rejecting capture by {}",
                    order_id,
                    existing,
                    owner_id
                );
                Err(AppError::BadRequest(msg::INVALID_ORDER.into()))
            }
        }
    }
}

/// Probe the transaction log for a coin order.
pub fn check_coin_replay(conn: &Connection, order_id: &str, owner_id: &str) -> Result<ReplayCheck> {
    let existing = queries::find_order_transaction_owner(conn, order_id)?;
    Ok(ReplayCheck::classify(existing, owner_id))
}

/// Probe subscriptions for an order already activated.
pub fn check_subscription_replay(
    conn: &Connection,
    order_id: &str,
    owner_id: &str,
) -> Result<ReplayCheck> {
    let existing = queries::find_subscription_order_owner(conn, order_id)?;
    Ok(ReplayCheck::classify(existing, owner_id))
}

// ============ Coin credit ============

/// A coin credit for one captured provider order.
#[derive(Debug, Clone)]
pub struct Credit<'a> {
    pub owner_id: &'a str,
    pub provider_order_id: &'a str,
    pub base_coins: i64,
    pub bonus_coins: i64,
    pub coupon_code: Option<&'a str>,
    pub description: String,
    pub package_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditReceipt {
    pub transaction_id: i64,
    pub total_credited: i64,
}

/// Lock the player, add coins, count the coupon use and append the log row,
/// all or nothing.
pub fn apply_credit(
    conn: &mut Connection,
    credit: &Credit<'_>,
) -> std::result::Result<CreditReceipt, LedgerError> {
    let total = credit.base_coins + credit.bonus_coins;

    with_immediate_tx(conn, |tx| {
        let exists = tx
            .query_row(
                "SELECT 1 FROM players WHERE id = ?1",
                params![credit.owner_id],
                |_| Ok(()),
            )
            .optional()?;
        if exists.is_none() {
            return Err(LedgerError::PlayerNotFound);
        }

        tx.execute(
            "UPDATE players SET dao_coins = dao_coins + ?1, dao_coins_spent = dao_coins_spent + ?1 WHERE id = ?2",
            params![total, credit.owner_id],
        )?;

        if let Some(code) = credit.coupon_code {
            tx.execute(
                "UPDATE dao_coupons SET current_uses = current_uses + 1 WHERE code = ?1",
                params![code],
            )?;
        }

        tx.execute(
            "INSERT INTO dao_transactions
                (user_id, amount, type, description, coupon_code, bonus_coins, package_type, provider_order_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                credit.owner_id,
                total,
                TransactionType::WebPurchase.as_ref(),
                &credit.description,
                credit.coupon_code,
                credit.bonus_coins,
                &credit.package_type,
                credit.provider_order_id,
                Utc::now().timestamp(),
            ],
        )?;

        Ok(CreditReceipt {
            transaction_id: tx.last_insert_rowid(),
            total_credited: total,
        })
    })
}

// ============ Subscriptions ============

/// New expiry for a purchase of `months`: stacked onto the current expiry
/// when one is still running, otherwise counted from `now`.
pub fn extended_expiry(
    current_expiry: Option<i64>,
    months: u32,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let start = current_expiry
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .filter(|expiry| *expiry > now)
        .unwrap_or(now);
    start.checked_add_months(Months::new(months))
}

/// Deactivate the owner's current subscription and insert the new active
/// period, preserving unused time.
pub fn activate_subscription(
    conn: &mut Connection,
    input: &ActivateSubscription,
    now: DateTime<Utc>,
) -> std::result::Result<Subscription, LedgerError> {
    with_immediate_tx(conn, |tx| {
        let current_expiry: Option<i64> = tx
            .query_row(
                "SELECT expires_at FROM player_subscriptions
                 WHERE user_id = ?1 AND is_active = 1 AND expires_at > ?2
                 ORDER BY expires_at DESC LIMIT 1",
                params![&input.user_id, now.timestamp()],
                |row| row.get(0),
            )
            .optional()?;

        let expires_at = extended_expiry(current_expiry, input.duration_months, now)
            .ok_or(LedgerError::ExpiryOutOfRange)?
            .timestamp();

        tx.execute(
            "UPDATE player_subscriptions SET is_active = 0 WHERE user_id = ?1 AND is_active = 1",
            params![&input.user_id],
        )?;

        tx.execute(
            "INSERT INTO player_subscriptions
                (user_id, tier, tier_name, qi_boost_percent, duration_months, price_paid_cents, payment_id, order_id, expires_at, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10)",
            params![
                &input.user_id,
                input.tier,
                &input.tier_name,
                input.qi_boost_percent,
                input.duration_months,
                input.price_paid_cents,
                &input.payment_id,
                &input.order_id,
                expires_at,
                now.timestamp(),
            ],
        )?;

        Ok(Subscription {
            id: tx.last_insert_rowid(),
            user_id: input.user_id.clone(),
            tier: input.tier,
            tier_name: input.tier_name.clone(),
            qi_boost_percent: input.qi_boost_percent,
            duration_months: i64::from(input.duration_months),
            price_paid_cents: input.price_paid_cents,
            payment_id: input.payment_id.clone(),
            order_id: input.order_id.clone(),
            expires_at,
            is_active: true,
            created_at: now.timestamp(),
        })
    })
}

// ============ AutoRenew ============

/// Record an AutoRenew unlock. Re-purchasing with the same payment id
/// reactivates the existing row.
pub fn activate_autorenew(
    conn: &Connection,
    user_id: &str,
    payment_id: &str,
) -> std::result::Result<(), LedgerError> {
    let now = Utc::now().timestamp();
    conn.execute(
        "INSERT INTO autorenew_purchases (user_id, payment_id, is_active, created_at, last_renewed_at)
         VALUES (?1, ?2, 1, ?3, ?3)
         ON CONFLICT(user_id, payment_id) DO UPDATE SET is_active = 1, last_renewed_at = excluded.last_renewed_at",
        params![user_id, payment_id, now],
    )
    .map_err(LedgerError::Database)?;
    Ok(())
}
