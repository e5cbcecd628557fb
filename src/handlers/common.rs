//! Steps shared by the create/capture handlers.

use serde::Deserialize;

use crate::db::AppState;
use crate::error::{AppError, Result, msg};
use crate::payments::{CaptureOutcome, CapturedPayment, Correlation, Order};
use crate::principal::Principal;

/// Owner and shard as sent in query strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerQuery {
    #[serde(default, alias = "discordId")]
    pub owner_id: Option<String>,
    #[serde(default, alias = "server")]
    pub shard: Option<String>,
}

/// Counts one order creation against the owner's window.
pub fn check_order_rate_limit(state: &AppState, principal: &Principal) -> Result<()> {
    if !state.order_rate_limit.check(&principal.owner_id) {
        tracing::warn!("Order rate limit hit for {}", principal.owner_id);
        return Err(AppError::TooManyRequests(msg::TOO_MANY_REQUESTS.into()));
    }
    Ok(())
}

/// Return and cancel URLs handed to the provider for a checkout flow.
pub fn checkout_urls(state: &AppState, flow: &str) -> (String, String) {
    let base = state.base_url.trim_end_matches('/');
    (
        format!("{}/{}/success", base, flow),
        format!("{}/{}/cancel", base, flow),
    )
}

/// Capture an order, treating "already captured" as success. `fetched` is
/// order data already read from the provider, reused instead of a second
/// lookup when the capture turns out to have happened earlier.
pub async fn capture_with_recovery(
    state: &AppState,
    order_id: &str,
    fetched: Option<Order>,
) -> Result<Order> {
    match state.paypal.capture_order(order_id).await? {
        CaptureOutcome::Completed(order) => Ok(order),
        CaptureOutcome::AlreadyCaptured => match fetched {
            Some(order) if order.captured().is_ok() => Ok(order),
            _ => Ok(state.paypal.get_order(order_id).await?),
        },
    }
}

/// The completed capture of `order`, or 400 if the payment did not settle.
pub fn completed_payment(order: &Order) -> Result<CapturedPayment> {
    let payment = order.captured()?;
    if !order.is_completed() || payment.status != "COMPLETED" {
        tracing::warn!(
            "Order {} not completed (order {}, capture {})",
            order.id,
            order.status,
            payment.status
        );
        return Err(AppError::BadRequest(msg::PAYMENT_NOT_COMPLETED.into()));
    }
    Ok(payment)
}

/// Parse the correlation id the order was created with.
pub fn order_correlation(order: &Order) -> Result<Correlation> {
    order
        .custom_id()
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| AppError::BadRequest(msg::INVALID_PURCHASE_TYPE.into()))
}

/// Owner of the order must be the requester.
pub fn ensure_owner(order_id: &str, expected_owner: &str, principal: &Principal) -> Result<()> {
    if expected_owner != principal.owner_id {
        tracing::warn!(
            "Order {} belongs to {}, capture attempted by {}",
            order_id,
            expected_owner,
            principal.owner_id
        );
        return Err(AppError::Forbidden(msg::UNAUTHORIZED_PAYMENT.into()));
    }
    Ok(())
}

/// A shard named by the client must agree with the one the order was made for.
pub fn ensure_shard(order_id: &str, order_shard: &str, requested: Option<&str>) -> Result<()> {
    match requested.map(str::trim).filter(|s| !s.is_empty()) {
        Some(label) if !label.eq_ignore_ascii_case(order_shard) => {
            tracing::warn!(
                "Order {} was created for shard {}, capture requested on {}",
                order_id,
                order_shard,
                label
            );
            Err(AppError::BadRequest(msg::INVALID_ORDER.into()))
        }
        _ => Ok(()),
    }
}
