use axum::extract::State;
use axum::http::HeaderMap;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::common::{
    OwnerQuery, capture_with_recovery, check_order_rate_limit, checkout_urls, completed_payment,
    ensure_owner, ensure_shard, order_correlation,
};
use crate::db::{AppState, queries};
use crate::error::{AppError, Result, ledger_error, msg};
use crate::extractors::{Json, Query};
use crate::ledger;
use crate::models::{ActivateSubscription, Subscription};
use crate::payments::{Correlation, OrderRequest};
use crate::pricing::{SubscriptionTier, find_tier, subscription_price_cents};
use crate::principal::Principal;
use crate::sanitize::{sanitize_amount, sanitize_order_id};

fn rfc3339(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Tier and total price for a subscription purchase, or 400.
fn resolve_tier(tier_id: i64, months: i64) -> Result<(&'static SubscriptionTier, i64)> {
    let tier = find_tier(tier_id).ok_or_else(|| AppError::BadRequest(msg::INVALID_TIER.into()))?;
    let price = subscription_price_cents(tier, months)
        .ok_or_else(|| AppError::BadRequest(msg::INVALID_DURATION.into()))?;
    Ok((tier, price))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionOrderRequest {
    pub tier_id: i64,
    #[serde(alias = "duration")]
    pub months: i64,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default, alias = "discordId")]
    pub owner_id: Option<String>,
    #[serde(default, alias = "server")]
    pub shard: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub approval_url: String,
}

/// Validate a subscription purchase and register it with PayPal. Downgrades
/// are refused before the provider is contacted.
pub async fn create_subscription_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateSubscriptionOrderRequest>,
) -> Result<Json<CreateOrderResponse>> {
    let principal = Principal::resolve(
        &headers,
        state.session_key.as_ref(),
        request.owner_id.as_deref(),
    )?;
    check_order_rate_limit(&state, &principal)?;

    let (tier, price_cents) = resolve_tier(request.tier_id, request.months)?;
    let amount_cents = sanitize_amount(request.amount.as_ref())?;
    if amount_cents != price_cents {
        return Err(AppError::BadRequest(msg::SUBSCRIPTION_PRICE_MISMATCH.into()));
    }

    let shard = state.shards.resolve(request.shard.as_deref())?.clone();
    {
        let conn = shard.pool.get()?;
        if let Some(active) = queries::get_active_subscription(&conn, &principal.owner_id)? {
            if active.tier > tier.id {
                tracing::info!(
                    "Refusing downgrade for {} on {}: active tier {}, requested {}",
                    principal.owner_id,
                    shard.label,
                    active.tier,
                    tier.id
                );
                return Err(AppError::BadRequest(msg::DOWNGRADE_NOT_ALLOWED.into()));
            }
        }
    }

    let correlation = Correlation::Subscription {
        tier: tier.id,
        months: request.months,
        owner_id: principal.owner_id.clone(),
        shard: shard.label.clone(),
    }
    .to_string();
    let plural = if request.months == 1 { "" } else { "s" };
    let description = format!(
        "{} Subscription - {} month{}",
        tier.name, request.months, plural
    );
    let (return_url, cancel_url) = checkout_urls(&state, "subscription");

    let created = state
        .paypal
        .create_order(&OrderRequest {
            amount_cents: price_cents,
            description: &description,
            custom_id: &correlation,
            return_url: &return_url,
            cancel_url: &cancel_url,
        })
        .await?;

    tracing::info!(
        "Created subscription order {} for {} on {}: {} x{} months",
        created.id,
        principal.owner_id,
        shard.label,
        tier.name,
        request.months
    );

    Ok(Json(CreateOrderResponse {
        order_id: created.id,
        approval_url: created.approval_url,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureByTokenRequest {
    /// PayPal order id, as returned on the approval redirect
    #[serde(alias = "orderId")]
    pub token: String,
    #[serde(default, alias = "discordId")]
    pub owner_id: Option<String>,
    #[serde(default, alias = "server")]
    pub shard: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    pub tier: i64,
    pub tier_name: String,
    pub boost_percent: i64,
    pub months: i64,
    pub expires_at: String,
}

impl From<&Subscription> for SubscriptionSummary {
    fn from(sub: &Subscription) -> Self {
        Self {
            tier: sub.tier,
            tier_name: sub.tier_name.clone(),
            boost_percent: sub.qi_boost_percent,
            months: sub.duration_months,
            expires_at: rfc3339(sub.expires_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CaptureSubscriptionResponse {
    pub success: bool,
    pub subscription: SubscriptionSummary,
}

/// Capture a subscription order and activate (or extend) the subscription.
pub async fn capture_subscription_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CaptureByTokenRequest>,
) -> Result<Json<CaptureSubscriptionResponse>> {
    let principal = Principal::resolve(
        &headers,
        state.session_key.as_ref(),
        request.owner_id.as_deref(),
    )?;
    let order_id = sanitize_order_id(&request.token)?;

    let order = state.paypal.get_order(&order_id).await?;
    let Correlation::Subscription {
        tier: tier_id,
        months,
        owner_id,
        shard: shard_label,
    } = order_correlation(&order)?
    else {
        return Err(AppError::BadRequest(msg::INVALID_PURCHASE_TYPE.into()));
    };
    ensure_owner(&order_id, &owner_id, &principal)?;
    ensure_shard(&order_id, &shard_label, request.shard.as_deref())?;
    let shard = state.shards.resolve(Some(&shard_label))?.clone();
    let (tier, price_cents) = resolve_tier(tier_id, months)?;
    let duration_months = u32::try_from(months)
        .map_err(|_| AppError::BadRequest(msg::INVALID_DURATION.into()))?;

    {
        let conn = shard.pool.get()?;
        ledger::check_subscription_replay(&conn, &order_id, &principal.owner_id)?
            .into_result(&order_id, &principal.owner_id)?;
    }

    let captured = capture_with_recovery(&state, &order_id, Some(order)).await?;
    let payment = completed_payment(&captured)?;
    if payment.amount_cents != price_cents {
        tracing::error!(
            "Subscription order {} captured {} cents, expected {}",
            order_id,
            payment.amount_cents,
            price_cents
        );
        return Err(AppError::BadRequest(msg::AMOUNT_VERIFICATION_FAILED.into()));
    }

    let subscription = {
        let mut conn = shard.pool.get()?;
        ledger::activate_subscription(
            &mut conn,
            &ActivateSubscription {
                user_id: principal.owner_id.clone(),
                tier: tier.id,
                tier_name: tier.name.to_string(),
                qi_boost_percent: tier.boost_percent,
                duration_months,
                price_paid_cents: price_cents,
                payment_id: payment.capture_id.clone(),
                order_id: order_id.clone(),
            },
            Utc::now(),
        )
        .map_err(|e| ledger_error(e, &order_id))?
    };

    tracing::info!(
        "Activated {} for {} on {} until {} (order {})",
        subscription.tier_name,
        principal.owner_id,
        shard.label,
        rfc3339(subscription.expires_at),
        order_id
    );

    Ok(Json(CaptureSubscriptionResponse {
        success: true,
        subscription: SubscriptionSummary::from(&subscription),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatusResponse {
    pub has_active_subscription: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionSummary>,
}

pub async fn subscription_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<SubscriptionStatusResponse>> {
    let principal = Principal::resolve(
        &headers,
        state.session_key.as_ref(),
        query.owner_id.as_deref(),
    )?;
    let shard = state.shards.resolve(query.shard.as_deref())?;
    let conn = shard.pool.get()?;
    let active = queries::get_active_subscription(&conn, &principal.owner_id)?;

    Ok(Json(SubscriptionStatusResponse {
        has_active_subscription: active.is_some(),
        subscription: active.as_ref().map(SubscriptionSummary::from),
    }))
}
