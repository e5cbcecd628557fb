use axum::extract::State;
use axum::http::HeaderMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use super::common::{
    OwnerQuery, capture_with_recovery, check_order_rate_limit, checkout_urls, completed_payment,
    ensure_owner, ensure_shard, order_correlation,
};
use super::subscriptions::{CaptureByTokenRequest, CreateOrderResponse};
use crate::db::{AppState, queries};
use crate::error::{AppError, Result, ledger_error, msg};
use crate::extractors::{Json, Query};
use crate::ledger;
use crate::payments::{Correlation, OrderRequest};
use crate::pricing::AUTORENEW_PRICE_CENTS;
use crate::principal::Principal;
use crate::sanitize::{sanitize_identifier, sanitize_order_id};

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAutoRenewOrderRequest {
    #[serde(default, alias = "discordId")]
    pub owner_id: Option<String>,
    #[serde(default, alias = "server")]
    pub shard: Option<String>,
}

pub async fn create_autorenew_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateAutoRenewOrderRequest>,
) -> Result<Json<CreateOrderResponse>> {
    let principal = Principal::resolve(
        &headers,
        state.session_key.as_ref(),
        request.owner_id.as_deref(),
    )?;
    check_order_rate_limit(&state, &principal)?;
    let shard = state.shards.resolve(request.shard.as_deref())?.clone();

    let correlation = Correlation::AutoRenew {
        owner_id: principal.owner_id.clone(),
        shard: shard.label.clone(),
    }
    .to_string();
    let (return_url, cancel_url) = checkout_urls(&state, "autorenew");

    let created = state
        .paypal
        .create_order(&OrderRequest {
            amount_cents: AUTORENEW_PRICE_CENTS,
            description: "AutoRenew Unlock",
            custom_id: &correlation,
            return_url: &return_url,
            cancel_url: &cancel_url,
        })
        .await?;

    tracing::info!(
        "Created AutoRenew order {} for {} on {}",
        created.id,
        principal.owner_id,
        shard.label
    );

    Ok(Json(CreateOrderResponse {
        order_id: created.id,
        approval_url: created.approval_url,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivatedResponse {
    pub success: bool,
    pub activated: bool,
}

/// Capture an AutoRenew order. Activation is an upsert, so a retried
/// capture reactivates rather than duplicates.
pub async fn capture_autorenew_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CaptureByTokenRequest>,
) -> Result<Json<ActivatedResponse>> {
    let principal = Principal::resolve(
        &headers,
        state.session_key.as_ref(),
        request.owner_id.as_deref(),
    )?;
    let order_id = sanitize_order_id(&request.token)?;

    let order = state.paypal.get_order(&order_id).await?;
    let Correlation::AutoRenew { owner_id, shard: shard_label } = order_correlation(&order)? else {
        return Err(AppError::BadRequest(msg::INVALID_PURCHASE_TYPE.into()));
    };
    ensure_owner(&order_id, &owner_id, &principal)?;
    ensure_shard(&order_id, &shard_label, request.shard.as_deref())?;
    let shard = state.shards.resolve(Some(&shard_label))?.clone();

    let captured = capture_with_recovery(&state, &order_id, Some(order)).await?;
    let payment = completed_payment(&captured)?;
    if payment.amount_cents != AUTORENEW_PRICE_CENTS {
        tracing::error!(
            "AutoRenew order {} captured {} cents, expected {}",
            order_id,
            payment.amount_cents,
            AUTORENEW_PRICE_CENTS
        );
        return Err(AppError::BadRequest(msg::AMOUNT_VERIFICATION_FAILED.into()));
    }

    {
        let conn = shard.pool.get()?;
        ledger::activate_autorenew(&conn, &principal.owner_id, &payment.capture_id)
            .map_err(|e| ledger_error(e, &order_id))?;
    }

    tracing::info!(
        "AutoRenew unlocked for {} on {} (order {})",
        principal.owner_id,
        shard.label,
        order_id
    );

    Ok(Json(ActivatedResponse {
        success: true,
        activated: true,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPurchaseResponse {
    pub has_purchased: bool,
}

pub async fn check_autorenew_purchase(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<CheckPurchaseResponse>> {
    let principal = Principal::resolve(
        &headers,
        state.session_key.as_ref(),
        query.owner_id.as_deref(),
    )?;
    let shard = state.shards.resolve(query.shard.as_deref())?;
    let conn = shard.pool.get()?;

    Ok(Json(CheckPurchaseResponse {
        has_purchased: queries::has_autorenew_purchase(&conn, &principal.owner_id)?,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminActivateRequest {
    #[serde(alias = "discordId")]
    pub owner_id: String,
    #[serde(default, alias = "server")]
    pub shard: Option<String>,
    #[serde(default)]
    pub payment_id: Option<String>,
}

fn admin_key_matches(expected: &str, provided: &str) -> bool {
    let (expected, provided) = (expected.as_bytes(), provided.as_bytes());
    expected.len() == provided.len() && bool::from(expected.ct_eq(provided))
}

/// Grant AutoRenew without a payment (support tooling). Requires the admin key.
pub async fn admin_activate_autorenew(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AdminActivateRequest>,
) -> Result<Json<ActivatedResponse>> {
    let expected = state.admin_api_key.as_deref().ok_or_else(|| {
        tracing::warn!("Admin activation attempted but ADMIN_API_KEY is not set");
        AppError::Unauthorized
    })?;
    let provided = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !admin_key_matches(expected, provided) {
        tracing::warn!("Admin activation rejected: {}", msg::INVALID_ADMIN_KEY);
        return Err(AppError::Unauthorized);
    }

    let owner_id = sanitize_identifier(&request.owner_id)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let payment_id = match request.payment_id.as_deref() {
        Some(id) => sanitize_identifier(id).map_err(|_| {
            AppError::BadRequest("Invalid payment ID".into())
        })?,
        None => format!("admin-{}", Utc::now().timestamp()),
    };
    let shard = state.shards.resolve(request.shard.as_deref())?;

    let conn = shard.pool.get()?;
    ledger::activate_autorenew(&conn, &owner_id, &payment_id)
        .map_err(|e| ledger_error(e, &payment_id))?;

    tracing::info!(
        "Admin activated AutoRenew for {} on {} (payment {})",
        owner_id,
        shard.label,
        payment_id
    );

    Ok(Json(ActivatedResponse {
        success: true,
        activated: true,
    }))
}
