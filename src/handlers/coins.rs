use axum::extract::State;
use axum::http::HeaderMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::common::{
    capture_with_recovery, check_order_rate_limit, checkout_urls, completed_payment, ensure_owner,
    ensure_shard,
};
use crate::db::{AppState, Shard, queries};
use crate::error::{AppError, OptionExt, Result, ledger_error, msg};
use crate::extractors::Json;
use crate::ledger::{self, Credit};
use crate::models::{CreateOrderMetadata, purchase_description};
use crate::payments::{Correlation, OrderRequest};
use crate::pricing::{CoinOrderTerms, PackageRequest};
use crate::principal::Principal;
use crate::sanitize::{sanitize_amount, sanitize_coupon_code, sanitize_order_id};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCoinOrderRequest {
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub packages: Option<Vec<PackageRequest>>,
    #[serde(default, alias = "discordId")]
    pub owner_id: Option<String>,
    #[serde(default, alias = "server")]
    pub shard: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCoinOrderResponse {
    pub order_id: String,
    pub shard: String,
    pub approval_url: String,
}

/// Price a coin order, register it with PayPal and record its terms.
pub async fn create_coin_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateCoinOrderRequest>,
) -> Result<Json<CreateCoinOrderResponse>> {
    let principal = Principal::resolve(
        &headers,
        state.session_key.as_ref(),
        request.owner_id.as_deref(),
    )?;
    check_order_rate_limit(&state, &principal)?;

    let amount_cents = sanitize_amount(request.amount.as_ref())?;
    let shard = state.shards.resolve(request.shard.as_deref())?.clone();
    let packages = request.packages.unwrap_or_default();

    let coupon_code = request
        .coupon_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    if coupon_code.is_some() && !packages.is_empty() {
        return Err(AppError::BadRequest(msg::COUPON_WITH_PACKAGES.into()));
    }

    let mut terms = CoinOrderTerms::price(amount_cents, &packages)?;

    if let Some(raw) = coupon_code {
        match sanitize_coupon_code(raw) {
            Ok(code) => {
                let conn = shard.pool.get()?;
                match queries::get_coupon_by_code(&conn, &code)? {
                    Some(coupon) if terms.apply_coupon(&coupon, Utc::now().timestamp()) => {
                        tracing::debug!(
                            "Coupon {} adds {} bonus coins for {}",
                            code,
                            terms.bonus_coins,
                            principal.owner_id
                        );
                    }
                    _ => tracing::debug!("Coupon {} not applicable, ignoring", code),
                }
            }
            Err(_) => tracing::debug!("Ignoring malformed coupon code"),
        }
    }

    let correlation = Correlation::Coins {
        owner_id: principal.owner_id.clone(),
        shard: shard.label.clone(),
    }
    .to_string();
    let description = terms.description();
    let (return_url, cancel_url) = checkout_urls(&state, "payment");

    let created = state
        .paypal
        .create_order(&OrderRequest {
            amount_cents,
            description: &description,
            custom_id: &correlation,
            return_url: &return_url,
            cancel_url: &cancel_url,
        })
        .await?;

    {
        let conn = state.shards.primary().pool.get()?;
        if let Err(e) = queries::delete_expired_order_metadata(&conn) {
            tracing::warn!("Failed to sweep expired order metadata: {}", e);
        }
        queries::create_order_metadata(
            &conn,
            &CreateOrderMetadata {
                order_id: created.id.clone(),
                user_id: principal.owner_id.clone(),
                shard: shard.label.clone(),
                amount_cents,
                base_coins: terms.base_coins,
                bonus_coins: terms.bonus_coins,
                coupon_code: terms.coupon_code.clone(),
                bonus_percentage: terms.bonus_percentage,
                packages: terms.packages.clone(),
            },
        )?;
    }

    tracing::info!(
        "Created PayPal order {} for {} on {}: {} coins (+{} bonus)",
        created.id,
        principal.owner_id,
        shard.label,
        terms.base_coins,
        terms.bonus_coins
    );

    Ok(Json(CreateCoinOrderResponse {
        order_id: created.id,
        shard: shard.label,
        approval_url: created.approval_url,
    }))
}

fn guard_replay(shard: &Shard, order_id: &str, principal: &Principal) -> Result<()> {
    let conn = shard.pool.get()?;
    ledger::check_coin_replay(&conn, order_id, &principal.owner_id)?
        .into_result(order_id, &principal.owner_id)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureCoinOrderRequest {
    pub order_id: String,
    #[serde(default, alias = "discordId")]
    pub owner_id: Option<String>,
    #[serde(default, alias = "server")]
    pub shard: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureCoinOrderResponse {
    pub success: bool,
    pub credited_units: i64,
    pub base_units: i64,
    pub bonus_units: i64,
    pub coupon_code: Option<String>,
    pub transaction_id: i64,
    pub shard: String,
}

/// Capture a coin order and credit the player exactly once.
///
/// Terms come from the order metadata written at creation, never from the
/// request or the provider's amount. The metadata row is only deleted after
/// the ledger transaction commits.
pub async fn capture_coin_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CaptureCoinOrderRequest>,
) -> Result<Json<CaptureCoinOrderResponse>> {
    let principal = Principal::resolve(
        &headers,
        state.session_key.as_ref(),
        request.owner_id.as_deref(),
    )?;
    let order_id = sanitize_order_id(&request.order_id)?;

    // A retry of a credited order is answered before anything else, even
    // though its metadata is already gone.
    let requested = state.shards.resolve(request.shard.as_deref())?.clone();
    guard_replay(&requested, &order_id, &principal)?;

    let metadata = {
        let conn = state.shards.primary().pool.get()?;
        queries::get_live_order_metadata(&conn, &order_id)?
            .or_not_found(msg::ORDER_DATA_NOT_FOUND)?
    };
    ensure_owner(&order_id, &metadata.user_id, &principal)?;
    ensure_shard(&order_id, &metadata.shard, request.shard.as_deref())?;
    let shard = state.shards.resolve(Some(&metadata.shard))?.clone();
    if shard.label != requested.label {
        guard_replay(&shard, &order_id, &principal)?;
    }

    let order = capture_with_recovery(&state, &order_id, None).await?;
    let payment = completed_payment(&order)?;

    if payment.amount_cents != metadata.amount_cents {
        tracing::error!(
            "Amount mismatch on order {}: captured {} cents, expected {} cents",
            order_id,
            payment.amount_cents,
            metadata.amount_cents
        );
        let conn = state.shards.primary().pool.get()?;
        if let Err(e) = queries::delete_order_metadata(&conn, &order_id) {
            tracing::warn!("Failed to delete metadata for order {}: {}", order_id, e);
        }
        return Err(AppError::BadRequest(msg::AMOUNT_VERIFICATION_FAILED.into()));
    }

    let receipt = {
        let mut conn = shard.pool.get()?;
        let credit = Credit {
            owner_id: &principal.owner_id,
            provider_order_id: &order_id,
            base_coins: metadata.base_coins,
            bonus_coins: metadata.bonus_coins,
            coupon_code: metadata.coupon_code.as_deref(),
            description: purchase_description(
                &order_id,
                metadata.amount_cents,
                metadata.coupon_code.as_deref(),
                metadata.bonus_coins,
            ),
            package_type: metadata.package_label(),
        };
        ledger::apply_credit(&mut conn, &credit).map_err(|e| ledger_error(e, &order_id))?
    };

    {
        let cleanup = state
            .shards
            .primary()
            .pool
            .get()
            .map_err(AppError::from)
            .and_then(|conn| queries::delete_order_metadata(&conn, &order_id));
        if let Err(e) = cleanup {
            tracing::warn!("Failed to delete metadata for order {}: {}", order_id, e);
        }
    }

    tracing::info!(
        "Credited {} coins ({} base, {} bonus) to {} on {} for order {}",
        receipt.total_credited,
        metadata.base_coins,
        metadata.bonus_coins,
        principal.owner_id,
        shard.label,
        order_id
    );

    Ok(Json(CaptureCoinOrderResponse {
        success: true,
        credited_units: receipt.total_credited,
        base_units: metadata.base_coins,
        bonus_units: metadata.bonus_coins,
        coupon_code: metadata.coupon_code,
        transaction_id: receipt.transaction_id,
        shard: shard.label,
    }))
}
