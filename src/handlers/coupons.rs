use axum::extract::State;
use axum::http::HeaderMap;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::{AppState, queries};
use crate::error::{Result, msg};
use crate::extractors::Json;
use crate::principal::Principal;
use crate::sanitize::{sanitize_amount, sanitize_coupon_code};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCouponRequest {
    pub code: String,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default, alias = "server")]
    pub shard: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRemaining {
    pub days: i64,
    pub hours: i64,
    pub valid_until: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCouponResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bonus_percentage: Option<i64>,
    /// Minimum purchase in dollars
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_purchase: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining: Option<TimeRemaining>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidateCouponResponse {
    fn invalid(error: String) -> Self {
        Self {
            valid: false,
            code: None,
            bonus_percentage: None,
            min_purchase: None,
            time_remaining: None,
            error: Some(error),
        }
    }
}

/// Preview a coupon against an amount. Never counts a use.
pub async fn validate_coupon(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ValidateCouponRequest>,
) -> Result<Json<ValidateCouponResponse>> {
    Principal::resolve(&headers, state.session_key.as_ref(), None)?.require_session()?;

    let code = sanitize_coupon_code(&request.code)?;
    let amount_cents = sanitize_amount(request.amount.as_ref())?;
    let shard = state.shards.resolve(request.shard.as_deref())?;

    let conn = shard.pool.get()?;
    let Some(coupon) = queries::get_coupon_by_code(&conn, &code)? else {
        return Ok(Json(ValidateCouponResponse::invalid(msg::INVALID_COUPON.into())));
    };

    let now = Utc::now().timestamp();
    if let Err(rejection) = coupon.check(amount_cents, now) {
        return Ok(Json(ValidateCouponResponse::invalid(rejection.message())));
    }

    let remaining = (coupon.valid_until - now).max(0);
    let valid_until = DateTime::from_timestamp(coupon.valid_until, 0)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true);

    Ok(Json(ValidateCouponResponse {
        valid: true,
        code: Some(coupon.code),
        bonus_percentage: Some(coupon.bonus_percentage),
        min_purchase: Some(coupon.min_purchase_cents as f64 / 100.0),
        time_remaining: Some(TimeRemaining {
            days: remaining / 86_400,
            hours: (remaining % 86_400) / 3_600,
            valid_until,
        }),
        error: None,
    }))
}
