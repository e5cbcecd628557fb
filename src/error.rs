use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::payments::GatewayError;
use crate::sanitize::SanitizeError;

/// User-facing messages shared across handlers.
pub mod msg {
    pub const INVALID_ORDER: &str = "Invalid order";
    pub const ORDER_ALREADY_PROCESSED: &str = "This order has already been processed";
    pub const ORDER_DATA_NOT_FOUND: &str = "Order data not found. Please try creating a new order.";
    pub const PLAYER_NOT_FOUND: &str = "Player not found";
    pub const PRICE_MISMATCH: &str = "Package price mismatch. Please refresh and try again.";
    pub const COUPON_WITH_PACKAGES: &str = "Coupon codes cannot be used with package purchases";
    pub const PAYMENT_NOT_COMPLETED: &str = "Payment not completed";
    pub const AMOUNT_VERIFICATION_FAILED: &str = "Payment amount verification failed";
    pub const UNAUTHORIZED_PAYMENT: &str = "Unauthorized payment";
    pub const TOO_MANY_REQUESTS: &str = "Too many requests. Please wait before trying again.";
    pub const UNKNOWN_SHARD: &str = "Unknown server";
    pub const INVALID_TIER: &str = "Invalid tier";
    pub const INVALID_DURATION: &str = "Invalid duration";
    pub const DOWNGRADE_NOT_ALLOWED: &str =
        "You already have a higher subscription tier active. Downgrades are not allowed.";
    pub const INVALID_PURCHASE_TYPE: &str = "Invalid purchase type";
    pub const SUBSCRIPTION_PRICE_MISMATCH: &str = "Price mismatch";
    pub const INVALID_ADMIN_KEY: &str = "Invalid admin key";
    pub const INVALID_COUPON: &str = "Invalid or expired coupon code";
    pub const PAYMENT_TIMEOUT: &str =
        "Payment verification timeout. Please contact support if payment was deducted.";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error("Payment provider error: {0}")]
    Upstream(String),

    #[error("Payment provider timed out")]
    UpstreamTimeout,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Ledger transaction failed for order {order_id}")]
    Ledger { order_id: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<SanitizeError> for AppError {
    fn from(err: SanitizeError) -> Self {
        match err {
            SanitizeError::InvalidIdentifier => AppError::Unauthorized,
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotConfigured(detail) => AppError::Configuration(detail),
            GatewayError::Timeout => AppError::UpstreamTimeout,
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone())),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized", None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "Forbidden", Some(msg.clone())),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", Some(msg.clone())),
            AppError::TooManyRequests(msg) => {
                (StatusCode::TOO_MANY_REQUESTS, "Too many requests", Some(msg.clone()))
            }
            AppError::Upstream(detail) => {
                tracing::error!("Payment provider error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Payment provider error",
                    Some("Payment processing failed. Please try again later.".to_string()),
                )
            }
            AppError::UpstreamTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "Gateway timeout",
                Some(msg::PAYMENT_TIMEOUT.to_string()),
            ),
            AppError::Configuration(detail) => {
                tracing::error!("Configuration error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Payment system not configured",
                    None,
                )
            }
            AppError::Ledger { order_id } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                Some(format!(
                    "Failed to process payment. Please contact support with order ID: {}",
                    order_id
                )),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Converts a missing row into a 404 with the given message.
pub trait OptionExt<T> {
    fn or_not_found(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, message: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(message.to_string()))
    }
}

/// Maps a ledger failure for `order_id` onto the HTTP error taxonomy.
pub fn ledger_error(err: LedgerError, order_id: &str) -> AppError {
    match err {
        LedgerError::PlayerNotFound => AppError::NotFound(msg::PLAYER_NOT_FOUND.into()),
        LedgerError::Duplicate => AppError::Conflict(msg::ORDER_ALREADY_PROCESSED.into()),
        err @ (LedgerError::Database(_) | LedgerError::ExpiryOutOfRange) => {
            tracing::error!("Ledger transaction failed for order {}: {}", order_id, err);
            AppError::Ledger {
                order_id: order_id.to_string(),
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
