mod autorenew;
mod coins;
mod common;
mod coupons;
mod players;
mod subscriptions;

pub use autorenew::*;
pub use coins::*;
pub use common::OwnerQuery;
pub use coupons::*;
pub use players::*;
pub use subscriptions::*;

use axum::{
    Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::db::AppState;
use crate::extractors::Json;
use crate::rate_limit::{self, RateLimitConfig};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// All storefront routes, without per-IP limits.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .merge(order_routes())
        .merge(lookup_routes())
}

fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/paypal/create-order", post(create_coin_order))
        .route("/paypal/capture-order", post(capture_coin_order))
        .route("/subscriptions/create-order", post(create_subscription_order))
        .route("/subscriptions/capture-order", post(capture_subscription_order))
        .route("/autorenew/create-order", post(create_autorenew_order))
        .route("/autorenew/capture-order", post(capture_autorenew_order))
        .route("/admin/activate-autorenew", post(admin_activate_autorenew))
}

fn lookup_routes() -> Router<AppState> {
    Router::new()
        .route("/subscriptions/status", get(subscription_status))
        .route("/autorenew/check-purchase", get(check_autorenew_purchase))
        .route("/coupons/validate", post(validate_coupon))
        .route("/user/stats", get(player_stats))
}

/// Production router: the same routes behind per-IP rate limit tiers.
/// Requires the server to be started with connect info for peer IPs.
pub fn router(rate_limit: RateLimitConfig) -> Router<AppState> {
    let health = Router::new()
        .route("/health", get(health))
        .layer(rate_limit::relaxed_layer(rate_limit.relaxed_rpm));

    Router::new()
        .merge(health)
        .merge(order_routes().layer(rate_limit::strict_layer(rate_limit.strict_rpm)))
        .merge(lookup_routes().layer(rate_limit::standard_layer(rate_limit.standard_rpm)))
}
