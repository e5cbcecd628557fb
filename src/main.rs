use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::Parser;
use jwt_simple::prelude::HS256Key;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coinshop::config::Config;
use coinshop::db::{AppState, Shard, ShardRegistry, create_pool, queries};
use coinshop::handlers;
use coinshop::models::CreateCoupon;
use coinshop::payments::PayPalClient;
use coinshop::rate_limit::InMemoryRateLimitStore;

#[derive(Parser, Debug)]
#[command(name = "coinshop")]
#[command(about = "PayPal storefront for Dao Coins, subscriptions and AutoRenew")]
struct Cli {
    /// Seed the launch coupon (FIRSTCC) on every shard (dev mode only)
    #[arg(long)]
    seed: bool,
}

/// Upserts the launch coupon: 100% bonus on purchases of $10 or more,
/// valid for four days from now, unlimited uses.
fn seed_launch_coupon(registry: &ShardRegistry) {
    let now = Utc::now();
    let input = CreateCoupon {
        code: "FIRSTCC".to_string(),
        bonus_percentage: 100,
        min_purchase_cents: 1_000,
        max_uses: None,
        valid_from: now.timestamp(),
        valid_until: (now + Duration::days(4)).timestamp(),
    };

    for shard in registry.iter() {
        let conn = shard
            .pool
            .get()
            .expect("Failed to get db connection for seeding");
        let coupon = queries::upsert_coupon(&conn, &input).expect("Failed to seed coupon");
        tracing::info!(
            "Seeded coupon {} on {} ({}% bonus, min ${}, until {})",
            coupon.code,
            shard.label,
            coupon.bonus_percentage,
            coupon.min_purchase_cents / 100,
            coupon.valid_until
        );
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coinshop=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    // One pool per shard, sized independently
    let shards = config
        .shards
        .iter()
        .map(|sc| {
            let pool = create_pool(&sc.database_path, sc.pool_size).unwrap_or_else(|e| {
                panic!("Failed to create pool for shard {}: {}", sc.label, e)
            });
            tracing::info!(
                "Shard {} -> {} (pool size {})",
                sc.label,
                sc.database_path,
                sc.pool_size
            );
            Shard {
                label: sc.label.clone(),
                pool,
            }
        })
        .collect();
    let registry = ShardRegistry::new(shards).expect("No shards configured");
    registry
        .init_schema()
        .expect("Failed to initialize shard schemas");
    tracing::info!("Primary shard: {}", registry.primary().label);

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set COINSHOP_ENV=dev)");
        } else {
            seed_launch_coupon(&registry);
        }
    }

    if config.paypal.client_id.is_none() || config.paypal.client_secret.is_none() {
        tracing::warn!("PayPal credentials not set; order endpoints will fail");
    }

    let paypal =
        PayPalClient::new(config.paypal.clone()).expect("Failed to build PayPal HTTP client");

    let state = AppState {
        shards: Arc::new(registry),
        paypal,
        base_url: config.base_url.clone(),
        session_key: config
            .session_secret
            .as_deref()
            .map(|s| HS256Key::from_bytes(s.as_bytes())),
        admin_api_key: config.admin_api_key.clone(),
        order_rate_limit: Arc::new(InMemoryRateLimitStore::new(
            config.order_rate_limit_max,
            config.order_rate_limit_window,
        )),
    };

    let app = handlers::router(config.rate_limit)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Coinshop listening on {}", addr);

    // Connect info is required for per-IP rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    tracing::info!("Server stopped, shard pools closed");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
