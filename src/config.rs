use std::env;
use std::time::Duration;

use crate::payments::PayPalConfig;
use crate::rate_limit::RateLimitConfig;

/// Connection settings for one shard.
#[derive(Debug, Clone)]
pub struct ShardConfig {
    pub label: String,
    pub database_path: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub base_url: String,
    pub dev_mode: bool,
    /// First entry is the primary shard
    pub shards: Vec<ShardConfig>,
    pub paypal: PayPalConfig,
    pub session_secret: Option<String>,
    pub admin_api_key: Option<String>,
    pub order_rate_limit_max: u32,
    pub order_rate_limit_window: Duration,
    pub rate_limit: RateLimitConfig,
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Labels from a `SHARDS` value, uppercased, blanks and repeats dropped.
fn parse_shard_labels(raw: &str) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for label in raw.split(',').map(|s| s.trim().to_uppercase()) {
        if !label.is_empty() && !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("COINSHOP_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env_parse("PORT", 3000);

        let base_url = env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let mut labels = parse_shard_labels(&env::var("SHARDS").unwrap_or_default());
        if labels.is_empty() {
            labels = vec!["S0".to_string(), "DS1".to_string()];
        }
        let default_pool_size: u32 = env_parse("DB_POOL_SIZE", 10);
        let shards = labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let database_path = if i == 0 {
                    env::var("DATABASE_PATH").unwrap_or_else(|_| format!("{}.db", label.to_lowercase()))
                } else {
                    env::var(format!("DATABASE_PATH_{}", label))
                        .unwrap_or_else(|_| format!("{}.db", label.to_lowercase()))
                };
                ShardConfig {
                    label: label.clone(),
                    database_path,
                    pool_size: env_parse(&format!("DB_POOL_SIZE_{}", label), default_pool_size),
                }
            })
            .collect();

        let api_base = env_opt("PAYPAL_API_BASE").unwrap_or_else(|| {
            PayPalConfig::api_base_for_mode(&env::var("PAYPAL_MODE").unwrap_or_default()).to_string()
        });
        let paypal = PayPalConfig {
            client_id: env_opt("PAYPAL_CLIENT_ID"),
            client_secret: env_opt("PAYPAL_CLIENT_SECRET"),
            api_base,
            timeout: Duration::from_secs(env_parse("PAYPAL_TIMEOUT_SECS", 30)),
        };

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            strict_rpm: env_parse("RATE_LIMIT_STRICT_RPM", defaults.strict_rpm),
            standard_rpm: env_parse("RATE_LIMIT_STANDARD_RPM", defaults.standard_rpm),
            relaxed_rpm: env_parse("RATE_LIMIT_RELAXED_RPM", defaults.relaxed_rpm),
        };

        Self {
            host,
            port,
            base_url,
            dev_mode,
            shards,
            paypal,
            session_secret: env_opt("SESSION_SECRET"),
            admin_api_key: env_opt("ADMIN_API_KEY"),
            order_rate_limit_max: env_parse("ORDER_RATE_LIMIT_MAX", 5),
            order_rate_limit_window: Duration::from_secs(env_parse(
                "ORDER_RATE_LIMIT_WINDOW_SECS",
                60,
            )),
            rate_limit,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
