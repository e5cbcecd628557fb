mod from_row;
mod schema;
pub mod queries;

pub use from_row::{FromRow, query_all, query_one};
pub use schema::init_shard_db;

use std::sync::Arc;

use jwt_simple::prelude::HS256Key;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::error::{AppError, Result, msg};
use crate::payments::PayPalClient;
use crate::rate_limit::RateLimitStore;

pub type DbPool = Pool<SqliteConnectionManager>;

pub fn create_pool(database_path: &str, max_size: u32) -> std::result::Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|c| c.busy_timeout(std::time::Duration::from_secs(5)));
    Pool::builder().max_size(max_size).build(manager)
}

/// One independently pooled player database.
#[derive(Clone)]
pub struct Shard {
    pub label: String,
    pub pool: DbPool,
}

/// All shards known to this process. The first one is the primary shard: it
/// holds order metadata and serves requests that name no shard.
pub struct ShardRegistry {
    shards: Vec<Shard>,
}

impl ShardRegistry {
    pub fn new(shards: Vec<Shard>) -> Result<Self> {
        if shards.is_empty() {
            return Err(AppError::Internal("at least one shard is required".into()));
        }
        Ok(Self { shards })
    }

    pub fn primary(&self) -> &Shard {
        &self.shards[0]
    }

    pub fn get(&self, label: &str) -> Option<&Shard> {
        self.shards
            .iter()
            .find(|s| s.label.eq_ignore_ascii_case(label))
    }

    /// Missing or blank labels select the primary shard; unknown labels are
    /// rejected rather than silently redirected.
    pub fn resolve(&self, requested: Option<&str>) -> Result<&Shard> {
        match requested.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(self.primary()),
            Some(label) => self
                .get(label)
                .ok_or_else(|| AppError::BadRequest(msg::UNKNOWN_SHARD.into())),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shard> {
        self.shards.iter()
    }

    /// Creates missing tables on every shard.
    pub fn init_schema(&self) -> Result<()> {
        for shard in &self.shards {
            let conn = shard.pool.get()?;
            init_shard_db(&conn)?;
            tracing::debug!("Schema ready on shard {}", shard.label);
        }
        Ok(())
    }
}

/// Application state shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub shards: Arc<ShardRegistry>,
    pub paypal: PayPalClient,
    /// Base URL for provider return/cancel URLs (e.g., https://shop.example.com)
    pub base_url: String,
    /// Verifies session tokens; None disables session auth
    pub session_key: Option<HS256Key>,
    pub admin_api_key: Option<String>,
    /// Per-owner order-creation window
    pub order_rate_limit: Arc<dyn RateLimitStore>,
}
