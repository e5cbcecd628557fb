//! Rate limiting.
//!
//! Two independent mechanisms:
//! - Per-IP tiers on the public router (tower_governor):
//!   - Strict: order creation and capture (outbound provider calls)
//!   - Standard: status lookups, coupon preview, stats
//!   - Relaxed: /health
//! - A per-owner order-creation window behind the `RateLimitStore` trait,
//!   injected through `AppState`. The default store is process-local, so
//!   limits are per instance.
//!
//! Per-IP tiers are configured via RATE_LIMIT_STRICT_RPM (default 10),
//! RATE_LIMIT_STANDARD_RPM (30) and RATE_LIMIT_RELAXED_RPM (60).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;

/// Rate limiter layer type alias using governor types directly
pub type RateLimitLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    axum::body::Body,
>;

/// Requests per minute for each per-IP tier.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub strict_rpm: u32,
    pub standard_rpm: u32,
    pub relaxed_rpm: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            strict_rpm: 10,
            standard_rpm: 30,
            relaxed_rpm: 60,
        }
    }
}

/// Creates a rate limiter layer with the specified requests per minute.
/// A zero rate is clamped to one request per minute.
fn create_layer(requests_per_minute: u32) -> RateLimitLayer {
    let rpm = requests_per_minute.max(1);
    let period_secs = (60 / rpm as u64).max(1);
    let config = GovernorConfigBuilder::default()
        .period(Duration::from_secs(period_secs))
        .burst_size(rpm)
        .finish()
        .expect("period and burst are non-zero");

    GovernorLayer::new(Arc::new(config))
}

pub fn strict_layer(requests_per_minute: u32) -> RateLimitLayer {
    create_layer(requests_per_minute)
}

pub fn standard_layer(requests_per_minute: u32) -> RateLimitLayer {
    create_layer(requests_per_minute)
}

pub fn relaxed_layer(requests_per_minute: u32) -> RateLimitLayer {
    create_layer(requests_per_minute)
}

// ============ Per-owner window ============

/// Keyed request counter. Implementations may be process-local or shared
/// between instances.
pub trait RateLimitStore: Send + Sync {
    /// Count one request for `key`. Returns false once the key is over its
    /// limit for the current window.
    fn check(&self, key: &str) -> bool;
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window counter held in process memory.
#[derive(Debug)]
pub struct InMemoryRateLimitStore {
    max_requests: u32,
    window: Duration,
    entries: Mutex<HashMap<String, WindowEntry>>,
}

/// Entries beyond this count trigger a sweep of expired windows.
const SWEEP_THRESHOLD: usize = 10_000;

impl InMemoryRateLimitStore {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        if entries.len() > SWEEP_THRESHOLD {
            entries.retain(|_, entry| entry.reset_at > now);
        }

        let entry = entries.entry(key.to_string()).or_insert(WindowEntry {
            count: 0,
            reset_at: now + self.window,
        });
        if now >= entry.reset_at {
            *entry = WindowEntry {
                count: 0,
                reset_at: now + self.window,
            };
        }

        if entry.count >= self.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }
}

impl Default for InMemoryRateLimitStore {
    /// Five orders per owner per minute.
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

impl RateLimitStore for InMemoryRateLimitStore {
    fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }
}
