use serde::Serialize;

/// A purchased subscription period on one shard. At most one row per user
/// has `is_active = true`.
#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub id: i64,
    pub user_id: String,
    /// Ordinal; higher is stronger
    pub tier: i64,
    pub tier_name: String,
    pub qi_boost_percent: i64,
    pub duration_months: i64,
    pub price_paid_cents: i64,
    /// Provider capture id
    pub payment_id: String,
    /// Provider order id, unique across the table
    pub order_id: String,
    pub expires_at: i64,
    pub is_active: bool,
    pub created_at: i64,
}

/// Input for activating a captured subscription order.
#[derive(Debug, Clone)]
pub struct ActivateSubscription {
    pub user_id: String,
    pub tier: i64,
    pub tier_name: String,
    pub qi_boost_percent: i64,
    pub duration_months: u32,
    pub price_paid_cents: i64,
    pub payment_id: String,
    pub order_id: String,
}
