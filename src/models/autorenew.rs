use serde::Serialize;

/// One-time AutoRenew unlock, keyed by (user_id, payment_id).
/// Re-purchasing reactivates the existing row instead of adding another.
#[derive(Debug, Clone, Serialize)]
pub struct AutoRenewPurchase {
    pub id: i64,
    pub user_id: String,
    pub payment_id: String,
    pub is_active: bool,
    pub created_at: i64,
    pub last_renewed_at: i64,
}
