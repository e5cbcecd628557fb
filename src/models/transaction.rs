use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};

/// Append-only row in `dao_transactions`. Never updated or deleted here.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: String,
    pub amount: i64,
    pub transaction_type: TransactionType,
    /// Embeds "PayPal Order <id>"; older rows are matched on this text alone
    pub description: String,
    pub coupon_code: Option<String>,
    pub bonus_coins: i64,
    pub package_type: Option<String>,
    /// Unique when present; the replay guard's authoritative key
    pub provider_order_id: Option<String>,
    pub created_at: i64,
}

/// Type tag of a ledger entry written by the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionType {
    WebPurchase,
}

/// Description written for a credited PayPal order.
pub fn purchase_description(
    order_id: &str,
    amount_cents: i64,
    coupon_code: Option<&str>,
    bonus_coins: i64,
) -> String {
    let mut description = format!(
        "Web purchase - PayPal Order {} - ${}",
        order_id,
        crate::sanitize::format_cents(amount_cents)
    );
    if let Some(code) = coupon_code.filter(|_| bonus_coins > 0) {
        description.push_str(&format!(" (Coupon: {}, Bonus: +{} coins)", code, bonus_coins));
    }
    description
}
