use serde::{Deserialize, Serialize};

/// How long a created order stays capturable.
pub const ORDER_METADATA_TTL_SECS: i64 = 60 * 60;

/// A catalog package after server-side validation, as persisted with the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedPackage {
    pub id: String,
    #[serde(rename = "type")]
    pub package_type: String,
    pub coins: i64,
    pub price_cents: i64,
    pub quantity: i64,
}

/// The authoritative terms of a coin order, decided at order creation and
/// read back exactly once at capture. Lives on the primary shard only.
#[derive(Debug, Clone, Serialize)]
pub struct OrderMetadata {
    pub order_id: String,
    pub user_id: String,
    /// Shard whose ledger the order credits
    pub shard: String,
    pub amount_cents: i64,
    pub base_coins: i64,
    pub bonus_coins: i64,
    pub coupon_code: Option<String>,
    pub bonus_percentage: i64,
    pub packages: Option<Vec<ValidatedPackage>>,
    pub created_at: i64,
    pub expires_at: i64,
}

impl OrderMetadata {
    pub fn total_coins(&self) -> i64 {
        self.base_coins + self.bonus_coins
    }

    /// Comma-separated package labels for the transaction log ("Starter, Popular").
    pub fn package_label(&self) -> Option<String> {
        self.packages
            .as_ref()
            .filter(|p| !p.is_empty())
            .map(|p| {
                p.iter()
                    .map(|pkg| pkg.package_type.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
    }
}

#[derive(Debug, Clone)]
pub struct CreateOrderMetadata {
    pub order_id: String,
    pub user_id: String,
    pub shard: String,
    pub amount_cents: i64,
    pub base_coins: i64,
    pub bonus_coins: i64,
    pub coupon_code: Option<String>,
    pub bonus_percentage: i64,
    pub packages: Option<Vec<ValidatedPackage>>,
}
