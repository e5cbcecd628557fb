//! Server-side price and bonus resolution.
//!
//! Client totals are never trusted: package orders are re-priced from the
//! catalog below, custom amounts buy one coin per dollar, and coupon bonuses
//! are computed here from the stored coupon row.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, msg};
use crate::models::{Coupon, ValidatedPackage};

pub const MIN_QUANTITY: i64 = 1;
pub const MAX_QUANTITY: i64 = 100;

/// Fixed AutoRenew unlock price ($5.00).
pub const AUTORENEW_PRICE_CENTS: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogPackage {
    pub id: &'static str,
    pub name: &'static str,
    pub coins: i64,
    pub price_cents: i64,
}

pub const PACKAGES: &[CatalogPackage] = &[
    CatalogPackage { id: "pkg1", name: "Starter", coins: 50, price_cents: 4_000 },
    CatalogPackage { id: "pkg2", name: "Popular", coins: 100, price_cents: 8_000 },
    CatalogPackage { id: "pkg3", name: "Great Value", coins: 150, price_cents: 12_500 },
    CatalogPackage { id: "pkg4", name: "Ultimate", coins: 200, price_cents: 15_000 },
];

pub fn find_package(id: &str) -> Option<&'static CatalogPackage> {
    PACKAGES.iter().find(|p| p.id == id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionTier {
    pub id: i64,
    pub name: &'static str,
    pub boost_percent: i64,
    pub monthly_price_cents: i64,
}

pub const TIERS: &[SubscriptionTier] = &[
    SubscriptionTier { id: 1, name: "Cultivator", boost_percent: 100, monthly_price_cents: 500 },
    SubscriptionTier { id: 2, name: "Dao Seeker", boost_percent: 200, monthly_price_cents: 1_000 },
    SubscriptionTier { id: 3, name: "Immortal", boost_percent: 400, monthly_price_cents: 1_500 },
    SubscriptionTier { id: 4, name: "Divine", boost_percent: 800, monthly_price_cents: 2_200 },
];

pub fn find_tier(id: i64) -> Option<&'static SubscriptionTier> {
    TIERS.iter().find(|t| t.id == id)
}

/// Discount percentage for a supported subscription length, None otherwise.
pub fn duration_discount(months: i64) -> Option<i64> {
    match months {
        1 => Some(0),
        6 => Some(10),
        12 => Some(20),
        _ => None,
    }
}

/// Total price of `months` of `tier`, rounded half-up to the cent.
pub fn subscription_price_cents(tier: &SubscriptionTier, months: i64) -> Option<i64> {
    let discount = duration_discount(months)?;
    let base = tier.monthly_price_cents * months;
    Some((base * (100 - discount) + 50) / 100)
}

/// A package line as submitted by the client. Only `id` and `quantity` are
/// read; any client-side price or coin count is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageRequest {
    pub id: String,
    #[serde(default)]
    pub quantity: Option<Value>,
}

impl PackageRequest {
    fn quantity(&self) -> Result<i64, AppError> {
        let invalid = || AppError::BadRequest(format!("Invalid quantity for package {}", self.id));
        let qty = match &self.quantity {
            None | Some(Value::Null) => 1,
            Some(Value::Number(n)) => n.as_i64().ok_or_else(invalid)?,
            Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| invalid())?,
            Some(_) => return Err(invalid()),
        };
        if !(MIN_QUANTITY..=MAX_QUANTITY).contains(&qty) {
            return Err(invalid());
        }
        Ok(qty)
    }
}

/// Authoritative terms of a coin order before it is sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinOrderTerms {
    pub amount_cents: i64,
    pub base_coins: i64,
    pub bonus_coins: i64,
    pub coupon_code: Option<String>,
    pub bonus_percentage: i64,
    pub packages: Option<Vec<ValidatedPackage>>,
}

impl CoinOrderTerms {
    /// Prices an order. A non-empty `packages` list must add up to exactly
    /// `amount_cents`; otherwise the order is a custom amount worth one coin
    /// per whole dollar.
    pub fn price(amount_cents: i64, packages: &[PackageRequest]) -> Result<Self, AppError> {
        if packages.is_empty() {
            return Ok(Self {
                amount_cents,
                base_coins: amount_cents / 100,
                bonus_coins: 0,
                coupon_code: None,
                bonus_percentage: 0,
                packages: None,
            });
        }

        let mut validated = Vec::with_capacity(packages.len());
        let mut total_cents = 0;
        let mut total_coins = 0;
        for req in packages {
            let pkg = find_package(&req.id)
                .ok_or_else(|| AppError::BadRequest(format!("Invalid package: {}", req.id)))?;
            let quantity = req.quantity()?;
            total_cents += pkg.price_cents * quantity;
            total_coins += pkg.coins * quantity;
            validated.push(ValidatedPackage {
                id: pkg.id.to_string(),
                package_type: pkg.name.to_string(),
                coins: pkg.coins,
                price_cents: pkg.price_cents,
                quantity,
            });
        }

        if total_cents != amount_cents {
            return Err(AppError::BadRequest(msg::PRICE_MISMATCH.into()));
        }

        Ok(Self {
            amount_cents,
            base_coins: total_coins,
            bonus_coins: 0,
            coupon_code: None,
            bonus_percentage: 0,
            packages: Some(validated),
        })
    }

    pub fn is_package_order(&self) -> bool {
        self.packages.is_some()
    }

    /// Applies a coupon if it is usable for this order at `now`. Unusable
    /// coupons leave the terms untouched and return false.
    pub fn apply_coupon(&mut self, coupon: &Coupon, now: i64) -> bool {
        if self.is_package_order() || coupon.check(self.amount_cents, now).is_err() {
            return false;
        }
        self.bonus_coins = self.base_coins * coupon.bonus_percentage / 100;
        self.bonus_percentage = coupon.bonus_percentage;
        self.coupon_code = Some(coupon.code.clone());
        true
    }

    pub fn total_coins(&self) -> i64 {
        self.base_coins + self.bonus_coins
    }

    /// Text shown to the buyer on the provider's checkout page.
    pub fn description(&self) -> String {
        match &self.packages {
            Some(pkgs) => {
                let lines: Vec<String> = pkgs
                    .iter()
                    .map(|p| format!("{} x{}", p.package_type, p.quantity))
                    .collect();
                format!("{} Dao Coins ({})", self.base_coins, lines.join(", "))
            }
            None if self.bonus_coins > 0 => format!(
                "{} Dao Coins (+{} bonus)",
                self.base_coins, self.bonus_coins
            ),
            None => format!("{} Dao Coins", self.base_coins),
        }
    }
}
