use serde::{Deserialize, Serialize};

/// Bonus coupon stored in `dao_coupons`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub id: i64,
    /// Uppercase, unique
    pub code: String,
    pub bonus_percentage: i64,
    pub min_purchase_cents: i64,
    /// None = unlimited
    pub max_uses: Option<i64>,
    pub current_uses: i64,
    pub active: bool,
    pub valid_from: i64,
    pub valid_until: i64,
}

/// Why a coupon can't be applied to a given purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponRejection {
    Inactive,
    OutsideValidity,
    BelowMinimum { min_purchase_cents: i64 },
    UsageLimitReached,
}

impl CouponRejection {
    pub fn message(&self) -> String {
        match self {
            Self::Inactive | Self::OutsideValidity => "Invalid or expired coupon code".to_string(),
            Self::BelowMinimum { min_purchase_cents } => format!(
                "Minimum purchase of ${} required for this coupon",
                crate::sanitize::format_cents(*min_purchase_cents)
            ),
            Self::UsageLimitReached => "This coupon has reached its usage limit".to_string(),
        }
    }
}

impl Coupon {
    /// Checks the coupon against a purchase of `amount_cents` at `now`.
    pub fn check(&self, amount_cents: i64, now: i64) -> Result<(), CouponRejection> {
        if !self.active {
            return Err(CouponRejection::Inactive);
        }
        if now < self.valid_from || now > self.valid_until {
            return Err(CouponRejection::OutsideValidity);
        }
        if amount_cents < self.min_purchase_cents {
            return Err(CouponRejection::BelowMinimum {
                min_purchase_cents: self.min_purchase_cents,
            });
        }
        if let Some(max) = self.max_uses {
            if self.current_uses >= max {
                return Err(CouponRejection::UsageLimitReached);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCoupon {
    pub code: String,
    pub bonus_percentage: i64,
    pub min_purchase_cents: i64,
    pub max_uses: Option<i64>,
    pub valid_from: i64,
    pub valid_until: i64,
}
