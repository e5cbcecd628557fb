//! Input sanitizing for identifiers, amounts, order ids and coupon codes.
//!
//! Anything a client or the payment provider hands us passes through here
//! before it reaches a query or an outbound call. Unexpected characters are
//! treated as tampering and rejected, never stripped and accepted.

use serde_json::Value;

/// Smallest purchasable amount, in cents ($1.00).
pub const MIN_AMOUNT_CENTS: i64 = 100;
/// Largest purchasable amount, in cents ($10,000.00).
pub const MAX_AMOUNT_CENTS: i64 = 1_000_000;
/// Provider order ids shorter than this are never looked up.
pub const MIN_ORDER_ID_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SanitizeError {
    #[error("Invalid user session")]
    InvalidIdentifier,
    #[error("Amount is required")]
    MissingAmount,
    #[error("Invalid amount format")]
    InvalidAmount,
    #[error("Minimum purchase is $1")]
    AmountTooSmall,
    #[error("Maximum purchase is $10000")]
    AmountTooLarge,
    #[error("Amount must have maximum 2 decimal places")]
    SubCentAmount,
    #[error("Invalid order ID format")]
    InvalidOrderId,
    #[error("Invalid coupon code format")]
    InvalidCode,
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Removes every character outside `[A-Za-z0-9_-]`.
pub fn strip_disallowed(raw: &str) -> String {
    raw.chars().filter(|c| is_allowed(*c)).collect()
}

/// Accepts an owner identifier only if filtering would leave it unchanged.
pub fn sanitize_identifier(raw: &str) -> Result<String, SanitizeError> {
    let cleaned = strip_disallowed(raw);
    if cleaned.is_empty() || cleaned != raw {
        return Err(SanitizeError::InvalidIdentifier);
    }
    Ok(cleaned)
}

/// Provider order ids get the same character filter plus a minimum length.
pub fn sanitize_order_id(raw: &str) -> Result<String, SanitizeError> {
    let cleaned = strip_disallowed(raw);
    if cleaned.len() < MIN_ORDER_ID_LEN || cleaned != raw {
        return Err(SanitizeError::InvalidOrderId);
    }
    Ok(cleaned)
}

/// Normalizes a coupon code (trimmed, uppercased) and rejects odd characters.
pub fn sanitize_coupon_code(raw: &str) -> Result<String, SanitizeError> {
    let code = raw.trim().to_uppercase();
    let cleaned = strip_disallowed(&code);
    if cleaned.is_empty() || cleaned != code {
        return Err(SanitizeError::InvalidCode);
    }
    Ok(cleaned)
}

/// Validates a client-submitted amount (JSON number or numeric string) and
/// returns it in cents.
pub fn sanitize_amount(raw: Option<&Value>) -> Result<i64, SanitizeError> {
    let amount = match raw {
        None | Some(Value::Null) => return Err(SanitizeError::MissingAmount),
        Some(Value::Number(n)) => n.as_f64().ok_or(SanitizeError::InvalidAmount)?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| SanitizeError::InvalidAmount)?,
        Some(_) => return Err(SanitizeError::InvalidAmount),
    };
    amount_to_cents(amount)
}

/// Validates an amount string returned by the payment provider.
pub fn parse_provider_amount(value: &str) -> Result<i64, SanitizeError> {
    let amount = value
        .trim()
        .parse::<f64>()
        .map_err(|_| SanitizeError::InvalidAmount)?;
    amount_to_cents(amount)
}

fn amount_to_cents(amount: f64) -> Result<i64, SanitizeError> {
    if !amount.is_finite() {
        return Err(SanitizeError::InvalidAmount);
    }
    if amount < MIN_AMOUNT_CENTS as f64 / 100.0 {
        return Err(SanitizeError::AmountTooSmall);
    }
    if amount > MAX_AMOUNT_CENTS as f64 / 100.0 {
        return Err(SanitizeError::AmountTooLarge);
    }
    let cents = (amount * 100.0).round();
    if cents / 100.0 != amount {
        return Err(SanitizeError::SubCentAmount);
    }
    Ok(cents as i64)
}

/// Formats cents as the provider's fixed two-decimal string ("160.00").
pub fn format_cents(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}
