use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use super::GatewayError;
use crate::sanitize::{format_cents, parse_provider_amount};

pub const SANDBOX_API_BASE: &str = "https://api-m.sandbox.paypal.com";
pub const LIVE_API_BASE: &str = "https://api-m.paypal.com";

const BRAND_NAME: &str = "DaoVerse";
const CURRENCY: &str = "USD";
const ALREADY_CAPTURED: &str = "ORDER_ALREADY_CAPTURED";

#[derive(Debug, Clone)]
pub struct PayPalConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_base: String,
    pub timeout: Duration,
}

impl PayPalConfig {
    /// Base URL for a `PAYPAL_MODE` value; anything but "live" is sandbox.
    pub fn api_base_for_mode(mode: &str) -> &'static str {
        if mode.eq_ignore_ascii_case("live") {
            LIVE_API_BASE
        } else {
            SANDBOX_API_BASE
        }
    }
}

// ============ Wire types ============

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub currency_code: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub href: String,
    pub rel: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Capture {
    pub id: String,
    pub status: String,
    pub amount: Option<Money>,
    pub custom_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Payments {
    #[serde(default)]
    pub captures: Vec<Capture>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseUnit {
    pub custom_id: Option<String>,
    pub amount: Option<Money>,
    pub payments: Option<Payments>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Order {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub purchase_units: Vec<PurchaseUnit>,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    issue: String,
}

#[derive(Serialize)]
struct CreateOrderRequest<'a> {
    intent: &'static str,
    purchase_units: [NewPurchaseUnit<'a>; 1],
    application_context: ApplicationContext<'a>,
}

#[derive(Serialize)]
struct NewPurchaseUnit<'a> {
    amount: Money,
    description: &'a str,
    custom_id: &'a str,
}

#[derive(Serialize)]
struct ApplicationContext<'a> {
    return_url: &'a str,
    cancel_url: &'a str,
    brand_name: &'static str,
    user_action: &'static str,
}

// ============ Parsed results ============

/// Order the provider accepted; the buyer must visit `approval_url`.
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub id: String,
    pub approval_url: String,
}

/// What a capture call settled to.
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    Completed(Order),
    /// The provider had already captured this order; the caller proceeds with
    /// order data it fetches or already holds.
    AlreadyCaptured,
}

/// The captured payment of an order, with its amount re-validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPayment {
    pub capture_id: String,
    pub status: String,
    pub amount_cents: i64,
    pub custom_id: Option<String>,
}

/// Everything needed to create one provider order.
#[derive(Debug, Clone)]
pub struct OrderRequest<'a> {
    pub amount_cents: i64,
    pub description: &'a str,
    pub custom_id: &'a str,
    pub return_url: &'a str,
    pub cancel_url: &'a str,
}

impl Order {
    fn first_unit(&self) -> Result<&PurchaseUnit, GatewayError> {
        self.purchase_units
            .first()
            .ok_or_else(|| GatewayError::Protocol(format!("order {} has no purchase units", self.id)))
    }

    pub fn is_completed(&self) -> bool {
        self.status == "COMPLETED"
    }

    pub fn custom_id(&self) -> Option<&str> {
        let unit = self.purchase_units.first()?;
        unit.custom_id.as_deref().or_else(|| {
            unit.payments
                .as_ref()
                .and_then(|p| p.captures.first())
                .and_then(|c| c.custom_id.as_deref())
        })
    }

    pub fn approval_url(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.rel == "approve")
            .map(|l| l.href.as_str())
    }

    /// The first capture on the order. Amount falls back to the purchase
    /// unit's when the capture omits it.
    pub fn captured(&self) -> Result<CapturedPayment, GatewayError> {
        let unit = self.first_unit()?;
        let capture = unit
            .payments
            .as_ref()
            .and_then(|p| p.captures.first())
            .ok_or_else(|| GatewayError::Protocol(format!("order {} has no captures", self.id)))?;

        let amount = capture
            .amount
            .as_ref()
            .or(unit.amount.as_ref())
            .ok_or_else(|| GatewayError::Protocol(format!("capture {} has no amount", capture.id)))?;

        Ok(CapturedPayment {
            capture_id: capture.id.clone(),
            status: capture.status.clone(),
            amount_cents: parse_money(amount)?,
            custom_id: capture.custom_id.clone().or_else(|| unit.custom_id.clone()),
        })
    }
}

fn parse_money(money: &Money) -> Result<i64, GatewayError> {
    if money.currency_code != CURRENCY {
        return Err(GatewayError::Protocol(format!(
            "unexpected currency {}",
            money.currency_code
        )));
    }
    parse_provider_amount(&money.value)
        .map_err(|e| GatewayError::Protocol(format!("amount {:?}: {}", money.value, e)))
}

async fn read_json<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, GatewayError> {
    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| GatewayError::Protocol(format!("{}: {}", e, body)))
}

// ============ Client ============

/// PayPal Orders v2 client. Every call is bounded by the configured timeout.
#[derive(Debug, Clone)]
pub struct PayPalClient {
    client: Client,
    config: PayPalConfig,
}

impl PayPalClient {
    pub fn new(config: PayPalConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    /// Exchanges client credentials for a bearer token.
    pub async fn access_token(&self) -> Result<String, GatewayError> {
        let (Some(id), Some(secret)) = (&self.config.client_id, &self.config.client_secret) else {
            return Err(GatewayError::NotConfigured(
                "PAYPAL_CLIENT_ID / PAYPAL_CLIENT_SECRET not set".into(),
            ));
        };
        let credentials = STANDARD.encode(format!("{}:{}", id, secret));

        let response = self
            .client
            .post(self.url("/v1/oauth2/token"))
            .header("Authorization", format!("Basic {}", credentials))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Auth(format!("{}: {}", status, body)));
        }

        let token: TokenResponse = read_json(response).await?;
        Ok(token.access_token)
    }

    pub async fn create_order(&self, req: &OrderRequest<'_>) -> Result<CreatedOrder, GatewayError> {
        let token = self.access_token().await?;
        let body = CreateOrderRequest {
            intent: "CAPTURE",
            purchase_units: [NewPurchaseUnit {
                amount: Money {
                    currency_code: CURRENCY.into(),
                    value: format_cents(req.amount_cents),
                },
                description: req.description,
                custom_id: req.custom_id,
            }],
            application_context: ApplicationContext {
                return_url: req.return_url,
                cancel_url: req.cancel_url,
                brand_name: BRAND_NAME,
                user_action: "PAY_NOW",
            },
        };

        let response = self
            .client
            .post(self.url("/v2/checkout/orders"))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Protocol(format!(
                "create order failed ({}): {}",
                status, text
            )));
        }

        let order: Order = read_json(response).await?;
        let approval_url = order
            .approval_url()
            .ok_or_else(|| GatewayError::Protocol(format!("order {} has no approve link", order.id)))?
            .to_string();

        Ok(CreatedOrder {
            id: order.id,
            approval_url,
        })
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Order, GatewayError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(self.url(&format!("/v2/checkout/orders/{}", order_id)))
            .bearer_auth(&token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Protocol(format!(
                "get order {} failed ({}): {}",
                order_id, status, text
            )));
        }

        read_json(response).await
    }

    pub async fn capture_order(&self, order_id: &str) -> Result<CaptureOutcome, GatewayError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(self.url(&format!("/v2/checkout/orders/{}/capture", order_id)))
            .bearer_auth(&token)
            .header("Content-Type", "application/json")
            .body("{}")
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(CaptureOutcome::Completed(read_json(response).await?));
        }

        let status = response.status();
        let text = response.text().await?;
        let already_captured = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.details.iter().any(|d| d.issue == ALREADY_CAPTURED))
            .unwrap_or(false);

        if already_captured {
            tracing::info!("PayPal order {} was already captured", order_id);
            return Ok(CaptureOutcome::AlreadyCaptured);
        }

        Err(GatewayError::CaptureFailed(format!("{}: {}", status, text)))
    }
}
