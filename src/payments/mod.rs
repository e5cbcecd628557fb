mod correlation;
mod paypal;

pub use correlation::*;
pub use paypal::*;

use thiserror::Error;

/// Failure talking to the payment provider. Raw provider bodies stay in the
/// variant payload for logging and are never sent to clients.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment provider not configured: {0}")]
    NotConfigured(String),

    #[error("provider authentication failed: {0}")]
    Auth(String),

    #[error("unexpected provider response: {0}")]
    Protocol(String),

    #[error("capture failed: {0}")]
    CaptureFailed(String),

    #[error("provider request timed out")]
    Timeout,

    #[error("provider transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Transport(e.to_string())
        }
    }
}
