//! Request identity.
//!
//! Every handler resolves exactly one [`Principal`] before doing any work.
//! A verified session token wins; otherwise the owner id the client put in
//! the request is used, and the principal says so.

use axum::http::{HeaderMap, header::AUTHORIZATION};
use jwt_simple::prelude::*;

use crate::error::{AppError, Result};
use crate::sanitize::sanitize_identifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trust {
    /// Owner id came from a verified session token
    SessionVerified,
    /// Owner id was supplied by the client without cryptographic binding
    ClientAsserted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub owner_id: String,
    pub trust: Trust,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

impl Principal {
    /// Resolve the requester. `claimed_owner` is the owner id from the body or
    /// query string, used only when no session token is presented.
    pub fn resolve(
        headers: &HeaderMap,
        session_key: Option<&HS256Key>,
        claimed_owner: Option<&str>,
    ) -> Result<Self> {
        if let Some(token) = bearer_token(headers) {
            let key = session_key.ok_or_else(|| {
                tracing::warn!("Session token presented but SESSION_SECRET is not set");
                AppError::Unauthorized
            })?;
            let claims = key.verify_token::<NoCustomClaims>(token, None).map_err(|e| {
                tracing::debug!("Session token rejected: {}", e);
                AppError::Unauthorized
            })?;
            let subject = claims.subject.ok_or(AppError::Unauthorized)?;
            let owner_id = sanitize_identifier(&subject).map_err(|_| AppError::Unauthorized)?;
            return Ok(Self {
                owner_id,
                trust: Trust::SessionVerified,
            });
        }

        let claimed = claimed_owner.ok_or(AppError::Unauthorized)?;
        let owner_id = sanitize_identifier(claimed).map_err(|_| AppError::Unauthorized)?;
        Ok(Self {
            owner_id,
            trust: Trust::ClientAsserted,
        })
    }

    /// Fails with 401 unless the identity came from a verified session.
    pub fn require_session(self) -> Result<Self> {
        match self.trust {
            Trust::SessionVerified => Ok(self),
            Trust::ClientAsserted => Err(AppError::Unauthorized),
        }
    }
}

/// Mint a session token for `owner_id`. The login service issues these in
/// production; the storefront only verifies them.
pub fn issue_session_token(
    key: &HS256Key,
    owner_id: &str,
    valid_for: Duration,
) -> std::result::Result<String, jwt_simple::Error> {
    key.authenticate(Claims::create(valid_for).with_subject(owner_id))
}
