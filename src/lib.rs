//! Coinshop - PayPal storefront for a Discord game's currency, subscriptions
//! and unlocks.
//!
//! Turns captured PayPal orders into exactly-once ledger mutations on the
//! right player shard: server-side pricing, short-lived order terms, a
//! replay guard and transactional crediting.

pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod payments;
pub mod pricing;
pub mod principal;
pub mod rate_limit;
pub mod sanitize;
