use serde::Serialize;

/// A game account row on one shard. The game server owns the table; the
/// storefront only reads it and adds to the two coin columns.
#[derive(Debug, Clone, Serialize)]
pub struct Player {
    pub id: String,
    pub dao_coins: i64,
    /// Lifetime coins purchased through the storefront
    pub dao_coins_spent: i64,
}
