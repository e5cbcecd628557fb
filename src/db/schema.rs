use rusqlite::Connection;

/// Initialize one shard's schema. Every shard carries the full table set;
/// order metadata is only ever written on the primary shard.
pub fn init_shard_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Player accounts (owned by the game server; mutated here only by the ledger)
        CREATE TABLE IF NOT EXISTS players (
            id TEXT PRIMARY KEY,
            dao_coins INTEGER NOT NULL DEFAULT 0 CHECK (dao_coins >= 0),
            dao_coins_spent INTEGER NOT NULL DEFAULT 0
        );

        -- Append-only currency log. Descriptions embed "PayPal Order <id>".
        CREATE TABLE IF NOT EXISTS dao_transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            amount INTEGER NOT NULL,
            type TEXT NOT NULL,
            description TEXT NOT NULL,
            coupon_code TEXT,
            bonus_coins INTEGER NOT NULL DEFAULT 0,
            package_type TEXT,
            provider_order_id TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_dao_transactions_user ON dao_transactions(user_id);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_dao_transactions_provider_order
            ON dao_transactions(provider_order_id) WHERE provider_order_id IS NOT NULL;

        CREATE TABLE IF NOT EXISTS dao_coupons (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            bonus_percentage INTEGER NOT NULL CHECK (bonus_percentage >= 0),
            min_purchase_cents INTEGER NOT NULL DEFAULT 0,
            max_uses INTEGER,  -- NULL = unlimited
            current_uses INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1,
            valid_from INTEGER NOT NULL,
            valid_until INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        -- Authoritative terms of a pending coin order (primary shard only)
        CREATE TABLE IF NOT EXISTS paypal_order_metadata (
            order_id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            shard TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            base_coins INTEGER NOT NULL,
            bonus_coins INTEGER NOT NULL DEFAULT 0,
            coupon_code TEXT,
            bonus_percentage INTEGER NOT NULL DEFAULT 0,
            packages TEXT,  -- JSON array of validated packages
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_paypal_order_metadata_expires ON paypal_order_metadata(expires_at);

        CREATE TABLE IF NOT EXISTS player_subscriptions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            tier INTEGER NOT NULL,
            tier_name TEXT NOT NULL,
            qi_boost_percent INTEGER NOT NULL,
            duration_months INTEGER NOT NULL,
            price_paid_cents INTEGER NOT NULL,
            payment_id TEXT NOT NULL,
            order_id TEXT NOT NULL UNIQUE,
            expires_at INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_player_subscriptions_active
            ON player_subscriptions(user_id, expires_at) WHERE is_active = 1;

        CREATE TABLE IF NOT EXISTS autorenew_purchases (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            payment_id TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            last_renewed_at INTEGER NOT NULL,

            UNIQUE(user_id, payment_id)
        );
        "#,
    )?;

    Ok(())
}
