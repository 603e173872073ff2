use rusqlite::Connection;

/// Initialize the database schema
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;

        -- Anonymous accounts, created implicitly on first redeem/payment
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            referral_code TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL
        );

        -- Devices, one owner at a time (device_id is the client-stable id)
        CREATE TABLE IF NOT EXISTS devices (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            device_id TEXT NOT NULL UNIQUE,
            user_agent TEXT,
            created_at INTEGER NOT NULL,
            last_seen_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_devices_user ON devices(user_id);

        -- Entitlement windows; expiry is evaluated at read time
        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            plan TEXT NOT NULL CHECK (plan IN ('match', 'weekly', 'monthly', 'yearly')),
            duration_days INTEGER NOT NULL,
            max_devices INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'expired')),
            code_id TEXT,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_subscriptions_user ON subscriptions(user_id, expires_at);

        -- Single-use redemption codes; used_by_user_id NULL = available
        CREATE TABLE IF NOT EXISTS redemptions (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            plan TEXT NOT NULL CHECK (plan IN ('match', 'weekly', 'monthly', 'yearly')),
            duration_days INTEGER NOT NULL,
            max_devices INTEGER NOT NULL,
            source TEXT NOT NULL CHECK (source IN ('manual', 'payment', 'gift', 'referral')),
            payment_order_id TEXT,
            used_by_user_id TEXT REFERENCES users(id),
            used_at INTEGER,
            revoked_at INTEGER,
            trial_hours INTEGER NOT NULL DEFAULT 0 CHECK (trial_hours IN (0, 1, 2, 4)),
            trial_movie_id TEXT,
            trial_movie_aliases TEXT,
            note TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_redemptions_order ON redemptions(payment_order_id)
            WHERE payment_order_id IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_redemptions_created ON redemptions(created_at);

        -- Payment orders; status transitions only pending -> success/failed
        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'success', 'failed')),
            plan TEXT NOT NULL CHECK (plan IN ('match', 'weekly', 'monthly', 'yearly')),
            bonus_days INTEGER NOT NULL DEFAULT 0,
            device_id TEXT,
            amount_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            gateway TEXT,
            gateway_txn_id TEXT,
            gateway_key TEXT,
            last_gateway_status TEXT,
            last_gateway_payload TEXT,
            verify_attempts INTEGER NOT NULL DEFAULT 0,
            failure_reason TEXT,
            user_id TEXT,
            subscription_id TEXT,
            access_code TEXT,
            access_code_id TEXT,
            created_at INTEGER NOT NULL,
            completed_at INTEGER,
            failed_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_payments_txn ON payments(gateway_txn_id)
            WHERE gateway_txn_id IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_payments_key ON payments(gateway_key)
            WHERE gateway_key IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_payments_created ON payments(created_at);

        -- TV pairing sessions; code unique among pending only
        CREATE TABLE IF NOT EXISTS pair_sessions (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL,
            tv_device_id TEXT NOT NULL,
            phone_device_id TEXT,
            user_id TEXT,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'paired', 'expired', 'cancelled')),
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            paired_at INTEGER
        );
        CREATE UNIQUE INDEX IF NOT EXISTS ux_pair_sessions_code_pending ON pair_sessions(code)
            WHERE status = 'pending';
        CREATE INDEX IF NOT EXISTS idx_pair_sessions_tv ON pair_sessions(tv_device_id, status);
        CREATE INDEX IF NOT EXISTS idx_pair_sessions_code ON pair_sessions(code, created_at);
        "#,
    )?;

    Ok(())
}
