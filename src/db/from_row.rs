//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
///
/// This provides graceful error handling instead of panicking when the database
/// contains invalid enum values (from corruption, migration errors, etc.).
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const USER_COLS: &str = "id, referral_code, created_at";

pub const DEVICE_COLS: &str = "id, user_id, device_id, user_agent, created_at, last_seen_at";

pub const SUBSCRIPTION_COLS: &str =
    "id, user_id, plan, duration_days, max_devices, status, code_id, created_at, expires_at";

pub const REDEMPTION_COLS: &str = "id, code, plan, duration_days, max_devices, source, payment_order_id, used_by_user_id, used_at, revoked_at, trial_hours, trial_movie_id, trial_movie_aliases, note, created_at";

pub const PAYMENT_COLS: &str = "id, order_id, status, plan, bonus_days, device_id, amount_cents, currency, gateway, gateway_txn_id, gateway_key, last_gateway_status, last_gateway_payload, verify_attempts, failure_reason, user_id, subscription_id, access_code, access_code_id, created_at, completed_at, failed_at";

pub const PAIR_SESSION_COLS: &str =
    "id, code, tv_device_id, phone_device_id, user_id, status, created_at, expires_at, paired_at";

// ============ FromRow Implementations ============

impl FromRow for User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            referral_code: row.get(1)?,
            created_at: row.get(2)?,
        })
    }
}

impl FromRow for Device {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Device {
            id: row.get(0)?,
            user_id: row.get(1)?,
            device_id: row.get(2)?,
            user_agent: row.get(3)?,
            created_at: row.get(4)?,
            last_seen_at: row.get(5)?,
        })
    }
}

impl FromRow for Subscription {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Subscription {
            id: row.get(0)?,
            user_id: row.get(1)?,
            plan: parse_enum(row, 2, "plan")?,
            duration_days: row.get(3)?,
            max_devices: row.get(4)?,
            status: row.get(5)?,
            code_id: row.get(6)?,
            created_at: row.get(7)?,
            expires_at: row.get(8)?,
        })
    }
}

impl FromRow for Redemption {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Redemption {
            id: row.get(0)?,
            code: row.get(1)?,
            plan: parse_enum(row, 2, "plan")?,
            duration_days: row.get(3)?,
            max_devices: row.get(4)?,
            source: parse_enum(row, 5, "source")?,
            payment_order_id: row.get(6)?,
            used_by_user_id: row.get(7)?,
            used_at: row.get(8)?,
            revoked_at: row.get(9)?,
            trial_hours: row.get(10)?,
            trial_movie_id: row.get(11)?,
            trial_movie_aliases: row.get(12)?,
            note: row.get(13)?,
            created_at: row.get(14)?,
        })
    }
}

impl FromRow for Payment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Payment {
            id: row.get(0)?,
            order_id: row.get(1)?,
            status: parse_enum(row, 2, "status")?,
            plan: parse_enum(row, 3, "plan")?,
            bonus_days: row.get(4)?,
            device_id: row.get(5)?,
            amount_cents: row.get(6)?,
            currency: row.get(7)?,
            gateway: row.get(8)?,
            gateway_txn_id: row.get(9)?,
            gateway_key: row.get(10)?,
            last_gateway_status: row.get(11)?,
            last_gateway_payload: row.get(12)?,
            verify_attempts: row.get(13)?,
            failure_reason: row.get(14)?,
            user_id: row.get(15)?,
            subscription_id: row.get(16)?,
            access_code: row.get(17)?,
            access_code_id: row.get(18)?,
            created_at: row.get(19)?,
            completed_at: row.get(20)?,
            failed_at: row.get(21)?,
        })
    }
}

impl FromRow for PairSession {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PairSession {
            id: row.get(0)?,
            code: row.get(1)?,
            tv_device_id: row.get(2)?,
            phone_device_id: row.get(3)?,
            user_id: row.get(4)?,
            status: parse_enum(row, 5, "status")?,
            created_at: row.get(6)?,
            expires_at: row.get(7)?,
            paired_at: row.get(8)?,
        })
    }
}
