//! Query layer. All state transitions that can race (payment completion,
//! code claims, device binds, pairing) are single guarded statements whose
//! affected-row count decides the winner.

use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::from_row::{
    query_all, query_one, DEVICE_COLS, PAIR_SESSION_COLS, PAYMENT_COLS, REDEMPTION_COLS,
    SUBSCRIPTION_COLS, USER_COLS,
};
use crate::codes::{fallback_code, generate_code, CODE_LEN, MAX_GENERATION_ATTEMPTS};
use crate::error::{AppError, Result};
use crate::models::*;
use crate::plan::Plan;

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ============ Users ============

pub fn create_user(conn: &Connection) -> Result<User> {
    let id = gen_id();
    let created_at = now();

    // Referral codes share the code alphabet; retry on the rare collision
    for _ in 0..MAX_GENERATION_ATTEMPTS {
        let referral_code = generate_code(CODE_LEN);
        match conn.execute(
            "INSERT INTO users (id, referral_code, created_at) VALUES (?1, ?2, ?3)",
            params![&id, &referral_code, created_at],
        ) {
            Ok(_) => {
                return Ok(User {
                    id,
                    referral_code,
                    created_at,
                })
            }
            Err(e) if is_unique_violation(&e) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::Internal(
        "Could not generate a unique referral code".into(),
    ))
}

pub fn get_user(conn: &Connection, id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        &[&id],
    )
}

/// Resolve the owner of a device, if the device is registered.
pub fn get_user_by_device(conn: &Connection, device_id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM users WHERE id = (SELECT user_id FROM devices WHERE device_id = ?1)",
            USER_COLS
        ),
        &[&device_id],
    )
}

// ============ Devices ============

pub fn get_device(conn: &Connection, device_id: &str) -> Result<Option<Device>> {
    query_one(
        conn,
        &format!("SELECT {} FROM devices WHERE device_id = ?1", DEVICE_COLS),
        &[&device_id],
    )
}

pub fn count_devices(conn: &Connection, user_id: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM devices WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Device quota for a user: the active subscription's limit, or a single
/// implicit binding for users with no active subscription.
pub fn device_quota(conn: &Connection, user_id: &str) -> Result<i64> {
    Ok(get_active_subscription(conn, user_id)?
        .map(|s| s.max_devices)
        .unwrap_or(1))
}

/// Atomically bind a device to a user, enforcing the device quota.
///
/// Uses an IMMEDIATE transaction plus a conditional INSERT (or UPDATE when
/// stealing the device from another user) guarded by the quota count, so two
/// racing binds cannot both slip under the limit. Re-binding a device the
/// user already owns only refreshes `last_seen_at`.
pub fn bind_device(
    conn: &mut Connection,
    user_id: &str,
    device_id: &str,
    user_agent: Option<&str>,
) -> Result<Device> {
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
    let device = bind_device_in_tx(&tx, user_id, device_id, user_agent)?;
    tx.commit()?;
    Ok(device)
}

/// The bind itself, for callers that already hold an IMMEDIATE transaction.
fn bind_device_in_tx(
    tx: &Connection,
    user_id: &str,
    device_id: &str,
    user_agent: Option<&str>,
) -> Result<Device> {
    let ts = now();

    let existing: Option<Device> = query_one(
        tx,
        &format!("SELECT {} FROM devices WHERE device_id = ?1", DEVICE_COLS),
        &[&device_id],
    )?;

    let quota = device_quota(tx, user_id)?;

    let device = match existing {
        Some(device) if device.user_id == user_id => {
            tx.execute(
                "UPDATE devices SET last_seen_at = ?1, user_agent = COALESCE(?2, user_agent) WHERE id = ?3",
                params![ts, user_agent, device.id],
            )?;
            Device {
                last_seen_at: ts,
                user_agent: user_agent.map(String::from).or(device.user_agent.clone()),
                ..device
            }
        }
        Some(device) => {
            // Device moves to this user (TV adopted through pairing)
            let affected = tx.execute(
                "UPDATE devices SET user_id = ?1, last_seen_at = ?2, user_agent = COALESCE(?3, user_agent)
                 WHERE id = ?4
                 AND (SELECT COUNT(*) FROM devices WHERE user_id = ?1) < ?5",
                params![user_id, ts, user_agent, device.id, quota],
            )?;
            if affected == 0 {
                return Err(AppError::Conflict(format!(
                    "Device limit reached ({} device max). Remove a device first.",
                    quota
                )));
            }
            Device {
                user_id: user_id.to_string(),
                last_seen_at: ts,
                user_agent: user_agent.map(String::from).or(device.user_agent.clone()),
                ..device
            }
        }
        None => {
            let id = gen_id();
            let affected = tx.execute(
                "INSERT INTO devices (id, user_id, device_id, user_agent, created_at, last_seen_at)
                 SELECT ?1, ?2, ?3, ?4, ?5, ?5
                 WHERE (SELECT COUNT(*) FROM devices WHERE user_id = ?2) < ?6",
                params![&id, user_id, device_id, user_agent, ts, quota],
            )?;
            if affected == 0 {
                return Err(AppError::Conflict(format!(
                    "Device limit reached ({} device max). Remove a device first.",
                    quota
                )));
            }
            Device {
                id,
                user_id: user_id.to_string(),
                device_id: device_id.to_string(),
                user_agent: user_agent.map(String::from),
                created_at: ts,
                last_seen_at: ts,
            }
        }
    };

    Ok(device)
}

/// Claim a code and activate it, all in one IMMEDIATE transaction: the
/// claim, the subscription insert, and the device bind commit together, so
/// a failure after the claim rolls the claim back instead of burning a code
/// that granted nothing. Returns Ok(None) when the claim was lost or the
/// code is unusable; the caller distinguishes the cases with a follow-up
/// read.
pub fn claim_redemption_and_activate(
    conn: &mut Connection,
    code: &str,
    user_id: &str,
    device_id: &str,
    user_agent: Option<&str>,
) -> Result<Option<(Redemption, Subscription)>> {
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

    let Some(redemption) = try_claim_redemption(&tx, code, user_id)? else {
        return Ok(None);
    };

    let subscription = if redemption.trial_hours > 0 {
        create_trial_subscription(
            &tx,
            user_id,
            redemption.plan,
            redemption.trial_hours,
            redemption.max_devices,
            Some(&redemption.id),
        )?
    } else {
        create_subscription(
            &tx,
            user_id,
            redemption.plan,
            redemption.duration_days,
            redemption.max_devices,
            Some(&redemption.id),
        )?
    };

    // The redeeming device binds under the fresh subscription's quota
    bind_device_in_tx(&tx, user_id, device_id, user_agent)?;

    tx.commit()?;
    Ok(Some((redemption, subscription)))
}

/// Look up the user owning `device_id`, creating user and binding in one
/// step for first-contact devices.
pub fn get_or_create_user_for_device(
    conn: &mut Connection,
    device_id: &str,
    user_agent: Option<&str>,
) -> Result<User> {
    if let Some(user) = get_user_by_device(conn, device_id)? {
        conn.execute(
            "UPDATE devices SET last_seen_at = ?1 WHERE device_id = ?2",
            params![now(), device_id],
        )?;
        return Ok(user);
    }

    let user = create_user(conn)?;
    bind_device(conn, &user.id, device_id, user_agent)?;
    Ok(user)
}

pub fn list_devices(conn: &Connection, user_id: &str) -> Result<Vec<Device>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM devices WHERE user_id = ?1 ORDER BY created_at",
            DEVICE_COLS
        ),
        &[&user_id],
    )
}

// ============ Subscriptions ============

pub fn create_subscription(
    conn: &Connection,
    user_id: &str,
    plan: Plan,
    duration_days: i64,
    max_devices: i64,
    code_id: Option<&str>,
) -> Result<Subscription> {
    let created_at = now();
    insert_subscription(
        conn,
        user_id,
        plan,
        duration_days,
        max_devices,
        code_id,
        created_at,
        created_at + duration_days * 86400,
    )
}

/// Trial subscriptions get an hour-scale window instead of the plan's days.
pub fn create_trial_subscription(
    conn: &Connection,
    user_id: &str,
    plan: Plan,
    trial_hours: i64,
    max_devices: i64,
    code_id: Option<&str>,
) -> Result<Subscription> {
    let created_at = now();
    insert_subscription(
        conn,
        user_id,
        plan,
        0,
        max_devices,
        code_id,
        created_at,
        created_at + trial_hours * 3600,
    )
}

#[allow(clippy::too_many_arguments)]
fn insert_subscription(
    conn: &Connection,
    user_id: &str,
    plan: Plan,
    duration_days: i64,
    max_devices: i64,
    code_id: Option<&str>,
    created_at: i64,
    expires_at: i64,
) -> Result<Subscription> {
    let id = gen_id();

    conn.execute(
        "INSERT INTO subscriptions (id, user_id, plan, duration_days, max_devices, status, code_id, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6, ?7, ?8)",
        params![&id, user_id, plan.as_str(), duration_days, max_devices, code_id, created_at, expires_at],
    )?;

    Ok(Subscription {
        id,
        user_id: user_id.to_string(),
        plan,
        duration_days,
        max_devices,
        status: "active".to_string(),
        code_id: code_id.map(String::from),
        created_at,
        expires_at,
    })
}

/// The user's current entitlement: active status AND unexpired, evaluated
/// now. Rows are never flipped to expired by a background job.
pub fn get_active_subscription(conn: &Connection, user_id: &str) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM subscriptions
             WHERE user_id = ?1 AND status = 'active' AND expires_at > ?2
             ORDER BY expires_at DESC LIMIT 1",
            SUBSCRIPTION_COLS
        ),
        &[&user_id, &now()],
    )
}

// ============ Redemptions ============

fn insert_redemption(conn: &Connection, input: &CreateRedemption, code: &str) -> Result<Redemption> {
    let id = gen_id();
    let created_at = now();

    conn.execute(
        "INSERT INTO redemptions (id, code, plan, duration_days, max_devices, source, payment_order_id,
                                  trial_hours, trial_movie_id, trial_movie_aliases, note, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            &id,
            code,
            input.plan.as_str(),
            input.duration_days,
            input.max_devices,
            input.source.as_str(),
            input.payment_order_id,
            input.trial_hours,
            input.trial_movie_id,
            input.trial_movie_aliases,
            input.note,
            created_at
        ],
    )?;

    Ok(Redemption {
        id,
        code: code.to_string(),
        plan: input.plan,
        duration_days: input.duration_days,
        max_devices: input.max_devices,
        source: input.source,
        payment_order_id: input.payment_order_id.clone(),
        used_by_user_id: None,
        used_at: None,
        revoked_at: None,
        trial_hours: input.trial_hours,
        trial_movie_id: input.trial_movie_id.clone(),
        trial_movie_aliases: input.trial_movie_aliases.clone(),
        note: input.note.clone(),
        created_at,
    })
}

/// Create a redemption with a freshly generated code.
///
/// Uniqueness comes from inserting and retrying on the UNIQUE constraint,
/// never from a lookup-then-insert. After too many collisions a
/// timestamp-suffixed fallback code is used.
pub fn create_redemption(conn: &Connection, input: &CreateRedemption) -> Result<Redemption> {
    for _ in 0..MAX_GENERATION_ATTEMPTS {
        let code = generate_code(CODE_LEN);
        match insert_redemption(conn, input, &code) {
            Ok(r) => return Ok(r),
            Err(AppError::Database(e)) if is_unique_violation(&e) => continue,
            Err(e) => return Err(e),
        }
    }
    insert_redemption(conn, input, &fallback_code(now()))
}

pub fn get_redemption_by_code(conn: &Connection, code: &str) -> Result<Option<Redemption>> {
    query_one(
        conn,
        &format!("SELECT {} FROM redemptions WHERE code = ?1", REDEMPTION_COLS),
        &[&code],
    )
}

pub fn get_redemption(conn: &Connection, id: &str) -> Result<Option<Redemption>> {
    query_one(
        conn,
        &format!("SELECT {} FROM redemptions WHERE id = ?1", REDEMPTION_COLS),
        &[&id],
    )
}

/// The redemption minted for a payment order, if any. This is the
/// idempotency anchor for the grant path.
pub fn get_redemption_by_order_id(conn: &Connection, order_id: &str) -> Result<Option<Redemption>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM redemptions WHERE payment_order_id = ?1",
            REDEMPTION_COLS
        ),
        &[&order_id],
    )
}

/// Atomically claim a redemption code for a user.
///
/// The UPDATE only succeeds if the code exists, has never been used, and is
/// not revoked, so exactly one of any number of concurrent redeemers wins.
/// Returns Ok(None) when the claim was lost or the code is unusable; the
/// caller distinguishes the cases with a follow-up read.
pub fn try_claim_redemption(
    conn: &Connection,
    code: &str,
    user_id: &str,
) -> Result<Option<Redemption>> {
    let affected = conn.execute(
        "UPDATE redemptions SET used_by_user_id = ?2, used_at = ?3
         WHERE code = ?1 AND used_by_user_id IS NULL AND revoked_at IS NULL",
        params![code, user_id, now()],
    )?;

    if affected == 0 {
        return Ok(None);
    }

    get_redemption_by_code(conn, code)
}

/// Backfill claim fields on a payment-sourced redemption that was created
/// before the user was known. No-op when the fields are already set.
pub fn repair_redemption_claim(conn: &Connection, id: &str, user_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE redemptions SET used_by_user_id = COALESCE(used_by_user_id, ?2),
                                used_at = COALESCE(used_at, ?3)
         WHERE id = ?1",
        params![id, user_id, now()],
    )?;
    Ok(())
}

/// Revoke a code so it can no longer be claimed. Already-redeemed
/// subscriptions are unaffected. Returns false when the code was already
/// revoked or does not exist.
pub fn revoke_redemption(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE redemptions SET revoked_at = ?2 WHERE id = ?1 AND revoked_at IS NULL",
        params![id, now()],
    )?;
    Ok(affected > 0)
}

pub fn delete_redemption(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute("DELETE FROM redemptions WHERE id = ?1", params![id])?;
    Ok(affected > 0)
}

pub fn list_redemptions(conn: &Connection, limit: i64) -> Result<Vec<Redemption>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM redemptions ORDER BY created_at DESC LIMIT ?1",
            REDEMPTION_COLS
        ),
        &[&limit],
    )
}

pub fn redemption_stats(conn: &Connection) -> Result<RedemptionStats> {
    let (total, used, revoked): (i64, i64, i64) = conn.query_row(
        "SELECT COUNT(*),
                COUNT(used_by_user_id),
                COUNT(revoked_at)
         FROM redemptions",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let available: i64 = conn.query_row(
        "SELECT COUNT(*) FROM redemptions WHERE used_by_user_id IS NULL AND revoked_at IS NULL",
        [],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT plan, COUNT(*), COUNT(used_by_user_id)
         FROM redemptions GROUP BY plan ORDER BY plan",
    )?;
    let by_plan = stmt
        .query_map([], |row| {
            Ok(PlanCount {
                plan: row.get(0)?,
                total: row.get(1)?,
                used: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(RedemptionStats {
        total,
        used,
        revoked,
        available,
        by_plan,
    })
}

// ============ Payments ============

pub fn create_payment(conn: &Connection, input: &CreatePayment) -> Result<Payment> {
    let id = gen_id();
    let created_at = now();

    conn.execute(
        "INSERT INTO payments (id, order_id, status, plan, bonus_days, device_id, amount_cents, currency, gateway, created_at)
         VALUES (?1, ?2, 'pending', ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            &id,
            &input.order_id,
            input.plan.as_str(),
            input.bonus_days,
            input.device_id,
            input.amount_cents,
            &input.currency,
            input.gateway,
            created_at
        ],
    )?;

    Ok(Payment {
        id,
        order_id: input.order_id.clone(),
        status: PaymentStatus::Pending,
        plan: input.plan,
        bonus_days: input.bonus_days,
        device_id: input.device_id.clone(),
        amount_cents: input.amount_cents,
        currency: input.currency.clone(),
        gateway: input.gateway.clone(),
        gateway_txn_id: None,
        gateway_key: None,
        last_gateway_status: None,
        last_gateway_payload: None,
        verify_attempts: 0,
        failure_reason: None,
        user_id: None,
        subscription_id: None,
        access_code: None,
        access_code_id: None,
        created_at,
        completed_at: None,
        failed_at: None,
    })
}

pub fn get_payment_by_order_id(conn: &Connection, order_id: &str) -> Result<Option<Payment>> {
    query_one(
        conn,
        &format!("SELECT {} FROM payments WHERE order_id = ?1", PAYMENT_COLS),
        &[&order_id],
    )
}

pub fn get_payment_by_txn_id(conn: &Connection, txn_id: &str) -> Result<Option<Payment>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payments WHERE gateway_txn_id = ?1",
            PAYMENT_COLS
        ),
        &[&txn_id],
    )
}

pub fn get_payment_by_gateway_key(conn: &Connection, key: &str) -> Result<Option<Payment>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payments WHERE gateway_key = ?1",
            PAYMENT_COLS
        ),
        &[&key],
    )
}

/// Record a gateway callback on the audit columns before any branching.
/// Runs for every correlated callback, duplicates included, and also
/// backfills missing gateway references so later callbacks can correlate
/// by transaction id or vendor key.
pub fn record_gateway_attempt(
    conn: &Connection,
    payment_id: &str,
    raw_status: Option<&str>,
    payload: &str,
    txn_id: Option<&str>,
    gateway_key: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE payments SET verify_attempts = verify_attempts + 1,
                             last_gateway_status = COALESCE(?2, last_gateway_status),
                             last_gateway_payload = ?3,
                             gateway_txn_id = COALESCE(gateway_txn_id, ?4),
                             gateway_key = COALESCE(gateway_key, ?5)
         WHERE id = ?1",
        params![payment_id, raw_status, payload, txn_id, gateway_key],
    )?;
    Ok(())
}

/// Atomically move a payment from pending to success.
///
/// Returns true only for the caller that performed the transition; a false
/// return means the payment was already terminal. This gate is what makes
/// the entitlement grant exactly-once.
pub fn try_complete_payment(conn: &Connection, order_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payments SET status = 'success', completed_at = ?2, failure_reason = NULL
         WHERE order_id = ?1 AND status = 'pending'",
        params![order_id, now()],
    )?;
    Ok(affected > 0)
}

/// Atomically move a payment from pending to failed. Terminal states are
/// never overwritten; a late failure callback for a success payment is a
/// no-op.
pub fn try_fail_payment(conn: &Connection, order_id: &str, reason: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payments SET status = 'failed', failed_at = ?2, failure_reason = ?3
         WHERE order_id = ?1 AND status = 'pending'",
        params![order_id, now(), reason],
    )?;
    Ok(affected > 0)
}

/// Write grant references back to the payment row after a successful grant.
pub fn record_grant_on_payment(
    conn: &Connection,
    order_id: &str,
    user_id: &str,
    subscription_id: &str,
    access_code: &str,
    access_code_id: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE payments SET user_id = ?2, subscription_id = ?3, access_code = ?4, access_code_id = ?5
         WHERE order_id = ?1",
        params![order_id, user_id, subscription_id, access_code, access_code_id],
    )?;
    Ok(())
}

pub fn list_recent_payments(conn: &Connection, limit: i64) -> Result<Vec<Payment>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM payments ORDER BY created_at DESC LIMIT ?1",
            PAYMENT_COLS
        ),
        &[&limit],
    )
}

// ============ Pairing ============

/// Flip stale pending sessions for one TV to expired. Opportunistic; reads
/// never depend on this having run.
pub fn expire_stale_pair_sessions_for_tv(conn: &Connection, tv_device_id: &str) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE pair_sessions SET status = 'expired'
         WHERE tv_device_id = ?1 AND status = 'pending' AND expires_at <= ?2",
        params![tv_device_id, now()],
    )?;
    Ok(affected)
}

/// Global sweep used by the background cleanup task.
pub fn expire_stale_pair_sessions(conn: &Connection) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE pair_sessions SET status = 'expired'
         WHERE status = 'pending' AND expires_at <= ?1",
        params![now()],
    )?;
    Ok(affected)
}

/// An unexpired pending session for this TV, for create-session reuse.
pub fn find_pending_pair_session_for_tv(
    conn: &Connection,
    tv_device_id: &str,
) -> Result<Option<PairSession>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM pair_sessions
             WHERE tv_device_id = ?1 AND status = 'pending' AND expires_at > ?2
             ORDER BY created_at DESC LIMIT 1",
            PAIR_SESSION_COLS
        ),
        &[&tv_device_id, &now()],
    )
}

/// Create a pending pairing session. The code only needs to be unique among
/// pending sessions (a partial unique index enforces it), so generation
/// retries on conflict like redemption codes do.
pub fn create_pair_session(conn: &Connection, tv_device_id: &str) -> Result<PairSession> {
    let created_at = now();
    let expires_at = created_at + PAIR_SESSION_TTL_SECS;

    for attempt in 0..=MAX_GENERATION_ATTEMPTS {
        let code = if attempt < MAX_GENERATION_ATTEMPTS {
            generate_code(CODE_LEN)
        } else {
            fallback_code(created_at)
        };
        let id = gen_id();
        match conn.execute(
            "INSERT INTO pair_sessions (id, code, tv_device_id, status, created_at, expires_at)
             VALUES (?1, ?2, ?3, 'pending', ?4, ?5)",
            params![&id, &code, tv_device_id, created_at, expires_at],
        ) {
            Ok(_) => {
                return Ok(PairSession {
                    id,
                    code,
                    tv_device_id: tv_device_id.to_string(),
                    phone_device_id: None,
                    user_id: None,
                    status: PairStatus::Pending,
                    created_at,
                    expires_at,
                    paired_at: None,
                })
            }
            Err(e) if is_unique_violation(&e) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::Internal(
        "Could not generate a unique pairing code".into(),
    ))
}

/// The most recent session for a code. Terminal sessions keep their code,
/// so the newest row is the one a polling TV or linking phone means.
pub fn get_latest_pair_session_by_code(
    conn: &Connection,
    code: &str,
) -> Result<Option<PairSession>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM pair_sessions WHERE code = ?1 ORDER BY created_at DESC LIMIT 1",
            PAIR_SESSION_COLS
        ),
        &[&code],
    )
}

/// Lazily expire one session. Guarded so a concurrent link cannot be
/// overwritten; returns whether this call did the flip.
pub fn lazy_expire_pair_session(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE pair_sessions SET status = 'expired'
         WHERE id = ?1 AND status = 'pending' AND expires_at <= ?2",
        params![id, now()],
    )?;
    Ok(affected > 0)
}

/// Atomically link a pending session to a phone's user. Fails (returns
/// false) if the session is no longer pending or already past its deadline.
pub fn try_pair_session(
    conn: &Connection,
    id: &str,
    phone_device_id: &str,
    user_id: &str,
) -> Result<bool> {
    let ts = now();
    let affected = conn.execute(
        "UPDATE pair_sessions SET status = 'paired', phone_device_id = ?2, user_id = ?3, paired_at = ?4
         WHERE id = ?1 AND status = 'pending' AND expires_at > ?4",
        params![id, phone_device_id, user_id, ts],
    )?;
    Ok(affected > 0)
}

/// Cancel other pending sessions for the same TV once one is paired.
pub fn cancel_sibling_pair_sessions(
    conn: &Connection,
    tv_device_id: &str,
    keep_id: &str,
) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE pair_sessions SET status = 'cancelled'
         WHERE tv_device_id = ?1 AND status = 'pending' AND id != ?2",
        params![tv_device_id, keep_id],
    )?;
    Ok(affected)
}

/// Delete terminal pairing sessions older than the cutoff. Storage hygiene
/// only; correctness never depends on rows being gone.
pub fn cleanup_terminal_pair_sessions(conn: &Connection, older_than_secs: i64) -> Result<usize> {
    let cutoff = now() - older_than_secs;
    let deleted = conn.execute(
        "DELETE FROM pair_sessions
         WHERE status IN ('expired', 'cancelled', 'paired') AND created_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}
