//! Entitlement granting for completed payments.
//!
//! Called only after the caller has won the pending -> success transition on
//! the payment row, and idempotent on its own anyway: the payment-sourced
//! redemption keyed by `payment_order_id` is the anchor, so re-running a
//! grant reuses the existing code and never mints a second subscription.

use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::{CodeSource, CreateRedemption, Payment, Redemption};

/// What a grant produced (or found already in place).
#[derive(Debug, Clone)]
pub struct GrantOutcome {
    pub user_id: String,
    pub access_code: String,
    pub redemption_id: String,
    pub subscription_id: String,
}

/// Grant the entitlement for a success payment.
///
/// Returns Ok(None) when the payment has no resolvable user (no device id,
/// or a device nobody has registered). The payment stays success with no
/// subscription; that partial state is deliberate and surfaces in the admin
/// payments list.
pub fn grant_entitlement(conn: &Connection, payment: &Payment) -> Result<Option<GrantOutcome>> {
    let user = match &payment.device_id {
        Some(device_id) => queries::get_user_by_device(conn, device_id)?,
        None => None,
    };

    let Some(user) = user else {
        tracing::error!(
            order_id = %payment.order_id,
            device_id = ?payment.device_id,
            "Success payment has no resolvable user; granted nothing"
        );
        return Ok(None);
    };

    let redemption = mint_or_reuse_redemption(conn, payment, &user.id)?;

    // A subscription already recorded on the payment means a previous grant
    // finished; reuse its references instead of creating another window.
    if let (Some(subscription_id), Some(code), Some(code_id)) = (
        payment.subscription_id.clone(),
        payment.access_code.clone(),
        payment.access_code_id.clone(),
    ) {
        return Ok(Some(GrantOutcome {
            user_id: user.id,
            access_code: code,
            redemption_id: code_id,
            subscription_id,
        }));
    }

    let duration_days = payment.plan.duration_days() + payment.bonus_days;
    let subscription = queries::create_subscription(
        conn,
        &user.id,
        payment.plan,
        duration_days,
        payment.plan.max_devices(),
        Some(&redemption.id),
    )?;

    queries::record_grant_on_payment(
        conn,
        &payment.order_id,
        &user.id,
        &subscription.id,
        &redemption.code,
        &redemption.id,
    )?;

    tracing::info!(
        order_id = %payment.order_id,
        user_id = %user.id,
        plan = %payment.plan,
        subscription_id = %subscription.id,
        "Granted entitlement for payment"
    );

    Ok(Some(GrantOutcome {
        user_id: user.id,
        access_code: redemption.code,
        redemption_id: redemption.id,
        subscription_id: subscription.id,
    }))
}

/// Reuse the redemption already minted for this order, repairing claim
/// fields if an earlier grant died between insert and claim. Otherwise mint
/// a new payment-sourced code, pre-marked used by the paying user.
fn mint_or_reuse_redemption(
    conn: &Connection,
    payment: &Payment,
    user_id: &str,
) -> Result<Redemption> {
    if let Some(existing) = queries::get_redemption_by_order_id(conn, &payment.order_id)? {
        if existing.used_by_user_id.is_none() || existing.used_at.is_none() {
            queries::repair_redemption_claim(conn, &existing.id, user_id)?;
        }
        return Ok(existing);
    }

    let input = CreateRedemption {
        plan: payment.plan,
        duration_days: payment.plan.duration_days() + payment.bonus_days,
        max_devices: payment.plan.max_devices(),
        source: CodeSource::Payment,
        payment_order_id: Some(payment.order_id.to_string()),
        trial_hours: 0,
        trial_movie_id: None,
        trial_movie_aliases: None,
        note: None,
    };
    let redemption = queries::create_redemption(conn, &input)?;
    queries::repair_redemption_claim(conn, &redemption.id, user_id)?;

    Ok(Redemption {
        used_by_user_id: Some(user_id.to_string()),
        ..redemption
    })
}
