use axum::{extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};

use crate::codes::{is_valid_code_format, normalize_code_input};
use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::util::extract_request_info;

/// Request body for POST /redeem
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemBody {
    pub code: String,
    /// Client-stable device identifier of the redeeming device
    pub device_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemResponse {
    pub plan: String,
    pub expires_at: i64,
    pub max_devices: i64,
    /// 0 unless the code is a movie-scoped trial
    pub trial_hours: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_movie_id: Option<String>,
    pub referral_code: String,
}

/// POST /redeem - Claim a redemption code for the calling device's user.
///
/// First-contact devices get a user created on the spot. The claim itself
/// is a conditional update, so a code being hammered from several devices
/// is consumed exactly once; losers get a 409.
pub async fn redeem_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RedeemBody>,
) -> Result<Json<RedeemResponse>> {
    let mut conn = state.db.get()?;

    if body.device_id.trim().is_empty() {
        return Err(AppError::BadRequest("deviceId is required".into()));
    }

    let code = normalize_code_input(&body.code);
    if !is_valid_code_format(&code) {
        return Err(AppError::BadRequest("Invalid code format".into()));
    }

    let (_, user_agent) = extract_request_info(&headers);
    let user = queries::get_or_create_user_for_device(
        &mut conn,
        body.device_id.trim(),
        user_agent.as_deref(),
    )?;

    // Claim, subscription, and device bind commit together; a failure on
    // any of them leaves the code available
    let claimed = queries::claim_redemption_and_activate(
        &mut conn,
        &code,
        &user.id,
        body.device_id.trim(),
        user_agent.as_deref(),
    )?;

    let (redemption, subscription) = match claimed {
        Some(result) => result,
        None => {
            // Lost the claim or the code is unusable; read back to say why
            return match queries::get_redemption_by_code(&conn, &code)? {
                None => Err(AppError::NotFound("Code not found".into())),
                Some(r) if r.revoked_at.is_some() => {
                    Err(AppError::Gone("This code has been revoked".into()))
                }
                Some(r) if r.used_by_user_id.as_deref() == Some(user.id.as_str()) => {
                    Err(AppError::Conflict("You have already used this code".into()))
                }
                Some(_) => Err(AppError::Conflict("This code has already been used".into())),
            };
        }
    };

    tracing::info!(
        user_id = %user.id,
        plan = %redemption.plan,
        trial = redemption.trial_hours > 0,
        "Code redeemed"
    );

    Ok(Json(RedeemResponse {
        plan: redemption.plan.as_str().to_string(),
        expires_at: subscription.expires_at,
        max_devices: subscription.max_devices,
        trial_hours: redemption.trial_hours,
        trial_movie_id: redemption.trial_movie_id,
        referral_code: user.referral_code,
    }))
}
