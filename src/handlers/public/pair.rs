use axum::{extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};

use crate::codes::normalize_code_input;
use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Query};
use crate::models::{PairStatus, PAIR_POLL_INTERVAL_MS};
use crate::util::extract_request_info;

/// Request body for POST /tv/pair
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePairBody {
    pub tv_device_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairSessionResponse {
    pub code: String,
    pub status: String,
    pub expires_at: i64,
    /// URL the phone app opens to complete pairing
    pub pair_url: String,
    pub poll_interval_ms: i64,
}

/// POST /tv/pair - Start (or resume) a pairing session for a TV.
///
/// An unexpired pending session for the same TV is returned as-is rather
/// than minting a new code on every app launch.
pub async fn create_pair_session(
    State(state): State<AppState>,
    Json(body): Json<CreatePairBody>,
) -> Result<Json<PairSessionResponse>> {
    let conn = state.db.get()?;

    let tv_device_id = body.tv_device_id.trim();
    if tv_device_id.is_empty() {
        return Err(AppError::BadRequest("tvDeviceId is required".into()));
    }

    queries::expire_stale_pair_sessions_for_tv(&conn, tv_device_id)?;

    let session = match queries::find_pending_pair_session_for_tv(&conn, tv_device_id)? {
        Some(existing) => existing,
        None => queries::create_pair_session(&conn, tv_device_id)?,
    };

    Ok(Json(pair_response(&state, session.code, session.status, session.expires_at)))
}

/// Query parameters for GET /tv/pair
#[derive(Debug, Deserialize)]
pub struct PollPairQuery {
    pub code: String,
}

/// GET /tv/pair - Poll a pairing session by code.
///
/// Expiry is lazy: a pending session past its deadline is flipped here (or
/// wherever it is next read) rather than by a timer.
pub async fn poll_pair_session(
    State(state): State<AppState>,
    Query(query): Query<PollPairQuery>,
) -> Result<Json<PairSessionResponse>> {
    let conn = state.db.get()?;

    let code = normalize_code_input(&query.code);
    let mut session = queries::get_latest_pair_session_by_code(&conn, &code)?
        .ok_or_else(|| AppError::NotFound("Unknown pairing code".into()))?;

    if session.is_stale(chrono::Utc::now().timestamp()) {
        queries::lazy_expire_pair_session(&conn, &session.id)?;
        session.status = PairStatus::Expired;
    }

    Ok(Json(pair_response(&state, session.code, session.status, session.expires_at)))
}

/// Request body for PUT /tv/pair
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkPairBody {
    pub code: String,
    pub phone_device_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkPairResponse {
    pub status: String,
    pub tv_device_id: String,
}

/// PUT /tv/pair - Link a phone to a pending session.
///
/// The TV device is adopted onto the phone's user (quota enforced) before
/// the session flips to paired, so a quota failure leaves the session
/// claimable. Linking an already paired session again succeeds idempotently;
/// retrying phones get a consistent answer.
pub async fn link_pair_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LinkPairBody>,
) -> Result<Json<LinkPairResponse>> {
    let mut conn = state.db.get()?;

    let phone_device_id = body.phone_device_id.trim();
    if phone_device_id.is_empty() {
        return Err(AppError::BadRequest("phoneDeviceId is required".into()));
    }

    let code = normalize_code_input(&body.code);
    let session = queries::get_latest_pair_session_by_code(&conn, &code)?
        .ok_or_else(|| AppError::NotFound("Unknown pairing code".into()))?;

    let user = queries::get_user_by_device(&conn, phone_device_id)?
        .ok_or_else(|| AppError::NotFound("Phone device is not registered".into()))?;

    let now = chrono::Utc::now().timestamp();
    match session.status {
        PairStatus::Paired => {
            return Ok(Json(LinkPairResponse {
                status: PairStatus::Paired.to_string(),
                tv_device_id: session.tv_device_id,
            }));
        }
        PairStatus::Expired => {
            return Err(AppError::Gone("Pairing session expired".into()));
        }
        PairStatus::Cancelled => {
            return Err(AppError::Gone("Pairing session was cancelled".into()));
        }
        PairStatus::Pending if session.expires_at <= now => {
            queries::lazy_expire_pair_session(&conn, &session.id)?;
            return Err(AppError::Gone("Pairing session expired".into()));
        }
        PairStatus::Pending => {}
    }

    // Adopt the TV under the phone's user before flipping the session
    let (_, user_agent) = extract_request_info(&headers);
    queries::bind_device(&mut conn, &user.id, &session.tv_device_id, user_agent.as_deref())?;

    if !queries::try_pair_session(&conn, &session.id, phone_device_id, &user.id)? {
        // Lost the race; report whatever the session became
        let current = queries::get_latest_pair_session_by_code(&conn, &code)?;
        return match current.map(|s| s.status) {
            Some(PairStatus::Paired) => Ok(Json(LinkPairResponse {
                status: PairStatus::Paired.to_string(),
                tv_device_id: session.tv_device_id,
            })),
            _ => Err(AppError::Gone("Pairing session expired".into())),
        };
    }

    queries::cancel_sibling_pair_sessions(&conn, &session.tv_device_id, &session.id)?;

    tracing::info!(
        user_id = %user.id,
        tv_device_id = %session.tv_device_id,
        "TV paired"
    );

    Ok(Json(LinkPairResponse {
        status: PairStatus::Paired.to_string(),
        tv_device_id: session.tv_device_id,
    }))
}

fn pair_response(
    state: &AppState,
    code: String,
    status: PairStatus,
    expires_at: i64,
) -> PairSessionResponse {
    let pair_url = format!("{}/pair?code={}", state.base_url, code);
    PairSessionResponse {
        code,
        status: status.to_string(),
        expires_at,
        pair_url,
        poll_interval_ms: PAIR_POLL_INTERVAL_MS,
    }
}
