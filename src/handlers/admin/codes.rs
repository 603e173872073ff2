use axum::extract::State;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Query};
use crate::models::{CodeSource, CreateRedemption, Redemption, RedemptionStats};
use crate::plan::Plan;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;
const MAX_BATCH: i64 = 100;
const ALLOWED_TRIAL_HOURS: &[i64] = &[1, 2, 4];

/// Query parameters for GET /admin/codes
#[derive(Debug, Deserialize)]
pub struct AdminCodesQuery {
    /// stats=true returns aggregate counts instead of a listing
    #[serde(default)]
    pub stats: Option<bool>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AdminCodesGetResponse {
    Stats(RedemptionStats),
    List { codes: Vec<Redemption> },
}

/// GET /admin/codes - List recent codes, or aggregate stats with ?stats=true
pub async fn admin_codes_get(
    State(state): State<AppState>,
    Query(query): Query<AdminCodesQuery>,
) -> Result<Json<AdminCodesGetResponse>> {
    let conn = state.db.get()?;

    if query.stats.unwrap_or(false) {
        let stats = queries::redemption_stats(&conn)?;
        return Ok(Json(AdminCodesGetResponse::Stats(stats)));
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let codes = queries::list_redemptions(&conn, limit)?;
    Ok(Json(AdminCodesGetResponse::List { codes }))
}

/// Request body for POST /admin/codes
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCodesBody {
    pub plan: String,
    /// Batch size, defaults to 1
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub trial_hours: Option<i64>,
    #[serde(default)]
    pub trial_movie_id: Option<String>,
    #[serde(default)]
    pub trial_movie_title: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateCodesResponse {
    pub codes: Vec<Redemption>,
}

/// POST /admin/codes - Mint a batch of codes.
///
/// Trial codes (trialHours > 0) are movie-scoped and require trialMovieId;
/// the alias list stored with the code carries the id plus a slug of the
/// title so older clients can match either form.
pub async fn admin_codes_create(
    State(state): State<AppState>,
    Json(body): Json<CreateCodesBody>,
) -> Result<Json<CreateCodesResponse>> {
    let conn = state.db.get()?;

    let plan: Plan = body
        .plan
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Unknown plan: {}", body.plan)))?;

    let count = body.count.unwrap_or(1);
    if !(1..=MAX_BATCH).contains(&count) {
        return Err(AppError::BadRequest(format!(
            "count must be between 1 and {}",
            MAX_BATCH
        )));
    }

    let source = match body.source.as_deref() {
        None => CodeSource::Manual,
        Some(s) => s
            .parse()
            .map_err(|_| AppError::BadRequest(format!("Unknown source: {}", s)))?,
    };
    if source == CodeSource::Payment {
        return Err(AppError::BadRequest(
            "payment-sourced codes are minted by the grant path only".into(),
        ));
    }

    let trial_hours = body.trial_hours.unwrap_or(0);
    let (trial_movie_id, trial_movie_aliases) = if trial_hours > 0 {
        if !ALLOWED_TRIAL_HOURS.contains(&trial_hours) {
            return Err(AppError::BadRequest(
                "trialHours must be 1, 2 or 4".into(),
            ));
        }
        let movie_id = body
            .trial_movie_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::BadRequest("trialMovieId is required for trial codes".into())
            })?;
        let aliases = movie_aliases(movie_id, body.trial_movie_title.as_deref());
        (
            Some(movie_id.to_string()),
            Some(serde_json::to_string(&aliases)?),
        )
    } else {
        (None, None)
    };

    let input = CreateRedemption {
        plan,
        duration_days: plan.duration_days(),
        max_devices: plan.max_devices(),
        source,
        payment_order_id: None,
        trial_hours,
        trial_movie_id,
        trial_movie_aliases,
        note: body.note.clone(),
    };

    let mut codes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        codes.push(queries::create_redemption(&conn, &input)?);
    }

    tracing::info!(plan = %plan, count, trial_hours, "Minted redemption codes");

    Ok(Json(CreateCodesResponse { codes }))
}

/// Request body for PUT /admin/codes
#[derive(Debug, Deserialize)]
pub struct UpdateCodeBody {
    pub id: String,
    pub action: String,
}

/// PUT /admin/codes - Currently only {action: "revoke"}.
/// Revocation blocks future claims; an already-redeemed subscription keeps
/// running.
pub async fn admin_codes_update(
    State(state): State<AppState>,
    Json(body): Json<UpdateCodeBody>,
) -> Result<Json<Value>> {
    let conn = state.db.get()?;

    if body.action != "revoke" {
        return Err(AppError::BadRequest(format!(
            "Unknown action: {}",
            body.action
        )));
    }

    if queries::get_redemption(&conn, &body.id)?.is_none() {
        return Err(AppError::NotFound("Code not found".into()));
    }

    let revoked = queries::revoke_redemption(&conn, &body.id)?;
    if !revoked {
        return Err(AppError::Conflict("Code is already revoked".into()));
    }

    Ok(Json(json!({ "revoked": true, "id": body.id })))
}

/// Query parameters for DELETE /admin/codes
#[derive(Debug, Deserialize)]
pub struct DeleteCodeQuery {
    pub id: String,
}

/// DELETE /admin/codes?id= - Remove a code outright. Prefer revoke; delete
/// is for codes minted by mistake.
pub async fn admin_codes_delete(
    State(state): State<AppState>,
    Query(query): Query<DeleteCodeQuery>,
) -> Result<Json<Value>> {
    let conn = state.db.get()?;

    if !queries::delete_redemption(&conn, &query.id)? {
        return Err(AppError::NotFound("Code not found".into()));
    }

    Ok(Json(json!({ "deleted": true, "id": query.id })))
}

/// Ids/slugs the trial movie is known under: the canonical id plus a slug
/// of the title when one was provided.
fn movie_aliases(movie_id: &str, title: Option<&str>) -> Vec<String> {
    let mut aliases = vec![movie_id.to_string()];
    if let Some(title) = title {
        let slug = slugify(title);
        if !slug.is_empty() && slug != movie_id {
            aliases.push(slug);
        }
    }
    aliases
}

fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_dash = true;
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    out.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("The Big Match 2"), "the-big-match-2");
        assert_eq!(slugify("  Final!!  Cup  "), "final-cup");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn test_movie_aliases_dedupe() {
        assert_eq!(
            movie_aliases("big-match", Some("Big Match")),
            vec!["big-match".to_string()]
        );
        assert_eq!(
            movie_aliases("m123", Some("Big Match")),
            vec!["m123".to_string(), "big-match".to_string()]
        );
    }
}
