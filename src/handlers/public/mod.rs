mod pair;
mod pay;
mod redeem;

pub use pair::*;
pub use pay::*;
pub use redeem::*;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::config::RateLimits;
use crate::db::AppState;
use crate::rate_limit;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(limits: RateLimits) -> Router<AppState> {
    let strict = Router::new()
        .route("/redeem", post(redeem_code))
        .route("/pay/checkout", post(create_checkout))
        .layer(rate_limit::strict_layer(limits.strict_rpm));

    let standard = Router::new()
        .route("/pay/status", get(payment_status))
        // POST creates/reuses a session, GET polls it, PUT links the phone
        .route(
            "/tv/pair",
            post(create_pair_session)
                .get(poll_pair_session)
                .put(link_pair_session),
        )
        .layer(rate_limit::standard_layer(limits.standard_rpm));

    let relaxed = Router::new()
        .route("/health", get(health))
        .layer(rate_limit::relaxed_layer(limits.relaxed_rpm));

    Router::new().merge(strict).merge(standard).merge(relaxed)
}
