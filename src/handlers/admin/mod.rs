mod codes;
mod payments;

pub use codes::*;
pub use payments::*;

use axum::{
    middleware::from_fn_with_state,
    routing::get,
    Router,
};

use crate::db::AppState;
use crate::middleware::admin_auth;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/admin/codes",
            get(admin_codes_get)
                .post(admin_codes_create)
                .put(admin_codes_update)
                .delete(admin_codes_delete),
        )
        .route("/admin/payments", get(admin_payments_list))
        .layer(from_fn_with_state(state, admin_auth))
}
