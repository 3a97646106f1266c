use axum::Router;
use axum::routing::get;

use crate::handlers;
use crate::state::AppState;

pub(super) fn build_access_routes() -> Router<AppState> {
    Router::new().route("/access", get(handlers::access::access_handler))
}
