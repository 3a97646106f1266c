use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

mod access;
mod worker_internal;

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_handler))
        .merge(access::build_access_routes())
        .merge(worker_internal::build_worker_internal_routes(
            app_state.clone(),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
