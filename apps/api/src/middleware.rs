use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use portwarden_application::EXECUTION_ROLE_HEADER;
use portwarden_core::AppError;

use crate::error::ApiResult;
use crate::state::AppState;

/// Admits scheduler invocations carrying the shared secret and execution role.
pub async fn require_worker_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let headers = request.headers();

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or_default();
    if bearer.is_empty() || bearer != state.worker_shared_secret {
        return Err(AppError::Unauthorized("invalid worker credentials".to_owned()).into());
    }

    let execution_role = headers
        .get(EXECUTION_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();
    if execution_role != state.revocation_execution_role {
        return Err(AppError::Unauthorized("unexpected execution role".to_owned()).into());
    }

    Ok(next.run(request).await)
}
