use axum::Json;
use axum::extract::State;
use portwarden_domain::RevocationPayload;

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn revocation_handler(
    State(state): State<AppState>,
    Json(payload): Json<RevocationPayload>,
) -> ApiResult<Json<&'static str>> {
    let outcome = state.revocation_service.revoke(payload).await?;

    Ok(Json(outcome.message()))
}
