use std::net::SocketAddr;
use std::str::FromStr;

use axum::Json;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use portwarden_application::GatewayOutcome;
use portwarden_core::AppResult;
use portwarden_domain::GrantOrigin;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AccessQuery {
    pub code: Option<String>,
}

pub async fn access_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<AccessQuery>,
) -> ApiResult<Response> {
    let origin = request_origin(&headers, peer, state.trust_forwarded_for)?;

    let outcome = state
        .auth_gateway_service
        .handle(query.code.as_deref(), origin)
        .await?;

    Ok(match outcome {
        GatewayOutcome::RedirectToLogin { location } => {
            (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
        }
        GatewayOutcome::Decided(decision) => {
            (StatusCode::OK, Json(decision.message())).into_response()
        }
    })
}

/// Resolves the caller's origin from the socket peer or, when trusted, the
/// first `X-Forwarded-For` hop.
pub(crate) fn request_origin(
    headers: &HeaderMap,
    peer: SocketAddr,
    trust_forwarded_for: bool,
) -> AppResult<GrantOrigin> {
    if trust_forwarded_for
        && let Some(forwarded) = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    {
        return GrantOrigin::from_str(forwarded);
    }

    Ok(GrantOrigin::new(peer.ip().to_canonical()))
}
