use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use portwarden_core::AppError;
use serde::Serialize;
use tracing::error;

/// API error payload.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    message: String,
}

/// HTTP API error wrapper around core application errors.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(value: AppError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AppError::UpstreamExchange { status, body } => {
                let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY);
                return (
                    status,
                    [(header::CONTENT_TYPE, "application/json")],
                    body.clone(),
                )
                    .into_response();
            }
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthenticated(_)
            | AppError::InvalidAssertion(_)
            | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::StoreMutation(_)
            | AppError::Scheduling(_)
            | AppError::LogSink(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }

        let payload = Json(ErrorResponse {
            message: self.0.to_string(),
        });

        (status, payload).into_response()
    }
}

/// Standard API result type.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use portwarden_core::AppError;

    use super::ApiError;

    #[test]
    fn upstream_exchange_keeps_provider_status() {
        let response = ApiError(AppError::UpstreamExchange {
            status: 400,
            body: r#"{"error":"invalid_grant"}"#.to_owned(),
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_and_scheduling_failures_are_server_errors() {
        for error in [
            AppError::StoreMutation("denied".to_owned()),
            AppError::Scheduling("quota".to_owned()),
        ] {
            assert_eq!(
                ApiError(error).into_response().status(),
                StatusCode::INTERNAL_SERVER_ERROR
            );
        }
    }

    #[test]
    fn unauthorized_maps_to_401() {
        assert_eq!(
            ApiError(AppError::Unauthorized("bad secret".to_owned()))
                .into_response()
                .status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
