use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use fieldops_core::CoreError;
use serde_json::json;
use tracing;

/// Every handler error ends up here and is rendered as `{ "error": message }`.
#[derive(Debug)]
pub struct ApiError(pub CoreError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::InvalidTransition { .. } | CoreError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::Storage(_) | CoreError::Serialization(_) | CoreError::Upstream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self.0);
            "Internal server error".to_string()
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self.0);
            self.0.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldops_core::types::TicketStatus;

    #[test]
    fn maps_core_errors_to_status_codes() {
        let cases = [
            (CoreError::not_found("Ticket", "t-1"), StatusCode::NOT_FOUND),
            (
                CoreError::InvalidTransition {
                    from: TicketStatus::Open,
                    to: TicketStatus::Verified,
                },
                StatusCode::BAD_REQUEST,
            ),
            (CoreError::Conflict("dup".into()), StatusCode::CONFLICT),
            (CoreError::Unauthorized, StatusCode::UNAUTHORIZED),
            (CoreError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (CoreError::Storage("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err).status(), expected);
        }
    }
}
