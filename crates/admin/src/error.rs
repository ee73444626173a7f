//! Unified error handling for admin.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use campus_eats_shop::OrderError;
use campus_eats_shop::auth::AuthError;

/// Application-level error type for the admin API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Order or catalog operation failed.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Staff login failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let server_error = matches!(
            self,
            Self::Order(OrderError::Repository(_))
                | Self::Auth(AuthError::Repository(_) | AuthError::PasswordHash)
                | Self::Session(_)
                | Self::Internal(_)
        );

        // Log server errors with Sentry
        if server_error {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Admin request error"
            );
        }

        let status = match &self {
            Self::Order(err) => match err {
                OrderError::Validation(_) | OrderError::EmptyCart => StatusCode::BAD_REQUEST,
                OrderError::NotFound(_) => StatusCode::NOT_FOUND,
                OrderError::CategoryMismatch { .. }
                | OrderError::InvalidState { .. }
                | OrderError::Conflict(_) => StatusCode::CONFLICT,
                OrderError::PaymentInitiationFailed { .. } => StatusCode::BAD_GATEWAY,
                OrderError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Auth(AuthError::Repository(_) | AuthError::PasswordHash)
            | Self::Session(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // Staff login never says which part was wrong
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        // Don't expose internal error details to clients
        let message = if server_error {
            "Internal server error".to_string()
        } else {
            match &self {
                Self::Order(err) => err.to_string(),
                Self::Auth(_) => "Invalid credentials".to_string(),
                Self::BadRequest(msg) => msg.clone(),
                Self::Session(_) | Self::Internal(_) => "Internal server error".to_string(),
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use campus_eats_core::FulfillmentStatus;

    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            get_status(
                OrderError::InvalidState {
                    status: FulfillmentStatus::Delivered,
                    message: "order is already delivered".to_string(),
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(OrderError::NotFound("order".to_string()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AuthError::UserAlreadyExists.into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::BadRequest("bad since".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Internal("boom".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
