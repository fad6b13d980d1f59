//! HTTP error mapping
//!
//! Bodies are always `{"error": "<message>"}`. Input errors carry their own
//! message; authorization and server errors carry a fixed one so callers
//! cannot tell which check failed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use intake_core::{ErrorKind, IntakeError};
use serde::Serialize;

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable message
    pub error: String,
}

/// Errors returned by the HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Pipeline error
    #[error(transparent)]
    Intake(#[from] IntakeError),

    /// Body was not valid JSON of the expected shape
    #[error("invalid request body")]
    InvalidBody,

    /// Request exceeded the configured timeout
    #[error("request timed out")]
    Timeout,
}

impl ApiError {
    /// HTTP status for this error
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidBody => StatusCode::BAD_REQUEST,
            Self::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            Self::Intake(err) => match err {
                IntakeError::Unauthorized => StatusCode::UNAUTHORIZED,
                IntakeError::Forbidden => StatusCode::FORBIDDEN,
                IntakeError::AlreadyComplete => StatusCode::CONFLICT,
                IntakeError::AlreadyNotified => StatusCode::OK,
                _ => match err.kind() {
                    ErrorKind::Input => StatusCode::BAD_REQUEST,
                    ErrorKind::Authorization => StatusCode::UNAUTHORIZED,
                    ErrorKind::State => StatusCode::CONFLICT,
                    ErrorKind::Persistence | ErrorKind::Configuration => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                },
            },
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::InvalidBody => "Invalid request body".to_string(),
            Self::Timeout => "Request timed out".to_string(),
            Self::Intake(err) => match err {
                IntakeError::Unauthorized => "Unauthorized".to_string(),
                IntakeError::Forbidden => "Unauthorized or application not found".to_string(),
                IntakeError::AlreadyComplete => "Application already complete".to_string(),
                IntakeError::AlreadyNotified => "Notification already sent".to_string(),
                _ if err.kind() == ErrorKind::Input => err.to_string(),
                _ => "Failed to process request".to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.public_message(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::ApplicationId;

    #[test]
    fn status_codes() {
        let cases = [
            (IntakeError::MissingField("source"), StatusCode::BAD_REQUEST),
            (IntakeError::InvalidStepNumber(9), StatusCode::BAD_REQUEST),
            (IntakeError::NoValidFields, StatusCode::BAD_REQUEST),
            (IntakeError::ConsentRequired("popia_consent"), StatusCode::BAD_REQUEST),
            (IntakeError::Unauthorized, StatusCode::UNAUTHORIZED),
            (IntakeError::Forbidden, StatusCode::FORBIDDEN),
            (IntakeError::AlreadyComplete, StatusCode::CONFLICT),
            (IntakeError::NotFound(ApplicationId::new()), StatusCode::INTERNAL_SERVER_ERROR),
            (IntakeError::Persistence("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                IntakeError::ServerConfiguration("secret".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
        assert_eq!(ApiError::Timeout.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn server_errors_do_not_leak_details() {
        let err = ApiError::from(IntakeError::Persistence("db password rejected".into()));
        assert_eq!(err.public_message(), "Failed to process request");

        let err = ApiError::from(IntakeError::ServerConfiguration("SESSION_JWT_SECRET".into()));
        assert!(!err.public_message().contains("SESSION_JWT_SECRET"));
    }

    #[test]
    fn input_errors_explain_themselves() {
        let err = ApiError::from(IntakeError::MissingField("licenceStatus"));
        assert_eq!(err.public_message(), "missing required field: licenceStatus");
    }
}
