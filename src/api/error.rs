use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::AuthError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Converts `AuthError` into the HTTP response a service should emit.
///
/// Every token or user-resolution failure collapses to a generic 401 so
/// the response does not reveal whether a token was malformed, expired, or
/// named a missing or disabled account.
#[derive(Debug)]
pub struct AppError(pub AuthError);

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AuthError::InvalidToken
            | AuthError::ExpiredToken
            | AuthError::UnknownIssuer
            | AuthError::UserNotFound
            | AuthError::UserDisabled => StatusCode::UNAUTHORIZED,
            AuthError::NotAMember
            | AuthError::InsufficientRole
            | AuthError::InvitationEmailMismatch => StatusCode::FORBIDDEN,
            AuthError::InvitationNotFound | AuthError::OrganizationNotFound => {
                StatusCode::NOT_FOUND
            }
            AuthError::InvitationAlreadyUsed
            | AuthError::DuplicateInvitation
            | AuthError::LastOwnerViolation => StatusCode::CONFLICT,
            AuthError::InvitationExpired => StatusCode::GONE,
            AuthError::KeyUnavailable(_)
            | AuthError::Configuration(_)
            | AuthError::Database(_)
            | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status == StatusCode::UNAUTHORIZED {
            "authentication required".to_owned()
        } else if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Detail strings may name hosts or tables; keep them server-side.
            log::error!(target: "portcullis", "msg=\"request failed\", error=\"{}\"", self.0);
            "internal error".to_owned()
        } else {
            self.0.to_string()
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
