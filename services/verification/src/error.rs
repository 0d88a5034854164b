use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Verification service error variants.
///
/// A wrong token and a token that is no longer outstanding share `TokenMismatch`.
#[derive(Debug, thiserror::Error)]
pub enum VerificationServiceError {
    #[error("invalid token format")]
    MalformedToken,
    #[error("user not found")]
    UserNotFound,
    #[error("email already registered")]
    DuplicateEmail,
    #[error("token mismatch")]
    TokenMismatch,
    #[error("token expired")]
    TokenExpired,
    #[error("invalid query")]
    InvalidQuery,
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl VerificationServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedToken => "MALFORMED_TOKEN",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::DuplicateEmail => "DUPLICATE_EMAIL",
            Self::TokenMismatch => "TOKEN_MISMATCH",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidQuery => "INVALID_QUERY",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedToken | Self::InvalidQuery => StatusCode::BAD_REQUEST,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::DuplicateEmail => StatusCode::CONFLICT,
            Self::TokenMismatch | Self::TokenExpired => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Full description for logs, including the anyhow chain of internal errors.
    pub fn detail(&self) -> String {
        match self {
            Self::Internal(e) => format!("{e:#}"),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for VerificationServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::Internal(_) = self {
            tracing::error!(error = %self.detail(), kind = "INTERNAL", "internal error");
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}

/// Failure to hand a message to the external channel. Always retryable from the
/// processor's point of view.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("publisher rejected message: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("publisher transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("publish timed out after {0:?}")]
    Timeout(Duration),
}
