use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;

use crate::error::VerificationServiceError;
use crate::state::AppState;
use crate::usecase::issue::{IssueTokenInput, IssueTokenUseCase};
use crate::usecase::verify::{VerifyEmailInput, VerifyEmailUseCase};

// ── GET /v1/user/verify ──────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct VerifyEmailQuery {
    pub email: String,
    pub token: String,
}

pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<StatusCode, VerificationServiceError> {
    let usecase = VerifyEmailUseCase {
        users: state.user_repo(),
        token_ttl: state.token_ttl,
        metrics: state.metrics.clone(),
    };
    usecase
        .execute(
            VerifyEmailInput {
                email: query.email,
                token: query.token,
            },
            Utc::now(),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── POST /v1/user/verification ───────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RequestVerificationBody {
    pub email: String,
}

/// Issue a fresh token and queue its email. The token itself only travels
/// through the outbox.
pub async fn request_verification(
    State(state): State<AppState>,
    Json(body): Json<RequestVerificationBody>,
) -> Result<StatusCode, VerificationServiceError> {
    let usecase = IssueTokenUseCase {
        users: state.user_repo(),
        metrics: state.metrics.clone(),
    };
    usecase
        .execute(IssueTokenInput { email: body.email }, Utc::now())
        .await?;
    Ok(StatusCode::ACCEPTED)
}
