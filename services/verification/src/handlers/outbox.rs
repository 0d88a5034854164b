use axum::{
    Json,
    extract::{Query, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use verimail_core::serde::{to_rfc3339_ms, to_rfc3339_ms_opt};

use crate::domain::types::{OutboxIntent, OutboxStatus};
use crate::error::VerificationServiceError;
use crate::state::AppState;
use crate::usecase::outbox::ListOutboxUseCase;

const DEFAULT_LIST_LIMIT: u64 = 50;

// ── GET /v1/outbox ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ListOutboxQuery {
    pub status: Option<String>,
    pub limit: Option<u64>,
}

/// An outbox row as shown to operators. The token is never exposed.
#[derive(Debug, Serialize)]
pub struct OutboxIntentResponse {
    pub id: i64,
    pub recipient: String,
    pub status: OutboxStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
    #[serde(serialize_with = "to_rfc3339_ms")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "to_rfc3339_ms")]
    pub next_attempt_at: DateTime<Utc>,
    #[serde(serialize_with = "to_rfc3339_ms_opt")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(serialize_with = "to_rfc3339_ms_opt")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl From<OutboxIntent> for OutboxIntentResponse {
    fn from(intent: OutboxIntent) -> Self {
        Self {
            id: intent.id.0,
            recipient: intent.recipient,
            status: intent.status,
            retry_count: intent.retry_count,
            last_error: intent.last_error,
            created_at: intent.created_at,
            next_attempt_at: intent.next_attempt_at,
            sent_at: intent.sent_at,
            failed_at: intent.failed_at,
        }
    }
}

/// Defaults to `status=FAILED`, the rows that need a human.
pub async fn list_outbox(
    State(state): State<AppState>,
    Query(query): Query<ListOutboxQuery>,
) -> Result<Json<Vec<OutboxIntentResponse>>, VerificationServiceError> {
    let status = match query.status.as_deref() {
        Some(raw) => raw
            .parse::<OutboxStatus>()
            .map_err(|_| VerificationServiceError::InvalidQuery)?,
        None => OutboxStatus::Failed,
    };

    let usecase = ListOutboxUseCase {
        store: state.outbox_store(),
    };
    let intents = usecase
        .execute(status, query.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .await?;
    Ok(Json(intents.into_iter().map(Into::into).collect()))
}
