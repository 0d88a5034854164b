use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use verimail_domain::{UserId, VerificationToken};

use crate::domain::metrics::PipelineMetrics;
use crate::domain::repository::UserRepository;
use crate::domain::types::{NewOutboxIntent, OutstandingToken, VerificationUser};
use crate::error::VerificationServiceError;

// ── RegisterUser ─────────────────────────────────────────────────────────────

pub struct RegisterUserInput {
    pub email: String,
}

/// Creates an unverified user and queues its first verification email.
pub struct RegisterUserUseCase<R: UserRepository> {
    pub users: R,
    pub metrics: Arc<dyn PipelineMetrics>,
}

impl<R: UserRepository> RegisterUserUseCase<R> {
    pub async fn execute(
        &self,
        input: RegisterUserInput,
        now: DateTime<Utc>,
    ) -> Result<VerificationToken, VerificationServiceError> {
        let email = input.email.trim().to_owned();
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(VerificationServiceError::DuplicateEmail);
        }

        let token = VerificationToken::generate();
        let user = VerificationUser {
            id: UserId(Uuid::now_v7()),
            email: email.clone(),
            email_verified: false,
            outstanding: Some(OutstandingToken {
                token,
                issued_at: now,
            }),
        };
        let intent = NewOutboxIntent::new(email, token, now);

        self.users.create_with_outbox(&user, &intent).await?;
        self.metrics.intent_enqueued();
        info!(user_id = %user.id, "user registered, verification email queued");
        Ok(token)
    }
}

// ── IssueToken ───────────────────────────────────────────────────────────────

pub struct IssueTokenInput {
    pub email: String,
}

/// Issues a fresh verification token for an existing user. The previous token
/// stops being accepted; intents already in the outbox are left alone.
pub struct IssueTokenUseCase<R: UserRepository> {
    pub users: R,
    pub metrics: Arc<dyn PipelineMetrics>,
}

impl<R: UserRepository> IssueTokenUseCase<R> {
    pub async fn execute(
        &self,
        input: IssueTokenInput,
        now: DateTime<Utc>,
    ) -> Result<VerificationToken, VerificationServiceError> {
        let user = self
            .users
            .find_by_email(input.email.trim())
            .await?
            .ok_or(VerificationServiceError::UserNotFound)?;

        let token = VerificationToken::generate();
        let intent = NewOutboxIntent::new(user.email.clone(), token, now);

        self.users
            .reissue_with_outbox(user.id, token, now, &intent)
            .await?;
        self.metrics.intent_enqueued();
        info!(user_id = %user.id, "verification token issued, email queued");
        Ok(token)
    }
}
