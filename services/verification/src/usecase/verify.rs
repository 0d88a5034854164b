use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use verimail_domain::VerificationToken;

use crate::domain::metrics::{PipelineMetrics, VerifyOutcome};
use crate::domain::repository::UserRepository;
use crate::error::VerificationServiceError;

pub struct VerifyEmailInput {
    pub email: String,
    pub token: String,
}

/// Consumes a presented verification token.
pub struct VerifyEmailUseCase<R: UserRepository> {
    pub users: R,
    pub token_ttl: Duration,
    pub metrics: Arc<dyn PipelineMetrics>,
}

impl<R: UserRepository> VerifyEmailUseCase<R> {
    pub async fn execute(
        &self,
        input: VerifyEmailInput,
        now: DateTime<Utc>,
    ) -> Result<(), VerificationServiceError> {
        let result = self.verify(input, now).await;
        if let Some(outcome) = outcome_of(&result) {
            self.metrics.verification(outcome);
        }
        result
    }

    async fn verify(
        &self,
        input: VerifyEmailInput,
        now: DateTime<Utc>,
    ) -> Result<(), VerificationServiceError> {
        let presented: VerificationToken = input
            .token
            .parse()
            .map_err(|_| VerificationServiceError::MalformedToken)?;

        let user = self
            .users
            .find_by_email(input.email.trim())
            .await?
            .ok_or(VerificationServiceError::UserNotFound)?;

        // "No token outstanding" and "wrong token" are reported identically.
        let outstanding = user
            .outstanding
            .filter(|o| o.token == presented)
            .ok_or(VerificationServiceError::TokenMismatch)?;

        if outstanding.is_expired_at(now, self.token_ttl) {
            debug!(
                user_id = %user.id,
                issued_at = %outstanding.issued_at,
                "verification token expired"
            );
            return Err(VerificationServiceError::TokenExpired);
        }

        // Conditional on the token still being outstanding: of two concurrent
        // presentations only one gets here with `true`.
        if !self.users.consume_token(user.id, presented).await? {
            return Err(VerificationServiceError::TokenMismatch);
        }

        info!(user_id = %user.id, "email verified");
        Ok(())
    }
}

fn outcome_of(result: &Result<(), VerificationServiceError>) -> Option<VerifyOutcome> {
    match result {
        Ok(()) => Some(VerifyOutcome::Verified),
        Err(VerificationServiceError::MalformedToken) => Some(VerifyOutcome::Malformed),
        Err(VerificationServiceError::UserNotFound) => Some(VerifyOutcome::UserNotFound),
        Err(VerificationServiceError::TokenMismatch) => Some(VerifyOutcome::Mismatch),
        Err(VerificationServiceError::TokenExpired) => Some(VerifyOutcome::Expired),
        Err(_) => None,
    }
}
