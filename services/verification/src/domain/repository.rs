#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};

use verimail_domain::{OutboxIntentId, UserId, VerificationToken};

use crate::domain::types::{
    NewOutboxIntent, OutboxIntent, OutboxStatus, VerificationMessage, VerificationUser,
};
use crate::error::{PublishError, VerificationServiceError};

/// Store for users' verification state. Every write that issues a token also
/// appends the matching outbox intent in the same transaction.
pub trait UserRepository: Send + Sync {
    async fn find_by_email(
        &self,
        email: &str,
    ) -> Result<Option<VerificationUser>, VerificationServiceError>;

    /// Insert a new user with an outstanding token plus its outbox intent atomically.
    /// A taken email is `DuplicateEmail`.
    async fn create_with_outbox(
        &self,
        user: &VerificationUser,
        intent: &NewOutboxIntent,
    ) -> Result<(), VerificationServiceError>;

    /// Replace the user's outstanding token (resetting `email_verified`) and append
    /// an outbox intent atomically. Existing intents are left as they are.
    async fn reissue_with_outbox(
        &self,
        user_id: UserId,
        token: VerificationToken,
        issued_at: DateTime<Utc>,
        intent: &NewOutboxIntent,
    ) -> Result<(), VerificationServiceError>;

    /// Mark the user verified and clear the token, but only if `token` is still the
    /// outstanding one. Returns `false` when it was already consumed or replaced.
    async fn consume_token(
        &self,
        user_id: UserId,
        token: VerificationToken,
    ) -> Result<bool, VerificationServiceError>;
}

/// Durable outbox of verification deliveries. Only the outbox processor mutates rows.
pub trait OutboxStore: Send + Sync {
    /// Pending intents with `next_attempt_at <= now`, oldest `created_at` first.
    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<OutboxIntent>, VerificationServiceError>;

    /// Take a lease on a pending intent by moving `next_attempt_at` from `observed`
    /// to `lease_until`. Returns `false` if the row changed since it was read.
    async fn claim(
        &self,
        id: OutboxIntentId,
        observed: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, VerificationServiceError>;

    /// Persist the outcome of one attempt, but only while the row is still pending
    /// under the lease `lease_until` taken by `claim`. Committed on its own.
    /// Returns `false` if the lease lapsed and another worker took the row.
    async fn update_claimed(
        &self,
        intent: &OutboxIntent,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, VerificationServiceError>;

    /// Most recent intents in `status`, newest first.
    async fn list_by_status(
        &self,
        status: OutboxStatus,
        limit: u64,
    ) -> Result<Vec<OutboxIntent>, VerificationServiceError>;
}

/// External channel that delivers the verification email.
pub trait VerificationPublisher: Send + Sync {
    async fn send(&self, message: &VerificationMessage) -> Result<(), PublishError>;
}
