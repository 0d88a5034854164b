use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use verimail_domain::{OutboxIntentId, UserId, VerificationToken};

/// Verification-relevant slice of a user account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationUser {
    pub id: UserId,
    pub email: String,
    pub email_verified: bool,
    /// The credential awaiting presentation, if any. Token and issue time
    /// travel together so one cannot be set without the other.
    pub outstanding: Option<OutstandingToken>,
}

/// A verification token that has been issued but not yet consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutstandingToken {
    pub token: VerificationToken,
    pub issued_at: DateTime<Utc>,
}

impl OutstandingToken {
    /// TTL is anchored at issuance. The token is still valid at exactly `issued_at + ttl`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now > self.issued_at + ttl
    }
}

/// Lifecycle of an outbox intent. `Sent` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown outbox status {0:?}")]
pub struct UnknownOutboxStatus(pub String);

impl FromStr for OutboxStatus {
    type Err = UnknownOutboxStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            _ => Err(UnknownOutboxStatus(s.to_owned())),
        }
    }
}

/// Intent to be appended to the outbox alongside a token issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOutboxIntent {
    pub recipient: String,
    /// Copied at creation; reissuing the user's token does not touch this intent.
    pub token: VerificationToken,
    pub created_at: DateTime<Utc>,
}

impl NewOutboxIntent {
    pub fn new(recipient: impl Into<String>, token: VerificationToken, now: DateTime<Utc>) -> Self {
        Self {
            recipient: recipient.into(),
            token,
            created_at: now,
        }
    }
}

/// Durable record of one verification email to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxIntent {
    pub id: OutboxIntentId,
    pub recipient: String,
    pub token: VerificationToken,
    pub status: OutboxStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

/// Result of applying a failed delivery attempt to an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureTransition {
    /// Still pending; eligible again at `next_attempt_at`.
    Retry { next_attempt_at: DateTime<Utc> },
    /// The attempt used up the last permitted retry.
    GaveUp,
    /// The intent was already terminal; nothing changed.
    Ignored,
}

impl OutboxIntent {
    /// `PENDING -> SENT`. Returns `false` (and changes nothing) on a terminal intent.
    pub fn mark_sent(&mut self, at: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = OutboxStatus::Sent;
        self.sent_at = Some(at);
        true
    }

    /// Count one failed attempt and move to `FAILED` once the policy is exhausted.
    pub fn record_failure(
        &mut self,
        error: &str,
        at: DateTime<Utc>,
        policy: &RetryPolicy,
    ) -> FailureTransition {
        if self.status.is_terminal() {
            return FailureTransition::Ignored;
        }
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(truncate_error(error));
        if policy.is_exhausted(self.retry_count) {
            self.status = OutboxStatus::Failed;
            self.failed_at = Some(at);
            return FailureTransition::GaveUp;
        }
        self.next_attempt_at = at + policy.backoff(self.retry_count);
        FailureTransition::Retry {
            next_attempt_at: self.next_attempt_at,
        }
    }

    /// `PENDING -> FAILED` without another attempt. Returns `false` on a terminal intent.
    pub fn give_up(&mut self, at: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = OutboxStatus::Failed;
        self.failed_at = Some(at);
        true
    }
}

/// Bounded retry with optional exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed attempts after which an intent is given up.
    pub max_retries: u32,
    /// Delay after the first failure; doubled per further failure. Zero means
    /// the intent is due again on the next sweep.
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: Duration::zero(),
            backoff_max: Duration::minutes(5),
        }
    }
}

impl RetryPolicy {
    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_retries
    }

    /// `base * 2^(retry_count - 1)`, capped at `backoff_max`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        if self.backoff_base <= Duration::zero() || retry_count == 0 {
            return Duration::zero();
        }
        let exp = (retry_count - 1).min(30);
        self.backoff_base
            .checked_mul(1i32 << exp)
            .map_or(self.backoff_max, |d| d.min(self.backoff_max))
    }
}

/// Message handed to the publisher. Serialized as the wire payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub email: String,
    pub token: VerificationToken,
}

impl VerificationMessage {
    pub fn for_intent(intent: &OutboxIntent) -> Self {
        Self {
            kind: EMAIL_VERIFICATION_MESSAGE_TYPE.to_owned(),
            email: intent.recipient.clone(),
            token: intent.token,
        }
    }
}

/// Shorten a delivery error to at most [`MAX_ERROR_SUMMARY_CHARS`] characters plus an ellipsis.
pub fn truncate_error(msg: &str) -> String {
    match msg.char_indices().nth(MAX_ERROR_SUMMARY_CHARS) {
        Some((cut, _)) => format!("{}...", &msg[..cut]),
        None => msg.to_owned(),
    }
}

/// `type` field of every verification message.
pub const EMAIL_VERIFICATION_MESSAGE_TYPE: &str = "EMAIL_VERIFICATION";

/// Characters of a delivery error kept in logs and `last_error`.
pub const MAX_ERROR_SUMMARY_CHARS: usize = 120;

/// Failed attempts before an intent is given up.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Intents selected per sweep.
pub const DEFAULT_BATCH_SIZE: u64 = 20;

/// Verification token time-to-live in seconds.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 60;
