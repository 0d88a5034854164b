use std::time::Duration;

use anyhow::ensure;

use verimail_core::config::{optional, or_default, process_env, required};

use crate::domain::types::{
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_TOKEN_TTL_SECS, RetryPolicy,
};

/// Verification service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct VerificationConfig {
    /// PostgreSQL connection URL. Env var: `DATABASE_URL`.
    pub database_url: String,
    /// Endpoint receiving verification messages. Env var: `PUBLISHER_URL`.
    pub publisher_url: String,
    /// Bearer token for the publisher endpoint. Env var: `PUBLISHER_AUTH_TOKEN`.
    pub publisher_auth_token: Option<String>,
    /// TCP port to listen on (default 3114). Env var: `VERIFICATION_PORT`.
    pub port: u16,
    /// How long an issued token stays valid (default 60s). Env var: `VERIFICATION_TOKEN_TTL_SECS`.
    pub token_ttl: chrono::Duration,
    pub outbox: OutboxConfig,
}

/// Outbox processor tuning.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Sweep period (default 5s). Env var: `OUTBOX_POLL_INTERVAL_MS`.
    pub poll_interval: Duration,
    /// Intents selected per sweep (default 20). Env var: `OUTBOX_BATCH_SIZE`.
    pub batch_size: u64,
    /// Upper bound on one publish call (default 10s). Env var: `OUTBOX_PUBLISH_TIMEOUT_MS`.
    pub publish_timeout: Duration,
    /// How long a claimed intent is hidden from other workers (default 60s).
    /// Env var: `OUTBOX_CLAIM_LEASE_MS`.
    pub claim_lease: Duration,
    /// Env vars: `OUTBOX_MAX_RETRIES` (10), `OUTBOX_BACKOFF_BASE_MS` (0),
    /// `OUTBOX_BACKOFF_MAX_MS` (300000).
    pub retry: RetryPolicy,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: DEFAULT_BATCH_SIZE,
            publish_timeout: Duration::from_secs(10),
            claim_lease: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

impl VerificationConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup<F>(env: &F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let poll_ms = or_default(env, "OUTBOX_POLL_INTERVAL_MS", 5_000u64)?;
        let timeout_ms = or_default(env, "OUTBOX_PUBLISH_TIMEOUT_MS", 10_000u64)?;
        let lease_ms = or_default(env, "OUTBOX_CLAIM_LEASE_MS", 60_000u64)?;
        let backoff_base_ms = or_default(env, "OUTBOX_BACKOFF_BASE_MS", 0i64)?;
        let backoff_max_ms = or_default(env, "OUTBOX_BACKOFF_MAX_MS", 300_000i64)?;
        let ttl_secs = or_default(env, "VERIFICATION_TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS)?;

        let outbox = OutboxConfig {
            poll_interval: Duration::from_millis(poll_ms),
            batch_size: or_default(env, "OUTBOX_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            publish_timeout: Duration::from_millis(timeout_ms),
            claim_lease: Duration::from_millis(lease_ms),
            retry: RetryPolicy {
                max_retries: or_default(env, "OUTBOX_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
                backoff_base: chrono::Duration::milliseconds(backoff_base_ms),
                backoff_max: chrono::Duration::milliseconds(backoff_max_ms),
            },
        };

        ensure!(poll_ms > 0, "OUTBOX_POLL_INTERVAL_MS must be positive");
        ensure!(outbox.batch_size > 0, "OUTBOX_BATCH_SIZE must be positive");
        ensure!(outbox.retry.max_retries > 0, "OUTBOX_MAX_RETRIES must be positive");
        ensure!(backoff_base_ms >= 0, "OUTBOX_BACKOFF_BASE_MS must not be negative");
        ensure!(
            backoff_max_ms >= backoff_base_ms,
            "OUTBOX_BACKOFF_MAX_MS must be at least OUTBOX_BACKOFF_BASE_MS"
        );
        ensure!(
            outbox.claim_lease > outbox.publish_timeout,
            "OUTBOX_CLAIM_LEASE_MS must exceed OUTBOX_PUBLISH_TIMEOUT_MS"
        );
        ensure!(ttl_secs > 0, "VERIFICATION_TOKEN_TTL_SECS must be positive");

        Ok(Self {
            database_url: required(env, "DATABASE_URL")?,
            publisher_url: required(env, "PUBLISHER_URL")?,
            publisher_auth_token: optional(env, "PUBLISHER_AUTH_TOKEN"),
            port: or_default(env, "VERIFICATION_PORT", 3114u16)?,
            token_ttl: chrono::Duration::seconds(ttl_secs),
            outbox,
        })
    }
}
