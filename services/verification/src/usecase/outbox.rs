use std::sync::Arc;

use anyhow::Context as _;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use tracing::{debug, error, info, warn};

use crate::config::OutboxConfig;
use crate::domain::clock::Clock;
use crate::domain::metrics::PipelineMetrics;
use crate::domain::repository::{OutboxStore, VerificationPublisher};
use crate::domain::types::{
    FailureTransition, OutboxIntent, OutboxStatus, VerificationMessage, truncate_error,
};
use crate::error::{PublishError, VerificationServiceError};

// ── ProcessOutbox ────────────────────────────────────────────────────────────

/// Counts from one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub selected: usize,
    pub sent: usize,
    pub retried: usize,
    pub failed: usize,
    /// Claimed by another worker between selection and claim.
    pub skipped: usize,
    /// Attempted, but the lease lapsed before the outcome was written.
    pub lost: usize,
    /// Intents whose outcome could not be persisted.
    pub errors: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.selected == 0
    }

    fn record(&mut self, outcome: IntentOutcome) {
        match outcome {
            IntentOutcome::Sent => self.sent += 1,
            IntentOutcome::Retried => self.retried += 1,
            IntentOutcome::GaveUp => self.failed += 1,
            IntentOutcome::Skipped => self.skipped += 1,
            IntentOutcome::LeaseLost => self.lost += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntentOutcome {
    Sent,
    Retried,
    GaveUp,
    Skipped,
    LeaseLost,
}

/// Drains due outbox intents through the publisher.
///
/// Each intent is claimed, attempted and persisted on its own: a failed publish
/// or a failed write for one intent never undoes or blocks the others in the
/// batch. A crash mid-sweep leaves unprocessed intents pending, and a claimed but
/// unrecorded intent becomes due again once its lease lapses.
///
/// The lease is taken from `clock` when each intent is claimed, and the outcome
/// is written only while that lease is still held.
pub struct OutboxProcessor<S, P>
where
    S: OutboxStore,
    P: VerificationPublisher,
{
    pub store: S,
    pub publisher: P,
    pub config: OutboxConfig,
    pub metrics: Arc<dyn PipelineMetrics>,
    pub clock: Arc<dyn Clock>,
}

impl<S, P> OutboxProcessor<S, P>
where
    S: OutboxStore,
    P: VerificationPublisher,
{
    /// Run one sweep, selecting intents due at the clock's current time.
    pub async fn sweep(&self) -> Result<SweepReport, VerificationServiceError> {
        self.sweep_at(self.clock.now()).await
    }

    /// Run one sweep over intents due at `now`. Claims and outcomes are still
    /// stamped from the clock. Only a failure to select the batch is returned as
    /// an error; per-intent failures are logged and counted in the report.
    pub async fn sweep_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, VerificationServiceError> {
        let lease =
            Duration::from_std(self.config.claim_lease).context("claim lease out of range")?;
        let due = self.store.find_due(now, self.config.batch_size).await?;

        let mut report = SweepReport {
            selected: due.len(),
            ..SweepReport::default()
        };
        for intent in due {
            let intent_id = intent.id;
            match self.process(intent, lease).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    report.errors += 1;
                    error!(%intent_id, error = %e.detail(), "failed to record outbox attempt");
                }
            }
        }
        Ok(report)
    }

    async fn process(
        &self,
        mut intent: OutboxIntent,
        lease: Duration,
    ) -> Result<IntentOutcome, VerificationServiceError> {
        if intent.status != OutboxStatus::Pending {
            return Ok(IntentOutcome::Skipped);
        }

        // Stored timestamps have microsecond precision.
        let lease_until = (self.clock.now() + lease).trunc_subsecs(6);
        if !self
            .store
            .claim(intent.id, intent.next_attempt_at, lease_until)
            .await?
        {
            debug!(intent_id = %intent.id, "intent claimed by another worker, skipping");
            return Ok(IntentOutcome::Skipped);
        }
        intent.next_attempt_at = lease_until;

        if self.config.retry.is_exhausted(intent.retry_count) {
            intent.give_up(self.clock.now());
            if !self.record(&intent, lease_until).await? {
                return Ok(IntentOutcome::LeaseLost);
            }
            self.report_give_up(&intent);
            return Ok(IntentOutcome::GaveUp);
        }

        let result = self.publish(&intent).await;
        let finished_at = self.clock.now();
        match result {
            Ok(()) => {
                intent.mark_sent(finished_at);
                if !self.record(&intent, lease_until).await? {
                    return Ok(IntentOutcome::LeaseLost);
                }
                self.metrics.delivery_succeeded();
                info!(
                    intent_id = %intent.id,
                    recipient = %intent.recipient,
                    retry_count = intent.retry_count,
                    "verification email sent"
                );
                Ok(IntentOutcome::Sent)
            }
            Err(e) => {
                let summary = truncate_error(&e.to_string());
                let transition = intent.record_failure(&summary, finished_at, &self.config.retry);
                if !self.record(&intent, lease_until).await? {
                    return Ok(IntentOutcome::LeaseLost);
                }
                self.metrics.delivery_failed(intent.retry_count);

                match transition {
                    FailureTransition::Retry { next_attempt_at } => {
                        if intent.retry_count == 1 {
                            warn!(
                                intent_id = %intent.id,
                                recipient = %intent.recipient,
                                error = %summary,
                                %next_attempt_at,
                                "initial failure to send verification email"
                            );
                        } else {
                            debug!(
                                intent_id = %intent.id,
                                retry_count = intent.retry_count,
                                error = %summary,
                                %next_attempt_at,
                                "verification email still failing"
                            );
                        }
                        Ok(IntentOutcome::Retried)
                    }
                    FailureTransition::GaveUp => {
                        self.report_give_up(&intent);
                        Ok(IntentOutcome::GaveUp)
                    }
                    FailureTransition::Ignored => Ok(IntentOutcome::Skipped),
                }
            }
        }
    }

    /// Write the attempt's outcome under the lease taken by the claim.
    async fn record(
        &self,
        intent: &OutboxIntent,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, VerificationServiceError> {
        let recorded = self.store.update_claimed(intent, lease_until).await?;
        if !recorded {
            warn!(
                intent_id = %intent.id,
                %lease_until,
                "claim lease lapsed before the attempt was recorded, discarding outcome"
            );
        }
        Ok(recorded)
    }

    /// One publisher call, bounded by the configured timeout.
    async fn publish(&self, intent: &OutboxIntent) -> Result<(), PublishError> {
        let message = VerificationMessage::for_intent(intent);
        let timeout = self.config.publish_timeout;
        match tokio::time::timeout(timeout, self.publisher.send(&message)).await {
            Ok(result) => result,
            Err(_) => Err(PublishError::Timeout(timeout)),
        }
    }

    fn report_give_up(&self, intent: &OutboxIntent) {
        self.metrics.intent_given_up();
        warn!(
            intent_id = %intent.id,
            recipient = %intent.recipient,
            retry_count = intent.retry_count,
            last_error = intent.last_error.as_deref().unwrap_or(""),
            "giving up on verification email"
        );
    }
}

// ── ListOutbox ───────────────────────────────────────────────────────────────

/// Upper bound for one listing request.
pub const MAX_LIST_LIMIT: u64 = 200;

/// Read-only view of the outbox for operators, typically `status = FAILED`.
pub struct ListOutboxUseCase<S: OutboxStore> {
    pub store: S,
}

impl<S: OutboxStore> ListOutboxUseCase<S> {
    pub async fn execute(
        &self,
        status: OutboxStatus,
        limit: u64,
    ) -> Result<Vec<OutboxIntent>, VerificationServiceError> {
        self.store
            .list_by_status(status, limit.clamp(1, MAX_LIST_LIMIT))
            .await
    }
}
