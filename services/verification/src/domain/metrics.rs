//! Explicit metrics seam for the outbox processor and the verifier.
//!
//! Callers receive an `Arc<dyn PipelineMetrics>` instead of relying on ambient
//! instrumentation. [`CounterMetrics`] records through the `metrics` facade;
//! exporting is left to whichever recorder the binary installs.

use metrics::counter;

/// Outcome of one verification attempt, used as a metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    Malformed,
    UserNotFound,
    Mismatch,
    Expired,
}

impl VerifyOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::Malformed => "malformed",
            Self::UserNotFound => "user_not_found",
            Self::Mismatch => "mismatch",
            Self::Expired => "expired",
        }
    }
}

pub trait PipelineMetrics: Send + Sync {
    fn intent_enqueued(&self);
    fn delivery_succeeded(&self);
    fn delivery_failed(&self, retry_count: u32);
    fn intent_given_up(&self);
    fn verification(&self, outcome: VerifyOutcome);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl PipelineMetrics for NoopMetrics {
    fn intent_enqueued(&self) {}
    fn delivery_succeeded(&self) {}
    fn delivery_failed(&self, _retry_count: u32) {}
    fn intent_given_up(&self) {}
    fn verification(&self, _outcome: VerifyOutcome) {}
}

/// Counters through the `metrics` facade. No-ops until a recorder is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterMetrics;

impl PipelineMetrics for CounterMetrics {
    fn intent_enqueued(&self) {
        counter!("verification_outbox_enqueued_total").increment(1);
    }

    fn delivery_succeeded(&self) {
        counter!("verification_outbox_sent_total").increment(1);
    }

    fn delivery_failed(&self, retry_count: u32) {
        let attempt = if retry_count <= 1 { "first" } else { "retry" };
        counter!("verification_outbox_failures_total", "attempt" => attempt).increment(1);
    }

    fn intent_given_up(&self) {
        counter!("verification_outbox_given_up_total").increment(1);
    }

    fn verification(&self, outcome: VerifyOutcome) {
        counter!("verification_attempts_total", "outcome" => outcome.as_str()).increment(1);
    }
}
