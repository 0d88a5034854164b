use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::domain::repository::{OutboxStore, VerificationPublisher};
use crate::usecase::outbox::OutboxProcessor;

/// Runs outbox sweeps on a fixed period until shutdown is signalled.
///
/// Sweeps run inline on the loop task, so two sweeps of the same worker never
/// overlap. A sweep that outlasts the period delays the next tick instead of
/// bursting to catch up.
pub struct OutboxWorker<S, P>
where
    S: OutboxStore,
    P: VerificationPublisher,
{
    pub processor: OutboxProcessor<S, P>,
}

impl<S, P> OutboxWorker<S, P>
where
    S: OutboxStore,
    P: VerificationPublisher,
{
    pub fn new(processor: OutboxProcessor<S, P>) -> Self {
        Self { processor }
    }

    /// Sweep until `shutdown` flips to `true` or its sender is dropped. A sweep
    /// already in progress is allowed to finish.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let period: Duration = self.processor.config.poll_interval;
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            poll_interval_ms = period.as_millis() as u64,
            batch_size = self.processor.config.batch_size,
            max_retries = self.processor.config.retry.max_retries,
            "outbox worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            match self.processor.sweep().await {
                Ok(report) if report.is_empty() => {}
                Ok(report) => debug!(
                    selected = report.selected,
                    sent = report.sent,
                    retried = report.retried,
                    failed = report.failed,
                    skipped = report.skipped,
                    lost = report.lost,
                    errors = report.errors,
                    "outbox sweep finished"
                ),
                Err(e) => error!(error = %e.detail(), "outbox sweep failed"),
            }
        }

        info!("outbox worker stopped");
    }
}
