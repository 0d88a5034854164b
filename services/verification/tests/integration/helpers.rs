use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use verimail_domain::{OutboxIntentId, UserId, VerificationToken};
use verimail_verification::config::OutboxConfig;
use verimail_verification::domain::clock::Clock;
use verimail_verification::domain::metrics::{PipelineMetrics, VerifyOutcome};
use verimail_verification::domain::repository::{
    OutboxStore, UserRepository, VerificationPublisher,
};
use verimail_verification::domain::types::{
    NewOutboxIntent, OutboxIntent, OutboxStatus, OutstandingToken, RetryPolicy,
    VerificationMessage, VerificationUser,
};
use verimail_verification::error::{PublishError, VerificationServiceError};
use verimail_verification::usecase::outbox::OutboxProcessor;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap()
}

// ── MockOutboxStore ──────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockOutboxStore {
    pub intents: Arc<Mutex<Vec<OutboxIntent>>>,
    next_id: Arc<AtomicI64>,
    /// Claims on these ids fail as if another worker got there first.
    pub contended: Arc<Mutex<HashSet<OutboxIntentId>>>,
    /// Updates to these ids fail with an internal error.
    pub failing_updates: Arc<Mutex<HashSet<OutboxIntentId>>>,
}

impl MockOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a shared handle to the internal intent list for post-execution inspection.
    pub fn intents_handle(&self) -> Arc<Mutex<Vec<OutboxIntent>>> {
        Arc::clone(&self.intents)
    }

    pub fn append(&self, intent: &NewOutboxIntent) -> OutboxIntentId {
        let id = OutboxIntentId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.intents.lock().unwrap().push(OutboxIntent {
            id,
            recipient: intent.recipient.clone(),
            token: intent.token,
            status: OutboxStatus::Pending,
            retry_count: 0,
            last_error: None,
            created_at: intent.created_at,
            next_attempt_at: intent.created_at,
            sent_at: None,
            failed_at: None,
        });
        id
    }

    /// Append a pending intent for `recipient` created at `at`.
    pub fn seed(&self, recipient: &str, at: DateTime<Utc>) -> OutboxIntentId {
        self.append(&NewOutboxIntent::new(
            recipient,
            VerificationToken::generate(),
            at,
        ))
    }

    pub fn get(&self, id: OutboxIntentId) -> OutboxIntent {
        self.intents
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .expect("intent exists")
    }

    pub fn set(&self, intent: OutboxIntent) {
        let mut intents = self.intents.lock().unwrap();
        let slot = intents
            .iter_mut()
            .find(|i| i.id == intent.id)
            .expect("intent exists");
        *slot = intent;
    }

    pub fn contend(&self, id: OutboxIntentId) {
        self.contended.lock().unwrap().insert(id);
    }

    pub fn fail_updates_for(&self, id: OutboxIntentId) {
        self.failing_updates.lock().unwrap().insert(id);
    }
}

impl OutboxStore for MockOutboxStore {
    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<OutboxIntent>, VerificationServiceError> {
        let mut due: Vec<OutboxIntent> = self
            .intents
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.status == OutboxStatus::Pending && i.next_attempt_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|i| (i.created_at, i.id));
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn claim(
        &self,
        id: OutboxIntentId,
        observed: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, VerificationServiceError> {
        if self.contended.lock().unwrap().contains(&id) {
            return Ok(false);
        }
        let mut intents = self.intents.lock().unwrap();
        match intents.iter_mut().find(|i| i.id == id) {
            Some(i) if i.status == OutboxStatus::Pending && i.next_attempt_at == observed => {
                i.next_attempt_at = lease_until;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_claimed(
        &self,
        intent: &OutboxIntent,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, VerificationServiceError> {
        if self.failing_updates.lock().unwrap().contains(&intent.id) {
            return Err(anyhow::anyhow!("connection reset").into());
        }
        let mut intents = self.intents.lock().unwrap();
        match intents.iter_mut().find(|i| i.id == intent.id) {
            Some(slot)
                if slot.status == OutboxStatus::Pending && slot.next_attempt_at == lease_until =>
            {
                *slot = intent.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_by_status(
        &self,
        status: OutboxStatus,
        limit: u64,
    ) -> Result<Vec<OutboxIntent>, VerificationServiceError> {
        let mut matching: Vec<OutboxIntent> = self
            .intents
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|i| std::cmp::Reverse((i.created_at, i.id)));
        matching.truncate(limit as usize);
        Ok(matching)
    }
}

// ── MockUserRepo ─────────────────────────────────────────────────────────────

/// Users plus the outbox they append to. Clones share state.
#[derive(Clone, Default)]
pub struct MockUserRepo {
    pub users: Arc<Mutex<Vec<VerificationUser>>>,
    pub outbox: MockOutboxStore,
}

impl MockUserRepo {
    pub fn new(outbox: MockOutboxStore) -> Self {
        Self {
            users: Arc::default(),
            outbox,
        }
    }

    pub fn user(&self, email: &str) -> VerificationUser {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned()
            .expect("user exists")
    }

    pub fn insert(&self, user: VerificationUser) {
        self.users.lock().unwrap().push(user);
    }
}

impl UserRepository for MockUserRepo {
    async fn find_by_email(
        &self,
        email: &str,
    ) -> Result<Option<VerificationUser>, VerificationServiceError> {
        let found = self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned();
        // Let concurrent callers interleave between read and write.
        tokio::task::yield_now().await;
        Ok(found)
    }

    async fn create_with_outbox(
        &self,
        user: &VerificationUser,
        intent: &NewOutboxIntent,
    ) -> Result<(), VerificationServiceError> {
        {
            let mut users = self.users.lock().unwrap();
            if users.iter().any(|u| u.email == user.email) {
                return Err(VerificationServiceError::DuplicateEmail);
            }
            users.push(user.clone());
        }
        self.outbox.append(intent);
        Ok(())
    }

    async fn reissue_with_outbox(
        &self,
        user_id: UserId,
        token: VerificationToken,
        issued_at: DateTime<Utc>,
        intent: &NewOutboxIntent,
    ) -> Result<(), VerificationServiceError> {
        {
            let mut users = self.users.lock().unwrap();
            let user = users
                .iter_mut()
                .find(|u| u.id == user_id)
                .ok_or(VerificationServiceError::UserNotFound)?;
            user.email_verified = false;
            user.outstanding = Some(OutstandingToken { token, issued_at });
        }
        self.outbox.append(intent);
        Ok(())
    }

    async fn consume_token(
        &self,
        user_id: UserId,
        token: VerificationToken,
    ) -> Result<bool, VerificationServiceError> {
        let mut users = self.users.lock().unwrap();
        match users.iter_mut().find(|u| u.id == user_id) {
            Some(user) if user.outstanding.map(|o| o.token) == Some(token) => {
                user.email_verified = true;
                user.outstanding = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ── MockPublisher ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum PublishMode {
    Succeed,
    Fail,
    /// Fail only the listed calls (1-based).
    FailOnCalls(Vec<usize>),
    /// Never complete.
    Hang,
}

#[derive(Clone)]
pub struct MockPublisher {
    pub mode: PublishMode,
    pub calls: Arc<AtomicUsize>,
    pub sent: Arc<Mutex<Vec<VerificationMessage>>>,
}

impl MockPublisher {
    pub fn new(mode: PublishMode) -> Self {
        Self {
            mode,
            calls: Arc::default(),
            sent: Arc::default(),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(PublishMode::Succeed)
    }

    pub fn failing() -> Self {
        Self::new(PublishMode::Fail)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns a shared handle to the accepted messages for post-execution inspection.
    pub fn sent_handle(&self) -> Arc<Mutex<Vec<VerificationMessage>>> {
        Arc::clone(&self.sent)
    }
}

impl VerificationPublisher for MockPublisher {
    async fn send(&self, message: &VerificationMessage) -> Result<(), PublishError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let fail = match &self.mode {
            PublishMode::Succeed => false,
            PublishMode::Fail => true,
            PublishMode::FailOnCalls(calls) => calls.contains(&call),
            PublishMode::Hang => {
                std::future::pending::<()>().await;
                false
            }
        };
        if fail {
            return Err(PublishError::Rejected {
                status: 503,
                body: "mailer unavailable".to_owned(),
            });
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// ── CountingMetrics ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct CountingMetrics {
    pub enqueued: AtomicU32,
    pub succeeded: AtomicU32,
    pub failed: AtomicU32,
    pub given_up: AtomicU32,
    pub outcomes: Mutex<Vec<VerifyOutcome>>,
}

impl CountingMetrics {
    pub fn get(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

impl PipelineMetrics for CountingMetrics {
    fn intent_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::SeqCst);
    }

    fn delivery_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
    }

    fn delivery_failed(&self, _retry_count: u32) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn intent_given_up(&self) {
        self.given_up.fetch_add(1, Ordering::SeqCst);
    }

    fn verification(&self, outcome: VerifyOutcome) {
        self.outcomes.lock().unwrap().push(outcome);
    }
}

// ── ManualClock ──────────────────────────────────────────────────────────────

/// Clock that only moves when told to. Clones share the same time.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ── Processor builder ────────────────────────────────────────────────────────

pub fn outbox_config() -> OutboxConfig {
    OutboxConfig {
        poll_interval: Duration::from_secs(5),
        batch_size: 20,
        publish_timeout: Duration::from_secs(10),
        claim_lease: Duration::from_secs(60),
        retry: RetryPolicy::default(),
    }
}

/// Processor whose clock stands at `t0()`.
pub fn processor(
    store: MockOutboxStore,
    publisher: MockPublisher,
    metrics: Arc<CountingMetrics>,
) -> OutboxProcessor<MockOutboxStore, MockPublisher> {
    OutboxProcessor {
        store,
        publisher,
        config: outbox_config(),
        metrics,
        clock: Arc::new(ManualClock::at(t0())),
    }
}
