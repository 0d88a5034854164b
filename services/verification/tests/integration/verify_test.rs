use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use verimail_domain::{UserId, VerificationToken};
use verimail_verification::domain::metrics::VerifyOutcome;
use verimail_verification::domain::types::{OutstandingToken, VerificationUser};
use verimail_verification::error::VerificationServiceError;
use verimail_verification::usecase::verify::{VerifyEmailInput, VerifyEmailUseCase};

use crate::helpers::{CountingMetrics, MockOutboxStore, MockUserRepo, t0};

fn user_with_token(
    email: &str,
    token: VerificationToken,
    issued_at: DateTime<Utc>,
) -> VerificationUser {
    VerificationUser {
        id: UserId(Uuid::now_v7()),
        email: email.to_owned(),
        email_verified: false,
        outstanding: Some(OutstandingToken { token, issued_at }),
    }
}

fn setup(
    user: VerificationUser,
) -> (
    MockUserRepo,
    Arc<CountingMetrics>,
    VerifyEmailUseCase<MockUserRepo>,
) {
    let repo = MockUserRepo::new(MockOutboxStore::new());
    repo.insert(user);
    let metrics = Arc::new(CountingMetrics::default());
    let usecase = VerifyEmailUseCase {
        users: repo.clone(),
        token_ttl: Duration::seconds(60),
        metrics: metrics.clone(),
    };
    (repo, metrics, usecase)
}

fn input(email: &str, token: impl ToString) -> VerifyEmailInput {
    VerifyEmailInput {
        email: email.to_owned(),
        token: token.to_string(),
    }
}

#[tokio::test]
async fn should_verify_email_with_outstanding_token() {
    let token = VerificationToken::generate();
    let (repo, metrics, usecase) = setup(user_with_token("a@x.com", token, t0()));

    usecase
        .execute(input("a@x.com", token), t0() + Duration::seconds(5))
        .await
        .unwrap();

    let user = repo.user("a@x.com");
    assert!(user.email_verified);
    assert!(user.outstanding.is_none());
    assert_eq!(*metrics.outcomes.lock().unwrap(), vec![VerifyOutcome::Verified]);
}

#[tokio::test]
async fn should_reject_second_use_of_same_token() {
    let token = VerificationToken::generate();
    let (repo, _metrics, usecase) = setup(user_with_token("a@x.com", token, t0()));

    usecase.execute(input("a@x.com", token), t0()).await.unwrap();
    let result = usecase.execute(input("a@x.com", token), t0()).await;

    assert!(
        matches!(result, Err(VerificationServiceError::TokenMismatch)),
        "expected TokenMismatch, got {result:?}"
    );
    assert!(repo.user("a@x.com").email_verified);
}

#[tokio::test]
async fn should_reject_wrong_token() {
    let token = VerificationToken::generate();
    let (repo, _metrics, usecase) = setup(user_with_token("a@x.com", token, t0()));

    let result = usecase
        .execute(input("a@x.com", VerificationToken::generate()), t0())
        .await;

    assert!(
        matches!(result, Err(VerificationServiceError::TokenMismatch)),
        "expected TokenMismatch, got {result:?}"
    );
    let user = repo.user("a@x.com");
    assert!(!user.email_verified);
    assert!(user.outstanding.is_some());
}

#[tokio::test]
async fn should_report_missing_token_as_mismatch() {
    let (_repo, _metrics, usecase) = setup(VerificationUser {
        id: UserId(Uuid::now_v7()),
        email: "a@x.com".to_owned(),
        email_verified: false,
        outstanding: None,
    });

    let result = usecase
        .execute(input("a@x.com", VerificationToken::generate()), t0())
        .await;

    assert!(
        matches!(result, Err(VerificationServiceError::TokenMismatch)),
        "expected TokenMismatch, got {result:?}"
    );
}

#[tokio::test]
async fn should_accept_token_at_exact_expiry_boundary() {
    let token = VerificationToken::generate();
    let (repo, _metrics, usecase) = setup(user_with_token("a@x.com", token, t0()));

    usecase
        .execute(input("a@x.com", token), t0() + Duration::seconds(60))
        .await
        .unwrap();

    assert!(repo.user("a@x.com").email_verified);
}

#[tokio::test]
async fn should_reject_expired_token_and_keep_it_outstanding() {
    let token = VerificationToken::generate();
    let (repo, metrics, usecase) = setup(user_with_token("a@x.com", token, t0()));

    let result = usecase
        .execute(
            input("a@x.com", token),
            t0() + Duration::seconds(60) + Duration::milliseconds(1),
        )
        .await;

    assert!(
        matches!(result, Err(VerificationServiceError::TokenExpired)),
        "expected TokenExpired, got {result:?}"
    );
    let user = repo.user("a@x.com");
    assert!(!user.email_verified);
    assert_eq!(user.outstanding.map(|o| o.token), Some(token));
    assert_eq!(*metrics.outcomes.lock().unwrap(), vec![VerifyOutcome::Expired]);
}

#[tokio::test]
async fn should_reject_malformed_token() {
    let token = VerificationToken::generate();
    let (_repo, metrics, usecase) = setup(user_with_token("a@x.com", token, t0()));

    let result = usecase.execute(input("a@x.com", "not-a-token"), t0()).await;

    assert!(
        matches!(result, Err(VerificationServiceError::MalformedToken)),
        "expected MalformedToken, got {result:?}"
    );
    assert_eq!(*metrics.outcomes.lock().unwrap(), vec![VerifyOutcome::Malformed]);
}

#[tokio::test]
async fn should_reject_unknown_user() {
    let token = VerificationToken::generate();
    let (_repo, _metrics, usecase) = setup(user_with_token("a@x.com", token, t0()));

    let result = usecase.execute(input("b@x.com", token), t0()).await;

    assert!(
        matches!(result, Err(VerificationServiceError::UserNotFound)),
        "expected UserNotFound, got {result:?}"
    );
}

#[tokio::test]
async fn should_let_only_one_concurrent_verification_succeed() {
    let token = VerificationToken::generate();
    let (repo, _metrics, usecase) = setup(user_with_token("a@x.com", token, t0()));

    let (first, second) = tokio::join!(
        usecase.execute(input("a@x.com", token), t0()),
        usecase.execute(input("a@x.com", token), t0()),
    );

    let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "got {first:?} and {second:?}");
    let loser = if first.is_ok() { second } else { first };
    assert!(
        matches!(loser, Err(VerificationServiceError::TokenMismatch)),
        "expected TokenMismatch, got {loser:?}"
    );
    assert!(repo.user("a@x.com").email_verified);
}
