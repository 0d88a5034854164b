use anyhow::{Context as _, anyhow};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect, SqlErr, TransactionError,
    TransactionTrait, sea_query::Expr,
};
use uuid::Uuid;

use verimail_domain::{OutboxIntentId, UserId, VerificationToken};
use verimail_verification_schema::{email_verification_outbox, users};

use crate::domain::repository::{OutboxStore, UserRepository};
use crate::domain::types::{
    NewOutboxIntent, OutboxIntent, OutboxStatus, OutstandingToken, VerificationUser,
};
use crate::error::VerificationServiceError;

// ── User repository ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbUserRepository {
    pub db: DatabaseConnection,
}

impl UserRepository for DbUserRepository {
    async fn find_by_email(
        &self,
        email: &str,
    ) -> Result<Option<VerificationUser>, VerificationServiceError> {
        let model = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.db)
            .await
            .context("find user by email")?;
        Ok(model.map(user_from_model))
    }

    async fn create_with_outbox(
        &self,
        user: &VerificationUser,
        intent: &NewOutboxIntent,
    ) -> Result<(), VerificationServiceError> {
        self.db
            .transaction::<_, (), DbErr>(|txn| {
                let user = user.clone();
                let intent = intent.clone();
                Box::pin(async move {
                    insert_user(txn, &user).await?;
                    insert_intent(txn, &intent).await?;
                    Ok(())
                })
            })
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    VerificationServiceError::DuplicateEmail
                } else {
                    anyhow::Error::new(e)
                        .context("create user with outbox")
                        .into()
                }
            })
    }

    async fn reissue_with_outbox(
        &self,
        user_id: UserId,
        token: VerificationToken,
        issued_at: DateTime<Utc>,
        intent: &NewOutboxIntent,
    ) -> Result<(), VerificationServiceError> {
        self.db
            .transaction::<_, (), DbErr>(move |txn| {
                let intent = intent.clone();
                Box::pin(async move {
                    users::ActiveModel {
                        id: Set(user_id.0),
                        email_verified: Set(false),
                        verification_token: Set(Some(token.as_uuid())),
                        token_issued_at: Set(Some(issued_at)),
                        updated_at: Set(issued_at),
                        ..Default::default()
                    }
                    .update(txn)
                    .await?;
                    insert_intent(txn, &intent).await?;
                    Ok(())
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Transaction(DbErr::RecordNotUpdated) => {
                    VerificationServiceError::UserNotFound
                }
                other => anyhow::Error::new(other)
                    .context("reissue token with outbox")
                    .into(),
            })
    }

    async fn consume_token(
        &self,
        user_id: UserId,
        token: VerificationToken,
    ) -> Result<bool, VerificationServiceError> {
        let result = users::Entity::update_many()
            .col_expr(users::Column::EmailVerified, Expr::value(true))
            .col_expr(
                users::Column::VerificationToken,
                Expr::value(Option::<Uuid>::None),
            )
            .col_expr(
                users::Column::TokenIssuedAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(users::Column::Id.eq(user_id.0))
            .filter(users::Column::VerificationToken.eq(token.as_uuid()))
            .exec(&self.db)
            .await
            .context("consume verification token")?;
        Ok(result.rows_affected == 1)
    }
}

async fn insert_user(txn: &DatabaseTransaction, user: &VerificationUser) -> Result<(), DbErr> {
    let now = Utc::now();
    users::ActiveModel {
        id: Set(user.id.0),
        email: Set(user.email.clone()),
        email_verified: Set(user.email_verified),
        verification_token: Set(user.outstanding.map(|o| o.token.as_uuid())),
        token_issued_at: Set(user.outstanding.map(|o| o.issued_at)),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(txn)
    .await?;
    Ok(())
}

async fn insert_intent(txn: &DatabaseTransaction, intent: &NewOutboxIntent) -> Result<(), DbErr> {
    email_verification_outbox::ActiveModel {
        recipient: Set(intent.recipient.clone()),
        token: Set(intent.token.as_uuid()),
        status: Set(OutboxStatus::Pending.as_str().to_owned()),
        retry_count: Set(0),
        last_error: Set(None),
        created_at: Set(intent.created_at),
        next_attempt_at: Set(intent.created_at),
        sent_at: Set(None),
        failed_at: Set(None),
        ..Default::default()
    }
    .insert(txn)
    .await?;
    Ok(())
}

fn is_unique_violation(err: &TransactionError<DbErr>) -> bool {
    let db_err = match err {
        TransactionError::Connection(e) | TransactionError::Transaction(e) => e,
    };
    matches!(db_err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

fn user_from_model(model: users::Model) -> VerificationUser {
    let outstanding = match (model.verification_token, model.token_issued_at) {
        (Some(token), Some(issued_at)) => Some(OutstandingToken {
            token: token.into(),
            issued_at,
        }),
        _ => None,
    };
    VerificationUser {
        id: UserId(model.id),
        email: model.email,
        email_verified: model.email_verified,
        outstanding,
    }
}

// ── Outbox store ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbOutboxStore {
    pub db: DatabaseConnection,
}

impl OutboxStore for DbOutboxStore {
    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<OutboxIntent>, VerificationServiceError> {
        let models = email_verification_outbox::Entity::find()
            .filter(email_verification_outbox::Column::Status.eq(OutboxStatus::Pending.as_str()))
            .filter(email_verification_outbox::Column::NextAttemptAt.lte(now))
            .order_by_asc(email_verification_outbox::Column::CreatedAt)
            .order_by_asc(email_verification_outbox::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await
            .context("find due outbox intents")?;
        Ok(models
            .into_iter()
            .map(intent_from_model)
            .collect::<anyhow::Result<_>>()?)
    }

    async fn claim(
        &self,
        id: OutboxIntentId,
        observed: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, VerificationServiceError> {
        let result = email_verification_outbox::Entity::update_many()
            .col_expr(
                email_verification_outbox::Column::NextAttemptAt,
                Expr::value(lease_until),
            )
            .filter(email_verification_outbox::Column::Id.eq(id.0))
            .filter(email_verification_outbox::Column::Status.eq(OutboxStatus::Pending.as_str()))
            .filter(email_verification_outbox::Column::NextAttemptAt.eq(observed))
            .exec(&self.db)
            .await
            .context("claim outbox intent")?;
        Ok(result.rows_affected == 1)
    }

    async fn update_claimed(
        &self,
        intent: &OutboxIntent,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, VerificationServiceError> {
        use email_verification_outbox::Column;

        let result = email_verification_outbox::Entity::update_many()
            .col_expr(Column::Status, Expr::value(intent.status.as_str()))
            .col_expr(
                Column::RetryCount,
                Expr::value(i32::try_from(intent.retry_count).unwrap_or(i32::MAX)),
            )
            .col_expr(Column::LastError, Expr::value(intent.last_error.clone()))
            .col_expr(Column::NextAttemptAt, Expr::value(intent.next_attempt_at))
            .col_expr(Column::SentAt, Expr::value(intent.sent_at))
            .col_expr(Column::FailedAt, Expr::value(intent.failed_at))
            .filter(Column::Id.eq(intent.id.0))
            .filter(Column::Status.eq(OutboxStatus::Pending.as_str()))
            .filter(Column::NextAttemptAt.eq(lease_until))
            .exec(&self.db)
            .await
            .context("record outbox attempt")?;
        Ok(result.rows_affected == 1)
    }

    async fn list_by_status(
        &self,
        status: OutboxStatus,
        limit: u64,
    ) -> Result<Vec<OutboxIntent>, VerificationServiceError> {
        let models = email_verification_outbox::Entity::find()
            .filter(email_verification_outbox::Column::Status.eq(status.as_str()))
            .order_by_desc(email_verification_outbox::Column::CreatedAt)
            .order_by_desc(email_verification_outbox::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await
            .context("list outbox intents by status")?;
        Ok(models
            .into_iter()
            .map(intent_from_model)
            .collect::<anyhow::Result<_>>()?)
    }
}

fn intent_from_model(model: email_verification_outbox::Model) -> anyhow::Result<OutboxIntent> {
    let status = model
        .status
        .parse::<OutboxStatus>()
        .with_context(|| format!("outbox intent {}", model.id))?;
    let retry_count = u32::try_from(model.retry_count)
        .map_err(|_| anyhow!("outbox intent {} has negative retry_count", model.id))?;
    Ok(OutboxIntent {
        id: OutboxIntentId(model.id),
        recipient: model.recipient,
        token: model.token.into(),
        status,
        retry_count,
        last_error: model.last_error,
        created_at: model.created_at,
        next_attempt_at: model.next_attempt_at,
        sent_at: model.sent_at,
        failed_at: model.failed_at,
    })
}
