use sea_orm::entity::prelude::*;

/// Durable intent to deliver one verification email.
///
/// Keyed by recipient address rather than user id so the row stays auditable
/// after the user's token is reissued. `status` is one of `PENDING`, `SENT`,
/// `FAILED`; rows are never deleted here.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "email_verification_outbox")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub recipient: String,
    pub token: Uuid,
    pub status: String,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Earliest time the processor may pick the row up; also carries the claim lease.
    pub next_attempt_at: chrono::DateTime<chrono::Utc>,
    pub sent_at: Option<chrono::DateTime<chrono::Utc>>,
    pub failed_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
