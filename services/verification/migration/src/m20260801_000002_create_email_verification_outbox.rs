use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EmailVerificationOutbox::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmailVerificationOutbox::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EmailVerificationOutbox::Recipient)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailVerificationOutbox::Token)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailVerificationOutbox::Status)
                            .string_len(16)
                            .not_null()
                            .default("PENDING"),
                    )
                    .col(
                        ColumnDef::new(EmailVerificationOutbox::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(EmailVerificationOutbox::LastError).string())
                    .col(
                        ColumnDef::new(EmailVerificationOutbox::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailVerificationOutbox::NextAttemptAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailVerificationOutbox::SentAt)
                            .timestamp_with_time_zone(),
                    )
                    .col(
                        ColumnDef::new(EmailVerificationOutbox::FailedAt)
                            .timestamp_with_time_zone(),
                    )
                    .to_owned(),
            )
            .await?;

        // Worker poll: pending rows that are due, oldest first.
        manager
            .create_index(
                Index::create()
                    .table(EmailVerificationOutbox::Table)
                    .col(EmailVerificationOutbox::Status)
                    .col(EmailVerificationOutbox::NextAttemptAt)
                    .name("idx_email_verification_outbox_status_next_attempt_at")
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(EmailVerificationOutbox::Table)
                    .col(EmailVerificationOutbox::Recipient)
                    .name("idx_email_verification_outbox_recipient")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(EmailVerificationOutbox::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(Iden)]
enum EmailVerificationOutbox {
    Table,
    Id,
    Recipient,
    Token,
    Status,
    RetryCount,
    LastError,
    CreatedAt,
    NextAttemptAt,
    SentAt,
    FailedAt,
}
