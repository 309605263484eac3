//! Pending pos/balance adjustments, written in the same database transaction
//! as the ledger row that caused them.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum AdjustmentOutbox {
    Table,
    Id,
    TransactionId,
    Target,
    PosId,
    UserId,
    PaymentType,
    Amount,
    IdempotencyKey,
    Status,
    Attempts,
    LastError,
    CreatedAt,
    UpdatedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AdjustmentOutbox::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AdjustmentOutbox::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AdjustmentOutbox::TransactionId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AdjustmentOutbox::Target).string().not_null())
                    .col(ColumnDef::new(AdjustmentOutbox::PosId).big_integer())
                    .col(ColumnDef::new(AdjustmentOutbox::UserId).big_integer())
                    .col(ColumnDef::new(AdjustmentOutbox::PaymentType).integer())
                    .col(
                        ColumnDef::new(AdjustmentOutbox::Amount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AdjustmentOutbox::IdempotencyKey)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AdjustmentOutbox::Status).string().not_null())
                    .col(
                        ColumnDef::new(AdjustmentOutbox::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(AdjustmentOutbox::LastError).string())
                    .col(
                        ColumnDef::new(AdjustmentOutbox::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AdjustmentOutbox::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uidx-adjustment_outbox-idempotency_key")
                    .table(AdjustmentOutbox::Table)
                    .col(AdjustmentOutbox::IdempotencyKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-adjustment_outbox-status")
                    .table(AdjustmentOutbox::Table)
                    .col(AdjustmentOutbox::Status)
                    .col(AdjustmentOutbox::Id)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-adjustment_outbox-transaction_id")
                    .table(AdjustmentOutbox::Table)
                    .col(AdjustmentOutbox::TransactionId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("uidx-adjustment_outbox-idempotency_key")
                    .table(AdjustmentOutbox::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(AdjustmentOutbox::Table).to_owned())
            .await?;
        Ok(())
    }
}
