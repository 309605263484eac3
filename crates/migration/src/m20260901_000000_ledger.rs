//! Ledger schema.
//!
//! - `transactions`: one row per recorded transaction, owned by this service
//! - `pos_cache`: last known attributes of each pos, read by list/detail joins

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum Transactions {
    Table,
    Id,
    UserId,
    PosId,
    Total,
    Details,
    PaymentType,
    Action,
    OccurredAt,
}

#[derive(Iden)]
enum PosCache {
    Table,
    Id,
    UserId,
    Name,
    PosType,
    Total,
    Color,
    RefreshedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::UserId).big_integer().not_null())
                    .col(ColumnDef::new(Transactions::PosId).big_integer().not_null())
                    .col(ColumnDef::new(Transactions::Total).big_integer().not_null())
                    .col(ColumnDef::new(Transactions::Details).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::PaymentType)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::Action).integer().not_null())
                    .col(
                        ColumnDef::new(Transactions::OccurredAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-user_id-occurred_at")
                    .table(Transactions::Table)
                    .col(Transactions::UserId)
                    .col(Transactions::OccurredAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-pos_id")
                    .table(Transactions::Table)
                    .col(Transactions::PosId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PosCache::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PosCache::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PosCache::UserId).big_integer().not_null())
                    .col(ColumnDef::new(PosCache::Name).string().not_null())
                    .col(ColumnDef::new(PosCache::PosType).integer().not_null())
                    .col(ColumnDef::new(PosCache::Total).big_integer().not_null())
                    .col(ColumnDef::new(PosCache::Color).string().not_null())
                    .col(ColumnDef::new(PosCache::RefreshedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PosCache::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        Ok(())
    }
}
