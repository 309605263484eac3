//! Last known attributes of each pos, refreshed from the pos service.
//!
//! List and detail join against this table instead of calling the pos
//! service on the read path, so the values are current rather than
//! point-in-time.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue, ConnectionTrait,
    entity::prelude::*,
    sea_query::{Expr, OnConflict},
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosSnapshot {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub pos_type: i32,
    pub total: i64,
    pub color: String,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "pos_cache")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub pos_type: i32,
    pub total: i64,
    pub color: String,
    pub refreshed_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transactions::Entity")]
    Transactions,
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for PosSnapshot {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            name: model.name,
            pos_type: model.pos_type,
            total: model.total,
            color: model.color,
        }
    }
}

pub(crate) async fn upsert<C: ConnectionTrait>(
    db: &C,
    pos: &PosSnapshot,
    now: DateTime<Utc>,
) -> Result<(), DbErr> {
    let model = ActiveModel {
        id: ActiveValue::Set(pos.id),
        user_id: ActiveValue::Set(pos.user_id),
        name: ActiveValue::Set(pos.name.clone()),
        pos_type: ActiveValue::Set(pos.pos_type),
        total: ActiveValue::Set(pos.total),
        color: ActiveValue::Set(pos.color.clone()),
        refreshed_at: ActiveValue::Set(now),
    };
    Entity::insert(model)
        .on_conflict(
            OnConflict::column(Column::Id)
                .update_columns([
                    Column::UserId,
                    Column::Name,
                    Column::PosType,
                    Column::Total,
                    Column::Color,
                    Column::RefreshedAt,
                ])
                .to_owned(),
        )
        .exec(db)
        .await?;
    Ok(())
}

/// Records the total reported by the pos service after an adjustment.
///
/// A pos that was never cached is left alone.
pub(crate) async fn set_total<C: ConnectionTrait>(
    db: &C,
    pos_id: i64,
    total: i64,
    now: DateTime<Utc>,
) -> Result<(), DbErr> {
    Entity::update_many()
        .col_expr(Column::Total, Expr::value(total))
        .col_expr(Column::RefreshedAt, Expr::value(now))
        .filter(Column::Id.eq(pos_id))
        .exec(db)
        .await?;
    Ok(())
}
