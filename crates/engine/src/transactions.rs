//! Ledger rows.
//!
//! A `Transaction` is immutable once recorded; the only mutation is deletion.
//! Its signed amount is what the pos and balance aggregates must sum to.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue,
    entity::prelude::*,
    sea_query::{Expr, SimpleExpr},
};
use serde::{Deserialize, Serialize};

use crate::{EngineError, ResultEngine};

/// Sign of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Increase,
    Decrease,
}

impl Action {
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Increase => 0,
            Self::Decrease => 1,
        }
    }

    /// Applies the sign to a stored total.
    pub fn signed(self, total: i64) -> i64 {
        match self {
            Self::Increase => total,
            Self::Decrease => -total,
        }
    }
}

impl TryFrom<i32> for Action {
    type Error = EngineError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Increase),
            1 => Ok(Self::Decrease),
            _ => Err(EngineError::Validation("invalid-action-type")),
        }
    }
}

/// Payment instrument a balance is kept for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Cash,
    Transfer,
}

impl PaymentType {
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Cash => 0,
            Self::Transfer => 1,
        }
    }
}

impl TryFrom<i32> for PaymentType {
    type Error = EngineError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Cash),
            1 => Ok(Self::Transfer),
            _ => Err(EngineError::Validation("invalid-type")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub pos_id: i64,
    pub total: i64,
    pub details: String,
    pub payment_type: PaymentType,
    pub action: Action,
    pub occurred_at: DateTime<Utc>,
}

impl Transaction {
    pub fn signed_amount(&self) -> i64 {
        self.action.signed(self.total)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub pos_id: i64,
    pub total: i64,
    pub details: String,
    pub payment_type: i32,
    pub action: i32,
    pub occurred_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::pos_cache::Entity",
        from = "Column::PosId",
        to = "super::pos_cache::Column::Id"
    )]
    PosCache,
}

impl Related<super::pos_cache::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PosCache.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// `SUM` of the signed amounts of the selected rows, zero when none match.
pub(crate) fn signed_sum() -> SimpleExpr {
    Expr::cust("COALESCE(SUM(CASE WHEN action = 0 THEN total ELSE -total END), 0)")
}

/// Columns of a row still to be inserted; the id is assigned by the store.
pub(crate) struct NewTransaction {
    pub user_id: i64,
    pub pos_id: i64,
    pub total: i64,
    pub details: String,
    pub payment_type: PaymentType,
    pub action: Action,
    pub occurred_at: DateTime<Utc>,
}

impl From<&NewTransaction> for ActiveModel {
    fn from(tx: &NewTransaction) -> Self {
        Self {
            id: ActiveValue::NotSet,
            user_id: ActiveValue::Set(tx.user_id),
            pos_id: ActiveValue::Set(tx.pos_id),
            total: ActiveValue::Set(tx.total),
            details: ActiveValue::Set(tx.details.clone()),
            payment_type: ActiveValue::Set(tx.payment_type.as_i32()),
            action: ActiveValue::Set(tx.action.as_i32()),
            occurred_at: ActiveValue::Set(tx.occurred_at),
        }
    }
}

impl TryFrom<Model> for Transaction {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            pos_id: model.pos_id,
            total: model.total,
            details: model.details,
            payment_type: PaymentType::try_from(model.payment_type)?,
            action: Action::try_from(model.action)?,
            occurred_at: model.occurred_at,
        })
    }
}
