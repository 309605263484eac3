//! Adjustment outbox.
//!
//! Every ledger write stores the pos and balance adjustments it implies in
//! the same database transaction. Entries start `pending`, and a dispatcher
//! moves them to `applied` or, once they cannot succeed, to `failed`.
//! Reconciliation settles failed entries as `reconciled`.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, ConnectionTrait, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::{EngineError, PaymentType, ResultEngine, Transaction};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Applied,
    Failed,
    Reconciled,
}

impl OutboxStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Applied => "applied",
            Self::Failed => "failed",
            Self::Reconciled => "reconciled",
        }
    }
}

impl TryFrom<&str> for OutboxStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "applied" => Ok(Self::Applied),
            "failed" => Ok(Self::Failed),
            "reconciled" => Ok(Self::Reconciled),
            _ => Err(EngineError::Validation("invalid-outbox-status")),
        }
    }
}

/// Aggregate an adjustment is addressed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdjustmentTarget {
    Pos {
        pos_id: i64,
    },
    Balance {
        user_id: i64,
        payment_type: PaymentType,
    },
}

impl AdjustmentTarget {
    pub fn kind(self) -> &'static str {
        match self {
            Self::Pos { .. } => "pos",
            Self::Balance { .. } => "balance",
        }
    }
}

/// Which ledger write produced an adjustment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdjustmentPhase {
    Create,
    Delete,
}

impl AdjustmentPhase {
    fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
        }
    }
}

/// Idempotency key sent with a remote adjustment.
///
/// Store-assigned transaction ids are never reused, so the key is unique per
/// `(transaction, phase, target)`.
pub fn idempotency_key(
    transaction_id: i64,
    phase: AdjustmentPhase,
    target: AdjustmentTarget,
) -> String {
    format!(
        "tx-{transaction_id}-{}-{}",
        phase.as_str(),
        target.kind()
    )
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub id: i64,
    pub transaction_id: i64,
    pub target: AdjustmentTarget,
    pub amount: i64,
    pub idempotency_key: String,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "adjustment_outbox")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub transaction_id: i64,
    pub target: String,
    pub pos_id: Option<i64>,
    pub user_id: Option<i64>,
    pub payment_type: Option<i32>,
    pub amount: i64,
    #[sea_orm(unique)]
    pub idempotency_key: String,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<&Model> for AdjustmentTarget {
    type Error = EngineError;

    fn try_from(model: &Model) -> ResultEngine<Self> {
        match (
            model.target.as_str(),
            model.pos_id,
            model.user_id,
            model.payment_type,
        ) {
            ("pos", Some(pos_id), _, _) => Ok(Self::Pos { pos_id }),
            ("balance", _, Some(user_id), Some(payment_type)) => Ok(Self::Balance {
                user_id,
                payment_type: PaymentType::try_from(payment_type)?,
            }),
            _ => Err(EngineError::Misconfigured("malformed outbox entry")),
        }
    }
}

impl TryFrom<Model> for Adjustment {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        let target = AdjustmentTarget::try_from(&model)?;
        let status = OutboxStatus::try_from(model.status.as_str())?;
        Ok(Self {
            id: model.id,
            transaction_id: model.transaction_id,
            target,
            amount: model.amount,
            idempotency_key: model.idempotency_key,
            status,
            attempts: model.attempts,
            last_error: model.last_error,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

fn pending_model(
    transaction_id: i64,
    phase: AdjustmentPhase,
    target: AdjustmentTarget,
    amount: i64,
    now: DateTime<Utc>,
) -> ActiveModel {
    let (pos_id, user_id, payment_type) = match target {
        AdjustmentTarget::Pos { pos_id } => (Some(pos_id), None, None),
        AdjustmentTarget::Balance {
            user_id,
            payment_type,
        } => (None, Some(user_id), Some(payment_type.as_i32())),
    };
    ActiveModel {
        id: ActiveValue::NotSet,
        transaction_id: ActiveValue::Set(transaction_id),
        target: ActiveValue::Set(target.kind().to_string()),
        pos_id: ActiveValue::Set(pos_id),
        user_id: ActiveValue::Set(user_id),
        payment_type: ActiveValue::Set(payment_type),
        amount: ActiveValue::Set(amount),
        idempotency_key: ActiveValue::Set(idempotency_key(transaction_id, phase, target)),
        status: ActiveValue::Set(OutboxStatus::Pending.as_str().to_string()),
        attempts: ActiveValue::Set(0),
        last_error: ActiveValue::Set(None),
        created_at: ActiveValue::Set(now),
        updated_at: ActiveValue::Set(now),
    }
}

/// Queues the pos and balance adjustments a ledger write implies, pos first.
///
/// Creation contributes the signed amount; deletion contributes its inverse.
pub(crate) async fn enqueue<C: ConnectionTrait>(
    db: &C,
    tx: &Transaction,
    phase: AdjustmentPhase,
    now: DateTime<Utc>,
) -> Result<(), DbErr> {
    let amount = match phase {
        AdjustmentPhase::Create => tx.signed_amount(),
        AdjustmentPhase::Delete => -tx.signed_amount(),
    };
    let targets = [
        AdjustmentTarget::Pos { pos_id: tx.pos_id },
        AdjustmentTarget::Balance {
            user_id: tx.user_id,
            payment_type: tx.payment_type,
        },
    ];
    for target in targets {
        pending_model(tx.id, phase, target, amount, now)
            .insert(db)
            .await?;
    }
    Ok(())
}

/// Condition matching every outbox row addressed to `target`.
pub(crate) fn addressed_to(target: AdjustmentTarget) -> sea_orm::Condition {
    let cond = sea_orm::Condition::all().add(Column::Target.eq(target.kind()));
    match target {
        AdjustmentTarget::Pos { pos_id } => cond.add(Column::PosId.eq(pos_id)),
        AdjustmentTarget::Balance {
            user_id,
            payment_type,
        } => cond
            .add(Column::UserId.eq(user_id))
            .add(Column::PaymentType.eq(payment_type.as_i32())),
    }
}
