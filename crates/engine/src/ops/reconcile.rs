use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect,
    TransactionTrait, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    AdjustmentTarget, Collaborator, EngineError, OutboxStatus, PaymentType, ResultEngine, outbox,
    pos_cache, transactions,
};

use super::{super::Engine, require_id, with_tx};

/// Result of recomputing an aggregate from the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Signed sum of the ledger rows addressed to the aggregate.
    pub expected: i64,
    /// Total the collaborator reported before the correction.
    pub observed: i64,
    /// Amount sent to the collaborator; zero when nothing was sent.
    pub correction: i64,
}

/// Ledger state of one aggregate, read in a single database transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Snapshot {
    pending: u64,
    expected: i64,
    /// Highest outbox id addressed to the aggregate. Every ledger write that
    /// touches the aggregate queues a new entry, so a changed value means the
    /// ledger moved.
    version: i64,
}

async fn snapshot<C: ConnectionTrait>(db: &C, target: AdjustmentTarget) -> ResultEngine<Snapshot> {
    let pending = outbox::Entity::find()
        .filter(outbox::addressed_to(target))
        .filter(outbox::Column::Status.eq(OutboxStatus::Pending.as_str()))
        .count(db)
        .await?;
    let version = outbox::Entity::find()
        .select_only()
        .column_as(Expr::col(outbox::Column::Id).max(), "version")
        .filter(outbox::addressed_to(target))
        .into_tuple::<Option<i64>>()
        .one(db)
        .await?
        .flatten()
        .unwrap_or(0);
    Ok(Snapshot {
        pending,
        expected: ledger_sum(db, target).await?,
        version,
    })
}

/// Signed sum of the ledger rows contributing to `target`.
async fn ledger_sum<C: ConnectionTrait>(db: &C, target: AdjustmentTarget) -> ResultEngine<i64> {
    let mut query = transactions::Entity::find()
        .select_only()
        .column_as(transactions::signed_sum(), "total");
    query = match target {
        AdjustmentTarget::Pos { pos_id } => query.filter(transactions::Column::PosId.eq(pos_id)),
        AdjustmentTarget::Balance {
            user_id,
            payment_type,
        } => query
            .filter(transactions::Column::UserId.eq(user_id))
            .filter(transactions::Column::PaymentType.eq(payment_type.as_i32())),
    };
    Ok(query.into_tuple::<i64>().one(db).await?.unwrap_or(0))
}

impl Engine {
    /// Recomputes a pos total from the ledger and corrects the pos service.
    pub async fn reconcile_pos(&self, pos_id: i64) -> ResultEngine<Reconciliation> {
        require_id(pos_id, "invalid-pos-id")?;
        self.reconcile(AdjustmentTarget::Pos { pos_id }).await
    }

    /// Recomputes a `(user, type)` balance from the ledger and corrects the
    /// balance service.
    pub async fn reconcile_balance(
        &self,
        user_id: i64,
        payment_type: i32,
    ) -> ResultEngine<Reconciliation> {
        require_id(user_id, "invalid-user-id")?;
        let payment_type = PaymentType::try_from(payment_type)?;
        self.reconcile(AdjustmentTarget::Balance {
            user_id,
            payment_type,
        })
        .await
    }

    /// The observed total is only trusted when the ledger did not move
    /// while it was read; otherwise the caller gets a 409 and may retry.
    async fn reconcile(&self, target: AdjustmentTarget) -> ResultEngine<Reconciliation> {
        let before = with_tx!(self, |db_tx| snapshot(&db_tx, target).await)?;
        if before.pending > 0 {
            return Err(EngineError::AdjustmentsPending(format!(
                "{} {} adjustment(s) queued",
                before.pending,
                target.kind()
            )));
        }

        let observed = match target {
            AdjustmentTarget::Pos { pos_id } => {
                self.pos
                    .pos_detail(pos_id)
                    .await
                    .map_err(|err| EngineError::upstream(Collaborator::Pos, err))?
                    .total
            }
            AdjustmentTarget::Balance {
                user_id,
                payment_type,
            } => self
                .balance
                .balance(user_id, payment_type)
                .await
                .map_err(|err| EngineError::upstream(Collaborator::Balance, err))?,
        };

        let after = snapshot(&self.database, target).await?;
        if after != before {
            tracing::warn!(
                aggregate = target.kind(),
                pending = after.pending,
                "ledger moved during reconciliation"
            );
            return Err(EngineError::AdjustmentsPending(format!(
                "{} ledger changed during reconciliation",
                target.kind()
            )));
        }
        let expected = before.expected;

        let correction = expected - observed;
        if correction != 0 {
            let key = format!("reconcile-{}-{}", target.kind(), Uuid::new_v4());
            match target {
                AdjustmentTarget::Pos { pos_id } => {
                    let total = self
                        .pos
                        .adjust_total(pos_id, correction, &key)
                        .await
                        .map_err(|err| EngineError::upstream(Collaborator::Pos, err))?;
                    pos_cache::set_total(&self.database, pos_id, total, self.now()).await?;
                }
                AdjustmentTarget::Balance {
                    user_id,
                    payment_type,
                } => {
                    self.balance
                        .adjust_balance(user_id, payment_type, correction, &key)
                        .await
                        .map_err(|err| EngineError::upstream(Collaborator::Balance, err))?;
                }
            }
        }

        let settled = outbox::Entity::update_many()
            .col_expr(
                outbox::Column::Status,
                Expr::value(OutboxStatus::Reconciled.as_str()),
            )
            .col_expr(outbox::Column::UpdatedAt, Expr::value(self.now()))
            .filter(outbox::addressed_to(target))
            .filter(outbox::Column::Status.eq(OutboxStatus::Failed.as_str()))
            .filter(outbox::Column::Id.lte(before.version))
            .exec(&self.database)
            .await?;

        tracing::info!(
            aggregate = target.kind(),
            expected,
            observed,
            correction,
            settled = settled.rows_affected,
            "aggregate reconciled"
        );
        Ok(Reconciliation {
            expected,
            observed,
            correction,
        })
    }
}
