use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, TransactionTrait};

use crate::{
    EngineError, ResultEngine, Transaction,
    outbox::{self, AdjustmentPhase},
    transactions,
};

use super::{super::Engine, require_id, with_tx};

impl Engine {
    /// Deletes a user's transaction and reverses exactly what it contributed
    /// to the pos and balance aggregates.
    pub async fn delete_transaction(&self, transaction_id: i64, user_id: i64) -> ResultEngine<()> {
        require_id(transaction_id, "invalid-transaction-id")?;
        require_id(user_id, "invalid-user-id")?;

        let now = self.now();
        let removed = with_tx!(self, |db_tx| {
            let model = transactions::Entity::find()
                .filter(transactions::Column::Id.eq(transaction_id))
                .filter(transactions::Column::UserId.eq(user_id))
                .one(&db_tx)
                .await?
                .ok_or(EngineError::NotFound("transaction-not-found"))?;
            let removed = Transaction::try_from(model)?;
            let deleted = transactions::Entity::delete_many()
                .filter(transactions::Column::Id.eq(transaction_id))
                .filter(transactions::Column::UserId.eq(user_id))
                .exec(&db_tx)
                .await?;
            // A concurrent delete may have removed the row since it was read.
            if deleted.rows_affected != 1 {
                return Err(EngineError::NotFound("transaction-not-found"));
            }
            outbox::enqueue(&db_tx, &removed, AdjustmentPhase::Delete, now).await?;
            Ok(removed)
        })?;

        tracing::info!(
            transaction_id = removed.id,
            user_id = removed.user_id,
            pos_id = removed.pos_id,
            amount = -removed.signed_amount(),
            "transaction deleted"
        );

        self.settle(removed.id).await
    }
}
