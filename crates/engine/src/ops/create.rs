use chrono::{DateTime, Utc};
use sea_orm::{EntityTrait, TransactionTrait};

use crate::{
    Action, Collaborator, EngineError, PaymentType, ResultEngine, Transaction, dates,
    outbox::{self, AdjustmentPhase},
    pos_cache,
    transactions::{self, NewTransaction},
};

use super::{super::Engine, require_id, with_tx};

/// Input of [`Engine::create_transaction`], as received on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateTransactionCmd {
    pub user_id: i64,
    pub pos_id: i64,
    pub total: i64,
    pub details: String,
    pub action: i32,
    pub payment_type: i32,
    /// `None` records the transaction at the current instant.
    pub occurred_at: Option<DateTime<Utc>>,
}

struct ValidCreate {
    user_id: i64,
    pos_id: i64,
    total: i64,
    details: String,
    action: Action,
    payment_type: PaymentType,
}

impl CreateTransactionCmd {
    fn validate(&self) -> ResultEngine<ValidCreate> {
        require_id(self.user_id, "invalid-user-id")?;
        require_id(self.pos_id, "invalid-pos-id")?;
        if self.total == 0 {
            return Err(EngineError::Validation("invalid-total"));
        }
        if self.details.is_empty() {
            return Err(EngineError::Validation("invalid-details"));
        }
        let action = Action::try_from(self.action)?;
        let payment_type = PaymentType::try_from(self.payment_type)?;
        Ok(ValidCreate {
            user_id: self.user_id,
            pos_id: self.pos_id,
            total: self.total,
            details: self.details.clone(),
            action,
            payment_type,
        })
    }
}

impl Engine {
    /// Records a transaction and applies its pos and balance adjustments.
    ///
    /// The pos must exist before anything is written. The ledger row and both
    /// pending adjustments are committed together, then dispatched. When an
    /// adjustment could not be applied the row stays recorded and
    /// [`EngineError::PartiallyApplied`] carries its id.
    pub async fn create_transaction(&self, cmd: CreateTransactionCmd) -> ResultEngine<i64> {
        let valid = cmd.validate()?;

        let pos = self
            .pos
            .pos_detail(valid.pos_id)
            .await
            .map_err(|err| EngineError::upstream(Collaborator::Pos, err))?;

        let now = self.now();
        let new_tx = NewTransaction {
            user_id: valid.user_id,
            pos_id: valid.pos_id,
            total: valid.total,
            details: valid.details,
            payment_type: valid.payment_type,
            action: valid.action,
            occurred_at: dates::resolve_occurred_at(cmd.occurred_at, now),
        };

        let recorded = with_tx!(self, |db_tx| {
            pos_cache::upsert(&db_tx, &pos, now).await?;
            let id = transactions::Entity::insert(transactions::ActiveModel::from(&new_tx))
                .exec(&db_tx)
                .await?
                .last_insert_id;
            let recorded = Transaction {
                id,
                user_id: new_tx.user_id,
                pos_id: new_tx.pos_id,
                total: new_tx.total,
                details: new_tx.details.clone(),
                payment_type: new_tx.payment_type,
                action: new_tx.action,
                occurred_at: new_tx.occurred_at,
            };
            outbox::enqueue(&db_tx, &recorded, AdjustmentPhase::Create, now).await?;
            Ok(recorded)
        })?;

        tracing::info!(
            transaction_id = recorded.id,
            user_id = recorded.user_id,
            pos_id = recorded.pos_id,
            amount = recorded.signed_amount(),
            "transaction recorded"
        );

        self.settle(recorded.id).await?;
        Ok(recorded.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_cmd() -> CreateTransactionCmd {
        CreateTransactionCmd {
            user_id: 1,
            pos_id: 2,
            total: 2000,
            details: "lunch".to_string(),
            action: 1,
            payment_type: 0,
            occurred_at: None,
        }
    }

    fn first_error(cmd: CreateTransactionCmd) -> EngineError {
        match cmd.validate() {
            Ok(_) => panic!("expected a validation error"),
            Err(err) => err,
        }
    }

    #[test]
    fn validation_reports_first_failing_field() {
        let cmd = CreateTransactionCmd {
            user_id: 0,
            pos_id: 0,
            total: 0,
            ..valid_cmd()
        };
        assert_eq!(first_error(cmd), EngineError::Validation("invalid-user-id"));

        let cmd = CreateTransactionCmd {
            pos_id: 0,
            total: 0,
            ..valid_cmd()
        };
        assert_eq!(first_error(cmd), EngineError::Validation("invalid-pos-id"));

        let cmd = CreateTransactionCmd {
            total: 0,
            details: String::new(),
            ..valid_cmd()
        };
        assert_eq!(first_error(cmd), EngineError::Validation("invalid-total"));

        let cmd = CreateTransactionCmd {
            details: String::new(),
            action: 7,
            ..valid_cmd()
        };
        assert_eq!(first_error(cmd), EngineError::Validation("invalid-details"));

        let cmd = CreateTransactionCmd {
            action: 7,
            payment_type: 7,
            ..valid_cmd()
        };
        assert_eq!(
            first_error(cmd),
            EngineError::Validation("invalid-action-type")
        );

        let cmd = CreateTransactionCmd {
            payment_type: 2,
            ..valid_cmd()
        };
        assert_eq!(first_error(cmd), EngineError::Validation("invalid-type"));
    }

    #[test]
    fn negative_totals_are_accepted() {
        let cmd = CreateTransactionCmd {
            total: -500,
            ..valid_cmd()
        };
        assert!(cmd.validate().is_ok());
    }
}
