mod create;
mod delete;
mod dispatch;
mod expenditure;
mod list;
mod reconcile;

pub use create::CreateTransactionCmd;
pub use dispatch::DispatchReport;
pub use expenditure::Expenditure;
pub use list::{ACTION_ALL, LedgerEntry, TransactionListQuery, TransactionPage};
pub use reconcile::Reconciliation;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result: $crate::ResultEngine<_> = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

/// Rejects an id that was left unset on the wire.
fn require_id(value: i64, code: &'static str) -> crate::ResultEngine<()> {
    if value == 0 {
        return Err(crate::EngineError::Validation(code));
    }
    Ok(())
}
