//! Delivery of queued adjustments to the pos and balance services.
//!
//! An entry leaves `pending` through a conditional update, so when the inline
//! dispatch of a request races the background sweep only one of them records
//! the outcome. The remote side deduplicates on the idempotency key.

use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    sea_query::Expr,
};
use serde::{Deserialize, Serialize};

use crate::{
    Adjustment, AdjustmentTarget, Collaborator, EngineError, OutboxStatus, ResultEngine,
    UpstreamError, outbox, pos_cache,
};

use super::{super::Engine, require_id};

/// Outcome counts of a dispatch pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub applied: usize,
    /// Still pending after a retryable failure.
    pub retrying: usize,
    /// Dead-lettered during this pass.
    pub failed: usize,
}

impl DispatchReport {
    fn record(&mut self, outcome: Delivery) {
        match outcome {
            Delivery::Applied => self.applied += 1,
            Delivery::Retrying => self.retrying += 1,
            Delivery::Failed => self.failed += 1,
            Delivery::Skipped => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.applied == 0 && self.retrying == 0 && self.failed == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Delivery {
    Applied,
    Retrying,
    Failed,
    /// Another dispatcher settled the entry first.
    Skipped,
}

/// Moves a pending entry to `status`, bumping its attempt counter.
///
/// Returns false when the entry was no longer pending.
async fn settle_entry<C: ConnectionTrait>(
    db: &C,
    entry: &outbox::Model,
    status: OutboxStatus,
    last_error: Option<String>,
    now: chrono::DateTime<chrono::Utc>,
) -> ResultEngine<bool> {
    let result = outbox::Entity::update_many()
        .col_expr(outbox::Column::Status, Expr::value(status.as_str()))
        .col_expr(
            outbox::Column::Attempts,
            Expr::col(outbox::Column::Attempts).add(1),
        )
        .col_expr(outbox::Column::LastError, Expr::value(last_error))
        .col_expr(outbox::Column::UpdatedAt, Expr::value(now))
        .filter(outbox::Column::Id.eq(entry.id))
        .filter(outbox::Column::Status.eq(OutboxStatus::Pending.as_str()))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

impl Engine {
    /// Delivers one pending entry and records the outcome.
    async fn deliver(&self, entry: &outbox::Model) -> ResultEngine<Delivery> {
        let target = AdjustmentTarget::try_from(entry)?;
        let key = entry.idempotency_key.as_str();

        let result = match target {
            AdjustmentTarget::Pos { pos_id } => self
                .pos
                .adjust_total(pos_id, entry.amount, key)
                .await
                .map(Some)
                .map_err(|err| (Collaborator::Pos, err)),
            AdjustmentTarget::Balance {
                user_id,
                payment_type,
            } => self
                .balance
                .adjust_balance(user_id, payment_type, entry.amount, key)
                .await
                .map(|_| None)
                .map_err(|err| (Collaborator::Balance, err)),
        };

        let now = self.now();
        match result {
            Ok(pos_total) => {
                if !settle_entry(&self.database, entry, OutboxStatus::Applied, None, now).await? {
                    return Ok(Delivery::Skipped);
                }
                if let (AdjustmentTarget::Pos { pos_id }, Some(total)) = (target, pos_total) {
                    pos_cache::set_total(&self.database, pos_id, total, now).await?;
                }
                tracing::info!(
                    entry_id = entry.id,
                    transaction_id = entry.transaction_id,
                    aggregate = target.kind(),
                    amount = entry.amount,
                    "adjustment applied"
                );
                Ok(Delivery::Applied)
            }
            Err((service, err)) => self.record_failure(entry, service, err).await,
        }
    }

    async fn record_failure(
        &self,
        entry: &outbox::Model,
        service: Collaborator,
        err: UpstreamError,
    ) -> ResultEngine<Delivery> {
        let now = self.now();
        let attempts = u32::try_from(entry.attempts.saturating_add(1)).unwrap_or(u32::MAX);
        let exhausted = attempts >= self.settings.max_attempts;
        let message = format!("{service}: {err}");

        if err.is_retryable() && !exhausted {
            let updated = outbox::Entity::update_many()
                .col_expr(
                    outbox::Column::Attempts,
                    Expr::col(outbox::Column::Attempts).add(1),
                )
                .col_expr(outbox::Column::LastError, Expr::value(message.clone()))
                .col_expr(outbox::Column::UpdatedAt, Expr::value(now))
                .filter(outbox::Column::Id.eq(entry.id))
                .filter(outbox::Column::Status.eq(OutboxStatus::Pending.as_str()))
                .exec(&self.database)
                .await?;
            if updated.rows_affected == 0 {
                return Ok(Delivery::Skipped);
            }
            tracing::warn!(
                entry_id = entry.id,
                transaction_id = entry.transaction_id,
                attempts,
                "adjustment deferred: {message}"
            );
            return Ok(Delivery::Retrying);
        }

        if !settle_entry(
            &self.database,
            entry,
            OutboxStatus::Failed,
            Some(message.clone()),
            now,
        )
        .await?
        {
            return Ok(Delivery::Skipped);
        }
        tracing::error!(
            entry_id = entry.id,
            transaction_id = entry.transaction_id,
            attempts,
            "adjustment dead-lettered: {message}"
        );
        Ok(Delivery::Failed)
    }

    /// Dispatches the pending adjustments of one transaction, oldest first.
    ///
    /// Fails with [`EngineError::PartiallyApplied`] unless every one of them
    /// was applied.
    pub(crate) async fn settle(&self, transaction_id: i64) -> ResultEngine<()> {
        let entries = outbox::Entity::find()
            .filter(outbox::Column::TransactionId.eq(transaction_id))
            .filter(outbox::Column::Status.eq(OutboxStatus::Pending.as_str()))
            .order_by_asc(outbox::Column::Id)
            .all(&self.database)
            .await?;

        let mut report = DispatchReport::default();
        let mut skipped = Vec::new();
        for entry in &entries {
            match self.deliver(entry).await? {
                Delivery::Skipped => skipped.push(entry.id),
                outcome => report.record(outcome),
            }
        }

        // Entries another dispatcher settled first report its outcome.
        if !skipped.is_empty() {
            let settled = outbox::Entity::find()
                .filter(outbox::Column::Id.is_in(skipped))
                .all(&self.database)
                .await?;
            for model in settled {
                match Adjustment::try_from(model)?.status {
                    OutboxStatus::Pending => report.retrying += 1,
                    OutboxStatus::Failed => report.failed += 1,
                    OutboxStatus::Applied | OutboxStatus::Reconciled => {}
                }
            }
        }

        if report.retrying == 0 && report.failed == 0 {
            return Ok(());
        }
        Err(EngineError::PartiallyApplied {
            transaction_id,
            pending: report.retrying,
            failed: report.failed,
        })
    }

    /// Background sweep: delivers up to `batch` pending adjustments, oldest
    /// first.
    pub async fn dispatch_pending(&self, batch: u64) -> ResultEngine<DispatchReport> {
        let entries = outbox::Entity::find()
            .filter(outbox::Column::Status.eq(OutboxStatus::Pending.as_str()))
            .order_by_asc(outbox::Column::Id)
            .limit(batch)
            .all(&self.database)
            .await?;

        let mut report = DispatchReport::default();
        for entry in &entries {
            report.record(self.deliver(entry).await?);
        }
        if !report.is_empty() {
            tracing::info!(
                applied = report.applied,
                retrying = report.retrying,
                failed = report.failed,
                "outbox sweep finished"
            );
        }
        Ok(report)
    }

    /// Lists outbox entries, optionally restricted to one status, oldest first.
    pub async fn outbox_entries(
        &self,
        status: Option<OutboxStatus>,
        limit: u64,
    ) -> ResultEngine<Vec<Adjustment>> {
        let mut query = outbox::Entity::find();
        if let Some(status) = status {
            query = query.filter(outbox::Column::Status.eq(status.as_str()));
        }
        query
            .order_by_asc(outbox::Column::Id)
            .limit(limit)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Adjustment::try_from)
            .collect()
    }

    /// Moves a dead-lettered entry back to `pending` with its attempts reset.
    pub async fn requeue_adjustment(&self, entry_id: i64) -> ResultEngine<Adjustment> {
        require_id(entry_id, "invalid-entry-id")?;
        let now = self.now();
        let result = outbox::Entity::update_many()
            .col_expr(
                outbox::Column::Status,
                Expr::value(OutboxStatus::Pending.as_str()),
            )
            .col_expr(outbox::Column::Attempts, Expr::value(0))
            .col_expr(outbox::Column::UpdatedAt, Expr::value(now))
            .filter(outbox::Column::Id.eq(entry_id))
            .filter(outbox::Column::Status.eq(OutboxStatus::Failed.as_str()))
            .exec(&self.database)
            .await?;
        if result.rows_affected == 0 {
            return Err(EngineError::NotFound("adjustment-not-found"));
        }

        let model = outbox::Entity::find_by_id(entry_id)
            .one(&self.database)
            .await?
            .ok_or(EngineError::NotFound("adjustment-not-found"))?;
        tracing::info!(entry_id, "adjustment requeued");
        Adjustment::try_from(model)
    }
}
