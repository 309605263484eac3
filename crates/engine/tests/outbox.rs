mod common;

use std::sync::{
    Arc, OnceLock, Weak,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use common::*;
use engine::{
    AdjustmentTarget, DispatchReport, Engine, EngineError, LedgerSettings, OutboxStatus,
    PaymentType, PosService, PosSnapshot, Reconciliation, UpstreamError,
    testing::{MemoryBalanceService, MemoryPosService},
};

/// Pos service that lets the engine do extra work in the middle of a call.
///
/// When `on_read` is armed, the next pos read first records another
/// transaction. When `on_adjust` is armed, the next adjustment first runs a
/// background sweep.
struct InterleavingPos {
    inner: Arc<MemoryPosService>,
    engine: OnceLock<Weak<Engine>>,
    on_read: AtomicBool,
    on_adjust: AtomicBool,
}

impl InterleavingPos {
    fn engine(&self) -> Arc<Engine> {
        self.engine.get().and_then(Weak::upgrade).unwrap()
    }
}

#[async_trait]
impl PosService for InterleavingPos {
    async fn pos_detail(&self, pos_id: i64) -> Result<PosSnapshot, UpstreamError> {
        if self.on_read.swap(false, Ordering::SeqCst) {
            self.engine()
                .create_transaction(cmd(500, INCREASE, CASH))
                .await
                .unwrap();
        }
        self.inner.pos_detail(pos_id).await
    }

    async fn adjust_total(
        &self,
        pos_id: i64,
        amount: i64,
        idempotency_key: &str,
    ) -> Result<i64, UpstreamError> {
        if self.on_adjust.swap(false, Ordering::SeqCst) {
            self.engine().dispatch_pending(10).await.unwrap();
        }
        self.inner.adjust_total(pos_id, amount, idempotency_key).await
    }
}

struct Interleaved {
    engine: Arc<Engine>,
    hooks: Arc<InterleavingPos>,
    pos: Arc<MemoryPosService>,
    balance: Arc<MemoryBalanceService>,
}

async fn interleaved() -> Interleaved {
    let pos = Arc::new(MemoryPosService::new().with_pos(POS, USER, "Groceries"));
    let balance = Arc::new(MemoryBalanceService::new());
    let hooks = Arc::new(InterleavingPos {
        inner: pos.clone(),
        engine: OnceLock::new(),
        on_read: AtomicBool::new(false),
        on_adjust: AtomicBool::new(false),
    });
    let engine = Arc::new(
        Engine::builder()
            .database(memory_db().await)
            .pos_service(hooks.clone())
            .balance_service(balance.clone())
            .clock(Arc::new(now))
            .build()
            .await
            .unwrap(),
    );
    hooks
        .engine
        .set(Arc::downgrade(&engine))
        .unwrap_or_else(|_| panic!("engine already set"));
    Interleaved {
        engine,
        hooks,
        pos,
        balance,
    }
}

#[tokio::test]
async fn outage_leaves_pending_adjustment_applied_once_later() {
    let h = harness().await;
    h.balance.set_outage(true);

    let err = h
        .engine
        .create_transaction(cmd(2000, INCREASE, CASH))
        .await
        .unwrap_err();
    let EngineError::PartiallyApplied {
        transaction_id,
        pending,
        failed,
    } = err
    else {
        panic!("expected a partial application, got {err:?}");
    };
    assert_eq!((pending, failed), (1, 0));
    assert_eq!(err.status(), 202);
    assert_eq!(err.code(), "adjustment-pending");

    // The ledger row is durable and the pos side already applied.
    let entry = h
        .engine
        .detail_transaction(USER, transaction_id)
        .await
        .unwrap();
    assert_eq!(entry.transaction.total, 2000);
    assert_eq!(h.pos.total(POS), Some(2000));
    assert_eq!(h.balance.total(USER, PaymentType::Cash), 0);

    let queued = h
        .engine
        .outbox_entries(Some(OutboxStatus::Pending), 10)
        .await
        .unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].attempts, 1);
    assert!(matches!(queued[0].target, AdjustmentTarget::Balance { .. }));

    h.balance.set_outage(false);
    let report = h.engine.dispatch_pending(10).await.unwrap();
    assert_eq!(
        report,
        DispatchReport {
            applied: 1,
            retrying: 0,
            failed: 0
        }
    );
    assert_eq!(h.balance.total(USER, PaymentType::Cash), 2000);

    assert!(h.engine.dispatch_pending(10).await.unwrap().is_empty());
    assert_eq!(h.balance.total(USER, PaymentType::Cash), 2000);
    assert_eq!(h.pos.total(POS), Some(2000));
}

#[tokio::test]
async fn retryable_failures_are_dead_lettered_after_max_attempts() {
    let h = harness_with(LedgerSettings {
        max_attempts: 3,
        ..LedgerSettings::default()
    })
    .await;
    h.balance.set_outage(true);

    assert!(
        h.engine
            .create_transaction(cmd(700, DECREASE, TRANSFER))
            .await
            .is_err()
    );
    assert_eq!(
        h.engine.dispatch_pending(10).await.unwrap(),
        DispatchReport {
            applied: 0,
            retrying: 1,
            failed: 0
        }
    );
    assert_eq!(
        h.engine.dispatch_pending(10).await.unwrap(),
        DispatchReport {
            applied: 0,
            retrying: 0,
            failed: 1
        }
    );

    let failed = h
        .engine
        .outbox_entries(Some(OutboxStatus::Failed), 10)
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].attempts, 3);
    assert!(
        failed[0]
            .last_error
            .as_deref()
            .is_some_and(|error| error.starts_with("balance-service"))
    );
    assert!(h.engine.dispatch_pending(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn rejection_is_dead_lettered_and_reconciled() {
    let h = harness().await;
    h.balance.reject_adjustments(Some((422, "balance-locked")));

    let err = h
        .engine
        .create_transaction(cmd(2000, INCREASE, CASH))
        .await
        .unwrap_err();
    assert_eq!(err.status(), 202);
    assert_eq!(err.code(), "adjustment-failed");
    assert_eq!(h.balance.adjust_calls(), 1);

    // Rejections are never retried by the sweep.
    assert!(h.engine.dispatch_pending(10).await.unwrap().is_empty());
    assert_eq!(h.balance.adjust_calls(), 1);

    h.balance.reject_adjustments(None);
    let outcome = h.engine.reconcile_balance(USER, CASH).await.unwrap();
    assert_eq!(
        outcome,
        Reconciliation {
            expected: 2000,
            observed: 0,
            correction: 2000
        }
    );
    assert_eq!(h.balance.total(USER, PaymentType::Cash), 2000);

    let reconciled = h
        .engine
        .outbox_entries(Some(OutboxStatus::Reconciled), 10)
        .await
        .unwrap();
    assert_eq!(reconciled.len(), 1);
    assert_eq!(
        h.engine.requeue_adjustment(reconciled[0].id).await,
        Err(EngineError::NotFound("adjustment-not-found"))
    );
}

#[tokio::test]
async fn reconcile_waits_for_pending_adjustments() {
    let h = harness().await;
    h.balance.set_outage(true);
    assert!(
        h.engine
            .create_transaction(cmd(2000, INCREASE, CASH))
            .await
            .is_err()
    );
    h.balance.set_outage(false);

    let err = h.engine.reconcile_balance(USER, CASH).await.unwrap_err();
    assert_eq!(err.status(), 409);
    assert_eq!(err.code(), "adjustment-pending");

    // The pos side has nothing queued.
    let outcome = h.engine.reconcile_pos(POS).await.unwrap();
    assert_eq!(outcome.correction, 0);
}

#[tokio::test]
async fn reconcile_pos_corrects_drift() {
    let h = harness().await;
    let id = h
        .engine
        .create_transaction(cmd(2000, INCREASE, CASH))
        .await
        .unwrap();
    h.pos.force_total(POS, 9999);

    let outcome = h.engine.reconcile_pos(POS).await.unwrap();
    assert_eq!(
        outcome,
        Reconciliation {
            expected: 2000,
            observed: 9999,
            correction: -7999
        }
    );
    assert_eq!(h.pos.total(POS), Some(2000));

    let entry = h.engine.detail_transaction(USER, id).await.unwrap();
    assert_eq!(entry.pos.map(|pos| pos.total), Some(2000));

    let again = h.engine.reconcile_pos(POS).await.unwrap();
    assert_eq!(again.correction, 0);
    assert_eq!(
        h.engine.reconcile_pos(0).await,
        Err(EngineError::Validation("invalid-pos-id"))
    );
    assert_eq!(
        h.engine.reconcile_balance(USER, 4).await,
        Err(EngineError::Validation("invalid-type"))
    );
}

#[tokio::test]
async fn requeued_adjustment_is_dispatched_again() {
    let h = harness().await;
    h.pos.reject_adjustments(Some((409, "pos-frozen")));

    let err = h
        .engine
        .create_transaction(cmd(2000, INCREASE, CASH))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "adjustment-failed");
    assert_eq!(h.pos.total(POS), Some(0));
    assert_eq!(h.balance.total(USER, PaymentType::Cash), 2000);

    let failed = h
        .engine
        .outbox_entries(Some(OutboxStatus::Failed), 10)
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].target, AdjustmentTarget::Pos { pos_id: POS });

    h.pos.reject_adjustments(None);
    let requeued = h.engine.requeue_adjustment(failed[0].id).await.unwrap();
    assert_eq!(requeued.status, OutboxStatus::Pending);
    assert_eq!(requeued.attempts, 0);

    assert_eq!(h.engine.dispatch_pending(10).await.unwrap().applied, 1);
    assert_eq!(h.pos.total(POS), Some(2000));
}

#[tokio::test]
async fn delete_queues_inverse_adjustments() {
    let h = harness().await;
    let id = h
        .engine
        .create_transaction(cmd(1500, DECREASE, TRANSFER))
        .await
        .unwrap();
    h.pos.set_outage(true);
    h.balance.set_outage(true);

    let err = h.engine.delete_transaction(id, USER).await.unwrap_err();
    assert_eq!(
        err,
        EngineError::PartiallyApplied {
            transaction_id: id,
            pending: 2,
            failed: 0
        }
    );
    let queued = h
        .engine
        .outbox_entries(Some(OutboxStatus::Pending), 10)
        .await
        .unwrap();
    assert_eq!(queued.len(), 2);
    assert!(queued.iter().all(|entry| entry.amount == 1500));
    assert!(
        queued
            .iter()
            .all(|entry| entry.idempotency_key.contains("-delete-"))
    );

    h.pos.set_outage(false);
    h.balance.set_outage(false);
    assert_eq!(h.engine.dispatch_pending(10).await.unwrap().applied, 2);
    assert_eq!(h.pos.total(POS), Some(0));
    assert_eq!(h.balance.total(USER, PaymentType::Transfer), 0);
}

#[tokio::test]
async fn reconcile_refuses_when_ledger_moves_during_remote_read() {
    let t = interleaved().await;
    t.engine
        .create_transaction(cmd(2000, INCREASE, CASH))
        .await
        .unwrap();
    t.hooks.on_read.store(true, Ordering::SeqCst);

    let err = t.engine.reconcile_pos(POS).await.unwrap_err();
    assert_eq!(err.status(), 409);
    assert_eq!(err.code(), "adjustment-pending");
    // Only the interleaved create reached the pos; no correction was sent.
    assert_eq!(t.pos.total(POS), Some(2500));

    let settled = t.engine.reconcile_pos(POS).await.unwrap();
    assert_eq!(
        settled,
        Reconciliation {
            expected: 2500,
            observed: 2500,
            correction: 0
        }
    );
}

#[tokio::test]
async fn create_reports_outcome_recorded_by_a_concurrent_sweep() {
    let t = interleaved().await;
    t.balance.reject_adjustments(Some((423, "balance-locked")));
    t.hooks.on_adjust.store(true, Ordering::SeqCst);

    // The sweep settles both entries before the request records anything.
    let err = t
        .engine
        .create_transaction(cmd(2000, INCREASE, CASH))
        .await
        .unwrap_err();
    assert_eq!(err.status(), 202);
    assert_eq!(err.code(), "adjustment-failed");
    assert!(matches!(
        err,
        EngineError::PartiallyApplied {
            pending: 0,
            failed: 1,
            ..
        }
    ));
    assert_eq!(t.pos.total(POS), Some(2000));
    assert_eq!(
        t.engine
            .outbox_entries(Some(OutboxStatus::Failed), 10)
            .await
            .unwrap()
            .len(),
        1
    );
}
