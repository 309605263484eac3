//! In-memory collaborators for tests.
//!
//! Both fakes honour idempotency keys the way the real services must, and can
//! be switched into an outage (every call is `Unavailable`) or into rejecting
//! adjustments with a fixed status and code.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;

use crate::{BalanceAdjusted, BalanceService, PaymentType, PosService, PosSnapshot, UpstreamError};

#[derive(Debug, Default)]
struct Faults {
    outage: bool,
    rejection: Option<(u16, String)>,
    adjust_calls: usize,
}

impl Faults {
    fn check_read(&self) -> Result<(), UpstreamError> {
        if self.outage {
            return Err(UpstreamError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn check_adjust(&mut self) -> Result<(), UpstreamError> {
        self.adjust_calls += 1;
        self.check_read()?;
        if let Some((status, error)) = &self.rejection {
            return Err(UpstreamError::Rejected {
                status: *status,
                error: error.clone(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct PosState {
    pos: HashMap<i64, PosSnapshot>,
    applied_keys: HashSet<String>,
    faults: Faults,
}

/// Pos service keeping its aggregates in memory.
#[derive(Debug, Default)]
pub struct MemoryPosService {
    state: Mutex<PosState>,
}

impl MemoryPosService {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, PosState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a pos with a zero total.
    pub fn with_pos(self, id: i64, user_id: i64, name: &str) -> Self {
        self.state().pos.insert(
            id,
            PosSnapshot {
                id,
                user_id,
                name: name.to_string(),
                pos_type: 0,
                total: 0,
                color: "#2e7d32".to_string(),
            },
        );
        self
    }

    pub fn total(&self, id: i64) -> Option<i64> {
        self.state().pos.get(&id).map(|pos| pos.total)
    }

    /// Overwrites a total without going through an adjustment.
    pub fn force_total(&self, id: i64, total: i64) {
        if let Some(pos) = self.state().pos.get_mut(&id) {
            pos.total = total;
        }
    }

    pub fn set_outage(&self, outage: bool) {
        self.state().faults.outage = outage;
    }

    pub fn reject_adjustments(&self, rejection: Option<(u16, &str)>) {
        self.state().faults.rejection = rejection.map(|(status, error)| (status, error.to_string()));
    }

    /// Adjustment calls received, including duplicates and failed ones.
    pub fn adjust_calls(&self) -> usize {
        self.state().faults.adjust_calls
    }
}

#[async_trait]
impl PosService for MemoryPosService {
    async fn pos_detail(&self, pos_id: i64) -> Result<PosSnapshot, UpstreamError> {
        let state = self.state();
        state.faults.check_read()?;
        state
            .pos
            .get(&pos_id)
            .cloned()
            .ok_or_else(|| UpstreamError::Rejected {
                status: 404,
                error: "pos-not-found".to_string(),
            })
    }

    async fn adjust_total(
        &self,
        pos_id: i64,
        amount: i64,
        idempotency_key: &str,
    ) -> Result<i64, UpstreamError> {
        let mut state = self.state();
        state.faults.check_adjust()?;
        let first_delivery = !state.applied_keys.contains(idempotency_key);
        let pos = state
            .pos
            .get_mut(&pos_id)
            .ok_or_else(|| UpstreamError::Rejected {
                status: 404,
                error: "pos-not-found".to_string(),
            })?;
        if first_delivery {
            pos.total += amount;
        }
        let total = pos.total;
        state.applied_keys.insert(idempotency_key.to_string());
        Ok(total)
    }
}

#[derive(Debug, Default)]
struct BalanceState {
    balances: HashMap<(i64, PaymentType), (i64, i64)>,
    applied_keys: HashSet<String>,
    next_id: i64,
    faults: Faults,
}

/// Balance service keeping its aggregates in memory.
///
/// A `(user, type)` pair that was never adjusted reads as zero.
#[derive(Debug, Default)]
pub struct MemoryBalanceService {
    state: Mutex<BalanceState>,
}

impl MemoryBalanceService {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BalanceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn total(&self, user_id: i64, payment_type: PaymentType) -> i64 {
        self.state()
            .balances
            .get(&(user_id, payment_type))
            .map_or(0, |(_, total)| *total)
    }

    pub fn set_outage(&self, outage: bool) {
        self.state().faults.outage = outage;
    }

    pub fn reject_adjustments(&self, rejection: Option<(u16, &str)>) {
        self.state().faults.rejection = rejection.map(|(status, error)| (status, error.to_string()));
    }

    /// Adjustment calls received, including duplicates and failed ones.
    pub fn adjust_calls(&self) -> usize {
        self.state().faults.adjust_calls
    }
}

#[async_trait]
impl BalanceService for MemoryBalanceService {
    async fn adjust_balance(
        &self,
        user_id: i64,
        payment_type: PaymentType,
        amount: i64,
        idempotency_key: &str,
    ) -> Result<BalanceAdjusted, UpstreamError> {
        let mut state = self.state();
        state.faults.check_adjust()?;
        let first_delivery = state.applied_keys.insert(idempotency_key.to_string());

        let key = (user_id, payment_type);
        let existing = state.balances.get(&key).copied();
        let (id, total) = match existing {
            Some(existing) => existing,
            None => {
                state.next_id += 1;
                (state.next_id, 0)
            }
        };
        let total = if first_delivery { total + amount } else { total };
        state.balances.insert(key, (id, total));
        Ok(BalanceAdjusted { id, total })
    }

    async fn balance(&self, user_id: i64, payment_type: PaymentType) -> Result<i64, UpstreamError> {
        let state = self.state();
        state.faults.check_read()?;
        Ok(state
            .balances
            .get(&(user_id, payment_type))
            .map_or(0, |(_, total)| *total))
    }
}
