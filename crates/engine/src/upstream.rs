//! Collaborator seams.
//!
//! The pos and balance aggregates are owned by other services. The engine
//! only talks to them through these traits, so the HTTP clients and the
//! in-memory fakes in [`crate::testing`] are interchangeable.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::{PaymentType, PosSnapshot};

/// Remote service the engine depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Collaborator {
    Pos,
    Balance,
}

impl Collaborator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pos => "pos-service",
            Self::Balance => "balance-service",
        }
    }

    pub fn unavailable_code(self) -> &'static str {
        match self {
            Self::Pos => "pos-service-unavailable",
            Self::Balance => "balance-service-unavailable",
        }
    }
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a collaborator client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// The collaborator answered with a non-success status. Never retried.
    #[error("rejected with {status}: {error}")]
    Rejected { status: u16, error: String },
    /// Transport failure or timeout.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl UpstreamError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result of a balance upsert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BalanceAdjusted {
    pub id: i64,
    pub total: i64,
}

#[async_trait]
pub trait PosService: Send + Sync {
    async fn pos_detail(&self, pos_id: i64) -> Result<PosSnapshot, UpstreamError>;

    /// Adds `amount` to the pos running total and returns the new total.
    ///
    /// A repeated `idempotency_key` must not be applied twice.
    async fn adjust_total(
        &self,
        pos_id: i64,
        amount: i64,
        idempotency_key: &str,
    ) -> Result<i64, UpstreamError>;
}

#[async_trait]
pub trait BalanceService: Send + Sync {
    /// Upserts the `(user_id, payment_type)` balance by `amount`.
    ///
    /// A repeated `idempotency_key` must not be applied twice.
    async fn adjust_balance(
        &self,
        user_id: i64,
        payment_type: PaymentType,
        amount: i64,
        idempotency_key: &str,
    ) -> Result<BalanceAdjusted, UpstreamError>;

    async fn balance(&self, user_id: i64, payment_type: PaymentType) -> Result<i64, UpstreamError>;
}
