//! The module contains the errors the engine can return.
//!
//! Every variant maps to the `(status, error)` pair embedded in RPC
//! responses through [`EngineError::status`] and [`EngineError::code`]:
//!
//! - [`Validation`] a request field is missing or out of range.
//! - [`NotFound`] the referenced transaction or window does not exist.
//! - [`Upstream`] a collaborator answered with a non-success status, kept verbatim.
//! - [`Unavailable`] a collaborator could not be reached.
//! - [`PartiallyApplied`] the ledger row is committed, some adjustments are not.
//!
//!  [`Validation`]: EngineError::Validation
//!  [`NotFound`]: EngineError::NotFound
//!  [`Upstream`]: EngineError::Upstream
//!  [`Unavailable`]: EngineError::Unavailable
//!  [`PartiallyApplied`]: EngineError::PartiallyApplied
use sea_orm::DbErr;
use thiserror::Error;

use crate::upstream::{Collaborator, UpstreamError};

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    Validation(&'static str),
    #[error("\"{0}\"")]
    NotFound(&'static str),
    #[error("{service} answered {status}: {error}")]
    Upstream {
        service: Collaborator,
        status: u16,
        error: String,
    },
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        service: Collaborator,
        reason: String,
    },
    #[error(
        "transaction {transaction_id} recorded with {pending} pending and {failed} failed adjustment(s)"
    )]
    PartiallyApplied {
        transaction_id: i64,
        pending: usize,
        failed: usize,
    },
    #[error("adjustments still pending for {0}")]
    AdjustmentsPending(String),
    #[error("undefined result: {0}")]
    Undefined(&'static str),
    #[error("engine misconfigured: {0}")]
    Misconfigured(&'static str),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl EngineError {
    pub(crate) fn upstream(service: Collaborator, err: UpstreamError) -> Self {
        match err {
            UpstreamError::Rejected { status, error } => Self::Upstream {
                service,
                status,
                error,
            },
            UpstreamError::Unavailable(reason) => Self::Unavailable { service, reason },
        }
    }

    /// HTTP-like status code reported to callers.
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Upstream { status, .. } => *status,
            Self::Unavailable { .. } => 503,
            Self::PartiallyApplied { .. } => 202,
            Self::AdjustmentsPending(_) => 409,
            Self::Undefined(_) => 422,
            Self::Misconfigured(_) | Self::Database(_) => 500,
        }
    }

    /// Lowercase-hyphenated error code reported to callers.
    ///
    /// Collaborator rejections keep the collaborator's own code.
    pub fn code(&self) -> &str {
        match self {
            Self::Validation(code) | Self::NotFound(code) | Self::Undefined(code) => *code,
            Self::Upstream { error, .. } => error.as_str(),
            Self::Unavailable { service, .. } => service.unavailable_code(),
            Self::PartiallyApplied { failed, .. } if *failed > 0 => "adjustment-failed",
            Self::PartiallyApplied { .. } | Self::AdjustmentsPending(_) => "adjustment-pending",
            Self::Misconfigured(_) | Self::Database(_) => "internal-error",
        }
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (Self::NotFound(a), Self::NotFound(b)) => a == b,
            (
                Self::Upstream {
                    service: sa,
                    status: ta,
                    error: ea,
                },
                Self::Upstream {
                    service: sb,
                    status: tb,
                    error: eb,
                },
            ) => sa == sb && ta == tb && ea == eb,
            (
                Self::Unavailable {
                    service: a,
                    reason: ra,
                },
                Self::Unavailable {
                    service: b,
                    reason: rb,
                },
            ) => a == b && ra == rb,
            (
                Self::PartiallyApplied {
                    transaction_id: ia,
                    pending: pa,
                    failed: fa,
                },
                Self::PartiallyApplied {
                    transaction_id: ib,
                    pending: pb,
                    failed: fb,
                },
            ) => ia == ib && pa == pb && fa == fb,
            (Self::AdjustmentsPending(a), Self::AdjustmentsPending(b)) => a == b,
            (Self::Undefined(a), Self::Undefined(b)) => a == b,
            (Self::Misconfigured(a), Self::Misconfigured(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
