use axum::{Json, http::StatusCode, response::IntoResponse};
use engine::EngineError;

use serde::Serialize;
pub use server::{ServerState, router, run, run_with_listener, spawn_with_listener};

mod server;
mod transactions;

pub mod types {
    pub mod transaction {
        pub use api_types::transaction::{
            CreateTransactionRequest, CreateTransactionResponse, DeleteTransactionRequest,
            DeleteTransactionResponse, DetailTransactionRequest, DetailTransactionResponse,
            ExpenditureRequest, ExpenditureResponse, ListTransactionsRequest,
            ListTransactionsResponse, PosView, TransactionView,
        };
    }
}

/// Failure of an RPC, reported as an embedded `(status, error)` pair.
#[derive(Debug)]
pub enum ServerError {
    Engine(EngineError),
    /// The request could not be turned into an engine call; the string is
    /// the error code.
    Generic(String),
}

#[derive(Serialize)]
struct Error {
    status: u16,
    error: String,
}

impl ServerError {
    pub fn status(&self) -> u16 {
        match self {
            ServerError::Engine(err) => err.status(),
            ServerError::Generic(_) => 400,
        }
    }

    /// Error code sent to the caller. Store errors are logged, never echoed.
    pub fn code(&self) -> String {
        match self {
            ServerError::Engine(EngineError::Database(db_err)) => {
                tracing::error!("database error: {db_err}");
                "internal-error".to_string()
            }
            ServerError::Engine(EngineError::Unavailable { service, reason }) => {
                tracing::warn!("{service} unavailable: {reason}");
                service.unavailable_code().to_string()
            }
            ServerError::Engine(err) => err.code().to_string(),
            ServerError::Generic(code) => code.clone(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let body = Error {
            status: self.status(),
            error: self.code(),
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

impl From<EngineError> for ServerError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}
