//! Transactions RPC endpoints

use api_types::transaction::{
    CreateTransactionRequest, CreateTransactionResponse, DeleteTransactionRequest,
    DeleteTransactionResponse, DetailTransactionRequest, DetailTransactionResponse,
    ExpenditureRequest, ExpenditureResponse, ListTransactionsRequest, ListTransactionsResponse,
    PosView, TransactionView,
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use chrono::{DateTime, Utc};
use engine::{CreateTransactionCmd, EngineError, LedgerEntry, TransactionListQuery};

use crate::{ServerError, server::ServerState};

fn payload<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServerError> {
    match payload {
        Ok(Json(payload)) => Ok(payload),
        Err(rejection) => {
            tracing::debug!("rejected request body: {rejection}");
            Err(ServerError::Generic("invalid-request".to_string()))
        }
    }
}

/// `0` means "now"; anything else must be a representable unix timestamp.
fn occurred_at(secs: i64) -> Result<Option<DateTime<Utc>>, ServerError> {
    if secs == 0 {
        return Ok(None);
    }
    DateTime::from_timestamp(secs, 0)
        .map(Some)
        .ok_or_else(|| ServerError::Generic("invalid-occurred-at".to_string()))
}

fn view(entry: LedgerEntry) -> TransactionView {
    let tx = entry.transaction;
    TransactionView {
        id: tx.id,
        total: tx.total,
        details: tx.details,
        payment_type: tx.payment_type.as_i32(),
        action: tx.action.as_i32(),
        created_at: tx.occurred_at.timestamp(),
        pos: entry.pos.map(|pos| PosView {
            id: pos.id,
            name: pos.name,
            pos_type: pos.pos_type,
            total: pos.total,
            color: pos.color,
        }),
    }
}

pub async fn create(
    State(state): State<ServerState>,
    request: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> Result<Json<CreateTransactionResponse>, ServerError> {
    let request = payload(request)?;
    let cmd = CreateTransactionCmd {
        user_id: request.user_id,
        pos_id: request.pos_id,
        total: request.total,
        details: request.details,
        action: request.action,
        payment_type: request.payment_type,
        occurred_at: occurred_at(request.occurred_at)?,
    };

    match state.engine.create_transaction(cmd).await {
        Ok(id) => Ok(Json(CreateTransactionResponse {
            status: 201,
            error: String::new(),
            id,
        })),
        Err(err @ EngineError::PartiallyApplied { transaction_id, .. }) => {
            tracing::warn!("{err}");
            Ok(Json(CreateTransactionResponse {
                status: err.status(),
                error: err.code().to_string(),
                id: transaction_id,
            }))
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn list(
    State(state): State<ServerState>,
    request: Result<Json<ListTransactionsRequest>, JsonRejection>,
) -> Result<Json<ListTransactionsResponse>, ServerError> {
    let request = payload(request)?;
    let query = TransactionListQuery {
        user_id: request.user_id,
        page: request.page,
        limit: request.limit,
        action: request.action,
        start_date: request.start_date,
        end_date: request.end_date,
    };

    let page = state.engine.list_transactions(&query).await?;
    Ok(Json(ListTransactionsResponse {
        status: 200,
        error: String::new(),
        limit: page.limit,
        page: page.page,
        transactions: page.entries.into_iter().map(view).collect(),
        total_for_window: page.total_for_window,
    }))
}

pub async fn detail(
    State(state): State<ServerState>,
    request: Result<Json<DetailTransactionRequest>, JsonRejection>,
) -> Result<Json<DetailTransactionResponse>, ServerError> {
    let request = payload(request)?;
    let entry = state
        .engine
        .detail_transaction(request.user_id, request.id)
        .await?;
    Ok(Json(DetailTransactionResponse {
        status: 200,
        error: String::new(),
        transaction: Some(view(entry)),
    }))
}

pub async fn delete(
    State(state): State<ServerState>,
    request: Result<Json<DeleteTransactionRequest>, JsonRejection>,
) -> Result<Json<DeleteTransactionResponse>, ServerError> {
    let request = payload(request)?;
    match state
        .engine
        .delete_transaction(request.id, request.user_id)
        .await
    {
        Ok(()) => Ok(Json(DeleteTransactionResponse {
            status: 200,
            error: String::new(),
        })),
        Err(err @ EngineError::PartiallyApplied { .. }) => {
            tracing::warn!("{err}");
            Ok(Json(DeleteTransactionResponse {
                status: err.status(),
                error: err.code().to_string(),
            }))
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn expenditure(
    State(state): State<ServerState>,
    request: Result<Json<ExpenditureRequest>, JsonRejection>,
) -> Result<Json<ExpenditureResponse>, ServerError> {
    let request = payload(request)?;
    let report = state
        .engine
        .percentage_expenditure(request.user_id, &request.start_date, &request.end_date)
        .await?;
    Ok(Json(ExpenditureResponse {
        status: 200,
        error: String::new(),
        today_total: report.today_total,
        reference_total: report.reference_total,
        percentage: report.percentage,
    }))
}
