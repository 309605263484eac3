//! Wire payloads shared by the ledger service, its collaborators and clients.
//!
//! Every response embeds the outcome as an HTTP-like `status` integer plus a
//! lowercase-hyphenated `error` code (empty on success). The transport itself
//! always answers `200 OK` when a payload could be produced.

use serde::{Deserialize, Serialize};

/// Payment instrument of a transaction or balance: `0` cash, `1` transfer.
pub type PaymentType = i32;

/// Sign of a transaction: `0` increase (income), `1` decrease (expense).
pub type Action = i32;

/// Action filter value meaning "both increase and decrease".
pub const ACTION_ALL: Action = 2;

pub mod transaction {
    use super::*;

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct CreateTransactionRequest {
        pub user_id: i64,
        pub pos_id: i64,
        pub total: i64,
        pub details: String,
        #[serde(rename = "type")]
        pub payment_type: PaymentType,
        pub action: Action,
        /// Unix seconds. `0` (or absent) means "now".
        pub occurred_at: i64,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct CreateTransactionResponse {
        pub status: u16,
        pub error: String,
        /// Set whenever the ledger row exists, including `202` responses.
        #[serde(default)]
        pub id: i64,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct ListTransactionsRequest {
        pub user_id: i64,
        pub page: u64,
        pub limit: u64,
        /// `0` increase, `1` decrease, `2` or absent for both.
        pub action: Option<Action>,
        /// `YYYY-MM-DD`, inclusive.
        pub start_date: Option<String>,
        /// `YYYY-MM-DD`, inclusive.
        pub end_date: Option<String>,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct ListTransactionsResponse {
        pub status: u16,
        pub error: String,
        #[serde(default)]
        pub limit: u64,
        #[serde(default)]
        pub page: u64,
        #[serde(default)]
        pub transactions: Vec<TransactionView>,
        /// Signed sum of the whole filtered window, not only of this page.
        #[serde(default)]
        pub total_for_window: i64,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct DetailTransactionRequest {
        pub user_id: i64,
        pub id: i64,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct DetailTransactionResponse {
        pub status: u16,
        pub error: String,
        #[serde(default)]
        pub transaction: Option<TransactionView>,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct DeleteTransactionRequest {
        pub user_id: i64,
        pub id: i64,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct DeleteTransactionResponse {
        pub status: u16,
        pub error: String,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct ExpenditureRequest {
        pub user_id: i64,
        pub start_date: String,
        pub end_date: String,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct ExpenditureResponse {
        pub status: u16,
        pub error: String,
        #[serde(default)]
        pub today_total: i64,
        #[serde(default)]
        pub reference_total: i64,
        #[serde(default)]
        pub percentage: f64,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct TransactionView {
        pub id: i64,
        pub total: i64,
        pub details: String,
        #[serde(rename = "type")]
        pub payment_type: PaymentType,
        pub action: Action,
        /// Unix seconds.
        pub created_at: i64,
        /// Current attributes of the pos, absent if the pos was never seen.
        pub pos: Option<PosView>,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct PosView {
        pub id: i64,
        pub name: String,
        #[serde(rename = "type")]
        pub pos_type: i32,
        pub total: i64,
        pub color: String,
    }
}

/// Payloads of the pos service, consumed by the ledger.
pub mod pos {
    use super::*;

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct PosDetailRequest {
        pub id: i64,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct PosDetailResponse {
        pub status: u16,
        #[serde(default)]
        pub error: String,
        #[serde(default)]
        pub pos: Option<Pos>,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct Pos {
        pub id: i64,
        #[serde(default)]
        pub user_id: i64,
        pub name: String,
        #[serde(rename = "type")]
        pub pos_type: i32,
        pub total: i64,
        pub color: String,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct AdjustTotalRequest {
        pub id: i64,
        /// Signed amount added to the running total.
        pub amount: i64,
        /// Replays with the same key must not be applied twice.
        pub idempotency_key: String,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct AdjustTotalResponse {
        pub status: u16,
        #[serde(default)]
        pub error: String,
        #[serde(default)]
        pub total: i64,
    }
}

/// Payloads of the balance service, consumed by the ledger.
pub mod balance {
    use super::*;

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct AdjustBalanceRequest {
        pub user_id: i64,
        #[serde(rename = "type")]
        pub payment_type: PaymentType,
        /// Signed amount added to the running total.
        pub amount: i64,
        pub idempotency_key: String,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct AdjustBalanceResponse {
        pub status: u16,
        #[serde(default)]
        pub error: String,
        #[serde(default)]
        pub id: i64,
        #[serde(default)]
        pub total: i64,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct GetBalanceRequest {
        pub user_id: i64,
        #[serde(rename = "type")]
        pub payment_type: PaymentType,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct GetBalanceResponse {
        pub status: u16,
        #[serde(default)]
        pub error: String,
        #[serde(default)]
        pub total: i64,
    }
}
