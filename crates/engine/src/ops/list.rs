use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::{Deserialize, Serialize};

use crate::{
    Action, EngineError, PosSnapshot, ResultEngine, Transaction, dates, pos_cache, transactions,
};

use super::{super::Engine, require_id};

/// Value of [`TransactionListQuery::action`] that selects both increases
/// and decreases.
pub const ACTION_ALL: i32 = 2;

/// Input of [`Engine::list_transactions`], as received on the wire.
///
/// Dates are `YYYY-MM-DD` in the ledger timezone; both bounds are inclusive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionListQuery {
    pub user_id: i64,
    pub page: u64,
    pub limit: u64,
    pub action: Option<i32>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// A ledger row joined with the cached attributes of its pos.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub transaction: Transaction,
    /// `None` when the pos was never cached.
    pub pos: Option<PosSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPage {
    pub page: u64,
    pub limit: u64,
    pub entries: Vec<LedgerEntry>,
    /// Signed sum over the whole filtered window, not only this page.
    pub total_for_window: i64,
}

struct ListFilter {
    user_id: i64,
    action: Option<Action>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

trait ApplyListFilter: QueryFilter + Sized {
    fn apply_list_filter(self, filter: &ListFilter) -> Self;
}

impl<T> ApplyListFilter for T
where
    T: QueryFilter + Sized,
{
    fn apply_list_filter(mut self, filter: &ListFilter) -> Self {
        self = self
            .filter(transactions::Column::UserId.eq(filter.user_id))
            .filter(transactions::Column::OccurredAt.gte(filter.from))
            .filter(transactions::Column::OccurredAt.lt(filter.to));
        if let Some(action) = filter.action {
            self = self.filter(transactions::Column::Action.eq(action.as_i32()));
        }
        self
    }
}

fn parse_action(value: Option<i32>) -> ResultEngine<Option<Action>> {
    match value {
        None | Some(ACTION_ALL) => Ok(None),
        Some(code) => Action::try_from(code)
            .map(Some)
            .map_err(|_| EngineError::Validation("invalid-action")),
    }
}

/// Resolves the inclusive date range.
///
/// The window is `today` unless both bounds are given.
fn resolve_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> ResultEngine<(NaiveDate, NaiveDate)> {
    let (start, end) = match (start, end) {
        (Some(start), Some(end)) => (start, end),
        _ => (today, today),
    };
    if start > end {
        return Err(EngineError::Validation("invalid-date-range"));
    }
    Ok((start, end))
}

fn into_entry(
    (model, pos): (transactions::Model, Option<pos_cache::Model>),
) -> ResultEngine<LedgerEntry> {
    Ok(LedgerEntry {
        transaction: Transaction::try_from(model)?,
        pos: pos.map(PosSnapshot::from),
    })
}

impl Engine {
    fn list_filter(&self, query: &TransactionListQuery) -> ResultEngine<ListFilter> {
        require_id(query.user_id, "invalid-user-id")?;
        if query.page == 0 {
            return Err(EngineError::Validation("invalid-page"));
        }
        if query.limit == 0 {
            return Err(EngineError::Validation("invalid-limit"));
        }
        let action = parse_action(query.action)?;
        let start = dates::parse_optional_date(query.start_date.as_deref(), "invalid-start-date")?;
        let end = dates::parse_optional_date(query.end_date.as_deref(), "invalid-end-date")?;

        let tz = self.settings.timezone;
        let (start, end) = resolve_range(start, end, dates::today(self.now(), tz))?;
        let (from, to) = dates::window(start, end, tz)?;
        Ok(ListFilter {
            user_id: query.user_id,
            action,
            from,
            to,
        })
    }

    /// Lists a user's transactions, newest first, one page at a time.
    ///
    /// Ties on the timestamp are broken by `details` ascending, then by id
    /// descending. An empty page is reported as not found.
    pub async fn list_transactions(
        &self,
        query: &TransactionListQuery,
    ) -> ResultEngine<TransactionPage> {
        let filter = self.list_filter(query)?;
        let offset = (query.page - 1).saturating_mul(query.limit);

        let rows = transactions::Entity::find()
            .find_also_related(pos_cache::Entity)
            .apply_list_filter(&filter)
            .order_by_desc(transactions::Column::OccurredAt)
            .order_by_asc(transactions::Column::Details)
            .order_by_desc(transactions::Column::Id)
            .offset(offset)
            .limit(query.limit)
            .all(&self.database)
            .await?;
        if rows.is_empty() {
            return Err(EngineError::NotFound("transaction-not-found"));
        }
        let entries = rows
            .into_iter()
            .map(into_entry)
            .collect::<ResultEngine<Vec<_>>>()?;

        let total_for_window = transactions::Entity::find()
            .select_only()
            .column_as(transactions::signed_sum(), "total")
            .apply_list_filter(&filter)
            .into_tuple::<i64>()
            .one(&self.database)
            .await?
            .unwrap_or(0);

        Ok(TransactionPage {
            page: query.page,
            limit: query.limit,
            entries,
            total_for_window,
        })
    }

    /// Fetches one of a user's transactions with its cached pos attributes.
    pub async fn detail_transaction(
        &self,
        user_id: i64,
        transaction_id: i64,
    ) -> ResultEngine<LedgerEntry> {
        require_id(user_id, "invalid-user-id")?;
        require_id(transaction_id, "invalid-transaction-id")?;

        let row = transactions::Entity::find()
            .find_also_related(pos_cache::Entity)
            .filter(transactions::Column::Id.eq(transaction_id))
            .filter(transactions::Column::UserId.eq(user_id))
            .one(&self.database)
            .await?
            .ok_or(EngineError::NotFound("transaction-not-found"))?;
        into_entry(row)
    }
}
