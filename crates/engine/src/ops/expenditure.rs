use sea_orm::{ConnectionTrait, Statement};
use serde::{Deserialize, Serialize};

use crate::{Action, EngineError, ResultEngine, dates};

use super::{super::Engine, require_id};

/// Spend on a day compared with a reference day.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expenditure {
    pub today_total: i64,
    pub reference_total: i64,
    /// `(reference - today) / reference * 100`.
    pub percentage: f64,
}

impl Engine {
    /// Compares the decrease totals of `start_date` ("today") and
    /// `end_date` (the reference day).
    ///
    /// Both days are summed in a single pass over the ledger.
    pub async fn percentage_expenditure(
        &self,
        user_id: i64,
        start_date: &str,
        end_date: &str,
    ) -> ResultEngine<Expenditure> {
        require_id(user_id, "invalid-user-id")?;
        let today = dates::parse_date(start_date, "invalid-start-date")?;
        let reference = dates::parse_date(end_date, "invalid-end-date")?;

        let tz = self.settings.timezone;
        let (today_from, today_to) = dates::window(today, today, tz)?;
        let (reference_from, reference_to) = dates::window(reference, reference, tz)?;

        let stmt = Statement::from_sql_and_values(
            self.database.get_database_backend(),
            "SELECT \
               COALESCE(SUM(CASE WHEN occurred_at >= ? AND occurred_at < ? THEN total END), 0) AS today_total, \
               COUNT(CASE WHEN occurred_at >= ? AND occurred_at < ? THEN 1 END) AS today_rows, \
               COALESCE(SUM(CASE WHEN occurred_at >= ? AND occurred_at < ? THEN total END), 0) AS reference_total, \
               COUNT(CASE WHEN occurred_at >= ? AND occurred_at < ? THEN 1 END) AS reference_rows \
             FROM transactions \
             WHERE user_id = ? AND action = ?",
            vec![
                today_from.into(),
                today_to.into(),
                today_from.into(),
                today_to.into(),
                reference_from.into(),
                reference_to.into(),
                reference_from.into(),
                reference_to.into(),
                user_id.into(),
                Action::Decrease.as_i32().into(),
            ],
        );
        let row = self
            .database
            .query_one(stmt)
            .await?
            .ok_or(EngineError::NotFound("transaction-not-found"))?;

        let today_rows: i64 = row.try_get("", "today_rows")?;
        let reference_rows: i64 = row.try_get("", "reference_rows")?;
        if today_rows == 0 || reference_rows == 0 {
            return Err(EngineError::NotFound("transaction-not-found"));
        }
        let today_total: i64 = row.try_get("", "today_total")?;
        let reference_total: i64 = row.try_get("", "reference_total")?;

        Ok(Expenditure {
            today_total,
            reference_total,
            percentage: percentage_change(today_total, reference_total)?,
        })
    }
}

fn percentage_change(today_total: i64, reference_total: i64) -> ResultEngine<f64> {
    if reference_total == 0 {
        return Err(EngineError::Undefined("zero-reference-total"));
    }
    let reference = reference_total as f64;
    Ok((reference - today_total as f64) / reference * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spend_drop_is_positive() {
        assert_eq!(percentage_change(10_000, 100_000), Ok(90.0));
        assert_eq!(percentage_change(150, 100), Ok(-50.0));
    }

    #[test]
    fn zero_reference_is_undefined() {
        assert_eq!(
            percentage_change(10, 0),
            Err(EngineError::Undefined("zero-reference-total"))
        );
    }
}
