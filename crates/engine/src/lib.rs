use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use sea_orm::DatabaseConnection;

pub use error::EngineError;
pub use ops::{
    ACTION_ALL, CreateTransactionCmd, DispatchReport, Expenditure, LedgerEntry, Reconciliation,
    TransactionListQuery, TransactionPage,
};
pub use outbox::{Adjustment, AdjustmentPhase, AdjustmentTarget, OutboxStatus};
pub use pos_cache::PosSnapshot;
pub use transactions::{Action, PaymentType, Transaction};
pub use upstream::{BalanceAdjusted, BalanceService, Collaborator, PosService, UpstreamError};

mod dates;
mod error;
mod ops;
mod outbox;
mod pos_cache;
pub mod testing;
mod transactions;
mod upstream;

type ResultEngine<T> = Result<T, EngineError>;

/// Source of "now"; replaced in tests to pin the calendar.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Ledger-wide knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedgerSettings {
    /// Timezone "today" and day windows are evaluated in.
    pub timezone: Tz,
    /// Delivery attempts before a retryable adjustment is dead-lettered.
    pub max_attempts: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            max_attempts: 10,
        }
    }
}

pub struct Engine {
    database: DatabaseConnection,
    pos: Arc<dyn PosService>,
    balance: Arc<dyn BalanceService>,
    settings: LedgerSettings,
    clock: Clock,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("database", &self.database)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn settings(&self) -> LedgerSettings {
        self.settings
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    pos: Option<Arc<dyn PosService>>,
    balance: Option<Arc<dyn BalanceService>>,
    settings: LedgerSettings,
    clock: Option<Clock>,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Pass the required pos service client
    pub fn pos_service(mut self, pos: Arc<dyn PosService>) -> EngineBuilder {
        self.pos = Some(pos);
        self
    }

    /// Pass the required balance service client
    pub fn balance_service(mut self, balance: Arc<dyn BalanceService>) -> EngineBuilder {
        self.balance = Some(balance);
        self
    }

    pub fn settings(mut self, settings: LedgerSettings) -> EngineBuilder {
        self.settings = settings;
        self
    }

    pub fn clock(mut self, clock: Clock) -> EngineBuilder {
        self.clock = Some(clock);
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        let pos = self
            .pos
            .ok_or(EngineError::Misconfigured("missing pos service"))?;
        let balance = self
            .balance
            .ok_or(EngineError::Misconfigured("missing balance service"))?;
        if self.settings.max_attempts == 0 {
            return Err(EngineError::Misconfigured("max_attempts must be > 0"));
        }
        Ok(Engine {
            database: self.database,
            pos,
            balance,
            settings: self.settings,
            clock: self.clock.unwrap_or_else(system_clock),
        })
    }
}
