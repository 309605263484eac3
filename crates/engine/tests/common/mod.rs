#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{Database, DatabaseConnection};

use engine::{
    CreateTransactionCmd, Engine, LedgerSettings,
    testing::{MemoryBalanceService, MemoryPosService},
};
use migration::MigratorTrait;

pub const USER: i64 = 1;
pub const OTHER_USER: i64 = 2;
pub const POS: i64 = 10;
pub const OTHER_POS: i64 = 11;

pub const INCREASE: i32 = 0;
pub const DECREASE: i32 = 1;
pub const CASH: i32 = 0;
pub const TRANSFER: i32 = 1;

pub struct Harness {
    pub engine: Engine,
    pub db: DatabaseConnection,
    pub pos: Arc<MemoryPosService>,
    pub balance: Arc<MemoryBalanceService>,
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).single().unwrap()
}

/// Pinned "now" of every harness: 2024-05-10 12:00 UTC.
pub fn now() -> DateTime<Utc> {
    at(2024, 5, 10, 12, 0)
}

pub async fn harness() -> Harness {
    harness_with(LedgerSettings::default()).await
}

pub async fn memory_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    db
}

pub async fn harness_with(settings: LedgerSettings) -> Harness {
    let db = memory_db().await;

    let pos = Arc::new(
        MemoryPosService::new()
            .with_pos(POS, USER, "Groceries")
            .with_pos(OTHER_POS, USER, "Salary"),
    );
    let balance = Arc::new(MemoryBalanceService::new());
    let engine = Engine::builder()
        .database(db.clone())
        .pos_service(pos.clone())
        .balance_service(balance.clone())
        .settings(settings)
        .clock(Arc::new(now))
        .build()
        .await
        .unwrap();

    Harness {
        engine,
        db,
        pos,
        balance,
    }
}

pub fn cmd(total: i64, action: i32, payment_type: i32) -> CreateTransactionCmd {
    CreateTransactionCmd {
        user_id: USER,
        pos_id: POS,
        total,
        details: "coffee".to_string(),
        action,
        payment_type,
        occurred_at: None,
    }
}
