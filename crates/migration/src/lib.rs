pub use sea_orm_migration::prelude::*;

mod m20260901_000000_ledger;
mod m20260915_000000_adjustment_outbox;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260901_000000_ledger::Migration),
            Box::new(m20260915_000000_adjustment_outbox::Migration),
        ]
    }
}
