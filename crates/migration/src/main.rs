use sea_orm::Database;
use sea_orm_migration::prelude::*;

const DEFAULT_DATABASE_URL: &str = "sqlite:./ledger.db?mode=rwc";

fn database_url() -> String {
    ["LEDGER__DATABASE__URL", "DATABASE_URL"]
        .iter()
        .find_map(|key| std::env::var(key).ok())
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cmd = std::env::args().nth(1).unwrap_or_else(|| "up".to_string());
    let db = Database::connect(database_url()).await?;

    match cmd.as_str() {
        "up" => migration::Migrator::up(&db, None).await?,
        "down" => migration::Migrator::down(&db, Some(1)).await?,
        "refresh" => migration::Migrator::refresh(&db).await?,
        "fresh" => migration::Migrator::fresh(&db).await?,
        "status" => migration::Migrator::status(&db).await?,
        other => {
            eprintln!("unknown command: {other}");
            eprintln!("Usage: cargo run -p migration -- [up|down|refresh|fresh|status]");
            std::process::exit(2);
        }
    }

    Ok(())
}
