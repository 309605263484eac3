use std::sync::Arc;

use engine::Engine;
use migration::{Migrator, MigratorTrait};
use upstream::{HttpBalanceClient, HttpPosClient};

mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;
    let mut tasks = tokio::task::JoinSet::new();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "ledger={level},server={level},engine={level},upstream={level}",
            level = settings.app.level
        ))
        .init();

    let db = connect_database(&settings.database.url).await?;
    let timeout = settings.upstream.timeout();
    let engine = Engine::builder()
        .database(db)
        .pos_service(Arc::new(HttpPosClient::new(
            &settings.upstream.pos_url,
            timeout,
        )?))
        .balance_service(Arc::new(HttpBalanceClient::new(
            &settings.upstream.balance_url,
            timeout,
        )?))
        .settings(settings.ledger.engine_settings()?)
        .build()
        .await?;
    let engine = Arc::new(engine);
    tracing::info!(
        timezone = %engine.settings().timezone,
        max_attempts = engine.settings().max_attempts,
        "ledger engine ready"
    );

    let bind = settings.server.bind.clone();
    let server_engine = engine.clone();
    tasks.spawn(async move {
        server::run(server_engine, &bind).await;
    });

    let interval = settings.ledger.dispatch_interval();
    let batch = settings.ledger.dispatch_batch;
    tasks.spawn(async move {
        dispatch_loop(engine, interval, batch).await;
    });

    while tasks.join_next().await.is_some() {
        tasks.shutdown().await;
    }

    Ok(())
}

/// Periodically retries adjustments left pending by a collaborator outage.
async fn dispatch_loop(engine: Arc<Engine>, interval: std::time::Duration, batch: u64) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match engine.dispatch_pending(batch).await {
            Ok(report) if report.is_empty() => {}
            Ok(report) => tracing::info!(
                applied = report.applied,
                retrying = report.retrying,
                failed = report.failed,
                "outbox sweep"
            ),
            Err(err) => tracing::error!("outbox sweep failed: {err}"),
        }
    }
}

async fn connect_database(
    url: &str,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
