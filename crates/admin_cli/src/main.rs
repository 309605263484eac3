use std::{error::Error, sync::Arc, time::Duration};

use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use engine::{Adjustment, AdjustmentTarget, Engine, LedgerSettings, OutboxStatus, Reconciliation};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use upstream::{HttpBalanceClient, HttpPosClient};

#[derive(Parser, Debug)]
#[command(name = "ledger_admin")]
#[command(about = "Operator utilities for the ledger (outbox, reconciliation)")]
struct Cli {
    /// Database connection string (also read from `LEDGER__DATABASE__URL`).
    #[arg(
        long,
        env = "LEDGER__DATABASE__URL",
        default_value = "sqlite:./ledger.db?mode=rwc"
    )]
    database_url: String,

    #[arg(long, env = "LEDGER__UPSTREAM__POS_URL")]
    pos_url: String,

    #[arg(long, env = "LEDGER__UPSTREAM__BALANCE_URL")]
    balance_url: String,

    #[arg(long, env = "LEDGER__UPSTREAM__TIMEOUT_MS", default_value_t = 5000)]
    timeout_ms: u64,

    /// IANA timezone the ledger evaluates days in.
    #[arg(long, env = "LEDGER__LEDGER__TIMEZONE", default_value = "UTC", value_parser = parse_timezone)]
    timezone: Tz,

    #[arg(long, env = "LEDGER__LEDGER__MAX_ATTEMPTS", default_value_t = 10)]
    max_attempts: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Outbox(Outbox),
    Reconcile(Reconcile),
}

#[derive(Args, Debug)]
struct Outbox {
    #[command(subcommand)]
    command: OutboxCommand,
}

#[derive(Subcommand, Debug)]
enum OutboxCommand {
    /// Show outbox entries, oldest first.
    List(OutboxListArgs),
    /// Deliver pending entries now.
    Dispatch(OutboxDispatchArgs),
    /// Move a failed entry back to pending.
    Requeue(OutboxRequeueArgs),
}

#[derive(Args, Debug)]
struct OutboxListArgs {
    #[arg(long, value_parser = parse_status)]
    status: Option<OutboxStatus>,
    #[arg(long, default_value_t = 50)]
    limit: u64,
}

#[derive(Args, Debug)]
struct OutboxDispatchArgs {
    #[arg(long, default_value_t = 100)]
    batch: u64,
}

#[derive(Args, Debug)]
struct OutboxRequeueArgs {
    id: i64,
}

#[derive(Args, Debug)]
struct Reconcile {
    #[command(subcommand)]
    command: ReconcileCommand,
}

#[derive(Subcommand, Debug)]
enum ReconcileCommand {
    /// Recompute a pos total from the ledger.
    Pos { pos_id: i64 },
    /// Recompute a user balance (`0` cash, `1` transfer) from the ledger.
    Balance { user_id: i64, payment_type: i32 },
}

fn parse_status(raw: &str) -> Result<OutboxStatus, String> {
    OutboxStatus::try_from(raw).map_err(|_| format!("unknown outbox status: {raw}"))
}

fn parse_timezone(raw: &str) -> Result<Tz, String> {
    raw.parse::<Tz>().map_err(|err| err.to_string())
}

fn describe(target: AdjustmentTarget) -> String {
    match target {
        AdjustmentTarget::Pos { pos_id } => format!("pos {pos_id}"),
        AdjustmentTarget::Balance {
            user_id,
            payment_type,
        } => format!("balance {user_id}/{}", payment_type.as_i32()),
    }
}

fn print_entry(entry: &Adjustment) {
    println!(
        "{:>6}  tx {:<6} {:<16} {:>12}  {:<10} attempts={} {}",
        entry.id,
        entry.transaction_id,
        describe(entry.target),
        entry.amount,
        entry.status.as_str(),
        entry.attempts,
        entry.last_error.as_deref().unwrap_or(""),
    );
}

fn print_reconciliation(what: &str, result: Reconciliation) {
    println!(
        "{what}: expected {} observed {} correction {}",
        result.expected, result.observed, result.correction
    );
}

async fn connect_db(
    database_url: &str,
) -> Result<DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    let db = connect_db(&cli.database_url).await?;
    let timeout = Duration::from_millis(cli.timeout_ms);
    let engine = Engine::builder()
        .database(db)
        .pos_service(Arc::new(HttpPosClient::new(&cli.pos_url, timeout)?))
        .balance_service(Arc::new(HttpBalanceClient::new(&cli.balance_url, timeout)?))
        .settings(LedgerSettings {
            timezone: cli.timezone,
            max_attempts: cli.max_attempts,
        })
        .build()
        .await?;

    match cli.command {
        Command::Outbox(Outbox {
            command: OutboxCommand::List(args),
        }) => {
            let entries = engine.outbox_entries(args.status, args.limit).await?;
            if entries.is_empty() {
                println!("no outbox entries");
            }
            for entry in &entries {
                print_entry(entry);
            }
        }
        Command::Outbox(Outbox {
            command: OutboxCommand::Dispatch(args),
        }) => {
            let report = engine.dispatch_pending(args.batch).await?;
            println!(
                "applied {} retrying {} failed {}",
                report.applied, report.retrying, report.failed
            );
        }
        Command::Outbox(Outbox {
            command: OutboxCommand::Requeue(args),
        }) => match engine.requeue_adjustment(args.id).await {
            Ok(entry) => print_entry(&entry),
            Err(err) => {
                eprintln!("cannot requeue {}: {}", args.id, err.code());
                std::process::exit(1);
            }
        },
        Command::Reconcile(Reconcile {
            command: ReconcileCommand::Pos { pos_id },
        }) => match engine.reconcile_pos(pos_id).await {
            Ok(result) => print_reconciliation(&format!("pos {pos_id}"), result),
            Err(err) => {
                eprintln!("cannot reconcile pos {pos_id}: {err}");
                std::process::exit(1);
            }
        },
        Command::Reconcile(Reconcile {
            command:
                ReconcileCommand::Balance {
                    user_id,
                    payment_type,
                },
        }) => match engine.reconcile_balance(user_id, payment_type).await {
            Ok(result) => print_reconciliation(
                &format!("balance {user_id}/{payment_type}"),
                result,
            ),
            Err(err) => {
                eprintln!("cannot reconcile balance {user_id}/{payment_type}: {err}");
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
