use std::sync::Arc;

use agency_core::config::AgencyConfig;
use agency_core::{Store, SystemClock};
use agency_mail::{HttpMailer, LogMailer, Mailer};
use agency_scheduler::{JobLedger, RunStatus, SchedulerEngine};
use agency_store::SqliteStore;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "agency-worker")]
#[command(version, about = "Runs the agency scheduling jobs", long_about = None)]
struct Cli {
    /// Config file (default: AGENCY_CONFIG, then ~/.agency/agency.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler until Ctrl-C.
    Run,
    /// Run one job now, outside its schedule.
    Trigger {
        /// Job name, e.g. `renewal_tasks`.
        job: String,
    },
    /// List registered jobs and their next fire time.
    Jobs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "agency_worker=info,agency_jobs=info,agency_scheduler=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // explicit flag > AGENCY_CONFIG env > ~/.agency/agency.toml
    let config_path = cli.config.clone().or_else(|| std::env::var("AGENCY_CONFIG").ok());
    let config = AgencyConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        AgencyConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    agency_store::db::init_db(&db)?;
    agency_scheduler::db::init_db(&db)?;
    info!("database migrations complete");

    // store and ledger each get their own connection
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(open(db_path)?)?);
    let ledger = JobLedger::new(open(db_path)?)?;
    let mailer = build_mailer(&config);

    let mut engine = SchedulerEngine::new(ledger, Arc::new(SystemClock))
        .with_lock_ttl(chrono::Duration::seconds(config.scheduler.lock_ttl_secs as i64))
        .with_tick_interval(std::time::Duration::from_secs(config.scheduler.tick_secs.max(1)));
    if let Some(ref id) = config.scheduler.instance_id {
        engine = engine.with_instance_id(id.clone());
    }
    agency_jobs::register_jobs(&mut engine, &config, store, mailer)?;

    match cli.command {
        Command::Jobs => {
            for trigger in engine.list() {
                let next = trigger
                    .next_fire
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{:<22} {:<16} {:<18} {}",
                    trigger.name, trigger.expression, trigger.timezone, next
                );
            }
        }
        Command::Trigger { job } => {
            let outcome = engine.run_now(&job).await?;
            match outcome.report {
                Some(report) => println!("{job}: {} ({report})", outcome.status),
                None => println!("{job}: {}", outcome.status),
            }
            if let Some(err) = outcome.error {
                eprintln!("{job}: {err}");
            }
            if outcome.status != RunStatus::Completed {
                std::process::exit(1);
            }
        }
        Command::Run => {
            let engine = Arc::new(engine);
            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            let handle = tokio::spawn(Arc::clone(&engine).run(shutdown_rx));
            info!(instance = %engine.instance_id(), "agency worker running");

            tokio::signal::ctrl_c().await?;
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
            handle.await?;
        }
    }
    Ok(())
}

fn open(path: &str) -> rusqlite::Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open(path)?;
    conn.execute_batch("PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")?;
    Ok(conn)
}

/// HTTP transport when `mail.api_url` and `mail.api_key` are set, log-only otherwise.
fn build_mailer(config: &AgencyConfig) -> Arc<dyn Mailer> {
    match HttpMailer::from_config(&config.mail) {
        Ok(mailer) => {
            info!(from = %config.mail.from, "mail transport: http");
            Arc::new(mailer)
        }
        Err(e) => {
            warn!("mail transport not configured ({e}); digests will only be logged");
            Arc::new(LogMailer)
        }
    }
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
