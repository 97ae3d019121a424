use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use maintenance_anchor::chain::{InMemoryLedger, LedgerClient, RpcLedgerClient};
use maintenance_anchor::config::AppConfig;
use maintenance_anchor::error::Result;
use maintenance_anchor::reconcile::ReconcileOperation;
use maintenance_anchor::server::{self, AppState};
use maintenance_anchor::service::AnchorService;
use maintenance_anchor::state::{Database, InMemoryRecordStore, PgRecordStore, RecordStore};

#[derive(Parser)]
#[command(name = "maintenance-anchor")]
#[command(about = "Tamper-evidence anchoring and reconciliation for vehicle service records")]
#[command(version)]
struct Cli {
    /// Ledger backend
    #[arg(long, value_enum, default_value_t = LedgerBackend::Rpc, global = true)]
    ledger: LedgerBackend,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LedgerBackend {
    /// JSON-RPC node from RPC_URL
    Rpc,
    /// Process-local ledger, for development
    Memory,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and periodic reconciliation
    Serve,
    /// Anchor one record
    Anchor { id: Uuid },
    /// Resend a failed or lost anchor
    Resend { id: Uuid },
    /// Show the external anchoring status of a record
    Status { id: Uuid },
    /// Check integrity of one record, or of every confirmed record
    Verify { id: Option<Uuid> },
    /// Run one reconciliation batch
    Reconcile {
        #[arg(value_enum)]
        operation: ReconcileOperation,
    },
    /// Check ledger and network health
    Diagnose,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "maintenance-anchor failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::from_env()?;

    let ledger: Arc<dyn LedgerClient> = match cli.ledger {
        LedgerBackend::Rpc => Arc::new(RpcLedgerClient::connect(config.ledger.clone()).await),
        LedgerBackend::Memory => {
            warn!("Using in-memory ledger; anchors do not outlive this process");
            Arc::new(InMemoryLedger::new())
        }
    };

    let store: Arc<dyn RecordStore> = match &config.database_url {
        Some(url) => {
            let db = Database::connect(url).await?;
            db.migrate().await?;
            Arc::new(PgRecordStore::new(db))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory record store");
            Arc::new(InMemoryRecordStore::new())
        }
    };

    let service = Arc::new(
        AnchorService::new(
            ledger,
            store,
            config.submitter.clone(),
            config.reconcile.clone(),
        )
        .with_mode(config.anchor_mode),
    );

    match cli.command {
        Commands::Serve => {
            let (stop_tx, stop_rx) = watch::channel(false);
            let reconciler = service.reconciler().clone();
            let interval = config.reconcile.interval;
            let periodic =
                tokio::spawn(async move { reconciler.run_periodic(interval, stop_rx).await });

            let shutdown = async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Failed to listen for shutdown signal");
                }
                info!("Shutting down");
                let _ = stop_tx.send(true);
            };

            server::serve(AppState { service }, config.listen_addr, shutdown).await?;
            if let Err(e) = periodic.await {
                warn!(error = %e, "Periodic reconciliation task ended abnormally");
            }
        }
        Commands::Anchor { id } => print_json(&service.submit_service_to_blockchain(id).await)?,
        Commands::Resend { id } => print_json(&service.resend(id).await?)?,
        Commands::Status { id } => print_json(&service.get_service_status(id).await?)?,
        Commands::Verify { id: Some(id) } => {
            print_json(&service.verify_service_integrity(id).await?)?
        }
        Commands::Verify { id: None } => print_json(&service.verify_all_services_integrity().await?)?,
        Commands::Reconcile { operation } => print_json(&service.reconcile(operation).await?)?,
        Commands::Diagnose => print_json(&service.diagnose().await)?,
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
