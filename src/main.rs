use clap::Parser;
use loyalty_accrual::application::dispatcher::{IntakeConfig, OverflowPolicy, ReconciliationPipeline};
use loyalty_accrual::application::ledger::LedgerApplier;
use loyalty_accrual::application::orders::OrderService;
use loyalty_accrual::application::reconciler::PollPolicy;
use loyalty_accrual::application::withdrawals::BalanceService;
use loyalty_accrual::domain::ports::SharedStore;
use loyalty_accrual::infrastructure::accrual_http::{HttpAccrualOracle, OracleConfig};
use loyalty_accrual::infrastructure::in_memory::InMemoryStore;
use loyalty_accrual::interfaces::http::auth::JwtVerifier;
use loyalty_accrual::interfaces::http::{AppState, router};
use loyalty_accrual::telemetry;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address the HTTP server listens on
    #[arg(long, env = "RUN_ADDRESS", default_value = "localhost:8080")]
    run_address: String,

    /// Base URL of the accrual service
    #[arg(long, env = "ACCRUAL_SYSTEM_ADDRESS")]
    accrual_address: String,

    /// Path to persistent database (optional). Requires the `storage-rocksdb` feature.
    #[arg(long, env = "DATABASE_PATH")]
    db_path: Option<PathBuf>,

    /// HS256 secret used to verify user tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: String,

    /// Delay between accrual polls for one order
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 10_000)]
    poll_interval_ms: u64,

    /// Give up on an order this long after its task started
    #[arg(long, env = "DEADLINE_MS", default_value_t = 120_000)]
    deadline_ms: u64,

    /// Maximum accrual polls per order
    #[arg(long, env = "MAX_ATTEMPTS", default_value_t = 12)]
    max_attempts: u32,

    /// Timeout for a single accrual request
    #[arg(long, env = "ORACLE_TIMEOUT_MS", default_value_t = 5_000)]
    oracle_timeout_ms: u64,

    /// Capacity of the intake queue
    #[arg(long, env = "QUEUE_CAPACITY", default_value_t = 6)]
    queue_capacity: usize,

    /// What a submission does when the intake queue is full
    #[arg(long, env = "OVERFLOW_POLICY", value_enum, default_value_t = OverflowPolicy::Block)]
    overflow_policy: OverflowPolicy,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_json);

    let store = open_store(cli.db_path)?;

    let base_url = if cli.accrual_address.contains("://") {
        cli.accrual_address
    } else {
        format!("http://{}", cli.accrual_address)
    };
    let oracle = HttpAccrualOracle::new(
        OracleConfig::default()
            .with_base_url(base_url)
            .with_timeout(Duration::from_millis(cli.oracle_timeout_ms)),
    )
    .into_diagnostic()?;

    let pipeline = ReconciliationPipeline::start(
        IntakeConfig {
            capacity: cli.queue_capacity,
            overflow: cli.overflow_policy,
        },
        PollPolicy {
            interval: Duration::from_millis(cli.poll_interval_ms),
            deadline: Duration::from_millis(cli.deadline_ms),
            max_attempts: cli.max_attempts,
        },
        Arc::new(oracle),
        LedgerApplier::new(store.clone()),
    );

    let state = AppState {
        orders: OrderService::new(store.clone(), pipeline.intake()),
        balances: BalanceService::new(store),
        jwt: JwtVerifier::new(&cli.jwt_secret),
    };

    let listener = tokio::net::TcpListener::bind(&cli.run_address)
        .await
        .into_diagnostic()?;
    info!(address = %cli.run_address, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;

    let report = pipeline.shutdown().await.into_diagnostic()?;
    info!(
        credited = report.credited,
        invalidated = report.invalidated,
        given_up = report.given_up,
        cancelled = report.cancelled,
        dropped = report.dropped,
        "shutdown complete"
    );
    Ok(())
}

fn open_store(db_path: Option<PathBuf>) -> Result<SharedStore> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            use loyalty_accrual::infrastructure::rocksdb::RocksDbStore;
            info!(path = %path.display(), "using RocksDB store");
            Ok(Arc::new(RocksDbStore::open(path).into_diagnostic()?))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(path) => {
            tracing::warn!(
                path = %path.display(),
                "built without storage-rocksdb, falling back to in-memory store"
            );
            Ok(Arc::new(InMemoryStore::new()))
        }
        None => Ok(Arc::new(InMemoryStore::new())),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
