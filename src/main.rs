use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracktrove::application::lifecycle::{Adapters, LifecycleService};
use tracktrove::config::LifecycleConfig;
use tracktrove::domain::ports::{LedgerStoreRef, TraceStoreRef, TransactionStoreRef};
use tracktrove::infrastructure::in_memory::{
    InMemoryLedgerStore, InMemoryTraceStore, InMemoryTransactionStore, InMemoryWorkQueue,
};
use tracktrove::infrastructure::notifier::LogNotifier;
#[cfg(feature = "storage-rocksdb")]
use tracktrove::infrastructure::rocksdb::RocksDBStore;
use tracktrove::infrastructure::simulator::RandomOutcome;
use tracktrove::infrastructure::timer::DisabledEscrowTimer;
use tracktrove::interfaces::csv::report_writer::{ReportRow, ReportWriter};
use tracktrove::interfaces::csv::request_reader::RequestReader;
use tracktrove::logging::init_logging;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input CSV of initiation requests
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Number of passes over the escrow, retry and settlement jobs
    #[arg(long, default_value_t = 5)]
    rounds: u32,

    /// Overrides the retry limit from the environment
    #[arg(long)]
    max_retries: Option<u32>,

    /// Push every INITIATED transaction onto the work queue before the rounds
    #[arg(long)]
    backfill: bool,

    /// Bounded wait for each work-queue dequeue, in milliseconds. Everything is
    /// queued before the rounds start, so no wait is needed by default.
    #[arg(long, default_value_t = 0)]
    queue_poll_ms: u64,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

type Stores = (TransactionStoreRef, LedgerStoreRef, TraceStoreRef);

fn in_memory_stores() -> Stores {
    (
        Arc::new(InMemoryTransactionStore::new()),
        Arc::new(InMemoryLedgerStore::new()),
        Arc::new(InMemoryTraceStore::new()),
    )
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    match db_path {
        Some(path) => {
            let store = RocksDBStore::open(path).into_diagnostic()?;
            Ok((
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                Arc::new(store),
            ))
        }
        None => Ok(in_memory_stores()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_stores())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs);

    let mut config = LifecycleConfig::from_env().into_diagnostic()?;
    if let Some(max_retries) = cli.max_retries {
        config.max_retries = max_retries;
    }
    config.queue_poll_timeout = Duration::from_millis(cli.queue_poll_ms);

    let (transactions, ledger, traces) = open_stores(cli.db_path)?;
    let service = LifecycleService::new(
        Adapters {
            transactions,
            ledger,
            traces,
            notifier: Arc::new(LogNotifier),
            // Batch runs have no long-lived listener; the sweep escrows instead.
            timer: Arc::new(DisabledEscrowTimer),
            queue: Arc::new(InMemoryWorkQueue::new()),
            simulator: Arc::new(RandomOutcome),
        },
        config,
    );

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = RequestReader::new(file);
    for request in reader.requests() {
        match request {
            Ok(request) => {
                if let Err(e) = service.initiate(request).await {
                    eprintln!("Error initiating transaction: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading request: {}", e);
            }
        }
    }

    if cli.backfill {
        service.enqueue_initiated().await.into_diagnostic()?;
    }

    for _ in 0..cli.rounds {
        service.run_round().await.into_diagnostic()?;
    }

    let mut rows = Vec::new();
    for tx in service.list().await.into_diagnostic()? {
        let ledger_entries = service.ledger_for(tx.id).await.into_diagnostic()?.len();
        rows.push(ReportRow::new(&tx, ledger_entries));
    }

    let stdout = io::stdout();
    let mut writer = ReportWriter::new(stdout.lock());
    writer.write_rows(rows).into_diagnostic()?;

    Ok(())
}
