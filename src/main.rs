use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use servitor::banner::{BannerInfo, format_execution_order, print_banner, print_session_summary};
use servitor::config::SchedulerConfig;
use servitor::proxy::transaction::{TransactionProcessor, TransactionProxy, TransactionRequest};
use servitor::scheduler::Scheduler;

#[derive(Parser)]
#[command(
    name = "servitor",
    version,
    about = "Queue transactions on a single worker, highest priority first."
)]
struct Cli {
    /// Transactions as ID:AMOUNT[:PRIORITY] (defaults to a built-in example set)
    #[arg(value_name = "TRANSACTION")]
    transactions: Vec<TransactionRequest>,

    /// JSON scheduler config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulated processing time per transaction, in milliseconds
    #[arg(long, default_value_t = 200)]
    delay_ms: u64,

    /// Queue everything before the worker starts, so priorities decide the whole order
    #[arg(long, default_value_t = false)]
    batch: bool,

    /// Print the ledger as JSON after processing
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn example_transactions() -> Vec<TransactionRequest> {
    vec![
        TransactionRequest::new("T1001", 10_000, 10),
        TransactionRequest::new("T1002", 500, 1),
        TransactionRequest::new("T1003", 3_000, 5),
    ]
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SchedulerConfig::load(path)?,
        None => SchedulerConfig::default(),
    };
    if cli.batch {
        config.start_paused = true;
    }

    let config_label = cli
        .config
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());

    print_banner(&BannerInfo {
        worker: &config.worker_name,
        config: &config_label,
        mode: if config.start_paused { "batch" } else { "live" },
        processing_ms: cli.delay_ms,
        queue_limit: config.max_pending,
    });

    let scheduler = Scheduler::with_config(config)?;
    let proxy = TransactionProxy::new(
        scheduler.clone(),
        TransactionProcessor::new(Duration::from_millis(cli.delay_ms)),
    );

    let requests = if cli.transactions.is_empty() {
        example_transactions()
    } else {
        cli.transactions
    };

    let handles: Vec<_> = requests
        .iter()
        .map(|request| (request, proxy.submit(request)))
        .collect();

    println!(
        "queued {} transaction(s); the worker processes them while we wait...",
        handles.len()
    );

    if scheduler.is_paused() {
        scheduler.resume();
    }

    for (request, handle) in handles {
        match handle.get() {
            Ok(message) => println!("  [p{}] ✓ {}", request.priority, message),
            Err(e) => println!("  [p{}] ✗ {}", request.priority, e),
        }
    }

    let ledger = proxy.ledger().get()?;
    println!("\nexecution order: {}", format_execution_order(&ledger));
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&ledger)?);
    }

    print_session_summary(scheduler.stats());
    Ok(())
}
