use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::BufReader;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ratewindow::config::RateWindowConfig;
use ratewindow::console::run_console;
use ratewindow::store::{InMemoryStore, RedisStore, SharedOrderedStore};
use ratewindow::{AdmissionMode, SlidingWindowLimiter};

/// Interactive sliding-window rate limiter: one decision per input line.
#[derive(Debug, Parser)]
#[command(name = "ratewindow", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Store URL (`redis://...` or `memory://`)
    #[arg(long)]
    store_url: Option<String>,

    /// Label of the rate-limited resource
    #[arg(long)]
    label: Option<String>,

    /// Maximum admitted events per window
    #[arg(long)]
    max_requests: Option<u64>,

    /// Window width in seconds
    #[arg(long)]
    window_seconds: Option<u64>,

    /// Admission mode
    #[arg(long, value_enum)]
    mode: Option<AdmissionMode>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn apply(&self, config: &mut RateWindowConfig) {
        if let Some(url) = &self.store_url {
            config.store.url = url.clone();
        }
        if let Some(mode) = self.mode {
            config.store.admission_mode = mode;
        }
        if let Some(label) = &self.label {
            config.limiter.label = label.clone();
        }
        if let Some(max) = self.max_requests {
            config.limiter.max_request_count = max;
        }
        if let Some(window) = self.window_seconds {
            config.limiter.window_seconds = window;
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run(args));
    // Stdin is read on a blocking pool thread that cannot be interrupted;
    // dropping the runtime normally would wait for the next line.
    runtime.shutdown_background();
    result
}

async fn run(args: Args) -> anyhow::Result<()> {
    info!("Starting ratewindow");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = RateWindowConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    let policy = config.limiter.policy()?;
    info!(
        store = %config.store.url,
        label = %config.limiter.label,
        max_request_count = policy.max_request_count(),
        window_seconds = policy.window_seconds(),
        mode = ?config.store.admission_mode,
        "Configuration loaded"
    );

    let store: Arc<dyn SharedOrderedStore> = if config.store.is_memory() {
        Arc::new(InMemoryStore::new())
    } else {
        Arc::new(RedisStore::connect(&config.store.url).await?)
    };

    let limiter = SlidingWindowLimiter::new(config.limiter.label.clone(), policy, store)
        .with_mode(config.store.admission_mode);
    info!("Rate limiter initialized; one decision per input line, empty line or `quit` to exit");

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    let summary = run_console(&limiter, stdin, stdout, shutdown_signal()).await?;
    info!(
        passed = summary.passed,
        limited = summary.limited,
        errors = summary.errors,
        "Console session finished"
    );

    info!("Ratewindow stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
