#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Tender parser daemon: owns the embedded DB and runs parse tasks.

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Instant};

use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tender_daemon::config::DaemonConfig;
use tender_daemon::db::Db;
use tender_daemon::extract::BrowserExtractor;
use tender_daemon::http::{self, AppState};
use tender_daemon::manager::TaskManager;
use tender_daemon::sweep::spawn_sweeper;

#[derive(Parser, Debug)]
#[command(name = "tender-daemon")]
struct Args {
    /// Listen address, e.g. 127.0.0.1:8000
    #[arg(long, default_value = "127.0.0.1:8000")]
    listen: SocketAddr,

    /// Directory for embedded SurrealDB storage.
    #[arg(long, default_value = ".tender-parser/db")]
    db_dir: PathBuf,

    /// Maximum number of concurrently running parse tasks.
    #[arg(long, default_value_t = 10)]
    max_concurrent_tasks: usize,

    /// Retention horizon for finished tasks, in hours.
    #[arg(long, default_value_t = 24)]
    cleanup_hours: u64,

    /// Seconds between retention sweep passes.
    #[arg(long, default_value_t = 3_600)]
    cleanup_interval_seconds: u64,

    /// API key required on protected routes. Unset leaves the API open.
    #[arg(long)]
    api_key: Option<String>,

    /// Per-task browser extraction deadline in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    browser_timeout_ms: u64,

    /// Run the browser with a visible window.
    #[arg(long)]
    no_headless: bool,

    /// Log level (env-filter syntax).
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(args.log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = DaemonConfig {
        db_dir: args.db_dir,
        max_concurrent_tasks: args.max_concurrent_tasks,
        cleanup_hours: args.cleanup_hours,
        cleanup_interval_seconds: args.cleanup_interval_seconds,
        api_key: args.api_key,
        browser_timeout_ms: args.browser_timeout_ms,
        browser_headless: !args.no_headless,
    };

    if config.auth_enabled() {
        tracing::info!("api key auth enabled");
    } else {
        tracing::warn!("api key auth disabled, protected routes are open");
    }

    let db = Db::connect(&config.db_dir).await?;
    db.apply_schema().await?;

    let extractor = Arc::new(BrowserExtractor::new(&config));
    let manager = Arc::new(TaskManager::new(
        db.clone(),
        extractor,
        config.max_concurrent_tasks,
    ));

    // Reschedule pending work left behind by the previous run before we
    // start accepting new submissions.
    manager.recover().await?;

    spawn_sweeper(
        Arc::clone(&manager),
        config.cleanup_interval_seconds,
        config.cleanup_hours,
    );

    let state = AppState {
        manager,
        db,
        config: Arc::new(config),
        started: Instant::now(),
    };

    let app = http::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!(listen = %args.listen, "daemon starting");
    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
