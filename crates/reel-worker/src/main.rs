//! Short-video worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reel_db::{JobRepository, PgJobRepository};
use reel_worker::{metrics, Orchestrator, Pipeline, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("reel=info".parse().expect("valid directive"))
        .add_directive("sqlx=warn".parse().expect("valid directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting reel-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        match metrics::start_exporter(port) {
            Ok(()) => info!("Metrics listening on port {}", port),
            Err(e) => error!("Failed to start metrics exporter: {}", e),
        }
    }

    let repo: Arc<dyn JobRepository> = match PgJobRepository::from_env().await {
        Ok(repo) => Arc::new(repo),
        Err(e) => {
            error!("Failed to connect to job store: {}", e);
            std::process::exit(1);
        }
    };

    let pipeline = match Pipeline::from_env(&config, Arc::clone(&repo)).await {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to build pipeline: {}", e);
            std::process::exit(1);
        }
    };

    let orchestrator = Orchestrator::new(repo, Arc::new(pipeline), config.max_concurrent_jobs);

    // Setup signal handlers
    let signal_target = Arc::clone(&orchestrator);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        signal_target.shutdown();
    });

    if let Err(e) = orchestrator.run(&config).await {
        error!("Orchestrator error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
