use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::header;
use changeset_stats::config::Config;
use changeset_stats::logging::{init_tracing, LogConfig};
use changeset_stats::routes::build_router;
use changeset_stats::source::HttpChangesetSource;
use changeset_stats::state::AppState;
use changeset_stats::store::Store;
use changeset_stats::workers::{BatchScheduler, WorkerManager};
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    init_tracing(&LogConfig::from(&config));
    tracing::info!(source = %config.source.base_url, "Starting changeset-stats");

    let store = Arc::new(Store::open(&config.sled_path).expect("Failed to open sled database"));
    store.run_migrations().expect("Failed to run migrations");

    let source =
        Arc::new(HttpChangesetSource::new(&config.source).expect("Failed to build HTTP client"));
    let scheduler = Arc::new(BatchScheduler::new(store.clone(), source));

    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    if config.harvest.run_on_start {
        let batch = scheduler.clone();
        let user_ids = config.harvest.user_ids();
        let limit = config.harvest.concurrency_limit;
        tokio::spawn(async move {
            let report = batch.run(&user_ids, limit).await;
            tracing::info!(
                succeeded = report.succeeded,
                empty = report.empty,
                failed = report.failed,
                "Startup harvest finished"
            );
        });
    }

    let worker_manager = WorkerManager::new(
        scheduler.clone(),
        shutdown_tx.subscribe(),
        &config.worker,
        &config.harvest,
    );
    let worker_handle = tokio::spawn(async move {
        if let Err(e) = worker_manager.start().await {
            tracing::error!(error = %e, "Worker manager failed");
        }
    });

    let state = AppState::new(store.clone(), scheduler, &config);

    let app = build_router(state)
        .layer(build_cors_layer(&config))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new());

    let addr = SocketAddr::new(config.host, config.port);
    tracing::info!(%addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");

    let server_future =
        axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()));

    // A panicking worker is logged; the lookup server keeps running.
    tokio::spawn(async move {
        match worker_handle.await {
            Err(e) => tracing::error!(error = %e, "Worker task panicked, HTTP server continues"),
            Ok(()) => tracing::info!("Worker manager exited normally"),
        }
    });

    if let Err(e) = server_future.await {
        tracing::error!(error = %e, "HTTP server crashed");
    }

    tracing::info!("Flushing store before exit");
    if let Err(e) = store.flush() {
        tracing::error!(error = %e, "Failed to flush store before exit");
    }
    tracing::info!("Shutdown complete");
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    if config.cors_origin.trim() == "*" {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_credentials(false)
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
            .allow_methods(Any);
    }

    match config.cors_origin.parse::<axum::http::HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
            .allow_methods(Any),
        Err(e) => {
            panic!(
                "FATAL: Invalid CORS_ORIGIN '{}': {}. \
                 Fix the CORS_ORIGIN environment variable.",
                config.cors_origin, e
            );
        }
    }
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
