use std::sync::Arc;

use sea_orm::Database;
use tokio::sync::watch;
use tracing::info;

use verimail_core::tracing::init_tracing;
use verimail_verification::config::VerificationConfig;
use verimail_verification::domain::clock::SystemClock;
use verimail_verification::domain::metrics::{CounterMetrics, PipelineMetrics};
use verimail_verification::infra::db::DbOutboxStore;
use verimail_verification::infra::publisher::HttpPublisher;
use verimail_verification::router::build_router;
use verimail_verification::state::AppState;
use verimail_verification::usecase::outbox::OutboxProcessor;
use verimail_verification::worker::OutboxWorker;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = VerificationConfig::from_env().expect("invalid configuration");

    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let publisher = HttpPublisher::new(
        config.publisher_url.clone(),
        config.publisher_auth_token.clone(),
        config.outbox.publish_timeout,
    )
    .expect("failed to build publisher client");

    let metrics: Arc<dyn PipelineMetrics> = Arc::new(CounterMetrics);

    let worker = OutboxWorker::new(OutboxProcessor {
        store: DbOutboxStore { db: db.clone() },
        publisher,
        config: config.outbox.clone(),
        metrics: metrics.clone(),
        clock: Arc::new(SystemClock),
    });
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    let state = AppState {
        db,
        token_ttl: config.token_ttl,
        metrics,
    };

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    info!("verification service listening on {addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "outbox worker task failed");
    }
    info!("verification service stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
