//! CRM reporting service.
//!
//! Serves the report HTTP API and turns inbound domain events into reports.

use anyhow::Context;
use reporting_postgres::PostgresReportStore;
use reporting_redis::RedisCacheStore;
use reporting_redpanda::RedpandaEventBus;
use reporting_runtime::{
    IngestionHandler, IngestionWorker, MetricsServer, PrometheusTelemetry, ReportLifecycle,
};
use reporting_server::{Config, HttpSalesClient, LogFormat};
use reporting_web::{AppState, router};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.server.log_format);

    info!("Starting CRM reporting service");
    info!(
        redis_url = %config.redis.url,
        redpanda_brokers = %config.redpanda.brokers,
        sales_base_url = %config.sales.base_url,
        ingest_topics = ?config.redpanda.ingest_topics,
        "Configuration loaded"
    );

    // Metrics
    let mut metrics_server = MetricsServer::new();
    if config.server.metrics_enabled {
        metrics_server
            .start()
            .context("Failed to install metrics recorder")?;
    }

    // Primary store
    info!("Connecting to report store...");
    let store = PostgresReportStore::connect(&config.postgres.url, config.postgres.max_connections)
        .await
        .context("Failed to connect to PostgreSQL")?;
    if config.postgres.run_migrations {
        store.migrate().await.context("Failed to run migrations")?;
        info!("Migrations applied");
    }
    info!("Report store connected");

    // Cache
    info!("Connecting to cache...");
    let mut cache = RedisCacheStore::new(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;
    if let Some(ttl) = config.redis.ttl() {
        cache = cache.with_ttl(ttl);
    }
    info!("Cache connected");

    // Event bus
    info!("Connecting to Redpanda event bus...");
    let event_bus = RedpandaEventBus::builder()
        .brokers(&config.redpanda.brokers)
        .consumer_group(&config.redpanda.consumer_group)
        .build()
        .context("Failed to create event bus")?;
    info!("Event bus connected");

    let mut builder = ReportLifecycle::builder()
        .store(Arc::new(store))
        .cache(Arc::new(cache))
        .events(Arc::new(event_bus))
        .sales(Arc::new(HttpSalesClient::new(&config.sales.base_url)))
        .config(config.to_lifecycle_config());
    if config.server.metrics_enabled {
        builder = builder.telemetry(Arc::new(PrometheusTelemetry));
    }
    let lifecycle = builder.build().context("Failed to build report lifecycle")?;

    // Ingestion workers
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = Vec::with_capacity(config.redpanda.ingest_topics.len());
    for topic in &config.redpanda.ingest_topics {
        let worker = IngestionWorker::new(IngestionHandler::new(topic.clone(), lifecycle.clone()));
        let mut rx = shutdown_rx.clone();
        let topic = topic.clone();
        workers.push(tokio::spawn(async move {
            let shutdown = async move {
                // A dropped sender also means shut down.
                let _ = rx.wait_for(|stop| *stop).await;
            };
            match worker.run(shutdown).await {
                Ok(stats) => info!(topic = %topic, ?stats, "Ingestion worker stopped"),
                Err(e) => error!(topic = %topic, error = %e, "Ingestion worker failed to start"),
            }
        }));
    }
    info!(worker_count = workers.len(), "Ingestion workers started");

    // HTTP server
    let mut state = AppState::new(lifecycle);
    if let Some(handle) = metrics_server.handle() {
        state = state.with_metrics(handle.clone());
    }
    let app = router(state);

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("HTTP server failed")?;

    for worker in workers {
        if let Err(e) = worker.await {
            warn!(error = %e, "Ingestion worker task panicked or was cancelled");
        }
    }

    info!("Server stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,reporting=debug,sqlx=warn,tower_http=debug".into());

    let (pretty, json) = match format {
        LogFormat::Pretty => (Some(fmt::layer()), None),
        LogFormat::Json => (None, Some(fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .init();
}

/// Resolves on Ctrl+C or SIGTERM. A handler that cannot be installed is
/// logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
