mod config;

use actix_cors::Cors;
use actix_web::{middleware as actix_middleware, web, App, HttpServer};
use analytics_core::ingestion::{self, IngestionContext};
use analytics_core::realtime::RealtimeBus;
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use analytics_api::AppState;
use config::Runtime;

const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    init_logging();

    let runtime = Runtime::bootstrap().await.map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::Other, format!("failed to start: {e}"))
    })?;

    let bus = Arc::new(RealtimeBus::new());
    let ingestion_ctx = Arc::new(IngestionContext::new(
        runtime.event_store,
        runtime.cache,
        runtime.queue,
        bus.clone(),
        runtime.config.ingestion.clone(),
    ));

    let rate_limiter = Arc::new(analytics_core::rate_limit::RateLimiter::new(
        ingestion_ctx.cache.clone(),
        runtime.config.rate_limit.clone(),
    ));

    let state = web::Data::new(AppState {
        ingestion: ingestion_ctx.clone(),
        funnels: runtime.funnels,
        api_keys: runtime.api_keys,
        rate_limiter,
        query_cache_ttl: runtime.config.cache.query_cache_ttl,
        user_cache_ttl: runtime.config.cache.cache_ttl,
        environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let background = ingestion::spawn_background_tasks(ingestion_ctx.clone(), shutdown_rx);

    let server_config = runtime.config.server.clone();
    let bind_address = format!("{}:{}", server_config.host, server_config.port);
    let cors_origin = server_config.cors_origin.clone();

    info!(address = %bind_address, "starting analytics-app");

    let server = HttpServer::new(move || {
        let cors = if cors_origin == "*" {
            Cors::default().allow_any_origin().allow_any_method().allow_any_header().max_age(3600)
        } else {
            Cors::default()
                .allowed_origin(&cors_origin)
                .allow_any_method()
                .allow_any_header()
                .max_age(3600)
        };

        App::new()
            .app_data(state.clone())
            .app_data(web::Data::new(bus.clone()))
            .wrap(actix_middleware::Logger::default())
            .wrap(cors)
            .configure(|cfg| analytics_api::configure(cfg, state.get_ref()))
    })
    .bind(&bind_address)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining in-flight work");

    server_handle.stop(true).await;
    let _ = shutdown_tx.send(true);

    if let Err(err) = drain_with_deadline(&ingestion_ctx).await {
        error!(error = %err, "final buffer flush failed during shutdown");
    }

    for handle in background {
        let _ = handle.await;
    }
    let _ = server_task.await;

    info!("shutdown complete");
    Ok(())
}

fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
}

async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

/// Flushes every tenant buffer, polling `flush_all` until it reports nothing
/// left or `SHUTDOWN_DRAIN_TIMEOUT` elapses. The queue workers keep draining
/// already-enqueued jobs in the background during this window; what we're
/// waiting out here is just the buffers, which `flush_all` empties in one
/// pass, so a single extra call covers anything pushed in the race between
/// the stop signal and the last in-flight request.
async fn drain_with_deadline(ctx: &IngestionContext) -> Result<(), analytics_core::error::AppError> {
    let deadline = tokio::time::Instant::now() + SHUTDOWN_DRAIN_TIMEOUT;
    loop {
        let flushed = ingestion::pipeline::flush_all(ctx).await?;
        if flushed == 0 || tokio::time::Instant::now() >= deadline {
            return Ok(());
        }
        tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
    }
}
