use std::net::SocketAddr;
use std::path::PathBuf;

use axum::routing::get;
use leadhub::config::Configuration;
use leadhub::{app, initialize_state, telemetry};
use opentelemetry::global;
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {},
                    _ = tokio::signal::ctrl_c() => {},
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            },
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("shutdown signal received, draining connections");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut config = Configuration::default();
    if let Ok(path) = std::env::var("CONFIG_PATH") {
        config = config.path(PathBuf::from(path));
    }
    let config = config.read()?;

    // Forward events to the collector when one is configured.
    let (otlp_logs, tracer_provider) = match &config.telemetry.otlp_endpoint {
        Some(endpoint) => (
            Some(telemetry::setup_logging(endpoint)?),
            Some(telemetry::setup_tracer(endpoint)?),
        ),
        None => (None, None),
    };
    if let Some(provider) = &tracer_provider {
        global::set_tracer_provider(provider.clone());
    }

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .with(fmt::layer())
        .with(otlp_logs)
        .init();

    let state = initialize_state(config.clone()).await?;
    let mut router = app(state);

    if config.telemetry.metrics {
        let handle = telemetry::setup_metrics_recorder()?;
        router = router
            .route("/metrics", get(move || std::future::ready(handle.render())));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, version = config.version(), "leadhub listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(provider) = tracer_provider {
        provider.shutdown()?;
    }

    Ok(())
}
