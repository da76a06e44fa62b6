use std::net::SocketAddr;
use std::path::PathBuf;

use dirgate::config::Configuration;
use dirgate::{app, initialize_state, telemetry};
use opentelemetry::global;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // read configuration file, `CONFIG_PATH` overrides `config.yaml`.
    let path = std::env::var("CONFIG_PATH").ok().map(PathBuf::from);
    let (config, read_error) = match Configuration::read(path.as_deref()) {
        Ok(config) => (config, None),
        Err(err) => (Configuration::default(), Some(err)),
    };

    let bridge = match config.telemetry.endpoint.as_deref() {
        Some(endpoint) => {
            global::set_tracer_provider(telemetry::setup_tracer(endpoint)?);
            Some(telemetry::setup_logging(endpoint)?)
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(fmt::layer())
        .with(bridge)
        .init();

    if let Some(err) = read_error {
        tracing::error!(%err, "cannot read configuration, using defaults");
    }

    let metrics = telemetry::setup_metrics_recorder()?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = initialize_state(config, Some(metrics))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server is listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(%err, "cannot listen for shutdown signal");
            }
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}
