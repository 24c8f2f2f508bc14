use econet_mqtt::{Bridge, Settings};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("starting econet-mqtt {}", env!("CARGO_PKG_VERSION"));

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!(variable = e.var(), "{e}");
            std::process::exit(1);
        }
    };
    log_settings(&settings);

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    let bridge = Bridge::start(settings, shutdown).await?;
    bridge.run().await?;

    info!("shutdown complete");
    Ok(())
}

fn log_settings(settings: &Settings) {
    info!("MQTT broker: {}:{}", settings.mqtt.host, settings.mqtt.port);
    info!("MQTT client ID: {}", settings.mqtt.client_id);
    match &settings.mqtt.username {
        Some(username) => info!(
            "MQTT user: {} (password {})",
            username,
            if settings.mqtt.password.is_some() { "set" } else { "empty" }
        ),
        None => info!("MQTT authentication disabled (anonymous)"),
    }
    info!("Topic prefix: {}", settings.mqtt.topic_prefix);
    info!("ecoNET endpoint: {}", settings.econet_url());
    info!("Polling interval: {}s", settings.poll_interval.as_secs());
    info!("Home Assistant discovery: {}", settings.discovery.enabled);
    if settings.discovery.enabled {
        info!("HA device name: {}", settings.discovery.device_name);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
