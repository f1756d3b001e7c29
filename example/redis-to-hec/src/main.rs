use relay_core::prelude::*;
use relay_hec::{HecConfig, HecForwarder};
use relay_redis::RedisMessagingClient;
use relay_redis::config::RedisClientConfig;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct RelaySettings {
    #[serde(default = "default_redis_url")]
    redis_url: String,
    destination: Destination,
    #[serde(default)]
    consumer: ConsumerConfig,
    #[serde(default)]
    redis: RedisClientConfig,
    #[serde(default)]
    hec: HecConfig,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_owned()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "relay.toml".to_owned());
    let settings: RelaySettings = toml::from_str(&std::fs::read_to_string(&path)?)?;
    info!(
        "Relaying {} from {} to {:?}",
        settings.destination, settings.redis_url, settings.hec
    );

    let client = RedisMessagingClient::new(&settings.redis_url, settings.redis)?;
    let forwarder = Arc::new(HecForwarder::new(&settings.hec)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut consumer = ConsumerTask::new(
        settings.destination,
        client,
        forwarder,
        settings.consumer,
        shutdown_rx,
    );
    consumer.start()?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    shutdown_tx.send(true)?;
    consumer.shutdown().await;
    Ok(())
}
