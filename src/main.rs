use provenance::{
    api::Server,
    config::Config,
    events::spawn_logging_listener,
    registry::{BatchRegistry, Database},
};
use std::sync::Arc;
use tracing::info;

const DEFAULT_CONFIG: &str = "config/default.toml";

/// Entry point for the provenance service.
///
/// Loads configuration, restores the registry from its database (replaying
/// and checking the event log), starts the audit log listener and serves
/// JSON-RPC until Ctrl-C.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = Config::load(&config_path)?;
    info!("Provenance registry starting with config: {:?}", config);

    let database = Database::connect(&config.database).await?;
    let registry = Arc::new(BatchRegistry::open(database, &config.registry).await?);

    let listener = spawn_logging_listener(registry.event_bus());
    info!("Audit log listener started");

    let server = Server::new(config, registry.clone());
    let served = server.start().await;

    listener.abort();
    registry.close().await;
    info!("Registry closed");

    served
}
