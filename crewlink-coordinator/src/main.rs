//! crewlink coordinator - background daemon

use std::sync::Arc;

use tracing::info;

use crewlink_coordinator::api::HttpApi;
use crewlink_coordinator::config::Config;
use crewlink_coordinator::connection::transport::NetDialer;
use crewlink_coordinator::notify::LogNotifier;
use crewlink_coordinator::storage::FileStorage;
use crewlink_coordinator::{ConnectionManager, Router};
use crewlink_utils::Result;

#[tokio::main]
async fn main() -> Result<()> {
    crewlink_utils::init_logging_with_config(crewlink_utils::LogConfig::coordinator())?;

    let config = Config::load();
    info!(
        push_endpoint = %config.push_endpoint,
        api_base = %config.api_base,
        "Starting coordinator"
    );

    let storage = Arc::new(FileStorage::open_default()?);
    let api = Arc::new(HttpApi::new(&config.api_base)?);

    let (connection, conn_events) =
        ConnectionManager::spawn(config.push_endpoint.clone(), Box::new(NetDialer));
    let _router = Router::spawn(
        connection,
        conn_events,
        storage,
        api,
        Arc::new(LogNotifier),
        config.allowed_surface_urls,
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(crewlink_utils::CrewlinkError::Io)?;
    info!("Shutting down");
    Ok(())
}
