//! HTTP server command

use anyhow::Result;

use crate::config::ServrConfig;
use crate::server;

/// Load the model, then start the inference server
pub async fn serve(mut config: ServrConfig, port: Option<u16>, host: Option<String>) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(host) = host {
        config.server.host = host;
    }

    // Traffic is accepted only once the model is in memory
    let service = super::load_service(config.clone()).await?;

    tracing::info!("Starting server at http://{}", config.server.addr());
    server::start(service, config.server).await?;

    Ok(())
}
