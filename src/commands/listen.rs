//! `cecli listen`: receive events and log them.

use std::sync::Arc;

use anyhow::Result;
use cecli_api::receive;
use cecli_core::{DisplayHandler, EventError};
use cecli_delivery::EventClient;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::GlobalArgs;

pub async fn run(global: &GlobalArgs, shutdown: CancellationToken) -> Result<()> {
    let transport = global.load_config()?.to_transport_config();

    let client = EventClient::build(&transport)
        .map_err(|e| EventError::receive_failed(format!("failed to start receiver: {}", e.message())))?;

    info!(url = %transport.url(), "listening for events");
    receive(&client, Arc::new(DisplayHandler), shutdown).await?;

    Ok(())
}
