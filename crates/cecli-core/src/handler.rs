//! Event handler seam for the receiving side.
//!
//! The listener decodes each request and hands the event to an
//! [`EventHandler`]. Handlers are shared across concurrent requests behind an
//! `Arc`, so implementations must not rely on exclusive access.

use async_trait::async_trait;
use tracing::info;

use crate::{error::Result, event::Event};

/// Consumer of decoded events.
#[async_trait]
pub trait EventHandler: Send + Sync + std::fmt::Debug {
    /// Handles one event.
    ///
    /// A returned error is logged by the caller and does not change the HTTP
    /// response sent to the producer.
    async fn handle_event(&self, event: Event) -> Result<()>;
}

/// Handler that logs every context attribute and the payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisplayHandler;

#[async_trait]
impl EventHandler for DisplayHandler {
    async fn handle_event(&self, event: Event) -> Result<()> {
        info!(
            specversion = event.spec_version(),
            event_type = event.event_type(),
            source = event.source(),
            id = event.id(),
            datacontenttype = event.data_content_type(),
            dataschema = event.data_schema(),
            subject = event.subject(),
            time = ?event.time(),
            "context attributes"
        );
        for (name, value) in event.extensions() {
            info!(name = %name, value = %value, "extension");
        }
        info!(data = %String::from_utf8_lossy(event.data()), "data");
        Ok(())
    }
}
