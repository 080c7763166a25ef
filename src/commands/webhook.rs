//! `cecli webhook`: receive events over a webhook and display or forward
//! them.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use cecli_api::listen;
use cecli_core::{DisplayHandler, Event, EventHandler};
use cecli_delivery::{DeliveryManager, DeliveryPolicy, EventClient};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::GlobalArgs;

#[derive(Debug, Clone, Args)]
pub struct WebhookArgs {
    /// Forward received events to this URL instead of displaying them
    #[arg(long)]
    pub sink: Option<String>,
}

/// Handler that re-sends each received event to a sink.
#[derive(Debug)]
pub struct ForwardHandler {
    client: EventClient,
    policy: DeliveryPolicy,
    shutdown: CancellationToken,
}

impl ForwardHandler {
    /// Forwards through `client` under `policy`, stopping retries on `shutdown`.
    pub const fn new(client: EventClient, policy: DeliveryPolicy, shutdown: CancellationToken) -> Self {
        Self { client, policy, shutdown }
    }
}

#[async_trait]
impl EventHandler for ForwardHandler {
    async fn handle_event(&self, event: Event) -> cecli_core::Result<()> {
        let event_id = event.id().to_string();
        let mut manager = DeliveryManager::with_policy(event, self.policy);

        let report = manager.send_with_shutdown(&self.client, &self.shutdown).await?;
        debug!(
            event_id = %event_id,
            sink = self.client.target(),
            state = ?report.state,
            attempts = report.attempts,
            "event forwarded"
        );
        Ok(())
    }
}

pub async fn run(global: &GlobalArgs, args: &WebhookArgs, shutdown: CancellationToken) -> Result<()> {
    let config = global.load_config()?;
    let transport = config.to_transport_config();

    let handler: Arc<dyn EventHandler> = match args.sink.as_ref().or(config.sink.as_ref()) {
        Some(sink) => {
            let client =
                EventClient::build_for_target_with(&transport, sink, config.to_client_config())?;
            info!(sink = client.target(), "forwarding events to sink");
            Arc::new(ForwardHandler::new(client, config.to_delivery_policy()?, shutdown.clone()))
        },
        None => Arc::new(DisplayHandler),
    };

    info!(url = %transport.url(), "starting webhook server");
    listen(&transport, handler, shutdown).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use cecli_core::{ErrorCode, EventOptions, TransportConfig};
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn forwarder(uri: &str, attempts: u32) -> ForwardHandler {
        let transport = TransportConfig { insecure: true, ..Default::default() };
        let client = EventClient::build_for_target(&transport, uri).unwrap();
        let policy = DeliveryPolicy::from_millis(attempts, 10).unwrap();
        ForwardHandler::new(client, policy, CancellationToken::new())
    }

    #[tokio::test]
    async fn forwards_event_with_original_attributes() {
        let sink = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::header("ce-id", "fwd-1"))
            .and(matchers::header("ce-type", "ce.type"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&sink)
            .await;

        let handler = forwarder(&sink.uri(), 3);
        let event = Event::with_id("fwd-1", &EventOptions::default());

        handler.handle_event(event).await.unwrap();
    }

    #[tokio::test]
    async fn forwarding_keeps_subject_and_extensions() {
        let sink = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::header("ce-id", "fwd-2"))
            .and(matchers::header("ce-subject", "orders/42"))
            .and(matchers::header("ce-dataschema", "https://schemas.example.com/order.json"))
            .and(matchers::header("ce-tenant", "acme"))
            .and(matchers::header("ce-source", "caf%C3%A9/orders"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&sink)
            .await;

        let received = serde_json::json!({
            "specversion": "1.0",
            "id": "fwd-2",
            "source": "café/orders",
            "type": "order.shipped",
            "subject": "orders/42",
            "dataschema": "https://schemas.example.com/order.json",
            "tenant": "acme",
            "data": {"order": 42}
        });
        let event = Event::from_json(received.to_string().as_bytes()).unwrap();

        forwarder(&sink.uri(), 1).handle_event(event).await.unwrap();
    }

    #[tokio::test]
    async fn rejected_forward_is_not_accepted() {
        let sink = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(410))
            .expect(2)
            .mount(&sink)
            .await;

        let handler = forwarder(&sink.uri(), 2);
        let error =
            handler.handle_event(Event::new(&EventOptions::default())).await.unwrap_err();

        assert_eq!(error.code(), ErrorCode::NotAccepted);
    }

    #[test]
    fn invalid_sink_is_invalid_url() {
        let transport = TransportConfig { insecure: true, ..Default::default() };
        let error = EventClient::build_for_target(&transport, "::not-a-url").unwrap_err();

        assert_eq!(error.code(), ErrorCode::InvalidUrl);
    }
}
