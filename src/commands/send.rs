//! `cecli send`: build an event and deliver it with retries.

use std::time::Duration;

use anyhow::Result;
use cecli_core::{Event, EventOptions};
use cecli_delivery::{DeliveryManager, EventClient};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::GlobalArgs;

#[derive(Debug, Clone, Args)]
pub struct SendArgs {
    /// JSON payload to send
    #[arg(short, long)]
    pub data: Option<String>,

    /// Event source [default: ce/uri]
    #[arg(long)]
    pub source: Option<String>,

    /// Event type [default: ce.type]
    #[arg(long = "type")]
    pub event_type: Option<String>,

    /// Number of delivery attempts [default: 3]
    #[arg(long)]
    pub attempts: Option<u32>,

    /// Delay between attempts in milliseconds [default: 1000]
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Print the event as JSON without sending it
    #[arg(long)]
    pub dry_run: bool,
}

impl SendArgs {
    fn event_options(&self) -> EventOptions {
        EventOptions {
            source: self.source.clone(),
            event_type: self.event_type.clone(),
            data: None,
        }
    }
}

pub async fn run(global: &GlobalArgs, args: &SendArgs, shutdown: CancellationToken) -> Result<()> {
    let config = global.load_config()?;

    let mut manager = DeliveryManager::new(Event::new(&args.event_options()));
    if let Some(data) = &args.data {
        manager.load_json_data(data.as_bytes())?;
    }

    if args.dry_run {
        println!("{}", String::from_utf8_lossy(&manager.to_json()?));
        return Ok(());
    }

    manager.set_attempts(args.attempts.unwrap_or(config.attempts))?;
    manager.set_delay(Duration::from_millis(args.timeout.unwrap_or(config.delay_ms)));

    let transport = config.to_transport_config();
    let client = EventClient::build_with(&transport, config.to_client_config())?;

    let policy = manager.policy();
    debug!(
        attempts = policy.attempts(),
        delay_ms = policy.delay().as_millis(),
        event = %String::from_utf8_lossy(&manager.to_json()?),
        "sending event"
    );

    let report = manager.send_with_shutdown(&client, &shutdown).await?;
    info!(target = client.target(), state = ?report.state, attempts = report.attempts, "send finished");

    Ok(())
}

#[cfg(test)]
mod tests {
    use cecli_core::{ErrorCode, EventError};
    use clap::Parser;
    use tempfile::TempDir;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        global: GlobalArgs,
        #[command(flatten)]
        send: SendArgs,
    }

    fn parse(args: &[&str]) -> Harness {
        Harness::try_parse_from(std::iter::once("cecli").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn type_flag_maps_to_event_type() {
        let harness = parse(&["--type", "order.created", "--source", "shop", "-d", "{}"]);
        let options = harness.send.event_options();

        assert_eq!(options.event_type.as_deref(), Some("order.created"));
        assert_eq!(options.source.as_deref(), Some("shop"));
        assert_eq!(harness.send.data.as_deref(), Some("{}"));
    }

    /// Config path inside `dir` that does not exist, so only defaults apply.
    fn missing_config(dir: &TempDir) -> String {
        dir.path().join("cecli.toml").display().to_string()
    }

    #[tokio::test]
    async fn dry_run_does_not_need_tls_material() {
        let dir = TempDir::new().unwrap();
        let config = missing_config(&dir);
        let harness = parse(&["--dry-run", "--cert", "/nonexistent/cert.pem", "--config", &config]);

        run(&harness.global, &harness.send, CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn malformed_data_is_invalid_format() {
        let dir = TempDir::new().unwrap();
        let config = missing_config(&dir);
        let harness = parse(&["-d", "{broken", "--config", &config]);

        let error = run(&harness.global, &harness.send, CancellationToken::new()).await.unwrap_err();

        let code = error.downcast_ref::<EventError>().unwrap().code();
        assert_eq!(code, ErrorCode::InvalidFormat);
    }

    #[tokio::test]
    async fn sends_to_configured_target() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::header("ce-source", "cli/test"))
            .and(matchers::body_json(serde_json::json!({"n": 7})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let port = server.address().port().to_string();
        let dir = TempDir::new().unwrap();
        let config = missing_config(&dir);
        let harness = parse(&[
            "--insecure",
            "--address",
            "127.0.0.1",
            "--port",
            &port,
            "--source",
            "cli/test",
            "-d",
            r#"{"n": 7}"#,
            "--config",
            &config,
        ]);

        run(&harness.global, &harness.send, CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_target_is_send_failed() {
        let dir = TempDir::new().unwrap();
        let config = missing_config(&dir);
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port().to_string()
        };
        let harness = parse(&[
            "--insecure",
            "--address",
            "127.0.0.1",
            "--port",
            &port,
            "--attempts",
            "2",
            "--timeout",
            "10",
            "--config",
            &config,
        ]);

        let error = run(&harness.global, &harness.send, CancellationToken::new()).await.unwrap_err();

        let code = error.downcast_ref::<EventError>().unwrap().code();
        assert_eq!(code, ErrorCode::SendFailed);
    }
}
