//! HTTP client for CloudEvent delivery.
//!
//! Builds the transport from a [`TransportConfig`], posts events in binary
//! mode, and classifies what came back so the delivery manager can decide
//! whether to retry.

use std::{error::Error as _, fmt, time::Duration};

use async_trait::async_trait;
use cecli_core::{binding, Event, EventError, Result, TransportConfig};
use reqwest::{Response, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn, Instrument};

use crate::tls;

/// Largest response body kept for diagnostics.
const MAX_DIAGNOSTIC_BODY: usize = 1024;

/// Configuration for the HTTP client underneath an [`EventClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Timeout for a single request, connect through response.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("cecli/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Result of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Receiver answered with a 2xx status.
    Ack {
        /// HTTP status code.
        status_code: u16,
    },
    /// Receiver answered with a status of 400 or above.
    Nack {
        /// HTTP status code.
        status_code: u16,
        /// Response body, truncated for diagnostics.
        body: String,
    },
    /// The request never reached the receiver.
    Undelivered {
        /// Transport failure description.
        reason: String,
    },
    /// Anything that is neither an answer nor a transport failure.
    Indeterminate {
        /// What made the attempt unclassifiable.
        reason: String,
    },
}

impl DeliveryOutcome {
    /// Returns true for an acknowledged delivery.
    pub const fn is_ack(&self) -> bool {
        matches!(self, Self::Ack { .. })
    }

    /// Maps an HTTP status and its body to an outcome.
    pub fn from_status(status_code: u16, body: String) -> Self {
        match status_code {
            200..=299 => Self::Ack { status_code },
            400.. => Self::Nack { status_code, body },
            _ => Self::Indeterminate { reason: format!("unexpected HTTP status {status_code}") },
        }
    }

    fn from_error(error: &reqwest::Error) -> Self {
        let reason = error_chain(error);
        if error.is_builder() || error.is_redirect() {
            Self::Indeterminate { reason }
        } else {
            Self::Undelivered { reason }
        }
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ack { status_code } => write!(f, "HTTP {status_code}"),
            Self::Nack { status_code, body } if body.is_empty() => write!(f, "HTTP {status_code}"),
            Self::Nack { status_code, body } => write!(f, "HTTP {status_code}: {body}"),
            Self::Undelivered { reason } => write!(f, "undelivered: {reason}"),
            Self::Indeterminate { reason } => write!(f, "indeterminate: {reason}"),
        }
    }
}

/// Submits a single event and reports what happened.
///
/// Implementations never return an error. Every failure mode is folded into
/// a [`DeliveryOutcome`] so the caller owns the retry decision.
#[async_trait]
pub trait EventSender: Send + Sync {
    /// Makes one delivery attempt.
    async fn send(&self, event: &Event) -> DeliveryOutcome;
}

/// Client bound to one target URL with the configured TLS material.
#[derive(Debug, Clone)]
pub struct EventClient {
    http: reqwest::Client,
    target: Url,
    transport: TransportConfig,
}

impl EventClient {
    /// Builds a client aimed at the URL derived from `transport`.
    ///
    /// # Errors
    ///
    /// Returns `TlsConfig` if TLS material cannot be loaded, or `Unknown` if
    /// the underlying HTTP client cannot be constructed.
    pub fn build(transport: &TransportConfig) -> Result<Self> {
        Self::build_with(transport, ClientConfig::default())
    }

    /// Like [`EventClient::build`] with an explicit client configuration.
    ///
    /// # Errors
    ///
    /// Same as [`EventClient::build`].
    pub fn build_with(transport: &TransportConfig, config: ClientConfig) -> Result<Self> {
        let url = transport.url();
        let target = Url::parse(&url)
            .map_err(|e| EventError::unknown(format!("failed to build target {url}: {e}")))?;
        Self::assemble(transport, target, &config)
    }

    /// Builds a client with the same TLS material aimed at `url`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl` if `url` does not parse, otherwise the same errors
    /// as [`EventClient::build`].
    pub fn build_for_target(transport: &TransportConfig, url: &str) -> Result<Self> {
        Self::build_for_target_with(transport, url, ClientConfig::default())
    }

    /// Like [`EventClient::build_for_target`] with an explicit client
    /// configuration.
    ///
    /// # Errors
    ///
    /// Same as [`EventClient::build_for_target`].
    pub fn build_for_target_with(
        transport: &TransportConfig,
        url: &str,
        config: ClientConfig,
    ) -> Result<Self> {
        let target =
            Url::parse(url).map_err(|e| EventError::invalid_url(format!("invalid URL {url}: {e}")))?;
        Self::assemble(transport, target, &config)
    }

    fn assemble(transport: &TransportConfig, target: Url, config: &ClientConfig) -> Result<Self> {
        let mut builder =
            reqwest::Client::builder().timeout(config.timeout).user_agent(&config.user_agent);

        if transport.insecure {
            warn!(target = %target, "insecure mode enabled, events are sent without TLS");
        } else {
            builder = builder.use_preconfigured_tls(tls::build_client_tls(transport)?);
        }

        let http = builder
            .build()
            .map_err(|e| EventError::unknown(format!("failed to build HTTP client: {e}")))?;

        debug!(target = %target, insecure = transport.insecure, "event client ready");

        Ok(Self { http, target, transport: transport.clone() })
    }

    /// Returns the URL events are posted to.
    pub fn target(&self) -> &str {
        self.target.as_str()
    }

    /// Returns the transport configuration the client was built from.
    pub const fn transport(&self) -> &TransportConfig {
        &self.transport
    }

    async fn read_body(response: Response) -> String {
        match response.bytes().await {
            Ok(bytes) if bytes.len() > MAX_DIAGNOSTIC_BODY => {
                let truncated = String::from_utf8_lossy(&bytes[..MAX_DIAGNOSTIC_BODY]);
                format!("{truncated}... (truncated)")
            },
            Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
            Err(e) => {
                warn!("failed to read response body: {e}");
                String::new()
            },
        }
    }
}

#[async_trait]
impl EventSender for EventClient {
    async fn send(&self, event: &Event) -> DeliveryOutcome {
        let span = info_span!("event_delivery", event_id = %event.id(), target = %self.target);

        async move {
            let (headers, body) = match binding::encode_binary(event) {
                Ok(encoded) => encoded,
                Err(e) => return DeliveryOutcome::Indeterminate { reason: e.to_string() },
            };

            let response =
                match self.http.post(self.target.clone()).headers(headers).body(body).send().await {
                    Ok(response) => response,
                    Err(e) => {
                        let outcome = DeliveryOutcome::from_error(&e);
                        debug!(%outcome, "request failed");
                        return outcome;
                    },
                };

            let status_code = response.status().as_u16();
            let outcome = DeliveryOutcome::from_status(status_code, Self::read_body(response).await);
            debug!(status = status_code, %outcome, "received response");
            outcome
        }
        .instrument(span)
        .await
    }
}

/// Flattens an error and its sources into one line.
fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
