//! Event delivery for cecli.
//!
//! Builds HTTP/S transports from a [`cecli_core::TransportConfig`] and sends
//! events with a fixed-delay retry loop.
//!
//! # Architecture
//!
//! Delivery is split into three layers:
//!
//! 1. **Transport** - [`EventClient`] owns the reqwest client and the TLS
//!    material loaded by [`tls`]
//! 2. **Attempt** - [`EventSender::send`] makes one submission and folds the
//!    result into a [`DeliveryOutcome`]
//! 3. **Policy** - [`DeliveryManager`] repeats attempts under a
//!    [`DeliveryPolicy`] until the event is acknowledged or attempts run out
//!
//! # Example
//!
//! ```no_run
//! use cecli_core::{Event, EventOptions, TransportConfig};
//! use cecli_delivery::{DeliveryManager, EventClient};
//!
//! # async fn example() -> cecli_core::Result<()> {
//! let transport = TransportConfig { insecure: true, ..Default::default() };
//! let client = EventClient::build(&transport)?;
//!
//! let mut manager = DeliveryManager::new(Event::new(&EventOptions::default()));
//! manager.send(&client).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod manager;
pub mod retry;
pub mod tls;

pub use client::{ClientConfig, DeliveryOutcome, EventClient, EventSender};
pub use manager::{DeliveryManager, DeliveryReport, DeliveryState};
pub use retry::{DeliveryPolicy, RetryDecision, DEFAULT_ATTEMPTS, DEFAULT_DELAY};
pub use tls::{build_client_tls, build_server_tls};

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
