//! Core types for cecli.
//!
//! Provides the CloudEvent model, the HTTP binding used on the wire, the
//! transport configuration shared by client and listener, the handler seam
//! for received events, and the coded error taxonomy every other crate
//! returns.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod binding;
pub mod error;
pub mod event;
pub mod handler;
pub mod transport;

pub use error::{ErrorCode, EventError, Result};
pub use event::{Event, EventAttributes, EventOptions, ExtensionValue};
pub use handler::{DisplayHandler, EventHandler};
pub use transport::TransportConfig;
