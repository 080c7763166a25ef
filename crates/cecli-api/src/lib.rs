//! cecli HTTP listener and configuration.
//!
//! Accepts CloudEvents over HTTP or HTTPS and dispatches them to an
//! [`cecli_core::EventHandler`]. Also owns the layered configuration shared
//! by the send and listen commands.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod handlers;
pub mod server;
pub mod tls_listener;

pub use config::Config;
pub use server::{
    bind, create_router, listen, receive, serve, shutdown_signal, BoundListener, ReceiveLoop,
};
