//! HTTP listener setup and request routing.
//!
//! Requests flow through middleware in order:
//! 1. Request ID generation
//! 2. Request/response logging
//! 3. Event decoding and handler dispatch
//!
//! No request timeout is applied. A decoded event is always answered with 200
//! after its handler finishes, however long that takes.
//!
//! # Graceful Shutdown
//!
//! Serving stops when the caller's `CancellationToken` fires. The listener
//! stops accepting connections and waits for in-flight requests before
//! returning `Ok`.

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::post,
    Router,
};
use cecli_core::{ErrorCode, EventError, EventHandler, Result, TransportConfig};
use cecli_delivery::{build_server_tls, EventClient};
use rustls::ServerConfig;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{handlers, tls_listener::TlsListener};

/// Creates the router that accepts events on `POST` to any path.
///
/// The returned router carries its own state and can be nested into an
/// existing application.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use cecli_api::server::create_router;
/// use cecli_core::DisplayHandler;
///
/// let app: axum::Router = axum::Router::new().nest_service("/events", create_router(Arc::new(DisplayHandler)));
/// ```
pub fn create_router(handler: Arc<dyn EventHandler>) -> Router {
    Router::new()
        .route("/", post(handlers::ingest_event))
        .route("/{*path}", post(handlers::ingest_event))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(handler)
}

/// Middleware to inject request ID into all responses.
async fn inject_request_id(mut req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;

    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-Id", header_value);
    }

    response
}

/// Socket bound by [`bind`], with TLS material already loaded.
#[derive(Debug)]
pub struct BoundListener {
    listener: TcpListener,
    tls: Option<Arc<ServerConfig>>,
    local_addr: SocketAddr,
}

impl BoundListener {
    /// Address the socket is bound to, with the OS-assigned port for port 0.
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns true if connections are TLS-terminated.
    pub const fn is_tls(&self) -> bool {
        self.tls.is_some()
    }
}

/// Loads TLS material (unless insecure) and binds `address:port`.
///
/// # Errors
///
/// Returns `TlsConfig` if certificates cannot be loaded, in which case no
/// socket is bound, and `ReceiveFailed` if the address cannot be bound.
pub async fn bind(config: &TransportConfig) -> Result<BoundListener> {
    let tls = if config.insecure {
        warn!("insecure mode enabled, listening without TLS");
        None
    } else {
        Some(build_server_tls(config)?)
    };

    let authority = config.authority();
    let listener = TcpListener::bind(&authority)
        .await
        .map_err(|e| EventError::receive_failed(format!("failed to bind {authority}: {e}")))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| EventError::receive_failed(format!("failed to read local address: {e}")))?;

    Ok(BoundListener { listener, tls, local_addr })
}

/// Serves events on a bound listener until `shutdown` fires.
///
/// # Errors
///
/// Returns `ReceiveFailed` if the serve loop fails.
pub async fn serve(
    bound: BoundListener,
    handler: Arc<dyn EventHandler>,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = create_router(handler);
    let BoundListener { listener, tls, local_addr } = bound;

    let served = match tls {
        None => {
            info!(addr = %local_addr, "listening for events over HTTP");
            axum::serve(listener, app).with_graceful_shutdown(shutdown.cancelled_owned()).await
        },
        Some(config) => {
            info!(addr = %local_addr, "listening for events over HTTPS");
            let listener = TlsListener::new(listener, config).map_err(|e| {
                EventError::receive_failed(format!("failed to start TLS listener: {e}"))
            })?;
            axum::serve(listener, app).with_graceful_shutdown(shutdown.cancelled_owned()).await
        },
    };

    served.map_err(|e| EventError::receive_failed(format!("listener failed: {e}")))?;

    info!(addr = %local_addr, "listener stopped gracefully");
    Ok(())
}

/// Binds and serves in one call, blocking until shutdown or failure.
///
/// # Errors
///
/// Same as [`bind`] and [`serve`].
pub async fn listen(
    config: &TransportConfig,
    handler: Arc<dyn EventHandler>,
    shutdown: CancellationToken,
) -> Result<()> {
    let bound = bind(config).await?;
    serve(bound, handler, shutdown).await
}

/// A client that can run its own receive loop.
#[async_trait]
pub trait ReceiveLoop: Send + Sync {
    /// Receives events until `shutdown` fires.
    async fn start_receiver(
        &self,
        handler: Arc<dyn EventHandler>,
        shutdown: CancellationToken,
    ) -> Result<()>;
}

#[async_trait]
impl ReceiveLoop for EventClient {
    async fn start_receiver(
        &self,
        handler: Arc<dyn EventHandler>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        listen(self.transport(), handler, shutdown).await
    }
}

/// Runs `client`'s receive loop.
///
/// # Errors
///
/// Any failure to start or run the loop is returned as `ReceiveFailed`.
pub async fn receive<R>(
    client: &R,
    handler: Arc<dyn EventHandler>,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: ReceiveLoop + ?Sized,
{
    client.start_receiver(handler, shutdown).await.map_err(|e| match e.code() {
        ErrorCode::ReceiveFailed => e,
        _ => EventError::receive_failed(format!("failed to start receiver: {}", e.message())),
    })
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
