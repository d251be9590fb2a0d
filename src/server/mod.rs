//! Transport bootstrap.
//!
//! Binds the native listener, wraps the dispatcher in the interceptor
//! chain, optionally starts the HTTP/JSON gateway, and serves until
//! cancelled. An unbindable port is fatal here, at startup; everything
//! after that point is contained per call or per connection.

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::capability::PluginHandlers;
use crate::config::RuntimeConfig;
use crate::error::{Result, TransportError};
use crate::logging;
use crate::service::PluginService;
use crate::transport::serve_connection;

pub mod gateway;

pub struct PluginServer {
    service: Arc<PluginService>,
    config: RuntimeConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl PluginServer {
    pub fn new(handlers: PluginHandlers, config: RuntimeConfig) -> Result<Self> {
        let service = PluginService::build(handlers, config.trace_id_override.clone())?;
        let (shutdown_tx, _) = broadcast::channel(16);
        Ok(Self {
            service,
            config,
            shutdown_tx,
        })
    }

    pub fn service(&self) -> Arc<PluginService> {
        self.service.clone()
    }

    /// Sending on the returned channel stops the accept loop and the
    /// gateway.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.port))
            .await
            .map_err(|e| TransportError::BindFailed {
                port: self.config.port,
                reason: e.to_string(),
            })?;
        info!(
            port = self.config.port,
            plugin = %self.service.identity().name,
            "plugin listener bound"
        );

        if let Some(gateway_config) = self.config.gateway.clone() {
            let service = self.service.clone();
            let shutdown = self.shutdown_tx.subscribe();
            tokio::spawn(async move {
                gateway::serve(service, gateway_config, shutdown).await;
            });
        }

        let mut shutdown = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("shutting down plugin listener");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "connection accepted");
                        tokio::spawn(serve_connection(
                            stream,
                            self.service.clone(),
                            self.shutdown_tx.subscribe(),
                        ));
                    }
                    Err(e) => warn!("accept failed: {e}"),
                },
            }
        }
        Ok(())
    }
}

/// Full bootstrap: install the logging subscriber, start serving, and
/// block until a termination signal arrives.
pub async fn serve(handlers: PluginHandlers, config: RuntimeConfig) -> Result<()> {
    let _log_guard = logging::init(&config.logging);

    let server = PluginServer::new(handlers, config)?;
    let shutdown = server.shutdown_handle();

    tokio::select! {
        result = server.run() => result,
        _ = shutdown_signal() => {
            let _ = shutdown.send(());
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C signal");
        },
        _ = terminate => {
            info!("received terminate signal");
        },
    }
}
