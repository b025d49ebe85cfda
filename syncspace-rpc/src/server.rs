//! RPC server with TCP listener, port-file rendezvous, and graceful stop

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use syncspace_runtime::{Backend, Dispatcher};

use crate::proto::transport_service_server::TransportServiceServer;
use crate::service::TransportServiceImpl;

/// In-flight RPCs get this long to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// gRPC server for the SyncSpace backend.
pub struct RpcServer {
    backend: Arc<Backend>,
    dispatcher: Arc<Dispatcher>,
    host: String,
    port: u16,
    port_file: Option<PathBuf>,
    fallback_data_dir: Option<PathBuf>,
}

impl RpcServer {
    pub fn new(backend: Arc<Backend>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            backend,
            dispatcher,
            host: "localhost".to_string(),
            port: 0,
            port_file: None,
            fallback_data_dir: None,
        }
    }

    /// Bind address; port 0 picks an ephemeral port.
    pub fn with_bind(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Write the chosen port number to this path once bound.
    pub fn with_port_file(mut self, path: Option<PathBuf>) -> Self {
        self.port_file = path;
        self
    }

    /// Data directory substituted into Init requests with an empty path.
    pub fn with_fallback_data_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.fallback_data_dir = dir;
        self
    }

    /// Bind, announce the port, and serve until `shutdown` fires. Returns
    /// after in-flight RPCs drain or the grace window expires.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), RpcServerError> {
        let addr: SocketAddr = format!("{}:{}", self.host, self.port)
            .parse()
            .or_else(|_| {
                // Hostnames like "localhost" need resolving; fall back to
                // the standard loopback.
                format!("127.0.0.1:{}", self.port).parse()
            })
            .map_err(|e| RpcServerError::Bind(format!("invalid bind address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RpcServerError::Bind(e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| RpcServerError::Bind(e.to_string()))?;

        tracing::info!(addr = %local_addr, "RPC server listening");

        if let Some(port_file) = &self.port_file {
            if let Err(e) = std::fs::write(port_file, local_addr.port().to_string()) {
                tracing::warn!(path = %port_file.display(), error = %e, "failed to write port file");
            }
        }

        let service = TransportServiceImpl::new(self.backend, self.dispatcher)
            .with_fallback_data_dir(self.fallback_data_dir);

        let drain = shutdown.clone();
        let server = Server::builder()
            .add_service(TransportServiceServer::new(service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                drain.cancelled().await;
            });

        tokio::select! {
            result = server => {
                result.map_err(|e| RpcServerError::Serve(e.to_string()))?;
            }
            _ = async {
                shutdown.cancelled().await;
                tokio::time::sleep(SHUTDOWN_GRACE).await;
            } => {
                tracing::warn!("shutdown grace window expired, aborting in-flight RPCs");
            }
        }

        tracing::info!("RPC server stopped");
        Ok(())
    }
}

/// Errors from running the RPC server.
#[derive(Debug, thiserror::Error)]
pub enum RpcServerError {
    #[error("bind failed: {0}")]
    Bind(String),

    #[error("serve failed: {0}")]
    Serve(String),
}
