//! HTTP server implementation.

use crate::config::DEFAULT_MAX_BODY_BYTES;
use crate::error::ServerError;
use crate::handler::{ApiHandler, ApiRequest, ApiResponse};
use crate::metrics::Metrics;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use workflowd_core::WorkflowEngine;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Largest request body accepted, in bytes.
    pub max_body_bytes: usize,
    /// Metrics instance (if metrics are enabled).
    pub metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("max_connections", &self.max_connections)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("metrics_enabled", &self.metrics.is_some())
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_connections: 1000,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            metrics: None,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// HTTP server for workflowd.
pub struct Server {
    config: ServerConfig,
    handler: Arc<ApiHandler>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: ServerConfig, engine: Arc<WorkflowEngine>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut handler = ApiHandler::new(engine);
        if let Some(ref metrics) = config.metrics {
            handler = handler.with_metrics(metrics.clone());
        }
        Self {
            config,
            handler: Arc::new(handler),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    pub fn handler(&self) -> &Arc<ApiHandler> {
        &self.handler
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener until shutdown.
    ///
    /// After the shutdown signal the listener is closed and every open
    /// connection finishes its in-flight request before this returns.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        let (drain_tx, drain_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        self.running.store(true, Ordering::SeqCst);

        tracing::info!("Server listening on http://{}", listener.local_addr()?);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((tcp_stream, addr)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.max_connections as u64
                            {
                                tracing::warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            if let Some(ref metrics) = self.config.metrics {
                                metrics.connections_total.inc();
                                metrics.connections_active.inc();
                            }

                            let handler = self.handler.clone();
                            let stats = self.stats.clone();
                            let metrics = self.config.metrics.clone();
                            let max_body_bytes = self.config.max_body_bytes;
                            let mut drain = drain_rx.clone();

                            connections.spawn(async move {
                                tracing::debug!("Client connected: {}", addr);

                                let service_stats = stats.clone();
                                let service = service_fn(move |req| {
                                    serve_request(
                                        req,
                                        handler.clone(),
                                        service_stats.clone(),
                                        max_body_bytes,
                                    )
                                });

                                let conn = http1::Builder::new()
                                    .serve_connection(TokioIo::new(tcp_stream), service);
                                tokio::pin!(conn);

                                let result = tokio::select! {
                                    result = conn.as_mut() => result,
                                    _ = drain.changed() => {
                                        conn.as_mut().graceful_shutdown();
                                        conn.as_mut().await
                                    }
                                };

                                if let Err(e) = result {
                                    tracing::debug!("Connection {} error: {}", addr, e);
                                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                }

                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                if let Some(ref metrics) = metrics {
                                    metrics.connections_active.dec();
                                }

                                tracing::debug!("Client disconnected: {}", addr);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        drop(listener);
        let _ = drain_tx.send(true);

        if !connections.is_empty() {
            tracing::info!("Draining {} open connections", connections.len());
        }
        while let Some(result) = connections.join_next().await {
            if let Err(e) = result {
                tracing::warn!("Connection task failed: {}", e);
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}

/// Collects the body, hands the request to the handler and converts back.
async fn serve_request(
    req: Request<Incoming>,
    handler: Arc<ApiHandler>,
    stats: Arc<ServerStats>,
    max_body_bytes: usize,
) -> Result<Response<Full<Bytes>>, BoxError> {
    let (parts, body) = req.into_parts();

    let response = match Limited::new(body, max_body_bytes).collect().await {
        Ok(collected) => {
            let request = ApiRequest {
                method: parts.method,
                path: parts.uri.path().to_string(),
                query: parts.uri.query().map(str::to_string),
                body: collected.to_bytes(),
            };
            handler.handle(&request)
        }
        Err(e) if e.is::<LengthLimitError>() => {
            let err = ServerError::PayloadTooLarge {
                limit: max_body_bytes,
            };
            tracing::debug!("{} {} rejected: {}", parts.method, parts.uri.path(), err);
            ApiResponse::from_error(&err)
        }
        Err(e) => return Err(e),
    };

    stats.requests_total.fetch_add(1, Ordering::Relaxed);
    if !response.status.is_success() {
        stats.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    Ok(response.into_hyper())
}
