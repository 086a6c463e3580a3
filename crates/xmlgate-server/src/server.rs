//! HTTP server hosting the mounted XML adapters.
//!
//! # Architecture
//!
//! - TCP listener bound to `server.http_addr`
//! - One task per connection, HTTP/1.1 via hyper
//! - `/health` and `/ready` probes, answered before any routing
//! - Requests under the mount path are routed to the adapter of the first
//!   path segment; the adapter sees the path below the service
//! - Optional Prometheus listener on its own address
//! - Graceful shutdown: stop accepting, fail readiness, drain connections
//!   until the shutdown timeout
//!
//! # Example
//!
//! ```rust,ignore
//! use xmlgate_server::{Server, ServiceRegistry, ShutdownSignal};
//!
//! let registry = ServiceRegistry::new();
//! registry.register("CatalogService", adapter)?;
//! let services = registry.mount("/xml")?;
//!
//! Server::builder(services)
//!     .config(config.server.clone())
//!     .build()?
//!     .run_with_shutdown(ShutdownSignal::with_os_signals())
//!     .await?;
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use xmlgate_config::ServerConfig;
use xmlgate_core::{AdapterError, RequestId};
use xmlgate_middleware::{BodyError, Response, ResponseExt};
use xmlgate_telemetry::{render_metrics, InFlightGuard};

use crate::error::ServerError;
use crate::health::{HealthCheck, ReadinessCheck};
use crate::registry::{MountedServices, RouteMatch};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Header carrying the request ID in both directions.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// The xmlgate HTTP server.
pub struct Server {
    config: ServerConfig,
    services: Arc<MountedServices>,
    health: HealthCheck,
    readiness: ReadinessCheck,
    metrics_addr: Option<String>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("mount_path", &self.services.mount_path())
            .field("metrics_addr", &self.metrics_addr)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Starts building a server for `services`.
    #[must_use]
    pub fn builder(services: Arc<MountedServices>) -> ServerBuilder {
        ServerBuilder::new(services)
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the liveness probe.
    #[must_use]
    pub fn health(&self) -> &HealthCheck {
        &self.health
    }

    /// Returns the readiness probe.
    #[must_use]
    pub fn readiness(&self) -> &ReadinessCheck {
        &self.readiness
    }

    /// Returns the mounted services.
    #[must_use]
    pub fn services(&self) -> &Arc<MountedServices> {
        &self.services
    }

    /// Returns the request timeout, `None` when disabled.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.config.request_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Binds `server.http_addr` and serves until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Binds `server.http_addr` and serves until `shutdown` triggers.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = parse_addr(&self.config.http_addr)?;
        let listener = bind(addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` triggers.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        tracing::info!(
            addr = %local_addr,
            mount_path = %self.services.mount_path(),
            "server listening"
        );

        if let Some(metrics_addr) = &self.metrics_addr {
            let listener = bind(parse_addr(metrics_addr)?).await?;
            tokio::spawn(serve_metrics(listener, shutdown.clone()));
        }

        let max_connections = self.config.max_connections as usize;
        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, remote_addr)) => {
                            if max_connections > 0 && tracker.active_connections() >= max_connections {
                                tracing::warn!(
                                    remote_addr = %remote_addr,
                                    max_connections,
                                    "connection limit reached, dropping connection"
                                );
                                continue;
                            }
                            let token = tracker.acquire();
                            let server = Arc::clone(&server);
                            let shutdown = shutdown.clone();
                            tokio::spawn(async move {
                                if let Err(err) = server.handle_connection(stream, shutdown).await {
                                    tracing::debug!(remote_addr = %remote_addr, error = %err, "connection closed with error");
                                }
                                drop(token);
                            });
                        }
                        Err(err) => tracing::error!(error = %err, "failed to accept connection"),
                    }
                }
                () = shutdown.recv() => {
                    tracing::info!("shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        server.readiness.set_ready(false);

        let timeout = Duration::from_secs(server.config.shutdown_timeout_secs);
        tracing::info!(
            timeout_secs = timeout.as_secs(),
            active_connections = tracker.active_connections(),
            "draining connections"
        );
        if tokio::time::timeout(timeout, tracker.wait_for_drain()).await.is_err() {
            tracing::warn!(
                active_connections = tracker.active_connections(),
                "shutdown timeout reached with open connections"
            );
        }

        tracing::info!("server stopped");
        Ok(())
    }

    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let server = Arc::clone(&self);
        let service = service_fn(move |request: Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { server.dispatch(request).await }
        });

        let connection = http1::Builder::new()
            .keep_alive(self.config.keep_alive)
            .serve_connection(io, service);
        tokio::pin!(connection);

        tokio::select! {
            result = connection.as_mut() => result,
            () = shutdown.recv() => {
                connection.as_mut().graceful_shutdown();
                connection.await
            }
        }
    }

    /// Answers one request.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Aborted`] when the pipeline dropped the request;
    /// the connection is then closed without a response.
    pub async fn dispatch<B>(&self, request: Request<B>) -> Result<Response, ServerError>
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BodyError>,
    {
        match (request.method(), request.uri().path()) {
            (&Method::GET, "/health") => return Ok(json_response(StatusCode::OK, &self.health.status())),
            (&Method::GET, "/ready") => {
                let status = self.readiness.status();
                let code = if status.is_ready() {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                return Ok(json_response(code, &status));
            }
            _ => {}
        }

        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(RequestId::parse)
            .unwrap_or_default();

        let _in_flight = InFlightGuard::new();
        let mut response = self.route(request_id, request).await;
        if response.is_aborted() {
            tracing::debug!(request_id = %request_id, "request aborted, closing connection");
            return Err(ServerError::Aborted);
        }

        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        Ok(response)
    }

    async fn route<B>(&self, request_id: RequestId, request: Request<B>) -> Response
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BodyError>,
    {
        let path = request.uri().path().to_string();
        let (adapter, remainder) = match self.services.route(&path) {
            RouteMatch::Service(route) => (route.adapter, route.remainder.to_string()),
            RouteMatch::UnknownService(segment) => {
                return error_response(
                    &AdapterError::not_found(format!("Service \"{segment}\" not found")),
                    request_id,
                );
            }
            RouteMatch::Outside => {
                return error_response(
                    &AdapterError::not_found(format!("Cannot {} {path}", request.method())),
                    request_id,
                );
            }
        };

        let (mut parts, body) = request.into_parts();
        parts.uri = match service_uri(&remainder, parts.uri.query()) {
            Ok(uri) => uri,
            Err(err) => return error_response(&AdapterError::malformed(err.to_string()), request_id),
        };
        let body = body.map_err(Into::<BodyError>::into).boxed_unsync();
        let request = Request::from_parts(parts, body);

        let handled = adapter.handle_with_id(request_id, request);
        match self.request_timeout() {
            Some(timeout) => match tokio::time::timeout(timeout, handled).await {
                Ok(response) => response,
                Err(_) => {
                    tracing::warn!(request_id = %request_id, path = %path, "request timed out");
                    error_response(
                        &AdapterError::engine(StatusCode::GATEWAY_TIMEOUT, "GATEWAY_TIMEOUT", "Request timed out"),
                        request_id,
                    )
                }
            },
            None => handled.await,
        }
    }
}

fn service_uri(remainder: &str, query: Option<&str>) -> Result<Uri, http::Error> {
    let path_and_query = match query {
        Some(query) => format!("{remainder}?{query}"),
        None => remainder.to_string(),
    };
    Uri::builder().path_and_query(path_and_query).build()
}

fn error_response(error: &AdapterError, request_id: RequestId) -> Response {
    let envelope = error.to_envelope(Some(&request_id.to_string()));
    json_response(error.status_code(), &envelope)
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    let body = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn parse_addr(addr: &str) -> Result<SocketAddr, ServerError> {
    addr.parse()
        .map_err(|err| ServerError::BindError(format!("invalid address '{addr}': {err}")))
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|err| ServerError::BindError(format!("failed to bind {addr}: {err}")))
}

async fn serve_metrics(listener: TcpListener, shutdown: ShutdownSignal) {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, "metrics listening");
    }
    loop {
        let stream = tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, _)) => stream,
                Err(err) => {
                    tracing::error!(error = %err, "failed to accept metrics connection");
                    continue;
                }
            },
            () = shutdown.recv() => break,
        };

        tokio::spawn(async move {
            let service = service_fn(|request: Request<Incoming>| async move {
                Ok::<_, std::convert::Infallible>(metrics_response(request.method(), request.uri().path()))
            });
            if let Err(err) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                tracing::debug!(error = %err, "metrics connection closed with error");
            }
        });
    }
}

fn metrics_response(method: &Method, path: &str) -> Response {
    if method != Method::GET || path != "/metrics" {
        return Response::empty(StatusCode::NOT_FOUND);
    }
    match render_metrics() {
        Some(body) => {
            let mut response = Response::text(StatusCode::OK, body);
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        None => Response::empty(StatusCode::SERVICE_UNAVAILABLE),
    }
}

/// Builder for [`Server`].
#[derive(Debug)]
pub struct ServerBuilder {
    services: Arc<MountedServices>,
    config: ServerConfig,
    service_name: String,
    service_version: String,
    metrics_addr: Option<String>,
}

impl ServerBuilder {
    /// Creates a builder with the default server configuration.
    #[must_use]
    pub fn new(services: Arc<MountedServices>) -> Self {
        Self {
            services,
            config: ServerConfig::default(),
            service_name: "xmlgate".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            metrics_addr: None,
        }
    }

    /// Replaces the server configuration.
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the bind address.
    #[must_use]
    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.http_addr = addr.into();
        self
    }

    /// Sets the request timeout in milliseconds; `0` disables it.
    #[must_use]
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    /// Sets the graceful shutdown timeout in seconds.
    #[must_use]
    pub fn shutdown_timeout_secs(mut self, secs: u64) -> Self {
        self.config.shutdown_timeout_secs = secs;
        self
    }

    /// Sets the service name reported by `/health`.
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Serves `GET /metrics` on `addr`.
    #[must_use]
    pub fn metrics_addr(mut self, addr: impl Into<String>) -> Self {
        self.metrics_addr = Some(addr.into());
        self
    }

    /// Builds the server.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::BindError`] for an unparsable bind address.
    pub fn build(self) -> Result<Server, ServerError> {
        parse_addr(&self.config.http_addr)?;
        if let Some(addr) = &self.metrics_addr {
            parse_addr(addr)?;
        }

        let services = Arc::clone(&self.services);
        let readiness = ReadinessCheck::new()
            .add_check("services_mounted", move || services.service_paths().next().is_some());

        Ok(Server {
            config: self.config,
            services: self.services,
            health: HealthCheck::new(self.service_name, self.service_version),
            readiness,
            metrics_addr: self.metrics_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ServiceRegistry;
    use xmlgate_core::fixtures::{bookshop_engine, bookshop_model};
    use xmlgate_core::AdapterMode;
    use xmlgate_middleware::XmlAdapter;

    fn catalog_adapter() -> XmlAdapter {
        XmlAdapter::builder(Arc::new(bookshop_model()))
            .engine(Arc::new(bookshop_engine()))
            .build()
            .unwrap()
    }

    fn server_with(adapter: XmlAdapter) -> Server {
        let registry = ServiceRegistry::new();
        registry.register("CatalogService", adapter).unwrap();
        let services = registry.mount("/xml").unwrap();
        Server::builder(services)
            .http_addr("127.0.0.1:0")
            .build()
            .unwrap()
    }

    fn request(method: Method, uri: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/xml")
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_builder_rejects_bad_address() {
        let registry = ServiceRegistry::new();
        registry.register("CatalogService", catalog_adapter()).unwrap();
        let services = registry.mount("/xml").unwrap();

        let result = Server::builder(services).http_addr("not-an-address").build();
        assert!(matches!(result, Err(ServerError::BindError(msg)) if msg.contains("not-an-address")));
    }

    #[test]
    fn test_request_timeout_zero_disables() {
        let registry = ServiceRegistry::new();
        registry.register("CatalogService", catalog_adapter()).unwrap();
        let services = registry.mount("/xml").unwrap();

        let server = Server::builder(Arc::clone(&services)).request_timeout_ms(0).build().unwrap();
        assert_eq!(server.request_timeout(), None);

        let server = Server::builder(services).request_timeout_ms(250).build().unwrap();
        assert_eq!(server.request_timeout(), Some(Duration::from_millis(250)));
    }

    #[tokio::test]
    async fn test_probes() {
        let server = server_with(catalog_adapter());

        let response = server.dispatch(request(Method::GET, "/health", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");

        let response = server.dispatch(request(Method::GET, "/ready", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        server.readiness().set_ready(false);
        let response = server.dispatch(request(Method::GET, "/ready", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["checks"]["services_mounted"], true);
    }

    #[tokio::test]
    async fn test_unknown_service_and_outside_mount() {
        let server = server_with(catalog_adapter());

        let response = server
            .dispatch(request(Method::GET, "/xml/Nope/Books", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        let json = body_json(response).await;
        assert_eq!(json["error"]["statusCode"], 404);
        assert!(json["error"]["message"].as_str().unwrap().contains("Nope"));

        let response = server.dispatch(request(Method::GET, "/odata/Books", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_request_id_is_echoed() {
        let server = server_with(catalog_adapter());
        let id = RequestId::new().to_string();

        let mut req = request(Method::GET, "/xml/CatalogService/Books", "");
        req.headers_mut().insert(REQUEST_ID_HEADER, HeaderValue::from_str(&id).unwrap());
        let response = server.dispatch(req).await.unwrap();
        assert_eq!(response.headers()[REQUEST_ID_HEADER], id.as_str());

        let mut req = request(Method::GET, "/xml/CatalogService/Books", "");
        req.headers_mut().insert(REQUEST_ID_HEADER, HeaderValue::from_static("not-a-uuid"));
        let response = server.dispatch(req).await.unwrap();
        assert_ne!(response.headers()[REQUEST_ID_HEADER], "not-a-uuid");
    }

    #[tokio::test]
    async fn test_adapter_sees_path_below_service() {
        let seen = Arc::new(parking_lot::Mutex::new(None::<String>));
        let recorder = Arc::clone(&seen);
        let adapter = XmlAdapter::builder(Arc::new(bookshop_model()))
            .mode(AdapterMode::Passthrough)
            .downstream(move |request| {
                *recorder.lock() = request.uri().path_and_query().map(ToString::to_string);
                Box::pin(async { Response::empty(StatusCode::NO_CONTENT) })
            })
            .build()
            .unwrap();
        let server = server_with(adapter);

        let response = server
            .dispatch(request(Method::GET, "/xml/CatalogService/Books(201)?$top=1", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(seen.lock().as_deref(), Some("/Books(201)?$top=1"));
    }

    #[tokio::test]
    async fn test_request_timeout_returns_504() {
        let adapter = XmlAdapter::builder(Arc::new(bookshop_model()))
            .mode(AdapterMode::Passthrough)
            .downstream(|_request| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Response::empty(StatusCode::OK)
                })
            })
            .build()
            .unwrap();
        let registry = ServiceRegistry::new();
        registry.register("CatalogService", adapter).unwrap();
        let server = Server::builder(registry.mount("/xml").unwrap())
            .request_timeout_ms(20)
            .build()
            .unwrap();

        let response = server
            .dispatch(request(Method::GET, "/xml/CatalogService/Books", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body_json(response).await["error"]["code"], "GATEWAY_TIMEOUT");
    }

    #[tokio::test]
    async fn test_aborted_response_closes_connection() {
        let adapter = XmlAdapter::builder(Arc::new(bookshop_model()))
            .mode(AdapterMode::Passthrough)
            .downstream(|_request| Box::pin(async { Response::aborted() }))
            .build()
            .unwrap();
        let server = server_with(adapter);

        let result = server
            .dispatch(request(Method::GET, "/xml/CatalogService/Books", ""))
            .await;
        assert!(matches!(result, Err(ServerError::Aborted)));
    }

    #[test]
    fn test_metrics_response_routes() {
        assert_eq!(
            metrics_response(&Method::GET, "/other").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            metrics_response(&Method::POST, "/metrics").status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let server = server_with(catalog_adapter());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        let result = tokio::time::timeout(Duration::from_secs(5), server.serve(listener, shutdown)).await;
        assert!(result.unwrap().is_ok());
    }
}
