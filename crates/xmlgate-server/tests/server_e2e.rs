//! Server tests over real TCP connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use xmlgate_core::fixtures::bookshop_engine;
use xmlgate_middleware::XmlAdapter;
use xmlgate_server::{Server, ServerError, ServiceRegistry, ShutdownSignal, REQUEST_ID_HEADER};

struct Running {
    addr: SocketAddr,
    shutdown: ShutdownSignal,
    handle: JoinHandle<Result<(), ServerError>>,
}

async fn start() -> Running {
    let engine = Arc::new(bookshop_engine());
    let adapter = XmlAdapter::builder(engine.catalog())
        .engine(engine)
        .build()
        .unwrap();
    let registry = ServiceRegistry::new();
    registry.register("CatalogService", adapter).unwrap();
    let server = Server::builder(registry.mount("/xml").unwrap())
        .shutdown_timeout_secs(1)
        .build()
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = ShutdownSignal::new();
    let handle = tokio::spawn(server.serve(listener, shutdown.clone()));
    Running {
        addr,
        shutdown,
        handle,
    }
}

async fn send(addr: SocketAddr, request: Request<Full<Bytes>>) -> (StatusCode, http::HeaderMap, Bytes) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .unwrap();
    tokio::spawn(connection);

    let response = sender.send_request(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

fn request(method: Method, path: &str, content_type: Option<&str>, body: &str) -> Request<Full<Bytes>> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("host", "localhost");
    if let Some(content_type) = content_type {
        builder = builder.header(CONTENT_TYPE, content_type);
    }
    builder.body(Full::new(Bytes::from(body.to_string()))).unwrap()
}

#[tokio::test]
async fn test_xml_create_then_read_over_tcp() {
    let running = start().await;

    let (status, headers, body) = send(
        running.addr,
        request(
            Method::POST,
            "/xml/CatalogService/Books",
            Some("application/xml"),
            "<Books><ID>901</ID><title>Solaris</title><stock>3</stock></Books>",
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(headers.contains_key(REQUEST_ID_HEADER));
    let created: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(created["title"], "Solaris");

    let (status, _, body) = send(
        running.addr,
        request(Method::GET, "/xml/CatalogService/Books(901)", None, ""),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let read: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(read["stock"], 3);

    running.shutdown.trigger();
    running.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_wrong_content_type_over_tcp() {
    let running = start().await;

    let (status, headers, body) = send(
        running.addr,
        request(
            Method::POST,
            "/xml/CatalogService/Books",
            Some("text/plain"),
            "<Books/>",
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(headers[CONTENT_TYPE], "application/json");
    let envelope: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(envelope["error"]["statusCode"], 415);

    running.shutdown.trigger();
    running.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_probes_and_unknown_service_over_tcp() {
    let running = start().await;

    let (status, _, body) = send(running.addr, request(Method::GET, "/health", None, "")).await;
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["service"], "xmlgate");

    let (status, _, _) = send(running.addr, request(Method::GET, "/ready", None, "")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(
        running.addr,
        request(Method::GET, "/xml/OrdersService/Orders", None, ""),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    running.shutdown.trigger();
    running.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let running = start().await;
    running.shutdown.trigger();

    tokio::time::timeout(Duration::from_secs(5), running.handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(TcpStream::connect(running.addr).await.is_err());
}
