//! End-to-end adapter tests.
//!
//! These run complete requests through [`XmlAdapter`] over the bookshop
//! fixtures and check the wire responses and the engine call counts.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use http::{Method, StatusCode};
use http_body::Frame;
use http_body_util::{BodyExt, StreamBody};
use serde_json::{json, Value};
use xmlgate_core::fixtures::{bookshop_engine, bookshop_model, MemoryEngine};
use xmlgate_core::{AdapterMode, OperationKind};
use xmlgate_middleware::{
    empty_body, full_body, Body, BodyError, Request, Response, ResponseExt, XmlAdapter,
};

struct Harness {
    engine: Arc<MemoryEngine>,
    adapter: XmlAdapter,
}

impl Harness {
    fn new() -> Self {
        Self::with_error_handler(true)
    }

    fn with_error_handler(enabled: bool) -> Self {
        let engine = Arc::new(bookshop_engine());
        let adapter = XmlAdapter::builder(engine.catalog())
            .engine(engine.clone())
            .error_handler(enabled)
            .build()
            .unwrap();
        Self { engine, adapter }
    }

    async fn send(&self, request: Request) -> Response {
        self.adapter.handle(request).await
    }
}

fn request(method: Method, path: &str, content_type: Option<&str>, body: Body) -> Request {
    let mut builder = http::Request::builder().method(method).uri(path);
    if let Some(ct) = content_type {
        builder = builder.header(CONTENT_TYPE, ct);
    }
    builder.body(body).unwrap()
}

fn xml(method: Method, path: &str, body: &'static str) -> Request {
    request(method, path, Some("application/xml"), full_body(body))
}

fn get(path: &str) -> Request {
    request(Method::GET, path, None, empty_body())
}

async fn body_bytes(response: Response) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

// ============================================================================
// Discovery
// ============================================================================

#[tokio::test]
async fn test_head_root_probe() {
    let harness = Harness::new();
    let response = harness
        .send(request(Method::HEAD, "/", None, empty_body()))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(CONTENT_LENGTH).unwrap(), "2");
    assert!(body_bytes(response).await.is_empty());
    assert_eq!(harness.engine.total_calls(), 0);
}

#[tokio::test]
async fn test_get_root_lists_entities() {
    let harness = Harness::new();
    let body = body_json(harness.send(get("/")).await).await;
    assert_eq!(body["entities"][0], json!({"name": "Books", "url": "Books"}));
    assert_eq!(body["entities"].as_array().unwrap().len(), 3);
}

// ============================================================================
// Content-type guards
// ============================================================================

#[tokio::test]
async fn test_wrong_content_type_is_415_envelope() {
    let harness = Harness::new();
    let response = harness
        .send(request(
            Method::POST,
            "/Books",
            Some("text/plain"),
            full_body("<Book/>"),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body = body_json(response).await;
    assert_eq!(body["error"]["message"], "INVALID_CONTENT_TYPE_ONLY_XML");
    assert_eq!(body["error"]["code"], "415");
    assert!(body["request_id"].is_string());
    assert_eq!(harness.engine.total_calls(), 0);
}

#[tokio::test]
async fn test_trailing_semicolon_is_rejected() {
    let harness = Harness::new();
    let response = harness
        .send(request(
            Method::PATCH,
            "/Books/201",
            Some("application/xml;"),
            full_body("<Book><title>x</title></Book>"),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_put_with_zero_length_is_malformed_document() {
    let harness = Harness::new();
    let mut put = xml(Method::PUT, "/Books/201", "");
    put.headers_mut()
        .insert(CONTENT_LENGTH, http::HeaderValue::from_static("0"));

    let response = harness.send(put).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_bytes(response).await,
        r#"{"error":{"message":"Malformed document","statusCode":400,"code":"400"}}"#
    );
    assert_eq!(harness.engine.total_calls(), 0);
}

// ============================================================================
// Transcoding
// ============================================================================

#[tokio::test]
async fn test_invalid_xml_never_reaches_engine() {
    let harness = Harness::new();
    let response = harness
        .send(xml(Method::POST, "/Books", "<Book><title>Villette</Book>"))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_bytes(response).await, r#"{"error":"Invalid XML format."}"#);
    assert_eq!(harness.engine.total_calls(), 0);
}

#[tokio::test]
async fn test_blank_xml_body_reaches_engine_without_document() {
    let harness = Harness::new();
    for blank in ["", "   \n"] {
        let response = harness.send(xml(Method::POST, "/Books", blank)).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["statusCode"], 400);
        assert_eq!(body["error"]["message"], "Expected an object in the request body");
        assert!(body["request_id"].is_string());
    }
    assert_eq!(harness.engine.call_count(OperationKind::Create), 2);
}

#[tokio::test]
async fn test_malformed_attribute_never_reaches_engine() {
    let harness = Harness::new();
    let response = harness
        .send(xml(Method::POST, "/Books", r#"<Books ID="1" ID="2"><title>Emma</title></Books>"#))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_bytes(response).await, r#"{"error":"Invalid XML format."}"#);
    assert_eq!(harness.engine.total_calls(), 0);
}

#[tokio::test]
async fn test_create_from_xml_and_read_back() {
    let harness = Harness::new();
    let response = harness
        .send(xml(
            Method::POST,
            "/Books",
            r#"<?xml version="1.0"?>
<bk:Book xmlns:bk="urn:bookshop">
  <bk:ID>301</bk:ID>
  <bk:title>Villette</bk:title>
  <bk:stock>5</bk:stock>
  <bk:available>true</bk:available>
  <bk:cover>AAEC</bk:cover>
</bk:Book>"#,
        ))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers().get(LOCATION).unwrap(), "Books/301");
    let created = body_json(response).await;
    assert_eq!(created["available"], json!(true));
    assert_eq!(created["cover"], json!("AAEC"));

    let read = body_json(harness.send(get("/Books/301")).await).await;
    assert_eq!(read["title"], "Villette");
    assert_eq!(read["stock"], 5);
    assert_eq!(read["available"], true);
    assert_eq!(read["cover"], "AAEC");
    assert_eq!(harness.engine.call_count(OperationKind::Create), 1);
    assert_eq!(harness.engine.call_count(OperationKind::Read), 1);
}

#[tokio::test]
async fn test_chunked_body_is_reassembled() {
    let harness = Harness::new();
    let chunks: Vec<Result<Frame<Bytes>, BodyError>> = vec![
        Ok(Frame::data(Bytes::from_static(b"<Book><ID>302</ID><ti"))),
        Ok(Frame::data(Bytes::from_static(b"tle>Shirley</title>"))),
        Ok(Frame::data(Bytes::from_static(b"</Book>"))),
    ];
    let body = StreamBody::new(stream::iter(chunks)).boxed_unsync();

    let response = harness
        .send(request(Method::POST, "/Books", Some("application/xml"), body))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["title"], "Shirley");
}

#[tokio::test]
async fn test_aborted_body_is_not_answered() {
    let harness = Harness::new();
    let chunks: Vec<Result<Frame<Bytes>, BodyError>> = vec![
        Ok(Frame::data(Bytes::from_static(b"<Book><ID>303"))),
        Err("connection reset by peer".into()),
    ];
    let body = StreamBody::new(stream::iter(chunks)).boxed_unsync();

    let response = harness
        .send(request(Method::POST, "/Books", Some("application/xml"), body))
        .await;
    assert!(response.is_aborted());
    assert_eq!(harness.engine.total_calls(), 0);
}

#[tokio::test]
async fn test_update_from_xml() {
    let harness = Harness::new();
    let response = harness
        .send(xml(
            Method::PATCH,
            "/Books(201)",
            "<Book><stock>3</stock><available>false</available></Book>",
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["stock"], 3);
    assert_eq!(body["available"], false);
    assert_eq!(body["title"], "Wuthering Heights");
}

// ============================================================================
// Dispatch and materialization
// ============================================================================

#[tokio::test]
async fn test_head_instance_reports_json_length() {
    let harness = Harness::new();
    let get_len = body_bytes(harness.send(get("/Books/201")).await).await.len();

    let response = harness
        .send(request(Method::HEAD, "/Books/201", None, empty_body()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_LENGTH).unwrap(),
        get_len.to_string().as_str()
    );
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_unbound_operation_with_numeric_result() {
    let harness = Harness::new();
    let response = harness
        .send(xml(
            Method::POST,
            "/submitOrder",
            "<submitOrder><book>201</book><quantity>2</quantity></submitOrder>",
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert_eq!(body_bytes(response).await, "10");
    assert_eq!(harness.engine.call_count(OperationKind::Invoke), 1);
}

#[tokio::test]
async fn test_engine_error_rendered_by_error_handler() {
    let harness = Harness::new();
    let response = harness
        .send(xml(
            Method::POST,
            "/submitOrder",
            "<submitOrder><book>201</book><quantity>99</quantity></submitOrder>",
        ))
        .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "ORDER_EXCEEDS_STOCK");
    assert_eq!(body["error"]["statusCode"], 409);
}

#[tokio::test]
async fn test_stalled_operation_answers_204() {
    let harness = Harness::new();
    let response = harness
        .send(xml(Method::POST, "/Books/201/rate", "<rate><stars>5</stars></rate>"))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_navigation_and_binary_fields() {
    let harness = Harness::new();
    harness.engine.seed(
        "Authors",
        [json!({"ID": 110, "name": "Anne Brontë", "photo": "cG5n"})],
    );
    harness.engine.seed(
        "Books",
        [json!({"ID": 220, "title": "Agnes Grey", "author_ID": 110})],
    );

    let author = body_json(harness.send(get("/Books/220/author")).await).await;
    assert_eq!(author["name"], "Anne Brontë");
    assert_eq!(author["photo"], "cG5n");
}

#[tokio::test]
async fn test_delete_and_not_found() {
    let harness = Harness::new();
    let response = harness
        .send(request(Method::DELETE, "/Books/207", None, empty_body()))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = harness.send(get("/Books/207")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "404");

    let response = harness.send(get("/Publishers")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_native_json_requests_still_work() {
    let harness = Harness::new();
    let response = harness
        .send(request(
            Method::POST,
            "/Genres",
            Some("application/json"),
            full_body(r#"{"name":"Gothic"}"#),
        ))
        .await;
    // the XML guard runs first and only admits application/xml
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let response = harness
        .send(request(Method::POST, "/Genres", None, full_body(r#"{"name":"Gothic"}"#)))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

// ============================================================================
// Configuration variants
// ============================================================================

#[tokio::test]
async fn test_error_handler_disabled_keeps_plain_text() {
    let harness = Harness::with_error_handler(false);
    let response = harness
        .send(request(
            Method::POST,
            "/Books",
            Some("text/xml"),
            full_body("<Book/>"),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(response
        .headers()
        .get(CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert_eq!(body_bytes(response).await, "INVALID_CONTENT_TYPE_ONLY_XML");
}

#[tokio::test]
async fn test_passthrough_hands_json_downstream() {
    let adapter = XmlAdapter::builder(Arc::new(bookshop_model()))
        .mode(AdapterMode::Passthrough)
        .downstream(|request: Request| {
            Box::pin(async move {
                let content_type = request.headers().get(CONTENT_TYPE).cloned();
                let body = request.into_body().collect().await.unwrap().to_bytes();
                let mut response = Response::text(StatusCode::ACCEPTED, body);
                if let Some(ct) = content_type {
                    response.headers_mut().insert("x-downstream-content-type", ct);
                }
                response
            })
        })
        .build()
        .unwrap();

    let response = adapter
        .handle(xml(
            Method::POST,
            "/Books",
            "<Book><title>Emma</title><available>false</available></Book>",
        ))
        .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(
        response.headers().get("x-downstream-content-type").unwrap(),
        "application/json"
    );
    assert_eq!(
        body_json(response).await,
        json!({"Book": {"title": "Emma", "available": false}})
    );
}
