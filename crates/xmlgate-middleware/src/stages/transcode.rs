//! XML to JSON transcoding.
//!
//! [`XmlTranscoderMiddleware`] engages for POST, PUT and PATCH requests whose
//! `content-type` contains `application/xml`. It accumulates the body,
//! converts it with [`xml_to_json`] and hands a JSON body to the rest of the
//! pipeline. A blank body carries no document and continues as an empty JSON
//! request. A document that does not parse is answered directly with
//! `400 {"error":"Invalid XML format."}`.
//!
//! # Mapping
//!
//! ```text
//! <ns:Book>                          {"Book": {
//!   <title>Emma</title>                "title": "Emma",
//!   <genre>Novel</genre>               "genre": ["Novel", "Romance"],
//!   <genre>Romance</genre>             "available": true
//!   <available>true</available>      }}
//! </ns:Book>
//! ```
//!
//! - the root element stays as the single top-level key
//! - namespace prefixes are stripped from tag names
//! - attributes are discarded
//! - a repeated child tag becomes an array, a single one stays a value
//! - `true` and `false` become booleans, all other text stays a string
//! - text next to child elements is kept under `_` unless it is whitespace

use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::{BodyExt, LengthLimitError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};
use thiserror::Error;
use xmlgate_core::{invalid_xml_body, AdapterError};

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::pipeline::Stage;
use crate::stages::content_type::is_mutating;
use crate::types::{collect_limited, empty_body, full_body, set_content_length, Request, Response, ResponseExt, APPLICATION_JSON, APPLICATION_XML};

/// Key under which mixed-content text is stored.
pub const TEXT_KEY: &str = "_";

/// Errors produced while converting XML to JSON.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranscodeError {
    /// The body is not valid UTF-8.
    #[error("body is not valid UTF-8")]
    Utf8,

    /// The XML reader rejected the markup.
    #[error("malformed XML: {0}")]
    Syntax(String),

    /// The document has no root element.
    #[error("document has no root element")]
    NoRoot,

    /// A second element follows the root element.
    #[error("document has more than one root element")]
    MultipleRoots,

    /// Non-whitespace text outside the root element.
    #[error("text outside the root element")]
    TextOutsideRoot,

    /// An entity reference that is neither predefined nor a character
    /// reference.
    #[error("unknown entity '&{0};'")]
    UnknownEntity(String),

    /// The document ended inside an element.
    #[error("unclosed element '{0}'")]
    Unclosed(String),
}

/// Summary of a transcoded request body, stored in the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transcoded {
    /// Size of the XML body in bytes.
    pub xml_bytes: usize,
    /// Size of the JSON body in bytes.
    pub json_bytes: usize,
}

struct Frame {
    name: String,
    text: String,
    cdata: bool,
    children: Map<String, Value>,
}

impl Frame {
    fn new(name: String) -> Self {
        Self {
            name,
            text: String::new(),
            cdata: false,
            children: Map::new(),
        }
    }

    fn into_value(self) -> Value {
        let blank = self.text.chars().all(char::is_whitespace) && !self.cdata;
        if self.children.is_empty() {
            if blank {
                return Value::String(self.text);
            }
            return scalar(self.text);
        }
        let mut object = self.children;
        if !blank {
            object.insert(TEXT_KEY.to_string(), scalar(self.text));
        }
        Value::Object(object)
    }
}

fn scalar(text: String) -> Value {
    match text.as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(text),
    }
}

fn local_name(raw: &[u8]) -> Result<String, TranscodeError> {
    let name = std::str::from_utf8(raw).map_err(|_| TranscodeError::Utf8)?;
    Ok(name.rsplit(':').next().unwrap_or(name).to_string())
}

fn attach(parent: &mut Map<String, Value>, name: String, value: Value) {
    match parent.get_mut(&name) {
        None => {
            parent.insert(name, value);
        }
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
    }
}

fn syntax(err: impl std::fmt::Display) -> TranscodeError {
    TranscodeError::Syntax(err.to_string())
}

/// Converts an XML document to its JSON shape.
///
/// # Example
///
/// ```
/// use xmlgate_middleware::stages::transcode::xml_to_json;
///
/// let json = xml_to_json("<b:Book><title>Emma</title><available>true</available></b:Book>").unwrap();
/// assert_eq!(json, serde_json::json!({"Book": {"title": "Emma", "available": true}}));
/// ```
pub fn xml_to_json(xml: &str) -> Result<Value, TranscodeError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().check_end_names = true;

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        match reader.read_event().map_err(syntax)? {
            Event::Start(e) => {
                if stack.is_empty() && root.is_some() {
                    return Err(TranscodeError::MultipleRoots);
                }
                check_attributes(&e)?;
                stack.push(Frame::new(local_name(e.name().as_ref())?));
            }
            Event::Empty(e) => {
                check_attributes(&e)?;
                let frame = Frame::new(local_name(e.name().as_ref())?);
                close(&mut stack, &mut root, frame)?;
            }
            Event::End(_) => {
                let frame = stack.pop().ok_or_else(|| syntax("unexpected end tag"))?;
                close(&mut stack, &mut root, frame)?;
            }
            Event::Text(e) => {
                let decoded = e.decode().map_err(syntax)?;
                let text = quick_xml::escape::unescape(&decoded).map_err(syntax)?;
                push_text(&mut stack, &text)?;
            }
            Event::GeneralRef(e) => {
                let name = e.decode().map_err(syntax)?;
                let resolved = match e.resolve_char_ref().map_err(syntax)? {
                    Some(ch) => ch.to_string(),
                    None => quick_xml::escape::resolve_predefined_entity(&name)
                        .ok_or_else(|| TranscodeError::UnknownEntity(name.to_string()))?
                        .to_string(),
                };
                push_text(&mut stack, &resolved)?;
            }
            Event::CData(e) => {
                let text = String::from_utf8(e.into_inner().into_owned())
                    .map_err(|_| TranscodeError::Utf8)?;
                match stack.last_mut() {
                    Some(frame) => {
                        frame.text.push_str(&text);
                        frame.cdata = true;
                    }
                    None => return Err(TranscodeError::TextOutsideRoot),
                }
            }
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) | Event::Comment(_) | Event::DocType(_) => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(TranscodeError::Unclosed(open.name));
    }
    let (name, value) = root.ok_or(TranscodeError::NoRoot)?;
    let mut top = Map::new();
    top.insert(name, value);
    Ok(Value::Object(top))
}

/// Attribute values are dropped, but malformed or duplicated attributes
/// still make the document invalid.
fn check_attributes(e: &BytesStart<'_>) -> Result<(), TranscodeError> {
    for attr in e.attributes().with_checks(true) {
        attr.map_err(syntax)?;
    }
    Ok(())
}

fn push_text(stack: &mut [Frame], text: &str) -> Result<(), TranscodeError> {
    match stack.last_mut() {
        Some(frame) => {
            frame.text.push_str(text);
            Ok(())
        }
        None if text.chars().all(char::is_whitespace) => Ok(()),
        None => Err(TranscodeError::TextOutsideRoot),
    }
}

fn close(
    stack: &mut [Frame],
    root: &mut Option<(String, Value)>,
    frame: Frame,
) -> Result<(), TranscodeError> {
    let name = frame.name.clone();
    let value = frame.into_value();
    match stack.last_mut() {
        Some(parent) => {
            attach(&mut parent.children, name, value);
            Ok(())
        }
        None if root.is_some() => Err(TranscodeError::MultipleRoots),
        None => {
            *root = Some((name, value));
            Ok(())
        }
    }
}

/// Middleware converting XML request bodies to JSON.
#[derive(Debug, Clone, Copy)]
pub struct XmlTranscoderMiddleware {
    max_body_bytes: usize,
}

impl XmlTranscoderMiddleware {
    /// Creates the stage with a limit on the accumulated XML body.
    #[must_use]
    pub const fn new(max_body_bytes: usize) -> Self {
        Self { max_body_bytes }
    }

    fn engages(request: &Request) -> bool {
        is_mutating(request.method())
            && request
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|ct| ct.contains(APPLICATION_XML))
    }
}

impl Middleware for XmlTranscoderMiddleware {
    fn name(&self) -> &'static str {
        Stage::XmlTranscoder.name()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if !Self::engages(&request) {
                return next.run(ctx, request).await;
            }

            let (mut parts, body) = request.into_parts();
            let xml = match collect_limited(body, self.max_body_bytes).await {
                Ok(collected) => collected.to_bytes(),
                Err(err) if err.is::<LengthLimitError>() => {
                    tracing::warn!(
                        request_id = %ctx.request_id(),
                        limit = self.max_body_bytes,
                        "XML body over limit"
                    );
                    return Response::raised(AdapterError::payload_too_large(self.max_body_bytes));
                }
                Err(err) => {
                    tracing::debug!(request_id = %ctx.request_id(), error = %err, "request body aborted");
                    return Response::aborted();
                }
            };

            let text = std::str::from_utf8(&xml).map_err(|_| TranscodeError::Utf8);
            if text.as_ref().is_ok_and(|text| text.trim().is_empty()) {
                tracing::debug!(request_id = %ctx.request_id(), "blank XML body, no document");
                parts
                    .headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
                set_content_length(&mut parts.headers, 0);
                let request = http::Request::from_parts(parts, empty_body());
                return next.run(ctx, request).await;
            }
            let document = text.and_then(xml_to_json);
            let document = match document {
                Ok(document) => document,
                Err(err) => {
                    metrics::counter!("xmlgate_transcode_failures_total").increment(1);
                    tracing::warn!(request_id = %ctx.request_id(), error = %err, "invalid XML body");
                    return Response::json(StatusCode::BAD_REQUEST, &invalid_xml_body());
                }
            };

            let json = document.to_string();
            parts
                .headers
                .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
            set_content_length(&mut parts.headers, json.len());
            ctx.set_extension(Transcoded {
                xml_bytes: xml.len(),
                json_bytes: json.len(),
            });
            ctx.set_body(document);
            tracing::debug!(
                request_id = %ctx.request_id(),
                xml_bytes = xml.len(),
                json_bytes = json.len(),
                "transcoded XML body"
            );

            let request = http::Request::from_parts(parts, full_body(json));
            next.run(ctx, request).await
        })
    }
}
