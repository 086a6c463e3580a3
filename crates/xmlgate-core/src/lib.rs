//! # xmlgate Core
//!
//! Core types and traits for the xmlgate XML protocol adapter.
//!
//! This crate provides the foundational types used throughout xmlgate:
//!
//! - [`AdapterError`] - Structured errors with kind, status and code
//! - [`RequestId`] - UUID v7 request identifier
//! - [`Document`] - Engine result tree with a raw-bytes leaf
//! - [`Catalog`] / [`Model`] - Read-only view of the service model
//! - [`ResourceEngine`] - Entity CRUD and custom operation execution
//! - [`ResolvedTarget`] - Entity, key, navigation or operation a request addresses
//! - [`encode_binary_fields`] - Base64 encoding of binary-typed result fields

#![doc(html_root_url = "https://docs.rs/xmlgate-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod binary;
mod context;
pub mod document;
pub mod engine;
mod error;
pub mod fixtures;
pub mod model;
mod mode;
pub mod target;

pub use binary::encode_binary_fields;
pub use context::RequestId;
pub use document::Document;
pub use engine::{
    BoxFuture, EngineRequest, EngineResult, OperationKind, OperationResult, ResourceEngine,
    ResponseDraft,
};
pub use error::{
    invalid_xml_body, malformed_document_body, AdapterError, AdapterResult, ErrorDetail,
    ErrorEnvelope, ErrorKind,
};
pub use mode::AdapterMode;
pub use model::{Catalog, Definition, ElementType, EntityDef, Model, ModelError, OperationDef};
pub use target::{KeyValues, NavigationStep, ResolvedTarget};
