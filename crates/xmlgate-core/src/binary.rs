//! Binary-field encoding for engine results.
//!
//! Binary-typed elements (`Binary`, `LargeBinary`) come back from the engine
//! as raw bytes. Before serialization they are replaced in place by their
//! base64 text (standard alphabet, padded). The walk follows association,
//! composition and entity-return targets so nested expansions are encoded
//! too.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::document::Document;
use crate::model::{Catalog, Definition, ElementType, EntityDef};

/// Re-encodes every binary field of `document` described by `definition`.
///
/// Fields that are already strings are left untouched, as are fields the
/// definition does not declare.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use xmlgate_core::binary::encode_binary_fields;
/// use xmlgate_core::document::Document;
/// use xmlgate_core::model::{Catalog, Definition, ElementType, EntityDef, Model};
///
/// let model = Model::builder("S")
///     .entity(
///         "Files",
///         EntityDef::builder()
///             .key("ID", ElementType::Integer)
///             .element("content", ElementType::Binary)
///             .build(),
///     )
///     .build();
///
/// let mut doc = Document::object();
/// doc.insert("content", Bytes::from_static(b"hi"));
///
/// let def = model.definition("Files").unwrap().unwrap();
/// encode_binary_fields(&mut doc, def, &model);
/// assert_eq!(doc.get("content").and_then(Document::as_str), Some("aGk="));
/// ```
pub fn encode_binary_fields(document: &mut Document, definition: Definition<'_>, catalog: &dyn Catalog) {
    match definition {
        Definition::Entity(entity) => encode_entity(document, entity, catalog),
        Definition::Operation(op) => {
            if let Some(returns) = &op.returns {
                encode_typed(document, returns, catalog);
            }
        }
    }
}

fn encode_entity(document: &mut Document, entity: &EntityDef, catalog: &dyn Catalog) {
    match document {
        Document::Array(rows) => {
            for row in rows {
                encode_entity(row, entity, catalog);
            }
        }
        Document::Object(fields) => {
            for (name, value) in fields.iter_mut() {
                if let Some(ty) = entity.element(name) {
                    encode_typed(value, ty, catalog);
                }
            }
        }
        _ => {}
    }
}

fn encode_typed(value: &mut Document, ty: &ElementType, catalog: &dyn Catalog) {
    if ty.is_binary() {
        encode_leaf(value);
    } else if let Some(target) = ty.target().and_then(|t| catalog.entity(t)) {
        encode_entity(value, target, catalog);
    }
}

fn encode_leaf(value: &mut Document) {
    match value {
        Document::Binary(bytes) => {
            let encoded = STANDARD.encode(bytes);
            *value = Document::String(encoded);
        }
        Document::Array(items) => items.iter_mut().for_each(encode_leaf),
        _ => {}
    }
}
