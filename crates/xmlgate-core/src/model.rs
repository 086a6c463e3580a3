//! Service model and catalog.
//!
//! The adapter needs a small slice of the service model: the entity names in
//! declaration order (for the discovery listing), key and element types (for
//! path resolution and binary-field detection) and the bound and unbound
//! operations. [`Catalog`] is that read-only view; [`Model`] is the bundled
//! implementation, loadable from a JSON or TOML file.
//!
//! # Example
//!
//! ```
//! use xmlgate_core::model::{Catalog, ElementType, EntityDef, Model};
//!
//! let model = Model::builder("CatalogService")
//!     .entity(
//!         "Books",
//!         EntityDef::builder()
//!             .key("ID", ElementType::Integer)
//!             .element("title", ElementType::String)
//!             .build(),
//!     )
//!     .build();
//!
//! assert_eq!(model.entity_names(), vec!["Books"]);
//! assert!(model.entity("Books").is_some());
//! ```

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AdapterError;

/// Separator between entity and action name in a bound operation identifier.
pub const BOUND_SEPARATOR: &str = ":$:";

/// Errors that can occur while loading a model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Failed to read the model file.
    #[error("failed to read model file '{path}': {source}")]
    Io {
        /// Path that could not be read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the model document.
    #[error("failed to parse model: {0}")]
    Parse(String),

    /// Unsupported model file extension.
    #[error("unsupported model format '{0}', expected .json or .toml")]
    UnsupportedFormat(String),

    /// The model parsed but is inconsistent.
    #[error("invalid model: {0}")]
    Invalid(String),
}

/// Type of an entity element, operation parameter or return value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ElementType {
    /// Unicode string.
    String,
    /// Integer number.
    Integer,
    /// Decimal number.
    Decimal,
    /// Boolean.
    Boolean,
    /// Calendar date.
    Date,
    /// Timestamp.
    Timestamp,
    /// UUID, rendered as a string.
    #[serde(rename = "UUID")]
    Uuid,
    /// Raw bytes, base64-encoded on the wire.
    Binary,
    /// Large raw bytes, base64-encoded on the wire.
    LargeBinary,
    /// Reference to another entity.
    Association {
        /// Target entity name.
        target: String,
        /// To-many association.
        #[serde(default)]
        many: bool,
    },
    /// Contained child entity.
    Composition {
        /// Target entity name.
        target: String,
        /// To-many composition.
        #[serde(default)]
        many: bool,
    },
    /// Instances of an entity, as returned by an operation.
    Entity {
        /// Entity name.
        target: String,
        /// Returns a collection.
        #[serde(default)]
        many: bool,
    },
}

impl ElementType {
    /// Returns `true` for `Binary` and `LargeBinary`.
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        matches!(self, Self::Binary | Self::LargeBinary)
    }

    /// Returns the target entity of an association, composition or entity
    /// return type.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Association { target, .. }
            | Self::Composition { target, .. }
            | Self::Entity { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Returns `true` for to-many associations and compositions.
    #[must_use]
    pub const fn is_many(&self) -> bool {
        match self {
            Self::Association { many, .. }
            | Self::Composition { many, .. }
            | Self::Entity { many, .. } => *many,
            _ => false,
        }
    }
}

/// A custom operation (CDS action or function).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationDef {
    /// Declared parameters in order.
    #[serde(default)]
    pub params: IndexMap<String, ElementType>,
    /// Declared return type.
    #[serde(default)]
    pub returns: Option<ElementType>,
}

impl OperationDef {
    /// Creates an operation without parameters or return type.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, ty: ElementType) -> Self {
        self.params.insert(name.into(), ty);
        self
    }

    /// Declares the return type.
    #[must_use]
    pub fn returns(mut self, ty: ElementType) -> Self {
        self.returns = Some(ty);
        self
    }
}

/// An entity definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityDef {
    /// Key element names in order.
    #[serde(default)]
    pub keys: Vec<String>,
    /// Elements in declaration order, keys included.
    #[serde(default)]
    pub elements: IndexMap<String, ElementType>,
    /// Bound operations.
    #[serde(default)]
    pub actions: IndexMap<String, OperationDef>,
}

impl EntityDef {
    /// Creates a new entity builder.
    #[must_use]
    pub fn builder() -> EntityDefBuilder {
        EntityDefBuilder::default()
    }

    /// Returns the type of an element.
    #[must_use]
    pub fn element(&self, name: &str) -> Option<&ElementType> {
        self.elements.get(name)
    }

    /// Returns a bound operation.
    #[must_use]
    pub fn action(&self, name: &str) -> Option<&OperationDef> {
        self.actions.get(name)
    }
}

/// Builder for [`EntityDef`].
#[derive(Debug, Default)]
pub struct EntityDefBuilder {
    def: EntityDef,
}

impl EntityDefBuilder {
    /// Adds a key element.
    #[must_use]
    pub fn key(mut self, name: impl Into<String>, ty: ElementType) -> Self {
        let name = name.into();
        self.def.keys.push(name.clone());
        self.def.elements.insert(name, ty);
        self
    }

    /// Adds a non-key element.
    #[must_use]
    pub fn element(mut self, name: impl Into<String>, ty: ElementType) -> Self {
        self.def.elements.insert(name.into(), ty);
        self
    }

    /// Adds a bound operation.
    #[must_use]
    pub fn action(mut self, name: impl Into<String>, op: OperationDef) -> Self {
        self.def.actions.insert(name.into(), op);
        self
    }

    /// Builds the entity definition.
    #[must_use]
    pub fn build(self) -> EntityDef {
        self.def
    }
}

/// A definition looked up by identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Definition<'a> {
    /// An entity.
    Entity(&'a EntityDef),
    /// A bound or unbound operation.
    Operation(&'a OperationDef),
}

/// Read-only view of a service model.
pub trait Catalog: Send + Sync {
    /// Service name.
    fn service_name(&self) -> &str;

    /// Entity names in declaration order.
    fn entity_names(&self) -> Vec<&str>;

    /// Looks up an entity.
    fn entity(&self, name: &str) -> Option<&EntityDef>;

    /// Looks up an unbound operation.
    fn operation(&self, name: &str) -> Option<&OperationDef>;

    /// Resolves a definition identifier.
    ///
    /// Plain identifiers name an entity or an unbound operation; unknown ones
    /// yield `Ok(None)`. `Entity:$:action` names a bound operation: an unknown
    /// entity is a not-found error, an unknown action yields `Ok(None)`.
    fn definition(&self, id: &str) -> Result<Option<Definition<'_>>, AdapterError> {
        if let Some(entity) = self.entity(id) {
            return Ok(Some(Definition::Entity(entity)));
        }
        if let Some(op) = self.operation(id) {
            return Ok(Some(Definition::Operation(op)));
        }
        let Some((entity_name, action)) = id.split_once(BOUND_SEPARATOR) else {
            return Ok(None);
        };
        let entity = self
            .entity(entity_name)
            .ok_or_else(|| AdapterError::not_found(format!("Entity \"{entity_name}\" not found")))?;
        Ok(entity.action(action).map(Definition::Operation))
    }
}

/// The bundled service model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Model {
    /// Service name.
    pub service: String,
    /// Entities in declaration order.
    #[serde(default)]
    pub entities: IndexMap<String, EntityDef>,
    /// Unbound operations.
    #[serde(default)]
    pub operations: IndexMap<String, OperationDef>,
}

impl Model {
    /// Creates a new model builder.
    #[must_use]
    pub fn builder(service: impl Into<String>) -> ModelBuilder {
        ModelBuilder {
            model: Model {
                service: service.into(),
                entities: IndexMap::new(),
                operations: IndexMap::new(),
            },
        }
    }

    /// Loads and validates a model file, picking the format by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            other => Err(ModelError::UnsupportedFormat(
                other.unwrap_or_default().to_string(),
            )),
        }
    }

    /// Parses and validates a JSON model.
    pub fn from_json_str(content: &str) -> Result<Self, ModelError> {
        let model: Self =
            serde_json::from_str(content).map_err(|e| ModelError::Parse(e.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    /// Parses and validates a TOML model.
    pub fn from_toml_str(content: &str) -> Result<Self, ModelError> {
        let model: Self = toml::from_str(content).map_err(|e| ModelError::Parse(e.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    /// Checks that keys are declared elements and that associations point to
    /// known entities.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.service.is_empty() {
            return Err(ModelError::Invalid("service name cannot be empty".to_string()));
        }
        for (name, entity) in &self.entities {
            for key in &entity.keys {
                if !entity.elements.contains_key(key) {
                    return Err(ModelError::Invalid(format!(
                        "key '{key}' of entity '{name}' is not an element"
                    )));
                }
            }
            for (element, ty) in &entity.elements {
                self.check_target(&format!("{name}.{element}"), ty)?;
            }
            for (action, op) in &entity.actions {
                self.check_operation(&format!("{name}.{action}"), op)?;
            }
        }
        for (name, op) in &self.operations {
            self.check_operation(name, op)?;
        }
        Ok(())
    }

    fn check_operation(&self, name: &str, op: &OperationDef) -> Result<(), ModelError> {
        for (param, ty) in &op.params {
            self.check_target(&format!("{name}({param})"), ty)?;
        }
        match &op.returns {
            Some(ty) => self.check_target(name, ty),
            None => Ok(()),
        }
    }

    fn check_target(&self, path: &str, ty: &ElementType) -> Result<(), ModelError> {
        match ty.target() {
            Some(target) if !self.entities.contains_key(target) => Err(ModelError::Invalid(
                format!("'{path}' targets unknown entity '{target}'"),
            )),
            _ => Ok(()),
        }
    }
}

impl Catalog for Model {
    fn service_name(&self) -> &str {
        &self.service
    }

    fn entity_names(&self) -> Vec<&str> {
        self.entities.keys().map(String::as_str).collect()
    }

    fn entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.get(name)
    }

    fn operation(&self, name: &str) -> Option<&OperationDef> {
        self.operations.get(name)
    }
}

/// Builder for [`Model`].
#[derive(Debug)]
pub struct ModelBuilder {
    model: Model,
}

impl ModelBuilder {
    /// Adds an entity.
    #[must_use]
    pub fn entity(mut self, name: impl Into<String>, def: EntityDef) -> Self {
        self.model.entities.insert(name.into(), def);
        self
    }

    /// Adds an unbound operation.
    #[must_use]
    pub fn operation(mut self, name: impl Into<String>, def: OperationDef) -> Self {
        self.model.operations.insert(name.into(), def);
        self
    }

    /// Builds the model without validation.
    #[must_use]
    pub fn build(self) -> Model {
        self.model
    }
}
