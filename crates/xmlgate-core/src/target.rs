//! Resolved request targets.
//!
//! The resolver stage turns a request path such as `/Books/201/author` or
//! `/Books/201/rate` into a [`ResolvedTarget`]. The dispatcher picks the
//! engine call from it and the materializer looks up [`ResolvedTarget::definition_id`]
//! in the catalog for binary-field encoding.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::BOUND_SEPARATOR;

/// Key values addressing one entity instance, by key element name.
pub type KeyValues = Map<String, Value>;

/// One association or composition step after the root entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationStep {
    /// Element followed from the previous entity.
    pub element: String,
    /// Entity reached by the step.
    pub entity: String,
    /// Key addressing one instance of a to-many target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<KeyValues>,
}

/// The entity, key, navigation path or custom operation a request addresses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTarget {
    /// Root entity named by the first path segment.
    pub entity: Option<String>,
    /// Key of the root entity instance.
    pub key: Option<KeyValues>,
    /// Navigation steps following the root instance.
    pub navigation: Vec<NavigationStep>,
    /// Custom operation: `name` when unbound, `Entity:$:name` when bound.
    pub operation: Option<String>,
    /// Entity finally addressed by the path, after navigation.
    pub target: Option<String>,
    /// Raw query string, if any.
    pub query: Option<String>,
}

impl ResolvedTarget {
    /// Creates a target addressing an entity collection.
    #[must_use]
    pub fn collection(entity: impl Into<String>) -> Self {
        let entity = entity.into();
        Self {
            target: Some(entity.clone()),
            entity: Some(entity),
            ..Self::default()
        }
    }

    /// Creates a target addressing one entity instance.
    #[must_use]
    pub fn instance(entity: impl Into<String>, key: KeyValues) -> Self {
        Self {
            key: Some(key),
            ..Self::collection(entity)
        }
    }

    /// Creates a target addressing an unbound operation.
    #[must_use]
    pub fn unbound_operation(name: impl Into<String>) -> Self {
        Self {
            operation: Some(name.into()),
            ..Self::default()
        }
    }

    /// Turns the target into a bound operation call on the addressed entity.
    #[must_use]
    pub fn bind_operation(mut self, action: &str) -> Self {
        let entity = self.target.clone().unwrap_or_default();
        self.operation = Some(format!("{entity}{BOUND_SEPARATOR}{action}"));
        self
    }

    /// Attaches the raw query string.
    #[must_use]
    pub fn with_query(mut self, query: Option<&str>) -> Self {
        self.query = query.filter(|q| !q.is_empty()).map(ToString::to_string);
        self
    }

    /// Returns `true` when a custom operation is addressed.
    #[must_use]
    pub const fn is_operation(&self) -> bool {
        self.operation.is_some()
    }

    /// Returns the key of the instance finally addressed, if any.
    #[must_use]
    pub fn target_key(&self) -> Option<&KeyValues> {
        match self.navigation.last() {
            Some(step) => step.key.as_ref(),
            None => self.key.as_ref(),
        }
    }

    /// Returns `true` when the path addresses a collection rather than one
    /// instance.
    #[must_use]
    pub fn is_collection(&self) -> bool {
        !self.is_operation() && self.target.is_some() && self.target_key().is_none()
    }

    /// Identifier of the definition used for binary-field encoding: the
    /// custom operation if present, otherwise the addressed entity.
    #[must_use]
    pub fn definition_id(&self) -> Option<&str> {
        self.operation.as_deref().or(self.target.as_deref())
    }
}
