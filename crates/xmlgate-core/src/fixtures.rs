//! Test fixtures for xmlgate development and testing.
//!
//! This module provides a bookshop model and [`MemoryEngine`], an in-memory
//! [`ResourceEngine`] that counts its calls. Tests across the workspace use
//! the call counters to assert that rejected requests never reach the engine.
//!
//! # Example
//!
//! ```
//! use xmlgate_core::fixtures;
//! use xmlgate_core::model::Catalog;
//!
//! let model = fixtures::bookshop_model();
//! assert_eq!(model.entity_names(), vec!["Books", "Authors", "Genres"]);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use http::StatusCode;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};

use crate::document::Document;
use crate::engine::{
    BoxFuture, EngineRequest, EngineResult, OperationKind, OperationResult, ResourceEngine,
    ResponseDraft,
};
use crate::error::AdapterError;
use crate::model::{Catalog, ElementType, EntityDef, Model, OperationDef};
use crate::target::KeyValues;

/// One stored entity instance.
pub type Row = IndexMap<String, Document>;

/// Handler for a custom operation registered on a [`MemoryEngine`].
pub type OperationHandler =
    Arc<dyn Fn(&MemoryEngine, &EngineRequest, &mut ResponseDraft) -> EngineResult + Send + Sync>;

/// Creates the bookshop model used throughout the tests.
///
/// - `Books` (key `ID`) with a `LargeBinary` cover, an `author` association
///   and the bound operations `rate` and `thumbnail`
/// - `Authors` (key `ID`) with a `Binary` photo
/// - `Genres` (key `ID`)
/// - unbound operations `submitOrder` (returns `Integer`) and `bestsellers`
///   (returns many `Books`)
#[must_use]
pub fn bookshop_model() -> Model {
    Model::builder("CatalogService")
        .entity(
            "Books",
            EntityDef::builder()
                .key("ID", ElementType::Integer)
                .element("title", ElementType::String)
                .element("stock", ElementType::Integer)
                .element("price", ElementType::Decimal)
                .element("available", ElementType::Boolean)
                .element("cover", ElementType::LargeBinary)
                .element(
                    "author",
                    ElementType::Association {
                        target: "Authors".to_string(),
                        many: false,
                    },
                )
                .element("author_ID", ElementType::Integer)
                .action(
                    "rate",
                    OperationDef::new().param("stars", ElementType::Integer),
                )
                .action(
                    "thumbnail",
                    OperationDef::new().returns(ElementType::Binary),
                )
                .build(),
        )
        .entity(
            "Authors",
            EntityDef::builder()
                .key("ID", ElementType::Integer)
                .element("name", ElementType::String)
                .element("photo", ElementType::Binary)
                .build(),
        )
        .entity(
            "Genres",
            EntityDef::builder()
                .key("ID", ElementType::Integer)
                .element("name", ElementType::String)
                .build(),
        )
        .operation(
            "submitOrder",
            OperationDef::new()
                .param("book", ElementType::Integer)
                .param("quantity", ElementType::Integer)
                .returns(ElementType::Integer),
        )
        .operation(
            "bestsellers",
            OperationDef::new().returns(ElementType::Entity {
                target: "Books".to_string(),
                many: true,
            }),
        )
        .build()
}

/// Creates a [`MemoryEngine`] over the bookshop model, seeded with two
/// authors and two books and with `submitOrder`, `bestsellers`,
/// `Books:$:rate` and `Books:$:thumbnail` registered.
///
/// `Books:$:rate` answers with neither result nor status.
#[must_use]
pub fn bookshop_engine() -> MemoryEngine {
    let engine = MemoryEngine::new(Arc::new(bookshop_model()));
    engine.seed(
        "Authors",
        [
            serde_json::json!({"ID": 101, "name": "Emily Brontë"}),
            serde_json::json!({"ID": 107, "name": "Charlotte Brontë"}),
        ],
    );
    engine.seed(
        "Books",
        [
            serde_json::json!({
                "ID": 201, "title": "Wuthering Heights", "stock": 12,
                "price": 11.11, "available": true, "author_ID": 101
            }),
            serde_json::json!({
                "ID": 207, "title": "Jane Eyre", "stock": 11,
                "price": 12.34, "available": false, "author_ID": 107
            }),
        ],
    );
    engine
        .with_operation("submitOrder", submit_order)
        .with_operation("bestsellers", bestsellers)
        .with_operation("Books:$:rate", |_, _, _| Ok(None))
        .with_operation("Books:$:thumbnail", |engine, request, _| {
            let key = request
                .target
                .key
                .as_ref()
                .ok_or_else(|| AdapterError::not_found("Books instance required"))?;
            let row = engine.find("Books", key)?;
            let cover = row.get("cover").cloned().unwrap_or(Document::Null);
            Ok(Some(OperationResult::with_result(cover)))
        })
}

fn submit_order(
    engine: &MemoryEngine,
    request: &EngineRequest,
    _response: &mut ResponseDraft,
) -> EngineResult {
    let params = request.body.as_ref().and_then(Value::as_object).map(|object| {
        match object.iter().next() {
            Some((name, Value::Object(inner))) if object.len() == 1 && name == "submitOrder" => inner,
            _ => object,
        }
    });
    let int_param = |name: &str| -> Result<i64, AdapterError> {
        params
            .and_then(|p| p.get(name))
            .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .ok_or_else(|| {
                AdapterError::engine(
                    StatusCode::BAD_REQUEST,
                    "ASSERT_NOT_NULL",
                    format!("Value of parameter \"{name}\" is required"),
                )
                .with_target(name)
            })
    };
    let book = int_param("book")?;
    let quantity = int_param("quantity")?;

    let mut key = Map::new();
    key.insert("ID".to_string(), Value::from(book));
    let mut store = engine.store.write();
    let row = store
        .get_mut("Books")
        .and_then(|rows| rows.iter_mut().find(|row| key_matches(row, &key)))
        .ok_or_else(|| AdapterError::not_found(format!("Books({book}) not found")))?;
    let stock = match row.get("stock") {
        Some(Document::Number(n)) => n.as_i64().unwrap_or_default(),
        _ => 0,
    };
    if quantity > stock {
        return Err(AdapterError::engine(
            StatusCode::CONFLICT,
            "ORDER_EXCEEDS_STOCK",
            format!("{quantity} exceeds stock for book #{book}"),
        ));
    }
    let remaining = stock - quantity;
    row.insert("stock".to_string(), Document::from(remaining));
    Ok(Some(OperationResult::with_result(remaining)))
}

fn bestsellers(
    engine: &MemoryEngine,
    _request: &EngineRequest,
    _response: &mut ResponseDraft,
) -> EngineResult {
    let rows = engine.rows("Books");
    Ok(Some(OperationResult::with_result(Document::Array(
        rows.into_iter().map(Document::Object).collect(),
    ))))
}

/// In-memory resource engine with per-operation call counters.
pub struct MemoryEngine {
    catalog: Arc<Model>,
    store: RwLock<HashMap<String, Vec<Row>>>,
    operations: HashMap<String, OperationHandler>,
    calls: Mutex<HashMap<OperationKind, usize>>,
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("service", &self.catalog.service_name())
            .field("operations", &self.operations.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl MemoryEngine {
    /// Creates an empty engine over `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<Model>) -> Self {
        Self {
            catalog,
            store: RwLock::new(HashMap::new()),
            operations: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a custom operation handler under `name` (`op` or
    /// `Entity:$:op`).
    #[must_use]
    pub fn with_operation<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&MemoryEngine, &EngineRequest, &mut ResponseDraft) -> EngineResult
            + Send
            + Sync
            + 'static,
    {
        self.operations.insert(name.into(), Arc::new(handler));
        self
    }

    /// Returns the catalog the engine serves.
    #[must_use]
    pub fn catalog(&self) -> Arc<Model> {
        Arc::clone(&self.catalog)
    }

    /// Inserts rows without counting a call. Binary fields may be given as
    /// base64 text.
    pub fn seed(&self, entity: &str, rows: impl IntoIterator<Item = Value>) {
        let Some(def) = self.catalog.entity(entity) else {
            return;
        };
        let mut store = self.store.write();
        let table = store.entry(entity.to_string()).or_default();
        for value in rows {
            if let Some(object) = value.as_object() {
                if let Ok(row) = to_row(def, object) {
                    table.push(row);
                }
            }
        }
    }

    /// Returns a snapshot of all rows of `entity`.
    #[must_use]
    pub fn rows(&self, entity: &str) -> Vec<Row> {
        self.store.read().get(entity).cloned().unwrap_or_default()
    }

    /// Finds one row by key.
    pub fn find(&self, entity: &str, key: &KeyValues) -> Result<Row, AdapterError> {
        self.store
            .read()
            .get(entity)
            .and_then(|rows| rows.iter().find(|row| key_matches(row, key)))
            .cloned()
            .ok_or_else(|| not_found(entity, key))
    }

    /// Number of calls of one operation kind.
    #[must_use]
    pub fn call_count(&self, kind: OperationKind) -> usize {
        self.calls.lock().get(&kind).copied().unwrap_or(0)
    }

    /// Number of calls of all kinds.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    fn record(&self, kind: OperationKind) {
        *self.calls.lock().entry(kind).or_insert(0) += 1;
    }

    fn entity_def(&self, request: &EngineRequest) -> Result<(String, &EntityDef), AdapterError> {
        let name = request
            .target
            .target
            .clone()
            .ok_or_else(|| AdapterError::not_found("No entity addressed"))?;
        let def = self
            .catalog
            .entity(&name)
            .ok_or_else(|| AdapterError::not_found(format!("Entity \"{name}\" not found")))?;
        Ok((name, def))
    }

    fn create_sync(&self, request: &EngineRequest) -> EngineResult {
        let (name, def) = self.entity_def(request)?;
        if request.target.target_key().is_some() || !request.target.navigation.is_empty() {
            return Err(AdapterError::method_not_allowed("POST"));
        }
        let body = unwrap_envelope(def, request.body.as_ref())
            .ok_or_else(|| AdapterError::malformed("Expected an object in the request body"))?;
        let mut row = to_row(def, body)?;

        let mut store = self.store.write();
        let table = store.entry(name.clone()).or_default();
        for key in &def.keys {
            if !row.contains_key(key) {
                row.insert(key.clone(), generate_key(def.element(key), table, key));
            }
        }
        let key = row_key(def, &row);
        if table.iter().any(|existing| key_matches(existing, &key)) {
            return Err(AdapterError::engine(
                StatusCode::CONFLICT,
                "ENTITY_ALREADY_EXISTS",
                "Entity already exists",
            ));
        }
        table.push(row.clone());

        let location = format!("{name}/{}", key_path(&key));
        Ok(Some(
            OperationResult::with_result(Document::Object(row))
                .status(StatusCode::CREATED)
                .location(location),
        ))
    }

    fn read_sync(&self, request: &EngineRequest) -> EngineResult {
        let target = &request.target;
        let root = target
            .entity
            .as_deref()
            .ok_or_else(|| AdapterError::not_found("No entity addressed"))?;

        let Some(key) = &target.key else {
            let rows = self.rows(root);
            return Ok(Some(OperationResult::with_result(Document::Array(
                rows.into_iter().map(Document::Object).collect(),
            ))));
        };
        let mut row = self.find(root, key)?;
        let mut entity = root.to_string();

        for step in &target.navigation {
            let def = self
                .catalog
                .entity(&entity)
                .ok_or_else(|| AdapterError::not_found(format!("Entity \"{entity}\" not found")))?;
            let ty = def.element(&step.element);
            if ty.is_some_and(ElementType::is_many) {
                return Err(AdapterError::engine(
                    StatusCode::NOT_IMPLEMENTED,
                    "NOT_IMPLEMENTED",
                    "To-many navigation is not supported",
                ));
            }
            let target_def = self.catalog.entity(&step.entity).ok_or_else(|| {
                AdapterError::not_found(format!("Entity \"{}\" not found", step.entity))
            })?;
            let mut fk = Map::new();
            for target_key in &target_def.keys {
                let column = format!("{}_{}", step.element, target_key);
                let value = row.get(&column).map(Document::to_json).unwrap_or(Value::Null);
                fk.insert(target_key.clone(), value);
            }
            row = self.find(&step.entity, &fk)?;
            entity = step.entity.clone();
        }

        Ok(Some(OperationResult::with_result(Document::Object(row))))
    }

    fn update_sync(&self, request: &EngineRequest) -> EngineResult {
        let (name, def) = self.entity_def(request)?;
        let key = request
            .target
            .target_key()
            .cloned()
            .ok_or_else(|| AdapterError::method_not_allowed(request.method.as_str()))?;
        let body = unwrap_envelope(def, request.body.as_ref())
            .ok_or_else(|| AdapterError::malformed("Expected an object in the request body"))?;
        let changes = to_row(def, body)?;

        let mut store = self.store.write();
        let row = store
            .get_mut(&name)
            .and_then(|rows| rows.iter_mut().find(|row| key_matches(row, &key)))
            .ok_or_else(|| not_found(&name, &key))?;
        for (field, value) in changes {
            if !def.keys.contains(&field) {
                row.insert(field, value);
            }
        }
        Ok(Some(OperationResult::with_result(Document::Object(row.clone()))))
    }

    fn delete_sync(&self, request: &EngineRequest) -> EngineResult {
        let (name, _) = self.entity_def(request)?;
        let key = request
            .target
            .target_key()
            .cloned()
            .ok_or_else(|| AdapterError::method_not_allowed("DELETE"))?;
        let mut store = self.store.write();
        let rows = store.get_mut(&name).ok_or_else(|| not_found(&name, &key))?;
        let before = rows.len();
        rows.retain(|row| !key_matches(row, &key));
        if rows.len() == before {
            return Err(not_found(&name, &key));
        }
        Ok(Some(OperationResult::with_status_only(StatusCode::NO_CONTENT)))
    }

    fn invoke_sync(&self, request: &EngineRequest, response: &mut ResponseDraft) -> EngineResult {
        let name = request.target.operation.as_deref().unwrap_or_default();
        let handler = self.operations.get(name).ok_or_else(|| {
            AdapterError::engine(
                StatusCode::NOT_IMPLEMENTED,
                "NOT_IMPLEMENTED",
                format!("Operation \"{name}\" is not implemented"),
            )
        })?;
        handler(self, request, response)
    }
}

impl ResourceEngine for MemoryEngine {
    fn create<'a>(
        &'a self,
        request: &'a EngineRequest,
        _response: &'a mut ResponseDraft,
    ) -> BoxFuture<'a, EngineResult> {
        Box::pin(async move {
            self.record(OperationKind::Create);
            self.create_sync(request)
        })
    }

    fn read<'a>(
        &'a self,
        request: &'a EngineRequest,
        _response: &'a mut ResponseDraft,
    ) -> BoxFuture<'a, EngineResult> {
        Box::pin(async move {
            self.record(OperationKind::Read);
            self.read_sync(request)
        })
    }

    fn update<'a>(
        &'a self,
        request: &'a EngineRequest,
        _response: &'a mut ResponseDraft,
    ) -> BoxFuture<'a, EngineResult> {
        Box::pin(async move {
            self.record(OperationKind::Update);
            self.update_sync(request)
        })
    }

    fn delete<'a>(
        &'a self,
        request: &'a EngineRequest,
        _response: &'a mut ResponseDraft,
    ) -> BoxFuture<'a, EngineResult> {
        Box::pin(async move {
            self.record(OperationKind::Delete);
            self.delete_sync(request)
        })
    }

    fn invoke<'a>(
        &'a self,
        request: &'a EngineRequest,
        response: &'a mut ResponseDraft,
    ) -> BoxFuture<'a, EngineResult> {
        Box::pin(async move {
            self.record(OperationKind::Invoke);
            self.invoke_sync(request, response)
        })
    }
}

/// Strips a single-key root wrapper such as `{"Book": {...}}` whose key is
/// not an element of the entity.
fn unwrap_envelope<'v>(def: &EntityDef, body: Option<&'v Value>) -> Option<&'v Map<String, Value>> {
    let object = body?.as_object()?;
    if object.len() == 1 {
        if let Some((name, Value::Object(inner))) = object.iter().next() {
            if def.element(name).is_none() {
                return Some(inner);
            }
        }
    }
    Some(object)
}

/// Converts a JSON object into a stored row. Unknown fields and associations
/// are dropped; numeric text is coerced for numeric elements and base64 text
/// is decoded for binary elements.
fn to_row(def: &EntityDef, object: &Map<String, Value>) -> Result<Row, AdapterError> {
    let mut row = Row::new();
    for (field, value) in object {
        let Some(ty) = def.element(field) else {
            continue;
        };
        if ty.target().is_some() {
            continue;
        }
        row.insert(field.clone(), coerce(field, ty, value)?);
    }
    Ok(row)
}

fn coerce(field: &str, ty: &ElementType, value: &Value) -> Result<Document, AdapterError> {
    let invalid = || {
        AdapterError::engine(
            StatusCode::BAD_REQUEST,
            "ASSERT_DATA_TYPE",
            format!("Value {value} is not a valid {ty:?}"),
        )
        .with_target(field)
    };
    match (ty, value) {
        (_, Value::Null) => Ok(Document::Null),
        (ElementType::Integer, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Document::from)
            .map_err(|_| invalid()),
        (ElementType::Decimal, Value::String(s)) => s
            .trim()
            .parse::<serde_json::Number>()
            .map(Document::Number)
            .map_err(|_| invalid()),
        (ElementType::Boolean, Value::String(_)) => Err(invalid()),
        (ElementType::Binary | ElementType::LargeBinary, Value::String(s)) => STANDARD
            .decode(s.trim())
            .map(|bytes| Document::Binary(bytes.into()))
            .map_err(|_| invalid()),
        _ => Ok(Document::from(value.clone())),
    }
}

fn key_matches(row: &Row, key: &KeyValues) -> bool {
    key.iter()
        .all(|(name, value)| row.get(name).is_some_and(|v| v.to_json() == *value))
}

fn row_key(def: &EntityDef, row: &Row) -> KeyValues {
    def.keys
        .iter()
        .map(|k| (k.clone(), row.get(k).map(Document::to_json).unwrap_or(Value::Null)))
        .collect()
}

fn key_path(key: &KeyValues) -> String {
    let render = |v: &Value| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if key.len() == 1 {
        key.values().map(render).collect()
    } else {
        key.iter()
            .map(|(k, v)| format!("{k}={}", render(v)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn generate_key(ty: Option<&ElementType>, table: &[Row], key: &str) -> Document {
    match ty {
        Some(ElementType::Integer) => {
            let max = table
                .iter()
                .filter_map(|row| match row.get(key) {
                    Some(Document::Number(n)) => n.as_i64(),
                    _ => None,
                })
                .max()
                .unwrap_or(0);
            Document::from(max + 1)
        }
        _ => Document::String(uuid::Uuid::new_v4().to_string()),
    }
}

fn not_found(entity: &str, key: &KeyValues) -> AdapterError {
    AdapterError::not_found(format!("{entity}({}) not found", key_path(key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestId;
    use crate::target::ResolvedTarget;
    use http::{HeaderMap, Method};
    use serde_json::json;

    fn request(kind: OperationKind, method: Method, target: ResolvedTarget, body: Option<Value>) -> EngineRequest {
        EngineRequest {
            kind,
            method,
            target,
            body,
            headers: HeaderMap::new(),
            request_id: RequestId::new(),
        }
    }

    fn id(value: i64) -> KeyValues {
        let mut key = Map::new();
        key.insert("ID".to_string(), json!(value));
        key
    }

    #[tokio::test]
    async fn test_create_wrapped_xml_body() {
        let engine = bookshop_engine();
        let req = request(
            OperationKind::Create,
            Method::POST,
            ResolvedTarget::collection("Books"),
            Some(json!({"Book": {"ID": "301", "title": "Villette", "available": true, "cover": "AAEC"}})),
        );
        let mut draft = ResponseDraft::new();
        let result = engine.execute(&req, &mut draft).await.unwrap().unwrap();

        assert_eq!(result.status, Some(StatusCode::CREATED));
        assert_eq!(result.location.as_deref(), Some("Books/301"));
        let stored = engine.find("Books", &id(301)).unwrap();
        assert_eq!(stored.get("cover"), Some(&Document::Binary(bytes::Bytes::from_static(&[0, 1, 2]))));
        assert_eq!(stored.get("title").and_then(Document::as_str), Some("Villette"));
        assert_eq!(engine.call_count(OperationKind::Create), 1);
    }

    #[tokio::test]
    async fn test_create_generates_integer_key_and_rejects_duplicates() {
        let engine = bookshop_engine();
        let mut draft = ResponseDraft::new();
        let req = request(
            OperationKind::Create,
            Method::POST,
            ResolvedTarget::collection("Books"),
            Some(json!({"title": "Shirley"})),
        );
        let created = engine.create(&req, &mut draft).await.unwrap().unwrap();
        assert_eq!(created.location.as_deref(), Some("Books/208"));

        let dup = request(
            OperationKind::Create,
            Method::POST,
            ResolvedTarget::collection("Books"),
            Some(json!({"ID": 201})),
        );
        let err = engine.create(&dup, &mut draft).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_integer() {
        let engine = bookshop_engine();
        let req = request(
            OperationKind::Create,
            Method::POST,
            ResolvedTarget::collection("Books"),
            Some(json!({"stock": "many"})),
        );
        let err = engine.create(&req, &mut ResponseDraft::new()).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "ASSERT_DATA_TYPE");
    }

    #[tokio::test]
    async fn test_read_collection_instance_and_navigation() {
        let engine = bookshop_engine();
        let mut draft = ResponseDraft::new();

        let all = request(OperationKind::Read, Method::GET, ResolvedTarget::collection("Books"), None);
        let result = engine.read(&all, &mut draft).await.unwrap().unwrap();
        assert!(matches!(result.result, Some(Document::Array(ref rows)) if rows.len() == 2));

        let mut nav = ResolvedTarget::instance("Books", id(201));
        nav.navigation.push(crate::target::NavigationStep {
            element: "author".to_string(),
            entity: "Authors".to_string(),
            key: None,
        });
        nav.target = Some("Authors".to_string());
        let req = request(OperationKind::Read, Method::GET, nav, None);
        let author = engine.read(&req, &mut draft).await.unwrap().unwrap();
        assert_eq!(
            author.result.unwrap().get("name").and_then(Document::as_str),
            Some("Emily Brontë")
        );
    }

    #[tokio::test]
    async fn test_read_missing_instance_is_not_found() {
        let engine = bookshop_engine();
        let req = request(
            OperationKind::Read,
            Method::GET,
            ResolvedTarget::instance("Books", id(999)),
            None,
        );
        let err = engine.read(&req, &mut ResponseDraft::new()).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Books(999) not found");
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let engine = bookshop_engine();
        let mut draft = ResponseDraft::new();
        let update = request(
            OperationKind::Update,
            Method::PATCH,
            ResolvedTarget::instance("Books", id(207)),
            Some(json!({"Books": {"stock": "3"}})),
        );
        let updated = engine.update(&update, &mut draft).await.unwrap().unwrap();
        assert_eq!(updated.result.unwrap().get("stock"), Some(&Document::from(3_i64)));

        let delete = request(
            OperationKind::Delete,
            Method::DELETE,
            ResolvedTarget::instance("Books", id(207)),
            None,
        );
        let deleted = engine.delete(&delete, &mut draft).await.unwrap().unwrap();
        assert_eq!(deleted.status, Some(StatusCode::NO_CONTENT));
        assert!(engine.delete(&delete, &mut draft).await.is_err());
        assert_eq!(engine.total_calls(), 3);
    }

    #[tokio::test]
    async fn test_registered_operations() {
        let engine = bookshop_engine();
        let mut draft = ResponseDraft::new();

        let order = request(
            OperationKind::Invoke,
            Method::POST,
            ResolvedTarget::unbound_operation("submitOrder"),
            Some(json!({"book": "201", "quantity": "2"})),
        );
        let result = engine.invoke(&order, &mut draft).await.unwrap().unwrap();
        assert_eq!(result.result, Some(Document::from(10_i64)));

        let rate = request(
            OperationKind::Invoke,
            Method::POST,
            ResolvedTarget::instance("Books", id(201)).bind_operation("rate"),
            None,
        );
        assert!(engine.invoke(&rate, &mut draft).await.unwrap().is_none());

        let unknown = request(
            OperationKind::Invoke,
            Method::POST,
            ResolvedTarget::unbound_operation("cancelOrder"),
            None,
        );
        let err = engine.invoke(&unknown, &mut draft).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(engine.call_count(OperationKind::Invoke), 3);
    }
}
