//! Path resolution.
//!
//! Maps the request path below the service root to a [`ResolvedTarget`]:
//!
//! | Path | Target |
//! |------|--------|
//! | `/Books` | collection |
//! | `/Books/201`, `/Books(201)`, `/Books(ID=201)` | instance |
//! | `/Books/201/author` | navigation through an association |
//! | `/Books/201/rate` | bound operation `Books:$:rate` |
//! | `/submitOrder` | unbound operation |
//!
//! Key literals are typed by the key element: integers become JSON numbers,
//! quoted literals lose their quotes, everything else stays a string.

use std::borrow::Cow;
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use serde_json::Value;
use xmlgate_core::{AdapterError, Catalog, ElementType, EntityDef, KeyValues, NavigationStep, ResolvedTarget};

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::pipeline::Stage;
use crate::types::{Request, Response, ResponseExt};

/// Middleware resolving request paths against the catalog.
#[derive(Clone)]
pub struct PathResolver {
    catalog: Arc<dyn Catalog>,
}

impl std::fmt::Debug for PathResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathResolver")
            .field("service", &self.catalog.service_name())
            .finish()
    }
}

impl PathResolver {
    /// Creates a resolver for `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    /// Resolves a path such as `/Books/201/author`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::NotFound`] for unknown entities, elements or
    /// operations, and [`AdapterError::MalformedDocument`] for key literals
    /// that do not match the key type.
    pub fn resolve(&self, path: &str) -> Result<ResolvedTarget, AdapterError> {
        let segments = split_path(path)?;
        let mut segments = segments.iter().map(AsRef::as_ref);

        let Some(first) = segments.next() else {
            return Err(AdapterError::not_found("No resource addressed"));
        };
        let (name, inline_key) = split_inline_key(first);

        if inline_key.is_none() && self.catalog.operation(name).is_some() {
            if let Some(extra) = segments.next() {
                return Err(not_found(extra));
            }
            return Ok(ResolvedTarget::unbound_operation(name));
        }

        let mut entity = self.entity(name)?;
        let mut target = ResolvedTarget::collection(name);
        if let Some(raw) = inline_key {
            target.key = Some(parse_key(name, entity, raw)?);
        }
        let mut instance = target.key.is_some();

        for segment in segments {
            if target.is_operation() {
                return Err(not_found(segment));
            }
            let (segment_name, inline_key) = split_inline_key(segment);

            if inline_key.is_none() && entity.action(segment_name).is_some() {
                target = target.bind_operation(segment_name);
                continue;
            }

            if !instance {
                if inline_key.is_some() {
                    return Err(not_found(segment));
                }
                let current = target.target.clone().unwrap_or_default();
                let key = parse_key(&current, entity, segment)?;
                match target.navigation.last_mut() {
                    Some(step) => step.key = Some(key),
                    None => target.key = Some(key),
                }
                instance = true;
                continue;
            }

            let Some(element) = entity.element(segment_name).filter(|element| {
                matches!(
                    element,
                    ElementType::Association { .. } | ElementType::Composition { .. }
                )
            }) else {
                return Err(not_found(segment));
            };
            let next_entity = element.target().unwrap_or_default().to_string();
            let many = element.is_many();
            entity = self.entity(&next_entity)?;
            let key = match inline_key {
                Some(raw) if many => Some(parse_key(&next_entity, entity, raw)?),
                Some(_) => return Err(not_found(segment)),
                None => None,
            };
            instance = key.is_some() || !many;
            target.navigation.push(NavigationStep {
                element: segment_name.to_string(),
                entity: next_entity.clone(),
                key,
            });
            target.target = Some(next_entity);
        }

        Ok(target)
    }

    fn entity(&self, name: &str) -> Result<&EntityDef, AdapterError> {
        self.catalog.entity(name).ok_or_else(|| not_found(name))
    }
}

fn not_found(segment: &str) -> AdapterError {
    AdapterError::not_found(format!("Resource \"{segment}\" not found"))
}

fn split_path(path: &str) -> Result<Vec<Cow<'_, str>>, AdapterError> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            percent_decode_str(segment)
                .decode_utf8()
                .map_err(|_| AdapterError::not_found(format!("Resource \"{segment}\" not found")))
        })
        .collect()
}

/// Splits `Books(201)` into `("Books", Some("201"))`.
fn split_inline_key(segment: &str) -> (&str, Option<&str>) {
    match segment.strip_suffix(')').and_then(|s| s.split_once('(')) {
        Some((name, key)) if !name.is_empty() => (name, Some(key)),
        _ => (segment, None),
    }
}

fn parse_key(entity_name: &str, entity: &EntityDef, raw: &str) -> Result<KeyValues, AdapterError> {
    let mut key = KeyValues::new();
    if raw.contains('=') {
        for pair in split_pairs(raw) {
            let (name, literal) = pair
                .split_once('=')
                .ok_or_else(|| invalid_key(entity_name, raw))?;
            let name = name.trim();
            if !entity.keys.iter().any(|k| k == name) {
                return Err(invalid_key(entity_name, raw));
            }
            key.insert(name.to_string(), typed_literal(entity, name, literal.trim())?);
        }
    } else {
        let [name] = entity.keys.as_slice() else {
            return Err(invalid_key(entity_name, raw));
        };
        key.insert(name.clone(), typed_literal(entity, name, raw)?);
    }
    if key.len() != entity.keys.len() {
        return Err(invalid_key(entity_name, raw));
    }
    Ok(key)
}

/// Splits `a=1,b='x,y'` on the commas outside quoted literals.
fn split_pairs(raw: &str) -> impl Iterator<Item = &str> {
    let mut quoted = false;
    raw.split(move |ch| {
        if ch == '\'' {
            quoted = !quoted;
        }
        ch == ',' && !quoted
    })
}

fn typed_literal(entity: &EntityDef, name: &str, literal: &str) -> Result<Value, AdapterError> {
    let unquoted = literal
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .map(|s| s.replace("''", "'"));
    match (entity.element(name), unquoted) {
        (_, Some(text)) => Ok(Value::String(text)),
        (Some(ElementType::Integer), None) => literal
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| AdapterError::malformed(format!("Invalid key value \"{literal}\" for \"{name}\""))),
        _ => Ok(Value::String(literal.to_string())),
    }
}

fn invalid_key(entity: &str, raw: &str) -> AdapterError {
    AdapterError::malformed(format!("Invalid key \"{raw}\" for entity \"{entity}\""))
}

impl Middleware for PathResolver {
    fn name(&self) -> &'static str {
        Stage::Resolver.name()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let resolved = self
                .resolve(request.uri().path())
                .map(|target| target.with_query(request.uri().query()));
            match resolved {
                Ok(target) => {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        entity = ?target.target,
                        operation = ?target.operation,
                        "resolved request target"
                    );
                    ctx.set_target(target);
                    next.run(ctx, request).await
                }
                Err(err) => {
                    tracing::debug!(request_id = %ctx.request_id(), error = %err, "unresolved path");
                    Response::raised(err)
                }
            }
        })
    }
}
