//! Service registry and mount.
//!
//! Services are collected as they are built and mounted exactly once under
//! the adapter's mount path. After [`ServiceRegistry::mount`] the set of
//! services is frozen: further registrations and mounts fail.
//!
//! ```text
//! /xml/CatalogService/Books(201)
//! └┬─┘ └─────┬──────┘└────┬────┘
//! mount   service     path seen by the adapter
//! ```

use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use parking_lot::Mutex;
use xmlgate_middleware::XmlAdapter;

use crate::error::ServerError;

/// Collects adapters until they are mounted.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    pending: Mutex<IndexMap<String, Arc<XmlAdapter>>>,
    mounted: OnceLock<Arc<MountedServices>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `adapter` under `service_path`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AlreadyMounted`] after [`mount`](Self::mount)
    /// and [`ServerError::DuplicateService`] for a path that is taken.
    pub fn register(
        &self,
        service_path: impl Into<String>,
        adapter: XmlAdapter,
    ) -> Result<(), ServerError> {
        let service_path = service_path.into();
        let mut pending = self.pending.lock();
        if let Some(mounted) = self.mounted.get() {
            return Err(ServerError::AlreadyMounted(mounted.mount_path.clone()));
        }
        if pending.contains_key(&service_path) {
            return Err(ServerError::DuplicateService(service_path));
        }

        tracing::debug!(service_path = %service_path, service = %adapter.service(), "service registered");
        pending.insert(service_path, Arc::new(adapter));
        Ok(())
    }

    /// Mounts every registered service under `mount_path`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AlreadyMounted`] on every call after the first
    /// successful one and [`ServerError::NoServices`] for an empty registry.
    pub fn mount(&self, mount_path: &str) -> Result<Arc<MountedServices>, ServerError> {
        let mut pending = self.pending.lock();
        if let Some(mounted) = self.mounted.get() {
            return Err(ServerError::AlreadyMounted(mounted.mount_path.clone()));
        }
        if pending.is_empty() {
            return Err(ServerError::NoServices);
        }

        let mounted = Arc::new(MountedServices {
            mount_path: normalize_mount(mount_path),
            services: std::mem::take(&mut *pending),
        });
        // `pending` is still held, so no other mount can fill the slot.
        let stored = self.mounted.set(Arc::clone(&mounted));
        debug_assert!(stored.is_ok(), "mount slot filled while pending lock was held");

        tracing::info!(
            mount_path = %mounted.mount_path,
            services = ?mounted.service_paths().collect::<Vec<_>>(),
            "xml adapter mounted"
        );
        Ok(mounted)
    }

    /// Returns the mounted services, if [`mount`](Self::mount) succeeded.
    #[must_use]
    pub fn mounted(&self) -> Option<Arc<MountedServices>> {
        self.mounted.get().cloned()
    }
}

fn normalize_mount(mount_path: &str) -> String {
    let trimmed = mount_path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// The frozen set of services under one mount path.
#[derive(Debug)]
pub struct MountedServices {
    mount_path: String,
    services: IndexMap<String, Arc<XmlAdapter>>,
}

/// A request path matched to a mounted service.
#[derive(Debug, Clone)]
pub struct Route<'a> {
    /// Service path segment that matched.
    pub service_path: &'a str,
    /// Adapter serving the service.
    pub adapter: Arc<XmlAdapter>,
    /// Path below the service, always starting with `/`.
    pub remainder: &'a str,
}

/// Outcome of matching a path against the mount.
#[derive(Debug, Clone)]
pub enum RouteMatch<'a> {
    /// The path addresses a mounted service.
    Service(Route<'a>),
    /// The path is under the mount but names no registered service.
    UnknownService(&'a str),
    /// The path is outside the mount.
    Outside,
}

impl MountedServices {
    /// Returns the mount path.
    #[must_use]
    pub fn mount_path(&self) -> &str {
        &self.mount_path
    }

    /// Returns the service paths in registration order.
    pub fn service_paths(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Matches `path` against the mount and the service paths.
    #[must_use]
    pub fn route<'a>(&'a self, path: &'a str) -> RouteMatch<'a> {
        let Some(below_mount) = strip_mount(&self.mount_path, path) else {
            return RouteMatch::Outside;
        };

        let below_mount = below_mount.trim_start_matches('/');
        let (segment, remainder) = match below_mount.find('/') {
            Some(idx) => (&below_mount[..idx], &below_mount[idx..]),
            None => (below_mount, "/"),
        };

        match self.services.get_key_value(segment) {
            Some((service_path, adapter)) => RouteMatch::Service(Route {
                service_path,
                adapter: Arc::clone(adapter),
                remainder,
            }),
            None => RouteMatch::UnknownService(segment),
        }
    }
}

fn strip_mount<'a>(mount_path: &str, path: &'a str) -> Option<&'a str> {
    if mount_path == "/" {
        return Some(path);
    }
    let rest = path.strip_prefix(mount_path)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}
