//! Assembles mounted services from a loaded configuration.
//!
//! The `xmlgate` binary serves one model file with the in-memory engine.
//! In passthrough mode the transcoded JSON request is echoed back, which
//! makes the binary usable as a transcoding probe.

use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use http_body_util::{BodyExt, Full};
use thiserror::Error;
use xmlgate_config::{AdapterConfig, XmlGateConfig};
use xmlgate_core::fixtures::MemoryEngine;
use xmlgate_core::{AdapterMode, Catalog, Model, ModelError};
use xmlgate_middleware::{
    AdapterSettings, BoxFuture, BuildError, Request, Response, ResponseExt, XmlAdapter,
    APPLICATION_JSON,
};

use crate::error::ServerError;
use crate::registry::{MountedServices, ServiceRegistry};

/// Errors assembling services at startup.
#[derive(Debug, Error)]
pub enum StartupError {
    /// `model.path` is not set.
    #[error("model.path is required")]
    MissingModel,

    /// The model file could not be loaded.
    #[error("failed to load model: {0}")]
    Model(#[from] ModelError),

    /// The adapter could not be built.
    #[error("failed to build adapter: {0}")]
    Adapter(#[from] BuildError),

    /// Registering or mounting failed.
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Converts the `[adapter]` section to adapter settings.
#[must_use]
pub fn adapter_settings(config: &AdapterConfig) -> AdapterSettings {
    AdapterSettings {
        mode: config.mode,
        error_handler: config.error_handler,
        max_body_bytes: config.max_body_bytes,
        expose_internal_errors: config.expose_internal_errors,
    }
}

/// Loads the model, builds its adapter and mounts it.
pub fn mount_from_config(config: &XmlGateConfig) -> Result<Arc<MountedServices>, StartupError> {
    let path = config.model.path.as_deref().ok_or(StartupError::MissingModel)?;
    let model = Arc::new(Model::from_file(path)?);
    tracing::info!(
        path = %path,
        service = %model.service_name(),
        entities = model.entities.len(),
        "model loaded"
    );

    let service_path = config
        .model
        .service_path
        .clone()
        .unwrap_or_else(|| model.service_name().to_string());
    let adapter = build_adapter(Arc::clone(&model), adapter_settings(&config.adapter))?;

    let registry = ServiceRegistry::new();
    registry.register(service_path, adapter)?;
    Ok(registry.mount(&config.server.mount_path)?)
}

fn build_adapter(model: Arc<Model>, settings: AdapterSettings) -> Result<XmlAdapter, BuildError> {
    let builder = XmlAdapter::builder(Arc::clone(&model) as Arc<dyn Catalog>).settings(settings);
    match settings.mode {
        AdapterMode::FullDispatch => builder.engine(Arc::new(MemoryEngine::new(model))).build(),
        AdapterMode::Passthrough => builder.downstream(echo_json).build(),
    }
}

fn echo_json(request: Request) -> BoxFuture<'static, Response> {
    Box::pin(async move {
        let bytes: Bytes = match request.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(_) => return Response::aborted(),
        };
        if bytes.is_empty() {
            return Response::empty(StatusCode::NO_CONTENT);
        }
        let mut response = Response::new(Full::new(bytes));
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        response
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use xmlgate_core::fixtures::bookshop_model;
    use xmlgate_middleware::full_body;

    fn model_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        let json = serde_json::to_string(&bookshop_model()).unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_model_path() {
        let config = XmlGateConfig::default();
        assert!(matches!(mount_from_config(&config), Err(StartupError::MissingModel)));
    }

    #[test]
    fn test_mount_uses_model_service_name() {
        let file = model_file();
        let mut config = XmlGateConfig::default();
        config.model.path = Some(file.path().display().to_string());

        let services = mount_from_config(&config).unwrap();
        assert_eq!(services.mount_path(), "/xml");
        assert_eq!(services.service_paths().collect::<Vec<_>>(), vec!["CatalogService"]);
    }

    #[test]
    fn test_service_path_override() {
        let file = model_file();
        let mut config = XmlGateConfig::default();
        config.model.path = Some(file.path().display().to_string());
        config.model.service_path = Some("catalog".to_string());
        config.adapter.mode = AdapterMode::Passthrough;

        let services = mount_from_config(&config).unwrap();
        assert_eq!(services.service_paths().collect::<Vec<_>>(), vec!["catalog"]);
    }

    #[test]
    fn test_bundled_config_and_model_load() {
        let root = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config");
        let mut config = xmlgate_config::ConfigLoader::new()
            .with_file(format!("{root}/xmlgate.toml"))
            .unwrap()
            .load()
            .unwrap();
        config.model.path = Some(format!("{root}/bookshop.toml"));

        let services = mount_from_config(&config).unwrap();
        assert_eq!(services.service_paths().collect::<Vec<_>>(), vec!["CatalogService"]);
    }

    #[test]
    fn test_adapter_settings_mapping() {
        let config = AdapterConfig {
            error_handler: false,
            mode: AdapterMode::Passthrough,
            max_body_bytes: 512,
            expose_internal_errors: true,
        };
        let settings = adapter_settings(&config);
        assert_eq!(settings.mode, AdapterMode::Passthrough);
        assert!(!settings.error_handler);
        assert_eq!(settings.max_body_bytes, 512);
        assert!(settings.expose_internal_errors);
    }

    #[tokio::test]
    async fn test_echo_returns_transcoded_body() {
        let request = http::Request::builder()
            .method(http::Method::POST)
            .uri("/Books")
            .body(full_body(r#"{"title":"Dune"}"#))
            .unwrap();
        let response = echo_json(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], APPLICATION_JSON);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], br#"{"title":"Dune"}"#);
    }
}
