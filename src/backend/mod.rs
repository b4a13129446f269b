//! Backend module - Traits, generation clients and factory selection

pub mod http_backend;
pub mod preview_backend;
pub mod rembg_client;
pub mod test_utils;
pub mod traits;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::BackendSettings;
use crate::error::{AppError, Result};
use http_backend::HttpBackendFactory;
use preview_backend::PreviewBackendFactory;
use traits::BackendFactory;

/// Which generation backend the service instantiates models with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Deterministic in-process renderer, no weights required
    #[default]
    Preview,
    /// AUTOMATIC1111-compatible HTTP server
    Http,
}

/// Build the factory selected by configuration
pub fn build_factory(settings: &BackendSettings) -> Result<Arc<dyn BackendFactory>> {
    match settings.kind {
        BackendKind::Preview => Ok(Arc::new(PreviewBackendFactory::new())),
        BackendKind::Http => {
            let endpoint = settings
                .endpoint
                .as_deref()
                .filter(|endpoint| !endpoint.is_empty())
                .ok_or_else(|| {
                    AppError::Config(config::ConfigError::Message(
                        "http backend requires an endpoint".to_string(),
                    ))
                })?;
            let factory = HttpBackendFactory::new(endpoint, settings.timeout_ms)
                .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;
            Ok(Arc::new(factory))
        }
    }
}
