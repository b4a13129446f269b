//! AI photo editor backend
//!
//! Classic image edits plus AI generation served over HTTP. Generation goes
//! through a model registry, a single-flight model loader and a dispatch
//! facade that picks and drives the right backend.

pub mod api;
pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod imaging;
pub mod middleware;
pub mod models;
pub mod response;

pub use error::{AppError, Result};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use backend::rembg_client::RembgClient;
use backend::traits::BackendFactory;
use config::Settings;
use dispatch::DispatchFacade;
use models::{ModelLoader, ModelRegistry};
use response::UploadStore;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<ModelRegistry>,
    pub loader: Arc<ModelLoader>,
    pub facade: Arc<DispatchFacade>,
    pub uploads: UploadStore,
    /// Present only when background removal is enabled
    pub rembg: Option<RembgClient>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Build the state with the generation backend chosen by configuration
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let factory = backend::build_factory(&settings.generation.backend)?;
        Self::with_factory(settings, factory)
    }

    /// Build the state around an explicit backend factory
    pub fn with_factory(settings: Settings, factory: Arc<dyn BackendFactory>) -> Result<Self> {
        let registry = Arc::new(ModelRegistry::new(settings.model_catalog())?);
        let loader = Arc::new(ModelLoader::with_capacity(
            registry.clone(),
            factory,
            settings.generation.max_loaded_models,
        ));
        let facade = Arc::new(DispatchFacade::new(
            registry.clone(),
            loader.clone(),
            settings.generation.clone(),
        ));

        let rembg = if settings.features.background_removal {
            let config = &settings.background_removal;
            Some(
                RembgClient::new(&config.endpoint, config.timeout_ms)
                    .map_err(|e| AppError::Internal(format!("Failed to create rembg client: {}", e)))?,
            )
        } else {
            None
        };

        info!(
            models = registry.len(),
            backend = loader.factory_kind(),
            generation = settings.features.generation,
            background_removal = settings.features.background_removal,
            "Application state initialized"
        );

        Ok(Self {
            uploads: UploadStore::new(&settings.storage.upload_dir),
            settings: Arc::new(settings),
            registry,
            loader,
            facade,
            rembg,
            started_at: Utc::now(),
        })
    }
}
