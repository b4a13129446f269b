//! Model catalog, switching and eviction

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::api::handlers::require_generation;
use crate::error::Result;
use crate::models::{Capability, LoadedModelInfo};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ModelStatus {
    pub key: String,
    pub backend_id: String,
    pub capability: Capability,
    pub memory_estimate_mb: u32,
    pub description: String,
    pub default_size: u32,
    pub loaded: bool,
    pub loading: bool,
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct FeatureStatus {
    pub generation: bool,
    pub background_removal: bool,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelStatus>,
    pub loaded: Vec<LoadedModelInfo>,
    pub active_model: Option<String>,
    pub default_model: String,
    pub backend: String,
    pub features: FeatureStatus,
}

pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    let loaded_keys = state.loader.loaded_keys();
    let active = state.loader.active_key();

    let models = state
        .registry
        .list()
        .iter()
        .map(|descriptor| ModelStatus {
            key: descriptor.key.clone(),
            backend_id: descriptor.backend_id.clone(),
            capability: descriptor.capability,
            memory_estimate_mb: descriptor.memory_estimate_mb,
            description: descriptor.description.clone(),
            default_size: descriptor.default_size,
            loaded: loaded_keys.contains(&descriptor.key),
            loading: state.loader.is_loading(&descriptor.key),
            active: active.as_deref() == Some(descriptor.key.as_str()),
        })
        .collect();

    Json(ModelsResponse {
        models,
        loaded: state.loader.loaded_models(),
        active_model: active,
        default_model: state.settings.generation.default_model.clone(),
        backend: state.loader.factory_kind().to_string(),
        features: FeatureStatus {
            generation: state.settings.features.generation,
            background_removal: state.rembg.is_some(),
        },
    })
}

#[derive(Debug, Deserialize)]
pub struct SwitchModelRequest {
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct SwitchModelResponse {
    pub active_model: String,
    pub capability: Capability,
    pub loaded_at: DateTime<Utc>,
}

pub async fn switch_model(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SwitchModelRequest>,
) -> Result<Json<SwitchModelResponse>> {
    require_generation(&state)?;

    let handle = state.loader.switch_active(request.model.trim()).await?;
    Ok(Json(SwitchModelResponse {
        active_model: handle.key().to_string(),
        capability: handle.descriptor().capability,
        loaded_at: handle.loaded_at(),
    }))
}

#[derive(Debug, Serialize)]
pub struct EvictModelResponse {
    pub model: String,
    pub evicted: bool,
}

pub async fn evict_model(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<EvictModelResponse>> {
    let evicted = state.loader.evict(&key)?;
    info!(model = %key, evicted, "Eviction requested");
    Ok(Json(EvictModelResponse {
        model: key,
        evicted,
    }))
}
