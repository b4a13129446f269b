//! Service information and health

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::AppState;

pub async fn root() -> Json<Value> {
    Json(json!({
        "name": "AI Photo Editor API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "upload": "/upload",
            "remove_background": "/remove-background",
            "apply_filter": "/apply-filter",
            "adjust_brightness": "/adjust-brightness",
            "generate_image": "/generate-image",
            "inpaint": "/inpaint",
            "outpaint": "/outpaint",
            "style_transfer": "/style-transfer",
            "text_effect": "/text-effect",
            "models": "/models",
            "health": "/health"
        }
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub ai_models_enabled: bool,
    pub background_removal_enabled: bool,
    pub device: String,
    pub backend: String,
    pub active_model: Option<String>,
    pub loaded_models: BTreeSet<String>,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let now = Utc::now();
    Json(HealthResponse {
        status: "healthy",
        ai_models_enabled: state.settings.features.generation,
        background_removal_enabled: state.rembg.is_some(),
        device: state.settings.generation.device.clone(),
        backend: state.loader.factory_kind().to_string(),
        active_model: state.loader.active_key(),
        loaded_models: state.loader.loaded_keys(),
        started_at: state.started_at,
        uptime_secs: (now - state.started_at).num_seconds(),
    })
}
