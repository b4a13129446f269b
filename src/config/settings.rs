//! Application settings and configuration management

use crate::backend::BackendKind;
use crate::error::{AppError, Result};
use crate::models::{builtin_catalog, ModelDescriptor};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub features: FeatureFlags,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub background_removal: BackgroundRemovalConfig,
    /// Model catalog; the built-in catalog is used when empty
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Cross-origin configuration for the web frontend
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
    ]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_keys: Vec<String>,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,
    #[serde(default = "default_burst")]
    pub burst_size: u32,
}

fn default_rps() -> u32 {
    20
}

fn default_burst() -> u32 {
    40
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: default_rps(),
            burst_size: default_burst(),
        }
    }
}

/// Upload storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_upload_dir() -> String {
    "./uploads".to_string()
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Feature families that can be switched off
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FeatureFlags {
    /// Text-to-image, inpaint, outpaint, style transfer and text effects
    #[serde(default)]
    pub generation: bool,
    #[serde(default)]
    pub background_removal: bool,
}

/// Generation backend selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendSettings {
    #[serde(default)]
    pub kind: BackendKind,
    /// Base URL of the generation server for the http kind
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_backend_timeout")]
    pub timeout_ms: u64,
}

fn default_backend_timeout() -> u64 {
    300_000
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            endpoint: None,
            timeout_ms: default_backend_timeout(),
        }
    }
}

/// Parameter defaults applied when a request omits them
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationDefaults {
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f32,
    #[serde(default = "default_strength")]
    pub strength: f32,
}

fn default_steps() -> u32 {
    50
}

fn default_guidance_scale() -> f32 {
    7.5
}

fn default_strength() -> f32 {
    0.75
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            guidance_scale: default_guidance_scale(),
            strength: default_strength(),
        }
    }
}

/// Model loading and dispatch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Reported by the health endpoint
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_model_cache_dir")]
    pub model_cache_dir: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    /// 0 keeps every loaded model resident
    #[serde(default)]
    pub max_loaded_models: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub defaults: GenerationDefaults,
}

fn default_device() -> String {
    "cpu".to_string()
}

fn default_model_cache_dir() -> String {
    "./models".to_string()
}

fn default_model() -> String {
    "sd-v1-5".to_string()
}

fn default_request_timeout() -> u64 {
    600
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            model_cache_dir: default_model_cache_dir(),
            default_model: default_model(),
            max_loaded_models: 0,
            request_timeout_secs: default_request_timeout(),
            backend: BackendSettings::default(),
            defaults: GenerationDefaults::default(),
        }
    }
}

/// rembg server used for background removal
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackgroundRemovalConfig {
    #[serde(default = "default_rembg_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_rembg_timeout")]
    pub timeout_ms: u64,
}

fn default_rembg_endpoint() -> String {
    "http://localhost:7000".to_string()
}

fn default_rembg_timeout() -> u64 {
    60_000
}

impl Default for BackgroundRemovalConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rembg_endpoint(),
            timeout_ms: default_rembg_timeout(),
        }
    }
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::Config(config::ConfigError::Message(message.into()))
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            // Load from configuration file
            .add_source(File::from(path.as_ref()).required(false))
            // Override with environment variables (prefixed with PHOTO_EDITOR__)
            .add_source(
                Environment::with_prefix("PHOTO_EDITOR")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors.allowed_origins")
                    .with_list_parse_key("auth.api_keys")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Models to register, falling back to the built-in catalog
    pub fn model_catalog(&self) -> Vec<ModelDescriptor> {
        if self.models.is_empty() {
            builtin_catalog()
        } else {
            self.models.clone()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("Server port cannot be 0"));
        }

        let catalog = self.model_catalog();
        let mut keys = HashSet::new();
        for model in &catalog {
            if model.key.is_empty() {
                return Err(invalid("Model key cannot be empty"));
            }
            if !keys.insert(model.key.as_str()) {
                return Err(invalid(format!("Duplicate model key '{}'", model.key)));
            }
            if model.default_size % 8 != 0 {
                return Err(invalid(format!(
                    "Model '{}' default_size must be a multiple of 8",
                    model.key
                )));
            }
        }

        if !keys.contains(self.generation.default_model.as_str()) {
            return Err(invalid(format!(
                "Default model '{}' is not in the model catalog",
                self.generation.default_model
            )));
        }

        if self.generation.backend.kind == BackendKind::Http
            && self.generation.backend.endpoint.as_deref().map_or(true, str::is_empty)
        {
            return Err(invalid("generation.backend.endpoint is required for the http backend"));
        }

        if self.generation.defaults.steps == 0 {
            return Err(invalid("generation.defaults.steps must be at least 1"));
        }

        if self.auth.enabled && self.auth.api_keys.is_empty() {
            return Err(invalid("auth is enabled but no api_keys are configured"));
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err(invalid(format!(
                "logging.format must be 'json' or 'pretty', got '{}'",
                self.logging.format
            )));
        }

        Ok(())
    }
}
