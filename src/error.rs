//! Error taxonomy for the photo editor service

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::dispatch::Operation;
use crate::models::Capability;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unknown model: {model}")]
    UnknownModel { model: String },

    #[error("Model '{model}' ({capability}) cannot perform {operation}")]
    IncompatibleOperation {
        model: String,
        operation: Operation,
        capability: Capability,
    },

    #[error("Failed to load model '{model}': {message}")]
    ModelLoad { model: String, message: String },

    #[error("{operation} failed on model '{model}': {message}")]
    Generation {
        operation: Operation,
        model: String,
        message: String,
    },

    #[error("Width and height must be multiples of 8 between 64 and 2048, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Feature disabled: {0}")]
    FeatureDisabled(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Backend error: {0}")]
    BackendError(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            AppError::UnknownModel { .. } => "unknown_model",
            AppError::IncompatibleOperation { .. } => "incompatible_operation",
            AppError::ModelLoad { .. } => "model_load_failed",
            AppError::Generation { .. } => "generation_failed",
            AppError::InvalidDimensions { .. } => "invalid_dimensions",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::FeatureDisabled(_) => "feature_disabled",
            AppError::Config(_) => "config_error",
            AppError::Io(_) => "io_error",
            AppError::Image(_) => "invalid_image",
            AppError::Multipart(_) => "invalid_multipart",
            AppError::BackendError(_) => "backend_error",
            AppError::AuthenticationFailed(_) => "invalid_api_key",
            AppError::RateLimitExceeded => "rate_limit_exceeded",
            AppError::NotFound(_) => "not_found",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Whether retrying the same request later can succeed
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            AppError::ModelLoad { .. }
                | AppError::Generation { .. }
                | AppError::BackendError(_)
                | AppError::RateLimitExceeded
        )
    }

    /// Model key the error refers to, if any
    pub fn model(&self) -> Option<&str> {
        match self {
            AppError::UnknownModel { model }
            | AppError::IncompatibleOperation { model, .. }
            | AppError::ModelLoad { model, .. }
            | AppError::Generation { model, .. } => Some(model),
            _ => None,
        }
    }

    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::UnknownModel { .. } => (StatusCode::NOT_FOUND, "not_found_error"),
            AppError::IncompatibleOperation { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_request_error")
            }
            AppError::ModelLoad { .. } => (StatusCode::SERVICE_UNAVAILABLE, "server_error"),
            AppError::Generation { .. } => (StatusCode::BAD_GATEWAY, "backend_error"),
            AppError::InvalidDimensions { .. }
            | AppError::InvalidRequest(_)
            | AppError::Image(_)
            | AppError::Multipart(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
            AppError::FeatureDisabled(_) => (StatusCode::SERVICE_UNAVAILABLE, "server_error"),
            AppError::Config(_) | AppError::Io(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "server_error")
            }
            AppError::BackendError(_) => (StatusCode::BAD_GATEWAY, "backend_error"),
            AppError::AuthenticationFailed(_) => {
                (StatusCode::UNAUTHORIZED, "authentication_error")
            }
            AppError::RateLimitExceeded => (StatusCode::TOO_MANY_REQUESTS, "rate_limit_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found_error"),
        }
    }
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    pub retriable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();

        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }

        let operation = match &self {
            AppError::IncompatibleOperation { operation, .. }
            | AppError::Generation { operation, .. } => Some(*operation),
            _ => None,
        };

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                message: self.to_string(),
                r#type: error_type.to_string(),
                code: self.code().to_string(),
                model: self.model().map(str::to_string),
                operation,
                retriable: self.is_retriable(),
            },
        });

        (status, body).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
