//! Request handlers

pub mod editing;
pub mod generation;
pub mod models;
pub mod status;

use crate::error::{AppError, Result};
use crate::AppState;

/// Fail with `feature_disabled` unless AI generation is switched on
pub(crate) fn require_generation(state: &AppState) -> Result<()> {
    if state.settings.features.generation {
        Ok(())
    } else {
        Err(AppError::FeatureDisabled(
            "AI generation is not enabled on this server".to_string(),
        ))
    }
}
