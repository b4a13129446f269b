//! Dispatch layer - request types and the generation facade

pub mod facade;
pub mod request;

pub use crate::imaging::OutpaintDirection;
pub use facade::{check_dimensions, DispatchFacade, MAX_SIDE, MIN_SIDE};
pub use request::{GenerationRequest, GenerationResult, Operation, MAX_EXPAND_PIXELS, MAX_SEED};
