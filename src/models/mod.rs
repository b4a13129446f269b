//! Model registry and loader

pub mod loader;
pub mod registry;

pub use loader::{LoadedModelHandle, LoadedModelInfo, ModelLoader};
pub use registry::{builtin_catalog, Capability, ModelDescriptor, ModelRegistry};
