//! Mock backends for exercising the loader and dispatch facade
//!
//! The mock factory counts instantiations per model and can be told to fail
//! or to stall on load or generate, which is what the single-flight, timeout
//! and capability tests need.

use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::preview_backend::fingerprint;
use crate::backend::traits::{
    BackendCall, BackendError, BackendFactory, BackendImage, BackendOutput, GenerationBackend,
};
use crate::models::ModelDescriptor;

/// Summary of one call received by a [`MockBackend`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub model: String,
    pub mode: &'static str,
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub seed: Option<u64>,
}

/// Factory producing [`MockBackend`]s
#[derive(Default)]
pub struct MockBackendFactory {
    loads: Mutex<HashMap<String, usize>>,
    failing: Mutex<HashSet<String>>,
    load_delay: Option<Duration>,
    generate_delay: Option<Duration>,
    fail_generation: bool,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockBackendFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make loads of `key` fail
    pub fn failing(self, key: &str) -> Self {
        self.failing.lock().insert(key.to_string());
        self
    }

    /// Make every load take at least `delay`
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    /// Make every generation call take at least `delay`
    pub fn with_generate_delay(mut self, delay: Duration) -> Self {
        self.generate_delay = Some(delay);
        self
    }

    /// Make every generation call fail
    pub fn failing_generation(mut self) -> Self {
        self.fail_generation = true;
        self
    }

    pub fn set_failing(&self, key: &str, failing: bool) {
        let mut set = self.failing.lock();
        if failing {
            set.insert(key.to_string());
        } else {
            set.remove(key);
        }
    }

    pub fn load_count(&self, key: &str) -> usize {
        self.loads.lock().get(key).copied().unwrap_or(0)
    }

    pub fn total_loads(&self) -> usize {
        self.loads.lock().values().sum()
    }

    /// Every generation call received by backends of this factory
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl BackendFactory for MockBackendFactory {
    fn kind(&self) -> &str {
        "mock"
    }

    async fn load(
        &self,
        descriptor: &ModelDescriptor,
    ) -> Result<Arc<dyn GenerationBackend>, BackendError> {
        *self.loads.lock().entry(descriptor.key.clone()).or_insert(0) += 1;

        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().contains(&descriptor.key) {
            return Err(BackendError::Unavailable(format!(
                "weights for {} not found",
                descriptor.backend_id
            )));
        }

        Ok(Arc::new(MockBackend {
            model: descriptor.key.clone(),
            fail: self.fail_generation,
            delay: self.generate_delay,
            calls: self.calls.clone(),
        }))
    }
}

/// Backend that paints a solid color derived from its inputs
pub struct MockBackend {
    model: String,
    fail: bool,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

#[async_trait]
impl GenerationBackend for MockBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, call: BackendCall) -> Result<BackendOutput, BackendError> {
        self.calls.lock().push(RecordedCall {
            model: self.model.clone(),
            mode: call.mode.name(),
            prompt: call.prompt.clone(),
            width: call.width,
            height: call.height,
            steps: call.steps,
            seed: call.seed,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail {
            return Err(BackendError::Unavailable("out of memory".to_string()));
        }

        let seed = call.seed.unwrap_or_else(|| u64::from(rand::random::<u32>()));
        let tint = fingerprint(call.prompt.as_bytes()) ^ seed;
        let color = Rgb([tint as u8, (tint >> 8) as u8, (tint >> 16) as u8]);
        let image = RgbImage::from_pixel(call.width, call.height, color);

        Ok(BackendOutput {
            image: BackendImage::Raw(DynamicImage::ImageRgb8(image)),
            seed: Some(seed),
        })
    }
}
