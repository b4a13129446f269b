//! Lazy, single-flight model loader
//!
//! Each registered model is instantiated at most once. Concurrent first
//! requests for the same key share one load; failures are not cached so the
//! next request retries.

use chrono::{DateTime, TimeZone, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::traits::{BackendFactory, GenerationBackend};
use crate::error::{AppError, Result};
use crate::models::registry::{Capability, ModelDescriptor, ModelRegistry};

/// A loaded backend instance owned by the loader
pub struct LoadedModelHandle {
    descriptor: ModelDescriptor,
    backend: Arc<dyn GenerationBackend>,
    loaded_at: DateTime<Utc>,
    last_used_ms: AtomicI64,
}

impl LoadedModelHandle {
    fn new(descriptor: ModelDescriptor, backend: Arc<dyn GenerationBackend>) -> Self {
        let now = Utc::now();
        Self {
            descriptor,
            backend,
            loaded_at: now,
            last_used_ms: AtomicI64::new(now.timestamp_millis()),
        }
    }

    pub fn key(&self) -> &str {
        &self.descriptor.key
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn backend(&self) -> &Arc<dyn GenerationBackend> {
        &self.backend
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn last_used(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.last_used_ms.load(Ordering::Relaxed))
            .single()
            .unwrap_or(self.loaded_at)
    }

    pub(crate) fn touch(&self) {
        self.last_used_ms
            .fetch_max(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }
}

impl fmt::Debug for LoadedModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModelHandle")
            .field("key", &self.descriptor.key)
            .field("backend", &self.backend.name())
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

/// Snapshot of a loaded model for status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct LoadedModelInfo {
    pub key: String,
    pub backend_id: String,
    pub capability: Capability,
    pub loaded_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

/// Load failure shared by every waiter of the same load
#[derive(Debug, Clone)]
struct LoadFailure {
    model: String,
    message: String,
}

impl From<LoadFailure> for AppError {
    fn from(failure: LoadFailure) -> Self {
        AppError::ModelLoad {
            model: failure.model,
            message: failure.message,
        }
    }
}

type LoadOutcome = std::result::Result<Arc<LoadedModelHandle>, LoadFailure>;
type PendingLoad = Shared<BoxFuture<'static, LoadOutcome>>;

enum Slot {
    Ready(Arc<LoadedModelHandle>),
    Loading { id: u64, pending: PendingLoad },
}

impl Slot {
    fn is_load(&self, load_id: u64) -> bool {
        matches!(self, Slot::Loading { id, .. } if *id == load_id)
    }
}

/// Owner of all instantiated generation backends
pub struct ModelLoader {
    registry: Arc<ModelRegistry>,
    factory: Arc<dyn BackendFactory>,
    slots: Arc<DashMap<String, Slot>>,
    active: RwLock<Option<String>>,
    /// 0 means unbounded
    max_loaded: usize,
    next_load_id: AtomicU64,
    load_attempts: Arc<AtomicU64>,
}

impl ModelLoader {
    /// Create a loader with no limit on loaded models
    pub fn new(registry: Arc<ModelRegistry>, factory: Arc<dyn BackendFactory>) -> Self {
        Self::with_capacity(registry, factory, 0)
    }

    /// Create a loader that keeps at most `max_loaded` models resident
    pub fn with_capacity(
        registry: Arc<ModelRegistry>,
        factory: Arc<dyn BackendFactory>,
        max_loaded: usize,
    ) -> Self {
        Self {
            registry,
            factory,
            slots: Arc::new(DashMap::new()),
            active: RwLock::new(None),
            max_loaded,
            next_load_id: AtomicU64::new(1),
            load_attempts: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn factory_kind(&self) -> &str {
        self.factory.kind()
    }

    /// Return the handle for `key`, loading it first if needed
    pub async fn get_or_load(&self, key: &str) -> Result<Arc<LoadedModelHandle>> {
        let descriptor = self.registry.lookup(key)?;

        let pending = match self.slots.entry(key.to_string()) {
            Entry::Occupied(entry) => match entry.get() {
                Slot::Ready(handle) => {
                    handle.touch();
                    return Ok(handle.clone());
                }
                Slot::Loading { pending, .. } => {
                    debug!(model = %key, "Joining in-flight model load");
                    pending.clone()
                }
            },
            Entry::Vacant(entry) => {
                let id = self.next_load_id.fetch_add(1, Ordering::Relaxed);
                let pending = self.start_load(id, descriptor.clone());
                entry.insert(Slot::Loading {
                    id,
                    pending: pending.clone(),
                });
                pending
            }
        };

        let handle = pending.await?;
        handle.touch();
        self.enforce_capacity(key);
        Ok(handle)
    }

    /// Load `key` and make it the default for requests naming no model
    pub async fn switch_active(&self, key: &str) -> Result<Arc<LoadedModelHandle>> {
        let handle = self.get_or_load(key).await?;
        let previous = self.active.write().replace(key.to_string());
        info!(model = %key, previous = ?previous, "Switched active model");
        self.enforce_capacity(key);
        Ok(handle)
    }

    pub fn active_key(&self) -> Option<String> {
        self.active.read().clone()
    }

    /// Keys of fully loaded models
    pub fn loaded_keys(&self) -> BTreeSet<String> {
        self.slots
            .iter()
            .filter(|entry| matches!(entry.value(), Slot::Ready(_)))
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn loaded_models(&self) -> Vec<LoadedModelInfo> {
        let mut models: Vec<LoadedModelInfo> = self
            .slots
            .iter()
            .filter_map(|entry| match entry.value() {
                Slot::Ready(handle) => Some(LoadedModelInfo {
                    key: handle.key().to_string(),
                    backend_id: handle.descriptor().backend_id.clone(),
                    capability: handle.descriptor().capability,
                    loaded_at: handle.loaded_at(),
                    last_used: handle.last_used(),
                }),
                Slot::Loading { .. } => None,
            })
            .collect();
        models.sort_by(|a, b| a.key.cmp(&b.key));
        models
    }

    pub fn is_loading(&self, key: &str) -> bool {
        self.slots
            .get(key)
            .map(|slot| matches!(*slot, Slot::Loading { .. }))
            .unwrap_or(false)
    }

    /// Number of backend instantiations started so far
    pub fn load_attempts(&self) -> u64 {
        self.load_attempts.load(Ordering::Relaxed)
    }

    /// Drop the loaded instance for `key`.
    ///
    /// Returns `false` when the model was not loaded. In-flight loads are left
    /// alone, and requests still holding the handle keep it alive until they
    /// finish.
    pub fn evict(&self, key: &str) -> Result<bool> {
        self.registry.lookup(key)?;
        let removed = self
            .slots
            .remove_if(key, |_, slot| matches!(slot, Slot::Ready(_)))
            .is_some();
        if removed {
            info!(model = %key, "Evicted model");
        }
        Ok(removed)
    }

    fn start_load(&self, id: u64, descriptor: ModelDescriptor) -> PendingLoad {
        let factory = self.factory.clone();
        let slots = self.slots.clone();
        let attempts = self.load_attempts.clone();
        let key = descriptor.key.clone();

        // The load runs on its own task so that it completes even if every
        // waiting request is dropped.
        async move {
            let task_slots = slots.clone();
            let task_key = key.clone();
            let task = tokio::spawn(async move {
                attempts.fetch_add(1, Ordering::Relaxed);
                let started = Instant::now();
                info!(
                    model = %descriptor.key,
                    backend_id = %descriptor.backend_id,
                    memory_estimate_mb = descriptor.memory_estimate_mb,
                    "Loading model"
                );

                let outcome = match factory.load(&descriptor).await {
                    Ok(backend) => {
                        info!(
                            model = %descriptor.key,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Model loaded"
                        );
                        Ok(Arc::new(LoadedModelHandle::new(descriptor, backend)))
                    }
                    Err(e) => {
                        warn!(model = %descriptor.key, error = %e, "Model load failed");
                        Err(LoadFailure {
                            model: task_key.clone(),
                            message: e.to_string(),
                        })
                    }
                };

                match &outcome {
                    Ok(handle) => {
                        if let Some(mut slot) = task_slots.get_mut(&task_key) {
                            if slot.is_load(id) {
                                *slot = Slot::Ready(handle.clone());
                            }
                        }
                    }
                    Err(_) => {
                        task_slots.remove_if(&task_key, |_, slot| slot.is_load(id));
                    }
                }

                outcome
            });

            match task.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    slots.remove_if(&key, |_, slot| slot.is_load(id));
                    Err(LoadFailure {
                        model: key,
                        message: format!("load task aborted: {}", join_error),
                    })
                }
            }
        }
        .boxed()
        .shared()
    }

    fn enforce_capacity(&self, keep: &str) {
        if self.max_loaded == 0 {
            return;
        }

        let active = self.active_key();
        loop {
            let ready: Vec<(String, DateTime<Utc>)> = self
                .slots
                .iter()
                .filter_map(|entry| match entry.value() {
                    Slot::Ready(handle) => Some((entry.key().clone(), handle.last_used())),
                    Slot::Loading { .. } => None,
                })
                .collect();

            if ready.len() <= self.max_loaded {
                return;
            }

            // The active model goes last, but the cap always holds
            let victim = ready
                .iter()
                .filter(|(key, _)| key != keep && Some(key) != active.as_ref())
                .min_by_key(|(_, last_used)| *last_used)
                .or_else(|| {
                    ready
                        .iter()
                        .filter(|(key, _)| key != keep)
                        .min_by_key(|(_, last_used)| *last_used)
                })
                .cloned();

            match victim {
                Some((key, _)) => {
                    if self
                        .slots
                        .remove_if(&key, |_, slot| matches!(slot, Slot::Ready(_)))
                        .is_some()
                    {
                        info!(model = %key, max_loaded = self.max_loaded, "Evicted least recently used model");
                    }
                }
                None => return,
            }
        }
    }
}
