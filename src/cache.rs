//! Compile-once cache of compiled modules, keyed by artifact name
//!
//! The first request for a name installs an empty cell and compiles into it;
//! concurrent and later requests for the same name wait on that same cell.
//! A failed compilation leaves the cell empty, so the next request retries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::artifact::Artifact;
use crate::error::Result;
use crate::runtime::{CompiledModule, Runtime};

type Slot = Arc<OnceCell<Arc<dyn CompiledModule>>>;

/// Memoized compiled modules
#[derive(Default)]
pub struct ArtifactCache {
    modules: Mutex<HashMap<String, Slot>>,
}

impl ArtifactCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the compiled module for `artifact`, compiling it at most once
    pub async fn get_or_compile(
        &self,
        artifact: &Artifact,
        runtime: &dyn Runtime,
    ) -> Result<Arc<dyn CompiledModule>> {
        let slot = self.slot(artifact.name());

        let module = slot
            .get_or_try_init(|| async {
                debug!(
                    artifact = artifact.name(),
                    runtime = runtime.name(),
                    "compiling artifact"
                );
                artifact.verify()?;
                runtime.compile(artifact)
            })
            .await
            .map_err(|error| {
                warn!(artifact = artifact.name(), %error, "artifact compilation failed");
                error
            })?;

        Ok(Arc::clone(module))
    }

    /// Whether a compiled module is cached under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.lock()
            .get(name)
            .is_some_and(|slot| slot.initialized())
    }

    /// Number of compiled modules
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    /// Whether nothing has been compiled yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the entry for `name`; the next request recompiles
    pub fn evict(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }

    fn slot(&self, name: &str) -> Slot {
        let mut modules = self.lock();
        Arc::clone(modules.entry(name.to_string()).or_default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        // The map is only ever inserted into or removed from; a panic
        // elsewhere cannot leave it half-updated.
        self.modules.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ArtifactCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactCache")
            .field("compiled", &self.len())
            .finish()
    }
}
