//! Hasher engine: one exclusively owned instance plus its shared view
//!
//! An engine moves through `Uninitialized -> Loading -> Ready`. Loading asks
//! the [`Loader`] for an instance (compile-once via the cache, serialized by
//! the load mutex); a failed load drops back to `Uninitialized` so a later
//! `setup()` can retry.
//!
//! Every `digest`/`reduce` writes its input into the same 4 KB window of the
//! instance's memory and reads the result from the first 32 bytes. Access to
//! the window goes through a [`SharedView`] that mutably borrows the
//! instance, so two operations on one engine can never overlap.

use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::artifact::Artifact;
use crate::cache::ArtifactCache;
use crate::error::{Error, Result};
use crate::mutex::AsyncMutex;
use crate::registry::{CallbackRegistry, ReduceCallback};
use crate::runtime::{EngineInstance, OnCandidate, Runtime};
use crate::{Digest, DIGEST_SIZE, VIEW_SIZE};

/// Options for [`HasherEngine::reduce`]
pub struct ReduceOptions {
    /// Invoked for every nonce meeting the threshold (default: none)
    pub callback: Option<ReduceCallback>,
    /// Half-open nonce range (default: `0..1`)
    pub range: Range<u64>,
    /// Minimum leading zero bits for the callback to fire (default: 0)
    pub zeros: u32,
}

impl Default for ReduceOptions {
    fn default() -> Self {
        Self {
            callback: None,
            range: 0..1,
            zeros: 0,
        }
    }
}

impl ReduceOptions {
    /// Default options: nonce 0 only, no callback
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the candidate callback
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(u64, u32, &Digest) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Set the nonce range
    pub fn range(mut self, range: Range<u64>) -> Self {
        self.range = range;
        self
    }

    /// Set the zero-bit threshold
    pub fn zeros(mut self, zeros: u32) -> Self {
        self.zeros = zeros;
        self
    }
}

impl std::fmt::Debug for ReduceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReduceOptions")
            .field("callback", &self.callback.is_some())
            .field("range", &self.range)
            .field("zeros", &self.zeros)
            .finish()
    }
}

/// Shared loading machinery: runtime, compile cache and load mutex
#[derive(Clone)]
pub struct Loader {
    runtime: Arc<dyn Runtime>,
    cache: Arc<ArtifactCache>,
    mutex: Arc<AsyncMutex>,
}

impl Loader {
    /// A loader with its own cache and mutex
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        Self::with_cache(runtime, Arc::new(ArtifactCache::new()))
    }

    /// A loader sharing an existing cache
    pub fn with_cache(runtime: Arc<dyn Runtime>, cache: Arc<ArtifactCache>) -> Self {
        Self {
            runtime,
            cache,
            mutex: Arc::new(AsyncMutex::new()),
        }
    }

    /// The compile cache
    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// The runtime
    pub fn runtime(&self) -> &dyn Runtime {
        self.runtime.as_ref()
    }

    /// Compile (once per name) and instantiate `artifact`
    pub async fn instantiate(&self, artifact: &Artifact) -> Result<Box<dyn EngineInstance>> {
        self.runtime.probe()?;

        self.mutex
            .dispatch(|| async {
                let module = self
                    .cache
                    .get_or_compile(artifact, self.runtime.as_ref())
                    .await?;
                debug!(artifact = artifact.name(), "instantiating module");
                module.instantiate()
            })
            .await
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("runtime", &self.runtime.name())
            .field("cache", &self.cache)
            .finish()
    }
}

/// Observable engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Loading,
    Ready,
}

enum State {
    Uninitialized,
    Loading,
    Ready(Session),
}

/// A lazily loaded hasher owning one engine instance
pub struct HasherEngine {
    artifact: Arc<Artifact>,
    loader: Loader,
    state: State,
}

impl HasherEngine {
    /// Create an engine in the `Uninitialized` state
    pub fn new(artifact: Arc<Artifact>, loader: Loader) -> Self {
        Self {
            artifact,
            loader,
            state: State::Uninitialized,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        match self.state {
            State::Uninitialized => EngineState::Uninitialized,
            State::Loading => EngineState::Loading,
            State::Ready(_) => EngineState::Ready,
        }
    }

    /// Whether `setup` has completed
    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    /// The artifact this engine loads
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Callbacks currently registered with this engine
    pub fn callbacks(&self) -> Option<&CallbackRegistry> {
        match &self.state {
            State::Ready(session) => Some(&session.callbacks),
            _ => None,
        }
    }

    /// Load and instantiate the artifact. A no-op once ready.
    pub async fn setup(&mut self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }

        self.state = State::Loading;
        let loaded = self
            .loader
            .instantiate(&self.artifact)
            .await
            .and_then(Session::new);

        match loaded {
            Ok(session) => {
                debug!(
                    artifact = self.artifact.name(),
                    view = session.view,
                    "engine ready"
                );
                self.state = State::Ready(session);
                Ok(())
            }
            Err(error) => {
                self.state = State::Uninitialized;
                Err(error)
            }
        }
    }

    /// Keccak-256 of `data`, loading the engine first if needed
    pub async fn digest(&mut self, data: &[u8]) -> Result<Digest> {
        self.setup().await?;
        self.try_digest(data)
    }

    /// Nonce reduction over `data`, loading the engine first if needed
    pub async fn reduce(&mut self, data: &[u8], options: ReduceOptions) -> Result<Digest> {
        self.setup().await?;
        self.try_reduce(data, options)
    }

    /// Keccak-256 of `data` on an already ready engine
    pub fn try_digest(&mut self, data: &[u8]) -> Result<Digest> {
        self.session()?.digest(data)
    }

    /// Nonce reduction on an already ready engine
    pub fn try_reduce(&mut self, data: &[u8], options: ReduceOptions) -> Result<Digest> {
        self.session()?.reduce(data, options)
    }

    fn session(&mut self) -> Result<&mut Session> {
        match &mut self.state {
            State::Ready(session) => Ok(session),
            _ => Err(Error::NotReady),
        }
    }
}

impl std::fmt::Debug for HasherEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HasherEngine")
            .field("artifact", &self.artifact.name())
            .field("state", &self.state())
            .finish()
    }
}

/// A ready instance with its view location and callback registry
struct Session {
    instance: Box<dyn EngineInstance>,
    view: usize,
    callbacks: CallbackRegistry,
}

impl Session {
    fn new(instance: Box<dyn EngineInstance>) -> Result<Self> {
        let view = instance.hash_buffer();
        let memory = instance.memory().len();
        if view.checked_add(VIEW_SIZE).is_none_or(|end| end > memory) {
            return Err(Error::Trap(keccak_core::Trap::OutOfBounds {
                length: VIEW_SIZE as u32,
                capacity: memory.saturating_sub(view),
            }));
        }

        Ok(Self {
            instance,
            view,
            callbacks: CallbackRegistry::new(),
        })
    }

    fn shared_view(&mut self) -> SharedView<'_> {
        let view = self.view;
        SharedView {
            window: &mut self.instance.memory_mut()[view..view + VIEW_SIZE],
        }
    }

    fn digest(&mut self, data: &[u8]) -> Result<Digest> {
        let length = check_input(data)?;

        self.shared_view().write(data);
        self.instance.digest(length)?;
        Ok(self.shared_view().result())
    }

    fn reduce(&mut self, data: &[u8], options: ReduceOptions) -> Result<Digest> {
        let length = check_input(data)?;
        let ReduceOptions {
            callback,
            range,
            zeros,
        } = options;

        self.shared_view().write(data);

        let callback = callback.unwrap_or_else(|| Box::new(|_, _, _| {}));
        let id = self.callbacks.register(callback)?;
        trace!(id, start = range.start, end = range.end, zeros, "reducing");

        let mut bridge = Bridge {
            registry: &mut self.callbacks,
            view: self.view,
        };
        let outcome = self.instance.reduce(
            length,
            id,
            range.start,
            range.end,
            zeros,
            &mut bridge,
        );
        self.callbacks.unregister(id);
        outcome?;

        Ok(self.shared_view().result())
    }
}

/// Exclusive access to the 4 KB input/output window of an instance
struct SharedView<'a> {
    window: &'a mut [u8],
}

impl SharedView<'_> {
    /// Write `data` at offset 0. Inputs shorter than a digest get the rest
    /// of the result window zeroed so stale bytes never leak into a result.
    fn write(&mut self, data: &[u8]) {
        if data.len() < DIGEST_SIZE {
            self.window[data.len()..DIGEST_SIZE].fill(0);
        }
        self.window[..data.len()].copy_from_slice(data);
    }

    /// Copy of the first 32 bytes
    fn result(&self) -> Digest {
        let mut digest = [0u8; DIGEST_SIZE];
        digest.copy_from_slice(&self.window[..DIGEST_SIZE]);
        digest
    }
}

/// Routes engine callbacks to the registry by id
struct Bridge<'a> {
    registry: &'a mut CallbackRegistry,
    view: usize,
}

impl OnCandidate for Bridge<'_> {
    fn on_candidate(
        &mut self,
        memory: &[u8],
        callback_id: i32,
        nonce: i64,
        zero_level: u32,
    ) -> Result<()> {
        let mut digest = [0u8; DIGEST_SIZE];
        digest.copy_from_slice(&memory[self.view..self.view + DIGEST_SIZE]);
        self.registry.invoke(callback_id, nonce, zero_level, &digest)
    }
}

fn check_input(data: &[u8]) -> Result<u32> {
    if data.len() > VIEW_SIZE {
        return Err(Error::OversizedInput {
            len: data.len(),
            max: VIEW_SIZE,
        });
    }
    Ok(data.len() as u32)
}
