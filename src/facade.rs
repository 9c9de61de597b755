//! Entry points: an injectable [`HasherFactory`] and process-wide shortcuts
//!
//! ```rust,no_run
//! # async fn run() -> keccak::Result<()> {
//! use keccak::{HasherFactory, ReduceOptions};
//!
//! // One-off hashing through the shared engine
//! let digest = keccak::keccak(b"abc").await?;
//!
//! // Independent engine for stateful work
//! let factory = HasherFactory::keccak256()?;
//! let mut hasher = factory.create_hasher().await?;
//! let last = hasher.reduce(
//!     &[0u8; 40],
//!     ReduceOptions::new().range(0..1_000).zeros(8).callback(|nonce, zeros, _| {
//!         println!("nonce {} has {} zero bits", nonce, zeros);
//!     }),
//! )?;
//! # let _ = (digest, last);
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;

use crate::artifact::Artifact;
use crate::engine::{HasherEngine, Loader, ReduceOptions};
use crate::error::Result;
use crate::runtime::{NativeRuntime, Runtime};
use crate::Digest;

/// Provider of hasher engines for one artifact
///
/// Every engine it hands out shares the factory's compile cache and load
/// mutex but owns its own instance, memory and callback registry.
#[derive(Debug, Clone)]
pub struct HasherFactory {
    artifact: Arc<Artifact>,
    loader: Loader,
}

impl HasherFactory {
    /// Factory for `artifact` on `runtime`, with a private cache
    pub fn new(artifact: Artifact, runtime: Arc<dyn Runtime>) -> Self {
        Self::with_loader(artifact, Loader::new(runtime))
    }

    /// Factory for `artifact` using an existing loader
    pub fn with_loader(artifact: Artifact, loader: Loader) -> Self {
        Self {
            artifact: Arc::new(artifact),
            loader,
        }
    }

    /// Factory for the bundled Keccak-256 artifact on the native runtime
    pub fn keccak256() -> Result<Self> {
        Ok(Self::new(Artifact::keccak256()?, Arc::new(NativeRuntime)))
    }

    /// The artifact engines load
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// The shared loader
    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    /// A new, not yet loaded engine
    pub fn engine(&self) -> HasherEngine {
        HasherEngine::new(Arc::clone(&self.artifact), self.loader.clone())
    }

    /// A new engine, loaded and ready
    pub async fn create_hasher(&self) -> Result<Hasher> {
        let mut engine = self.engine();
        engine.setup().await?;
        Ok(Hasher { engine })
    }
}

/// A ready hasher with synchronous `digest` and `reduce`
#[derive(Debug)]
pub struct Hasher {
    engine: HasherEngine,
}

impl Hasher {
    /// Keccak-256 of `data`
    pub fn digest(&mut self, data: &[u8]) -> Result<Digest> {
        self.engine.try_digest(data)
    }

    /// Reduce `data` over a nonce range written into its last 8 bytes.
    ///
    /// Returns the digest of the last nonce in the range, or the input
    /// itself (zero-padded to 32 bytes) when the range is empty.
    pub fn reduce(&mut self, data: &[u8], options: ReduceOptions) -> Result<Digest> {
        self.engine.try_reduce(data, options)
    }

    /// The underlying engine
    pub fn engine(&self) -> &HasherEngine {
        &self.engine
    }

    /// Unwrap into the underlying engine
    pub fn into_engine(self) -> HasherEngine {
        self.engine
    }
}

static FACTORY: OnceCell<HasherFactory> = OnceCell::const_new();
static SHARED: OnceCell<Mutex<Hasher>> = OnceCell::const_new();

/// The process-wide factory for the bundled artifact
pub async fn shared_factory() -> Result<&'static HasherFactory> {
    FACTORY
        .get_or_try_init(|| async { HasherFactory::keccak256() })
        .await
}

/// Keccak-256 of `data` on the process-wide engine
///
/// The engine is loaded on first use; concurrent first calls wait for the
/// same load. Calls are serialized on the engine afterwards.
pub async fn keccak(data: &[u8]) -> Result<Digest> {
    let shared = SHARED
        .get_or_try_init(|| async {
            let hasher = shared_factory().await?.create_hasher().await?;
            Ok::<_, crate::Error>(Mutex::new(hasher))
        })
        .await?;

    // Every call rewrites the view from scratch, so a poisoned lock is safe to reuse
    let mut hasher = shared.lock().unwrap_or_else(PoisonError::into_inner);
    hasher.digest(data)
}

/// A new independent hasher sharing the process-wide compile cache
pub async fn create_hasher() -> Result<Hasher> {
    shared_factory().await?.create_hasher().await
}
