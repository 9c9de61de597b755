//! Keccak Reduce Library
//!
//! Keccak-256 hashing and proof-of-work nonce reduction on top of a lazily
//! loaded compute module.
//!
//! # Overview
//!
//! The hash itself runs inside a compute module (see `keccak-core`). This
//! crate is the machinery around it:
//!
//! - **Loading**: artifacts are verified and compiled at most once per name,
//!   instances are created under a FIFO async mutex
//! - **Shared view**: each engine reuses one 4 KB window of its instance's
//!   memory for input and output, never reallocating
//! - **Reduce**: hashes `data` once per nonce in a range (the nonce replaces
//!   the last 8 bytes) and calls back for every digest with enough leading
//!   zero bits, bridged through an id-indexed callback registry
//!
//! # Example
//!
//! ```rust,no_run
//! use keccak::{HasherFactory, ReduceOptions, zero_level};
//!
//! # async fn run() -> keccak::Result<()> {
//! let digest = keccak::keccak(b"abc").await?;
//! assert_eq!(hex::encode(&digest[..4]), "4e03657a");
//!
//! let factory = HasherFactory::keccak256()?;
//! let mut hasher = factory.create_hasher().await?;
//!
//! let mut input = b"block header".to_vec();
//! input.extend_from_slice(&[0u8; 8]); // nonce slot
//!
//! let last = hasher.reduce(
//!     &input,
//!     ReduceOptions::new().range(0..100_000).zeros(16).callback(|nonce, zeros, hash| {
//!         println!("nonce {}: {} zero bits ({})", nonce, zeros, hex::encode(hash));
//!     }),
//! )?;
//! println!("last digest has {} zero bits", zero_level(&last));
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod facade;
pub mod mutex;
pub mod registry;
pub mod runtime;

pub use artifact::{Artifact, ArtifactBinary};
pub use cache::ArtifactCache;
pub use config::Config;
pub use engine::{EngineState, HasherEngine, Loader, ReduceOptions};
pub use error::{Error, Result};
pub use facade::{create_hasher, keccak, shared_factory, Hasher, HasherFactory};
pub use keccak_core::{meets_difficulty, DIGEST_SIZE};
pub use mutex::AsyncMutex;
pub use registry::{CallbackRegistry, ReduceCallback};
pub use runtime::{CompiledModule, EngineInstance, NativeRuntime, OnCandidate, Runtime};

/// Size of the shared input/output window
pub const VIEW_SIZE: usize = keccak_core::HASH_BUFFER_SIZE;

/// A Keccak-256 digest
pub type Digest = [u8; DIGEST_SIZE];

/// Leading zero bits of a digest
pub fn zero_level(digest: &Digest) -> u32 {
    keccak_core::zero_level(digest)
}

#[cfg(test)]
mod tests;
