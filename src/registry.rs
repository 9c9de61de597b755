//! Per-engine registry of reduction callbacks
//!
//! The engine cannot hold a Rust closure, so `reduce` parks the caller's
//! callback here under a random `u32` id, hands the id to the engine, and
//! the engine reports candidates back by id. Ids are unique among the
//! currently registered callbacks only.

use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::Digest;

/// Callback invoked as `(nonce, zero_level, digest)` for each candidate
pub type ReduceCallback = Box<dyn FnMut(u64, u32, &Digest) + Send>;

/// Attempts at drawing an unused id before giving up
const MAX_ID_ATTEMPTS: usize = 64;

/// Reinterpret an engine-reported id (signed 32-bit) as the registered `u32`
#[inline]
pub fn decode_id(raw: i32) -> u32 {
    raw as u32
}

/// Reinterpret an engine-reported nonce (signed 64-bit) as `u64`
#[inline]
pub fn decode_nonce(raw: i64) -> u64 {
    raw as u64
}

/// Draw a uniformly random `u32`
pub fn random_id() -> Result<u32> {
    let mut bytes = [0u8; 4];
    getrandom::getrandom(&mut bytes).map_err(|e| Error::Random(e.to_string()))?;
    Ok(u32::from_le_bytes(bytes))
}

/// Map of outstanding callback ids to callbacks
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<u32, ReduceCallback>,
}

impl CallbackRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `callback` under a fresh id not held by any outstanding registration
    pub fn register(&mut self, callback: ReduceCallback) -> Result<u32> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = random_id()?;
            if let std::collections::hash_map::Entry::Vacant(slot) = self.callbacks.entry(id) {
                slot.insert(callback);
                return Ok(id);
            }
        }
        Err(Error::CallbackIdsExhausted)
    }

    /// Call the callback registered under the engine-encoded `raw_id`
    pub fn invoke(
        &mut self,
        raw_id: i32,
        raw_nonce: i64,
        zero_level: u32,
        digest: &Digest,
    ) -> Result<()> {
        let id = decode_id(raw_id);
        let callback = self
            .callbacks
            .get_mut(&id)
            .ok_or(Error::UnknownCallback(id))?;

        callback(decode_nonce(raw_nonce), zero_level, digest);
        Ok(())
    }

    /// Remove and return the callback registered under `id`
    pub fn unregister(&mut self, id: u32) -> Option<ReduceCallback> {
        self.callbacks.remove(&id)
    }

    /// Whether `id` is currently registered
    pub fn contains(&self, id: u32) -> bool {
        self.callbacks.contains_key(&id)
    }

    /// Number of outstanding registrations
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Whether no registration is outstanding
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("ids", &self.callbacks.keys().collect::<Vec<_>>())
            .finish()
    }
}
