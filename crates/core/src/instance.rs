//! Live module instance: linear memory plus the `digest`/`reduce` exports
//!
//! The host talks to an instance only through its memory and integer
//! arguments. During `reduce` the instance calls back into the host through
//! the [`Imports`] table, passing the callback id and nonce in their signed
//! ABI encodings (`i32`/`i64`); decoding them is the host's job.

use core::fmt;

use sha3::{Digest, Keccak256};

use crate::image::ModuleImage;
use crate::params::*;

/// Host functions imported by an instance
pub trait Imports {
    /// Invoked during `reduce` for every nonce whose digest has at least
    /// `zeros_min` leading zero bits. The digest sits at the start of the
    /// hash buffer inside `memory`. Returning an error aborts the export.
    fn hash_callback(
        &mut self,
        memory: &[u8],
        callback_id: i32,
        nonce: i64,
        zeros: u32,
    ) -> Result<(), Trap>;
}

/// Fault raised while executing an export
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trap {
    /// Input length exceeds the hash buffer
    OutOfBounds { length: u32, capacity: usize },
    /// An import returned an error
    Host(String),
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trap::OutOfBounds { length, capacity } => write!(
                f,
                "length {} is out of bounds for a {}-byte hash buffer",
                length, capacity
            ),
            Trap::Host(msg) => write!(f, "host callback failed: {}", msg),
        }
    }
}

impl std::error::Error for Trap {}

/// Instantiated module
pub struct Instance {
    /// Linear memory
    memory: Vec<u8>,
    /// Offset of the hash buffer
    buffer: usize,
    /// Offset of the prefix backup buffer
    temp: usize,
}

impl Instance {
    pub(crate) fn new(image: &ModuleImage) -> Self {
        let buffer = image.buffer_offset as usize;
        Self {
            memory: vec![0u8; image.memory_size as usize],
            buffer,
            temp: buffer + HASH_BUFFER_SIZE,
        }
    }

    /// Linear memory
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Mutable linear memory
    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    /// Offset of the hash buffer within linear memory
    pub fn hash_buffer(&self) -> u32 {
        self.buffer as u32
    }

    /// Hash the first `length` bytes of the hash buffer and write the
    /// digest over the start of the buffer.
    pub fn digest(&mut self, length: u32) -> Result<(), Trap> {
        let len = check_length(length)?;
        let start = self.buffer;

        let hash = Keccak256::digest(&self.memory[start..start + len]);
        self.memory[start..start + DIGEST_SIZE].copy_from_slice(&hash);
        Ok(())
    }

    /// Hash the buffer once per nonce in `[nonce_min, nonce_max)`.
    ///
    /// The prefix before the nonce slot is backed up first and restored
    /// before every candidate, since each digest clobbers the first 32
    /// bytes of the buffer. After the loop the buffer holds the digest of
    /// the last nonce (or the untouched input for an empty range).
    pub fn reduce(
        &mut self,
        length: u32,
        callback_id: u32,
        nonce_min: u64,
        nonce_max: u64,
        zeros_min: u32,
        imports: &mut dyn Imports,
    ) -> Result<(), Trap> {
        let len = check_length(length)?;
        let offset = len.saturating_sub(NONCE_SIZE);
        let (buffer, temp) = (self.buffer, self.temp);

        self.memory.copy_within(buffer..buffer + offset, temp);

        for nonce in nonce_min..nonce_max {
            self.memory.copy_within(temp..temp + offset, buffer);
            let slot = buffer + offset;
            self.memory[slot..slot + NONCE_SIZE].copy_from_slice(&nonce.to_be_bytes());

            self.digest(length)?;

            let zeros = zero_level(&self.memory[buffer..buffer + DIGEST_SIZE]);
            if zeros >= zeros_min {
                // Exports speak signed integers; the host reinterprets them.
                imports.hash_callback(&self.memory, callback_id as i32, nonce as i64, zeros)?;
            }
        }
        Ok(())
    }
}

fn check_length(length: u32) -> Result<usize, Trap> {
    let len = length as usize;
    if len > HASH_BUFFER_SIZE {
        return Err(Trap::OutOfBounds {
            length,
            capacity: HASH_BUFFER_SIZE,
        });
    }
    Ok(len)
}

/// Count the leading zero bits of a hash
///
/// An all-zero 32-byte hash has a zero level of 256.
#[inline(always)]
pub fn zero_level(hash: &[u8]) -> u32 {
    let mut zero_bits = 0u32;

    for byte in hash.iter() {
        if *byte == 0 {
            zero_bits += 8;
        } else {
            zero_bits += byte.leading_zeros();
            break;
        }
    }

    zero_bits
}

/// Check if a hash has at least `difficulty` leading zero bits
///
/// # Example
///
/// ```rust
/// use keccak_core::meets_difficulty;
///
/// let mut hash = [0xFFu8; 32];
/// hash[0] = 0x00;
/// hash[1] = 0x0F;
/// assert!(meets_difficulty(&hash, 12));
/// assert!(!meets_difficulty(&hash, 13));
/// ```
#[inline(always)]
pub fn meets_difficulty(hash: &[u8; DIGEST_SIZE], difficulty: u32) -> bool {
    zero_level(hash) >= difficulty
}
