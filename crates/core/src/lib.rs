//! # Keccak Compute Module
//!
//! The compute artifact behind the `keccak` hasher: a tiny module image that
//! compiles into an [`Instance`] owning linear memory and exposing two exports,
//! `digest` and `reduce`, over a fixed 4 KB hash buffer.
//!
//! ## Memory Layout
//!
//! ```text
//! memory = reserved || hash_buffer || temp_buffer || free
//!          ^^^^^^^^    ^^^^^^^^^^^    ^^^^^^^^^^^
//!          offset      4 KB           4 KB (prefix backup for reduce)
//! ```
//!
//! The host writes input into the hash buffer, calls an export and reads the
//! 32-byte digest back from the start of the same buffer.
//!
//! ## Nonce Format
//!
//! `reduce` overwrites the **last 8 bytes** of the input with each nonce:
//!
//! ```text
//! input = prefix || nonce
//!         ^^^^^^    ^^^^^
//!         any len   8 bytes (big-endian u64)
//! ```
//!
//! Inputs of 8 bytes or less have the nonce written at offset 0.
//!
//! ## Example
//!
//! ```rust
//! use keccak_core::{Module, ModuleImage, Kernel, zero_level};
//!
//! let image = ModuleImage::new(Kernel::Keccak256, 16 * 1024, 1024);
//! let module = Module::compile(&image.to_bytes()).unwrap();
//! let mut instance = module.instantiate();
//!
//! let at = instance.hash_buffer() as usize;
//! instance.memory_mut()[at..at + 3].copy_from_slice(b"abc");
//! instance.digest(3).unwrap();
//!
//! let digest = &instance.memory()[at..at + 32];
//! assert_eq!(digest[0], 0x4e);
//! assert!(zero_level(digest) < 8);
//! ```

mod image;
mod instance;
mod params;

pub use image::{ImageError, Kernel, Module, ModuleImage};
pub use instance::{Imports, Instance, Trap, meets_difficulty, zero_level};
pub use params::*;
