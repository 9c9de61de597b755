//! Module image and memory layout parameters

/// Size of the shared hash buffer in bytes (4 KB)
pub const HASH_BUFFER_SIZE: usize = 4 * 1024;

/// Size of the prefix backup buffer used by `reduce` (4 KB)
pub const TEMP_BUFFER_SIZE: usize = 4 * 1024;

/// Keccak-256 output size
pub const DIGEST_SIZE: usize = 32;

/// Width of the nonce written into the input tail
pub const NONCE_SIZE: usize = 8;

/// Required alignment of the hash buffer within linear memory
pub const BUFFER_ALIGN: usize = 128;

/// Upper bound on linear memory a module image may request (16 MB)
pub const MAX_MEMORY: usize = 16 * 1024 * 1024;

/// Module image magic: `\0kcm`
pub const IMAGE_MAGIC: [u8; 4] = *b"\0kcm";

/// Module image format version
pub const IMAGE_VERSION: u8 = 1;

/// Encoded image length in bytes
pub const IMAGE_LEN: usize = 16;
