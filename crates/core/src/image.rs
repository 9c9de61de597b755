//! Module image parsing ("compilation")
//!
//! Image layout (16 bytes):
//!
//! ```text
//! magic[4] || version u8 || kernel u8 || reserved u16 || memory_size u32 LE || buffer_offset u32 LE
//! ```

use core::fmt;

use crate::instance::Instance;
use crate::params::*;

/// Hash kernel a module image is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    /// Keccak-256 (original Keccak padding, not FIPS-202 SHA3-256)
    Keccak256,
}

impl Kernel {
    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Kernel::Keccak256),
            _ => None,
        }
    }

    fn code(self) -> u8 {
        match self {
            Kernel::Keccak256 => 1,
        }
    }
}

/// Decoded module image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleImage {
    /// Hash kernel
    pub kernel: Kernel,
    /// Linear memory size in bytes
    pub memory_size: u32,
    /// Offset of the hash buffer within linear memory
    pub buffer_offset: u32,
}

/// Reasons an image fails to compile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    /// Image is not exactly [`IMAGE_LEN`] bytes
    Length(usize),
    /// Magic bytes do not match [`IMAGE_MAGIC`]
    Magic([u8; 4]),
    /// Unsupported format version
    Version(u8),
    /// Unknown kernel code
    Kernel(u8),
    /// Hash buffer offset is not aligned to [`BUFFER_ALIGN`]
    Misaligned(u32),
    /// Buffers do not fit into the requested memory
    Layout { memory_size: u32, buffer_offset: u32 },
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageError::Length(len) => {
                write!(f, "image is {} bytes, expected {}", len, IMAGE_LEN)
            }
            ImageError::Magic(magic) => write!(f, "bad image magic {:02x?}", magic),
            ImageError::Version(v) => write!(f, "unsupported image version {}", v),
            ImageError::Kernel(k) => write!(f, "unknown kernel code {}", k),
            ImageError::Misaligned(offset) => write!(
                f,
                "hash buffer offset {} is not {}-byte aligned",
                offset, BUFFER_ALIGN
            ),
            ImageError::Layout {
                memory_size,
                buffer_offset,
            } => write!(
                f,
                "buffers at offset {} do not fit in {} bytes of memory",
                buffer_offset, memory_size
            ),
        }
    }
}

impl std::error::Error for ImageError {}

impl ModuleImage {
    /// Describe a new image
    pub fn new(kernel: Kernel, memory_size: u32, buffer_offset: u32) -> Self {
        Self {
            kernel,
            memory_size,
            buffer_offset,
        }
    }

    /// Parse and validate raw image bytes
    pub fn parse(bytes: &[u8]) -> Result<Self, ImageError> {
        let bytes: &[u8; IMAGE_LEN] = bytes
            .try_into()
            .map_err(|_| ImageError::Length(bytes.len()))?;

        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != IMAGE_MAGIC {
            return Err(ImageError::Magic(magic));
        }
        if bytes[4] != IMAGE_VERSION {
            return Err(ImageError::Version(bytes[4]));
        }
        let kernel = Kernel::from_code(bytes[5]).ok_or(ImageError::Kernel(bytes[5]))?;

        let memory_size = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let buffer_offset = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);

        let image = Self::new(kernel, memory_size, buffer_offset);
        image.validate()?;
        Ok(image)
    }

    /// Encode the image back into its 16-byte form
    pub fn to_bytes(&self) -> [u8; IMAGE_LEN] {
        let mut out = [0u8; IMAGE_LEN];
        out[0..4].copy_from_slice(&IMAGE_MAGIC);
        out[4] = IMAGE_VERSION;
        out[5] = self.kernel.code();
        out[8..12].copy_from_slice(&self.memory_size.to_le_bytes());
        out[12..16].copy_from_slice(&self.buffer_offset.to_le_bytes());
        out
    }

    fn validate(&self) -> Result<(), ImageError> {
        let offset = self.buffer_offset as usize;
        if offset % BUFFER_ALIGN != 0 {
            return Err(ImageError::Misaligned(self.buffer_offset));
        }

        let required = offset + HASH_BUFFER_SIZE + TEMP_BUFFER_SIZE;
        let memory = self.memory_size as usize;
        if required > memory || memory > MAX_MEMORY {
            return Err(ImageError::Layout {
                memory_size: self.memory_size,
                buffer_offset: self.buffer_offset,
            });
        }
        Ok(())
    }
}

/// A compiled module, ready to be instantiated any number of times
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Module {
    image: ModuleImage,
}

impl Module {
    /// Compile raw image bytes
    pub fn compile(bytes: &[u8]) -> Result<Self, ImageError> {
        Ok(Self {
            image: ModuleImage::parse(bytes)?,
        })
    }

    /// The validated image this module was compiled from
    pub fn image(&self) -> &ModuleImage {
        &self.image
    }

    /// Create a fresh instance with zeroed linear memory
    pub fn instantiate(&self) -> Instance {
        Instance::new(&self.image)
    }
}
