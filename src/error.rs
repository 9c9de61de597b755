//! Error types for the hasher

use thiserror::Error;

/// Errors surfaced by loading, digesting and reducing
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    #[error("Failed to compile artifact `{name}`: {reason}")]
    ArtifactCompile { name: String, reason: String },

    #[error("Artifact `{name}` checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid artifact encoding: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Input of {len} bytes exceeds the {max}-byte hash buffer")]
    OversizedInput { len: usize, max: usize },

    #[error("No reduce callback registered under id {0}")]
    UnknownCallback(u32),

    #[error("Could not allocate a free callback id")]
    CallbackIdsExhausted,

    #[error("Random source failed: {0}")]
    Random(String),

    #[error("Engine trapped: {0}")]
    Trap(#[from] keccak_core::Trap),

    #[error("Engine is not ready")]
    NotReady,

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error means the artifact itself could not be turned into a module
    pub fn is_compile_failure(&self) -> bool {
        matches!(
            self,
            Error::ArtifactCompile { .. } | Error::ChecksumMismatch { .. } | Error::Decode(_)
        )
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
