//! Compute artifacts: named module bytes with an integrity checksum
//!
//! Artifacts travel as JSON documents of the form
//! `{"name": "...", "data": "<base64>", "hash": "<checksum>"}` where the
//! checksum is the leading hex characters of the SHA-256 of the raw bytes
//! (8 characters for bundled artifacts).

use std::fs;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Length of the checksum prefix written for new artifacts
pub const CHECKSUM_LEN: usize = 8;

/// The bundled Keccak-256 artifact
const KECCAK256_JSON: &str = include_str!("../artifacts/keccak256.json");

/// Serialized artifact document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactBinary {
    /// Artifact name, the cache key
    pub name: String,
    /// Base64-encoded module bytes
    pub data: String,
    /// Truncated hex SHA-256 of the module bytes
    pub hash: String,
}

/// An immutable, decoded artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    name: String,
    bytes: Arc<[u8]>,
    checksum: String,
}

impl Artifact {
    /// Wrap raw module bytes
    pub fn new(
        name: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
        checksum: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            checksum: checksum.into(),
        }
    }

    /// Wrap raw module bytes, computing their checksum
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        let checksum = checksum(&bytes);
        Self::new(name, bytes, checksum)
    }

    /// Decode base64 module bytes
    pub fn from_base64(
        name: impl Into<String>,
        data: &str,
        checksum: impl Into<String>,
    ) -> Result<Self> {
        let bytes = STANDARD.decode(data.trim())?;
        Ok(Self::new(name, bytes, checksum))
    }

    /// Decode a serialized artifact document
    pub fn from_binary(binary: &ArtifactBinary) -> Result<Self> {
        Self::from_base64(binary.name.clone(), &binary.data, binary.hash.clone())
    }

    /// Parse an artifact from its JSON form
    pub fn from_json(json: &str) -> Result<Self> {
        let binary: ArtifactBinary = serde_json::from_str(json)?;
        Self::from_binary(&binary)
    }

    /// Load an artifact JSON document from disk
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// The bundled Keccak-256 artifact
    pub fn keccak256() -> Result<Self> {
        Self::from_json(KECCAK256_JSON)
    }

    /// Encode back into the serialized document form
    pub fn to_binary(&self) -> ArtifactBinary {
        ArtifactBinary {
            name: self.name.clone(),
            data: STANDARD.encode(&self.bytes),
            hash: self.checksum.clone(),
        }
    }

    /// Artifact name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw module bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Expected checksum
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Check the bytes against the expected checksum.
    ///
    /// The expected value may be any non-empty prefix of the full hex SHA-256;
    /// comparison ignores ASCII case.
    pub fn verify(&self) -> Result<()> {
        let actual = hex::encode(Sha256::digest(&self.bytes));
        let expected = self.checksum.to_ascii_lowercase();

        if expected.is_empty() || !actual.starts_with(&expected) {
            return Err(Error::ChecksumMismatch {
                name: self.name.clone(),
                expected: self.checksum.clone(),
                actual: actual[..CHECKSUM_LEN.max(expected.len()).min(actual.len())].to_string(),
            });
        }
        Ok(())
    }
}

/// Truncated hex SHA-256 of `bytes`
pub fn checksum(bytes: &[u8]) -> String {
    let mut digest = hex::encode(Sha256::digest(bytes));
    digest.truncate(CHECKSUM_LEN);
    digest
}
