//! Compute runtime seam
//!
//! A [`Runtime`] turns artifact bytes into a [`CompiledModule`], and a module
//! into any number of independent [`EngineInstance`]s. [`NativeRuntime`]
//! backs these with `keccak-core`.

use std::sync::Arc;

use keccak_core::{Imports, Instance, Module, Trap};

use crate::artifact::Artifact;
use crate::error::{Error, Result};

/// Something that can compile artifacts into runnable modules
pub trait Runtime: Send + Sync {
    /// Short runtime name for logs
    fn name(&self) -> &str;

    /// Fails with [`Error::UnsupportedEnvironment`] when this runtime cannot
    /// execute modules on the current host
    fn probe(&self) -> Result<()> {
        Ok(())
    }

    /// Compile verified artifact bytes
    fn compile(&self, artifact: &Artifact) -> Result<Arc<dyn CompiledModule>>;
}

/// A compiled module, shared by every engine that loads the same artifact
pub trait CompiledModule: Send + Sync {
    /// Create a new instance with its own memory
    fn instantiate(&self) -> Result<Box<dyn EngineInstance>>;
}

/// Host hook invoked by an instance while it reduces
pub trait OnCandidate {
    /// `callback_id` and `nonce` arrive in the engine's signed encodings
    fn on_candidate(&mut self, memory: &[u8], callback_id: i32, nonce: i64, zero_level: u32)
        -> Result<()>;
}

/// A live, exclusively owned module instance
pub trait EngineInstance: Send {
    /// Linear memory
    fn memory(&self) -> &[u8];

    /// Mutable linear memory
    fn memory_mut(&mut self) -> &mut [u8];

    /// Offset of the shared hash buffer within memory
    fn hash_buffer(&self) -> usize;

    /// Hash `length` bytes at the hash buffer, leaving the digest there
    fn digest(&mut self, length: u32) -> Result<()>;

    /// Hash once per nonce in `[nonce_min, nonce_max)`, calling `host` for
    /// every digest with at least `zeros_min` leading zero bits
    fn reduce(
        &mut self,
        length: u32,
        callback_id: u32,
        nonce_min: u64,
        nonce_max: u64,
        zeros_min: u32,
        host: &mut dyn OnCandidate,
    ) -> Result<()>;
}

/// Runtime executing `keccak-core` modules in-process
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeRuntime;

impl Runtime for NativeRuntime {
    fn name(&self) -> &str {
        "native"
    }

    fn compile(&self, artifact: &Artifact) -> Result<Arc<dyn CompiledModule>> {
        let module = Module::compile(artifact.bytes()).map_err(|e| Error::ArtifactCompile {
            name: artifact.name().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Arc::new(NativeModule { module }))
    }
}

struct NativeModule {
    module: Module,
}

impl CompiledModule for NativeModule {
    fn instantiate(&self) -> Result<Box<dyn EngineInstance>> {
        Ok(Box::new(NativeInstance {
            instance: self.module.instantiate(),
        }))
    }
}

struct NativeInstance {
    instance: Instance,
}

impl EngineInstance for NativeInstance {
    fn memory(&self) -> &[u8] {
        self.instance.memory()
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        self.instance.memory_mut()
    }

    fn hash_buffer(&self) -> usize {
        self.instance.hash_buffer() as usize
    }

    fn digest(&mut self, length: u32) -> Result<()> {
        Ok(self.instance.digest(length)?)
    }

    fn reduce(
        &mut self,
        length: u32,
        callback_id: u32,
        nonce_min: u64,
        nonce_max: u64,
        zeros_min: u32,
        host: &mut dyn OnCandidate,
    ) -> Result<()> {
        let mut imports = HostImports { host, error: None };
        let outcome = self.instance.reduce(
            length,
            callback_id,
            nonce_min,
            nonce_max,
            zeros_min,
            &mut imports,
        );

        match (outcome, imports.error) {
            (Ok(()), _) => Ok(()),
            // Prefer the host's own error over its stringified trap
            (Err(_), Some(error)) => Err(error),
            (Err(trap), None) => Err(trap.into()),
        }
    }
}

/// Adapts an [`OnCandidate`] hook to the module's import table
struct HostImports<'h> {
    host: &'h mut dyn OnCandidate,
    error: Option<Error>,
}

impl Imports for HostImports<'_> {
    fn hash_callback(
        &mut self,
        memory: &[u8],
        callback_id: i32,
        nonce: i64,
        zeros: u32,
    ) -> std::result::Result<(), Trap> {
        self.host
            .on_candidate(memory, callback_id, nonce, zeros)
            .map_err(|error| {
                let trap = Trap::Host(error.to_string());
                self.error = Some(error);
                trap
            })
    }
}
