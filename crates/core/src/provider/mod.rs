//! Analysis-provider contract.
//!
//! Binary loading, instruction decoding, and reference resolution are owned
//! by an external provider. The core consumes fully-materialized, owned
//! record values and never inspects file bytes itself, so providers can wrap
//! anything from an in-process disassembler to an exported database.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "capstone-provider")]
pub mod capstone;
#[cfg(feature = "capstone-provider")]
pub use capstone::CapstoneProvider;

/// Classification of an outbound reference discovered while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    Code,
    Data,
    String,
}

/// One outbound reference from a decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub kind: RefKind,
    pub target: u64,
}

/// One decoded instruction inside a basic block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionRecord {
    /// Coarse opcode category. The category space is at most 256 values;
    /// the fingerprint maps it onto the odd-prime table.
    pub category: u8,
    /// Byte length actually consumed by the decoder.
    pub length: u32,
    /// Whether this instruction is a call.
    pub is_call: bool,
    /// Outbound references resolved by the provider for this instruction.
    pub references: Vec<ReferenceRecord>,
}

/// One basic block as reported by the provider.
///
/// A zero-length or failed decode terminates `instructions` early; the
/// remainder of the block is simply not modeled. That is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub address: u64,
    /// Raw bytes of the decoded instructions, in decode order.
    pub bytes: Vec<u8>,
    pub instructions: Vec<InstructionRecord>,
    /// Fallthrough and/or jump successor addresses. Targets that do not
    /// resolve to a block of the same function are dropped during CFG
    /// construction.
    pub successors: Vec<u64>,
}

/// One function as reported by the provider: an entry address and its
/// ordered basic blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub address: u64,
    pub blocks: Vec<BlockRecord>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("binary not found at {0}")]
    MissingBinary(PathBuf),
    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("provider not found: {0}")]
    MissingProvider(String),
    #[error("analysis provider error: {0}")]
    Provider(String),
}

/// Trait implemented by analysis providers (e.g. Capstone + goblin).
pub trait AnalysisProvider: Send + Sync {
    fn load(&self, path: &Path) -> Result<Vec<FunctionRecord>, ProviderError>;
    fn name(&self) -> &'static str;
}

/// Registry for analysis providers; callers select by name.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Box<dyn AnalysisProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self { providers: HashMap::new() }
    }

    pub fn register<P: AnalysisProvider + 'static>(&mut self, provider: P) -> &mut Self {
        self.providers.insert(provider.name().to_string(), Box::new(provider));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn AnalysisProvider> {
        self.providers.get(name).map(|p| &**p)
    }

    /// Return a sorted list of registered provider names for error messages/help.
    pub fn names(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.providers.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Convenience builder for a registry populated with the bundled providers.
pub fn default_provider_registry() -> ProviderRegistry {
    #[allow(unused_mut)]
    let mut registry = ProviderRegistry::new();
    #[cfg(feature = "capstone-provider")]
    {
        registry.register(CapstoneProvider);
    }
    registry
}
