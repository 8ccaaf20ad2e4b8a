//! Deterministic naming of destination files and serialized objects.

use std::sync::Arc;

use crate::config::IdentifierStrategy;
use crate::content::ids::{Hash128, HashBuilder, ObjectId};

/// Prefix of every generated internal file name.
pub const GENERATED_PREFIX: &str = "CAB-";

/// Strategy for generating stable identifiers.
///
/// Both functions must be pure: the same input always yields the same output
/// on every machine.
pub trait DeterministicIdentifiers: Send + Sync {
    /// Internal file name derived from a bundle or scene name.
    fn generate_internal_file_name(&self, name: &str) -> String {
        format!("{}{}", GENERATED_PREFIX, Hash128::of_str(name).to_hex())
    }

    /// Serialization index of an object within its destination file.
    fn serialization_index_from_object(&self, object: &ObjectId) -> i64;
}

/// Packs the asset hash into the high 32 bits and the local id into the low
/// 32 bits. Indices of objects from the same asset stay adjacent.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefabPackedIdentifiers;

impl DeterministicIdentifiers for PrefabPackedIdentifiers {
    fn serialization_index_from_object(&self, object: &ObjectId) -> i64 {
        let mut builder = HashBuilder::new();
        builder.hash(&object.asset.hash()).str(&object.file_path);
        let high = (builder.finish().high_u64() >> 32) as u32;
        let low = object.local_id as u32;
        (((high as u64) << 32) | low as u64) as i64
    }
}

/// Hashes the full object identity into the index.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unity5PackedIdentifiers;

impl DeterministicIdentifiers for Unity5PackedIdentifiers {
    fn serialization_index_from_object(&self, object: &ObjectId) -> i64 {
        let mut builder = HashBuilder::new();
        builder
            .hash(&object.asset.hash())
            .i64(object.local_id)
            .str(&object.file_path);
        builder.finish().high_u64() as i64
    }
}

/// Instantiate the configured strategy.
pub fn identifiers_for(strategy: IdentifierStrategy) -> Arc<dyn DeterministicIdentifiers> {
    match strategy {
        IdentifierStrategy::Prefab => Arc::new(PrefabPackedIdentifiers),
        IdentifierStrategy::Unity5 => Arc::new(Unity5PackedIdentifiers),
    }
}
