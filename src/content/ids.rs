//! Stable identifiers for assets and the objects they contain.
//!
//! Every identifier is built on [`Hash128`], a 128-bit value with a total
//! order. The order is what keeps every map, list, and generated file name in
//! a build reproducible across runs and machines.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// File paths that designate engine-shipped resources.
///
/// Objects living in these files are never packed into bundles unless they
/// are explicitly relocated into a built-in resources bundle.
pub const BUILTIN_RESOURCE_PATHS: &[&str] = &["builtin/default_resources", "builtin/extra_resources"];

/// Error parsing an identifier from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdParseError {
    #[error("invalid hex digits in '{0}'")]
    InvalidHex(String),
    #[error("expected 32 hex digits, found {0}")]
    InvalidLength(usize),
}

/// A fixed-width 128-bit hash.
///
/// Rendered as 32 lowercase hex digits; ordering is byte-wise.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hash128([u8; 16]);

impl Hash128 {
    /// The all-zero hash.
    pub const ZERO: Hash128 = Hash128([0; 16]);

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Hash an arbitrary byte slice.
    pub fn of(data: &[u8]) -> Self {
        let mut builder = HashBuilder::new();
        builder.bytes(data);
        builder.finish()
    }

    /// Hash a string.
    pub fn of_str(value: &str) -> Self {
        Self::of(value.as_bytes())
    }

    /// Combine several hashes into one. Order matters.
    pub fn combine(parts: &[Hash128]) -> Self {
        let mut builder = HashBuilder::new();
        for part in parts {
            builder.hash(part);
        }
        builder.finish()
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 16]
    }

    /// The first eight bytes read as a big-endian integer.
    pub fn high_u64(&self) -> u64 {
        let mut high = [0u8; 8];
        high.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(high)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(text: &str) -> Result<Self, IdParseError> {
        if text.len() != 32 {
            return Err(IdParseError::InvalidLength(text.len()));
        }
        let bytes = hex::decode(text).map_err(|_| IdParseError::InvalidHex(text.to_string()))?;
        let mut out = [0u8; 16];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl fmt::Display for Hash128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash128({})", self.to_hex())
    }
}

impl TryFrom<String> for Hash128 {
    type Error = IdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Hash128> for String {
    fn from(value: Hash128) -> Self {
        value.to_hex()
    }
}

/// Incremental builder for [`Hash128`] values.
///
/// Each part is length-prefixed so `("ab", "c")` and `("a", "bc")` hash
/// differently. The digest is SHA-256 truncated to 16 bytes.
#[derive(Clone, Default)]
pub struct HashBuilder {
    hasher: Sha256,
}

impl HashBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.hasher.update((data.len() as u64).to_le_bytes());
        self.hasher.update(data);
        self
    }

    pub fn str(&mut self, value: &str) -> &mut Self {
        self.bytes(value.as_bytes())
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.bytes(&value.to_le_bytes())
    }

    pub fn i64(&mut self, value: i64) -> &mut Self {
        self.bytes(&value.to_le_bytes())
    }

    pub fn hash(&mut self, value: &Hash128) -> &mut Self {
        self.bytes(&value.0)
    }

    /// Feed the canonical JSON encoding of a value.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<&mut Self, serde_json::Error> {
        let encoded = serde_json::to_vec(value)?;
        Ok(self.bytes(&encoded))
    }

    pub fn finish(self) -> Hash128 {
        let digest = self.hasher.finalize();
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest[..16]);
        Hash128(out)
    }
}

/// Identifier of a source asset.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(Hash128);

impl AssetId {
    pub const fn new(hash: Hash128) -> Self {
        Self(hash)
    }

    /// Derive the identifier of an asset from its project path.
    pub fn from_path(path: &str) -> Self {
        Self(Hash128::of_str(path))
    }

    pub fn parse(text: &str) -> Result<Self, IdParseError> {
        Hash128::from_hex(text).map(Self)
    }

    pub fn hash(&self) -> Hash128 {
        self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({})", self.0)
    }
}

/// Kind of file an object is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    #[default]
    SerializedAsset,
    MetaAsset,
    NonAsset,
}

/// Identifier of a single object inside an asset or a built-in resource file.
///
/// Ordering compares the owning asset first, then the local id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    pub asset: AssetId,
    pub local_id: i64,
    #[serde(default)]
    pub file_type: FileType,
    pub file_path: String,
}

impl ObjectId {
    pub fn new(asset: AssetId, local_id: i64, file_path: impl Into<String>) -> Self {
        Self {
            asset,
            local_id,
            file_type: FileType::SerializedAsset,
            file_path: file_path.into(),
        }
    }

    /// An object inside one of the built-in resource files.
    pub fn builtin(file_path: &str, local_id: i64) -> Self {
        Self {
            asset: AssetId::from_path(file_path),
            local_id,
            file_type: FileType::NonAsset,
            file_path: file_path.to_string(),
        }
    }

    pub fn with_file_type(mut self, file_type: FileType) -> Self {
        self.file_type = file_type;
        self
    }

    /// Whether this object lives in an engine-shipped resource file.
    pub fn is_builtin(&self) -> bool {
        BUILTIN_RESOURCE_PATHS.iter().any(|path| self.file_path.eq_ignore_ascii_case(path))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_path, self.local_id)
    }
}
