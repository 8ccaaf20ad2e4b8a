//! Feature usage carried alongside serialized content.
//!
//! A [`UsageTagSet`] names the feature variants an asset needs (shader
//! keywords, lighting modes). [`GlobalUsage`] holds the scene-wide settings
//! that influence those tags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::ids::{Hash128, HashBuilder};

bitflags::bitflags! {
    /// Scene-wide settings unioned across every scene in a build.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct GlobalUsage: u32 {
        const LIGHTMAP_BAKED = 1 << 0;
        const LIGHTMAP_REALTIME = 1 << 1;
        const LIGHTMAP_DIRECTIONAL = 1 << 2;
        const SHADOW_MASK = 1 << 3;
        const FOG_LINEAR = 1 << 4;
        const FOG_EXPONENTIAL = 1 << 5;
        const FOG_EXPONENTIAL_SQUARED = 1 << 6;
        const INSTANCING = 1 << 7;
    }
}

impl GlobalUsage {
    /// Tag names for every set flag, lowercase and prefixed with `global:`.
    pub fn tags(&self) -> impl Iterator<Item = String> + '_ {
        self.iter_names().map(|(name, _)| format!("global:{}", name.to_ascii_lowercase()))
    }
}

/// An ordered, deduplicated set of usage tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageTagSet {
    tags: BTreeSet<String>,
}

impl UsageTagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: impl Into<String>) -> bool {
        self.tags.insert(tag.into())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Merge every tag of `other` into this set.
    pub fn union_with(&mut self, other: &UsageTagSet) {
        self.tags.extend(other.tags.iter().cloned());
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Content hash of the set, used in cache keys.
    pub fn content_hash(&self) -> Hash128 {
        let mut builder = HashBuilder::new();
        builder.u32(self.tags.len() as u32);
        for tag in &self.tags {
            builder.str(tag);
        }
        builder.finish()
    }
}

impl<S: Into<String>> FromIterator<S> for UsageTagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            tags: iter.into_iter().map(Into::into).collect(),
        }
    }
}
