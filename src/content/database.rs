//! JSON-backed content database.
//!
//! The database is the reference [`ContentService`]: a project describes its
//! assets, their objects, and object references in a single JSON file.
//!
//! # Format
//!
//! ```json
//! {
//!   "unsaved_changes": false,
//!   "assets": [
//!     {
//!       "path": "Assets/hero.prefab",
//!       "source": "rev-3",
//!       "address": "hero",
//!       "objects": [
//!         {
//!           "local_id": 1,
//!           "usage": ["skinned"],
//!           "references": [{ "path": "Assets/hero.mat", "local_id": 1 }]
//!         }
//!       ]
//!     },
//!     {
//!       "path": "Assets/level.scene",
//!       "scene": true,
//!       "global_usage": "LIGHTMAP_BAKED | FOG_LINEAR",
//!       "objects": [{ "local_id": 1, "references": [] }]
//!     }
//!   ],
//!   "builtin": [{ "path": "builtin/default_resources", "local_id": 10 }]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use super::ids::{AssetId, Hash128, HashBuilder, ObjectId, BUILTIN_RESOURCE_PATHS};
use super::service::{ContentError, ContentService, ProcessedScene};
use super::usage::{GlobalUsage, UsageTagSet};

/// Reference from one object to another, by asset path and local id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub path: String,
    pub local_id: i64,
}

/// A single object as declared in the content file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub local_id: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usage: Vec<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub stream_size: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ObjectRef>,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

impl ObjectRecord {
    pub fn new(local_id: i64) -> Self {
        Self {
            local_id,
            usage: Vec::new(),
            stream_size: 0,
            references: Vec::new(),
        }
    }

    pub fn reference(mut self, path: &str, local_id: i64) -> Self {
        self.references.push(ObjectRef {
            path: path.to_string(),
            local_id,
        });
        self
    }

    pub fn usage(mut self, tag: &str) -> Self {
        self.usage.push(tag.to_string());
        self
    }

    pub fn stream_size(mut self, size: u64) -> Self {
        self.stream_size = size;
        self
    }
}

/// An asset as declared in the content file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub path: String,
    /// Opaque revision marker; changing it changes the asset hash.
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub scene: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub global_usage: GlobalUsage,
    #[serde(default)]
    pub objects: Vec<ObjectRecord>,
}

impl AssetRecord {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            source: String::new(),
            scene: false,
            address: None,
            global_usage: GlobalUsage::empty(),
            objects: Vec::new(),
        }
    }

    pub fn scene(path: &str) -> Self {
        Self {
            scene: true,
            ..Self::new(path)
        }
    }

    pub fn object(mut self, object: ObjectRecord) -> Self {
        self.objects.push(object);
        self
    }

    pub fn address(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }

    pub fn source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn global_usage(mut self, usage: GlobalUsage) -> Self {
        self.global_usage = usage;
        self
    }
}

/// An object inside a built-in resource file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltinRecord {
    pub path: String,
    #[serde(flatten)]
    pub object: ObjectRecord,
}

/// Top-level structure of a content file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentManifest {
    #[serde(default)]
    pub unsaved_changes: bool,
    #[serde(default)]
    pub assets: Vec<AssetRecord>,
    #[serde(default)]
    pub builtin: Vec<BuiltinRecord>,
}

impl ContentManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asset(mut self, asset: AssetRecord) -> Self {
        self.assets.push(asset);
        self
    }

    pub fn builtin(mut self, path: &str, object: ObjectRecord) -> Self {
        self.builtin.push(BuiltinRecord {
            path: path.to_string(),
            object,
        });
        self
    }
}

#[derive(Debug, Clone)]
struct IndexedAsset {
    path: String,
    hash: Hash128,
    scene: bool,
    address: Option<String>,
    global_usage: GlobalUsage,
    objects: Vec<ObjectId>,
}

#[derive(Debug, Clone, Default)]
struct IndexedObject {
    usage: Vec<String>,
    stream_size: u64,
    references: Vec<ObjectId>,
}

/// In-memory index over a [`ContentManifest`].
#[derive(Debug, Clone, Default)]
pub struct ContentDatabase {
    assets: BTreeMap<AssetId, IndexedAsset>,
    paths: BTreeMap<String, AssetId>,
    objects: BTreeMap<ObjectId, IndexedObject>,
    unsaved_changes: bool,
}

impl ContentDatabase {
    /// Load a content file from disk.
    pub fn load(path: &Path) -> Result<Self, ContentError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ContentError> {
        let manifest: ContentManifest = serde_json::from_str(text)?;
        Self::from_manifest(manifest)
    }

    /// Index a manifest, resolving every object reference.
    pub fn from_manifest(manifest: ContentManifest) -> Result<Self, ContentError> {
        let mut db = ContentDatabase {
            unsaved_changes: manifest.unsaved_changes,
            ..Default::default()
        };

        for record in &manifest.assets {
            let id = AssetId::from_path(&record.path);
            if db.paths.insert(record.path.clone(), id).is_some() {
                return Err(ContentError::DuplicatePath(record.path.clone()));
            }

            let mut hasher = HashBuilder::new();
            hasher.str(&record.path).str(&record.source).json(&record.objects)?;
            if record.scene {
                hasher.u32(record.global_usage.bits());
            }

            let mut objects: Vec<ObjectId> = record
                .objects
                .iter()
                .map(|object| ObjectId::new(id, object.local_id, record.path.as_str()))
                .collect();
            objects.sort();
            objects.dedup();

            db.assets.insert(
                id,
                IndexedAsset {
                    path: record.path.clone(),
                    hash: hasher.finish(),
                    scene: record.scene,
                    address: record.address.clone(),
                    global_usage: record.global_usage,
                    objects,
                },
            );
        }

        let declared = manifest
            .assets
            .iter()
            .flat_map(|asset| asset.objects.iter().map(move |object| (asset.path.as_str(), object)))
            .chain(manifest.builtin.iter().map(|builtin| (builtin.path.as_str(), &builtin.object)));

        let mut pending = Vec::new();
        for (path, record) in declared {
            let id = db.resolve(path, record.local_id)?;
            pending.push((id, record));
        }

        for (id, record) in &pending {
            db.objects.insert(
                id.clone(),
                IndexedObject {
                    usage: record.usage.clone(),
                    stream_size: record.stream_size,
                    references: Vec::new(),
                },
            );
        }

        for (id, record) in pending {
            let mut references = Vec::with_capacity(record.references.len());
            for reference in &record.references {
                let target = db.resolve(&reference.path, reference.local_id)?;
                if !db.objects.contains_key(&target) {
                    return Err(ContentError::DanglingReference {
                        object: id.to_string(),
                        missing: target.to_string(),
                    });
                }
                references.push(target);
            }
            references.sort();
            references.dedup();
            if let Some(indexed) = db.objects.get_mut(&id) {
                indexed.references = references;
            }
        }

        Ok(db)
    }

    fn resolve(&self, path: &str, local_id: i64) -> Result<ObjectId, ContentError> {
        if let Some(id) = self.paths.get(path) {
            return Ok(ObjectId::new(*id, local_id, path));
        }
        if BUILTIN_RESOURCE_PATHS.iter().any(|builtin| builtin.eq_ignore_ascii_case(path)) {
            return Ok(ObjectId::builtin(path, local_id));
        }
        Err(ContentError::UnknownPath(path.to_string()))
    }

    /// Look up an asset by project path.
    pub fn asset_id(&self, path: &str) -> Option<AssetId> {
        self.paths.get(path).copied()
    }

    /// Every asset, scenes included, in id order.
    pub fn asset_ids(&self) -> impl Iterator<Item = AssetId> + '_ {
        self.assets.keys().copied()
    }

    pub fn address(&self, asset: &AssetId) -> Option<&str> {
        self.assets.get(asset).and_then(|indexed| indexed.address.as_deref())
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    fn indexed(&self, asset: &AssetId) -> Result<&IndexedAsset, ContentError> {
        self.assets.get(asset).ok_or(ContentError::UnknownAsset(*asset))
    }
}

impl ContentService for ContentDatabase {
    fn asset_path(&self, asset: &AssetId) -> Result<String, ContentError> {
        Ok(self.indexed(asset)?.path.clone())
    }

    fn is_scene(&self, asset: &AssetId) -> bool {
        self.assets.get(asset).is_some_and(|indexed| indexed.scene)
    }

    fn asset_hash(&self, asset: &AssetId) -> Result<Hash128, ContentError> {
        Ok(self.indexed(asset)?.hash)
    }

    fn asset_dependencies(&self, asset: &AssetId) -> Result<Vec<AssetId>, ContentError> {
        let indexed = self.indexed(asset)?;
        let mut dependencies = BTreeSet::new();
        for object in &indexed.objects {
            let Some(record) = self.objects.get(object) else {
                continue;
            };
            for reference in &record.references {
                if reference.asset != *asset && self.assets.contains_key(&reference.asset) {
                    dependencies.insert(reference.asset);
                }
            }
        }
        Ok(dependencies.into_iter().collect())
    }

    fn objects_in_asset(&self, asset: &AssetId) -> Result<Vec<ObjectId>, ContentError> {
        Ok(self.indexed(asset)?.objects.clone())
    }

    fn referenced_objects(&self, objects: &[ObjectId]) -> Result<Vec<ObjectId>, ContentError> {
        let roots: BTreeSet<&ObjectId> = objects.iter().collect();
        let mut visited: BTreeSet<ObjectId> = BTreeSet::new();
        let mut queue: VecDeque<&ObjectId> = objects.iter().collect();

        while let Some(current) = queue.pop_front() {
            let record = self.objects.get(current).ok_or_else(|| ContentError::DanglingReference {
                object: current.to_string(),
                missing: current.to_string(),
            })?;
            for reference in &record.references {
                if roots.contains(reference) || visited.contains(reference) {
                    continue;
                }
                visited.insert(reference.clone());
                queue.push_back(reference);
            }
        }

        Ok(visited.into_iter().collect())
    }

    fn process_scene(&self, scene: &AssetId, temp_folder: &Path) -> Result<ProcessedScene, ContentError> {
        let indexed = self.indexed(scene)?;
        let processed: PathBuf = temp_folder.join("scenes").join(format!("{}.scene.json", scene));
        if let Some(parent) = processed.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::json!({
            "scene": indexed.path,
            "objects": indexed.objects.iter().map(|object| object.local_id).collect::<Vec<_>>(),
        });
        fs::write(&processed, serde_json::to_vec_pretty(&body)?)?;

        Ok(ProcessedScene {
            processed_scene: processed,
            referenced_objects: self.referenced_objects(&indexed.objects)?,
            global_usage: indexed.global_usage,
        })
    }

    fn usage_tags(&self, objects: &[ObjectId], global: GlobalUsage) -> Result<UsageTagSet, ContentError> {
        let mut tags = UsageTagSet::new();
        for object in objects {
            if let Some(record) = self.objects.get(object) {
                for tag in &record.usage {
                    tags.insert(tag.as_str());
                }
            }
        }
        if !objects.is_empty() {
            for tag in global.tags() {
                tags.insert(tag);
            }
        }
        Ok(tags)
    }

    fn stream_data_size(&self, object: &ObjectId) -> u64 {
        self.objects.get(object).map_or(0, |record| record.stream_size)
    }

    fn has_unsaved_changes(&self) -> bool {
        self.unsaved_changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> ContentDatabase {
        let manifest = ContentManifest::new()
            .asset(
                AssetRecord::new("Assets/hero.prefab")
                    .object(ObjectRecord::new(1).reference("Assets/hero.mat", 1).usage("skinned"))
                    .object(ObjectRecord::new(2).reference("Assets/hero.prefab", 1)),
            )
            .asset(
                AssetRecord::new("Assets/hero.mat")
                    .object(ObjectRecord::new(1).reference("builtin/default_resources", 10).usage("lit")),
            )
            .asset(
                AssetRecord::scene("Assets/level.scene")
                    .global_usage(GlobalUsage::FOG_LINEAR)
                    .object(ObjectRecord::new(1).reference("Assets/hero.prefab", 2)),
            )
            .builtin("builtin/default_resources", ObjectRecord::new(10));
        ContentDatabase::from_manifest(manifest).unwrap()
    }

    #[test]
    fn test_referenced_objects_are_transitive() {
        let db = sample();
        let hero = db.asset_id("Assets/hero.prefab").unwrap();
        let objects = db.objects_in_asset(&hero).unwrap();
        let referenced = db.referenced_objects(&objects).unwrap();

        let paths: Vec<_> = referenced.iter().map(|o| o.file_path.as_str()).collect();
        assert!(paths.contains(&"Assets/hero.mat"));
        assert!(paths.contains(&"builtin/default_resources"));
        assert!(!paths.contains(&"Assets/hero.prefab"));
    }

    #[test]
    fn test_asset_dependencies_skip_builtin() {
        let db = sample();
        let hero = db.asset_id("Assets/hero.prefab").unwrap();
        let mat = db.asset_id("Assets/hero.mat").unwrap();
        assert_eq!(db.asset_dependencies(&hero).unwrap(), vec![mat]);
        assert!(db.asset_dependencies(&mat).unwrap().is_empty());
    }

    #[test]
    fn test_hash_changes_with_source() {
        let a = ContentDatabase::from_manifest(
            ContentManifest::new().asset(AssetRecord::new("Assets/x").source("1").object(ObjectRecord::new(1))),
        )
        .unwrap();
        let b = ContentDatabase::from_manifest(
            ContentManifest::new().asset(AssetRecord::new("Assets/x").source("2").object(ObjectRecord::new(1))),
        )
        .unwrap();
        let id = AssetId::from_path("Assets/x");
        assert_ne!(a.asset_hash(&id).unwrap(), b.asset_hash(&id).unwrap());
    }

    #[test]
    fn test_dangling_reference_rejected() {
        let manifest = ContentManifest::new()
            .asset(AssetRecord::new("Assets/a").object(ObjectRecord::new(1).reference("Assets/a", 99)));
        assert!(matches!(
            ContentDatabase::from_manifest(manifest),
            Err(ContentError::DanglingReference { .. })
        ));
    }

    #[test]
    fn test_unknown_path_rejected() {
        let manifest = ContentManifest::new()
            .asset(AssetRecord::new("Assets/a").object(ObjectRecord::new(1).reference("Assets/missing", 1)));
        assert!(matches!(
            ContentDatabase::from_manifest(manifest),
            Err(ContentError::UnknownPath(_))
        ));
    }

    #[test]
    fn test_process_scene_writes_handle() {
        let db = sample();
        let temp = TempDir::new().unwrap();
        let scene = db.asset_id("Assets/level.scene").unwrap();
        assert!(db.is_scene(&scene));

        let processed = db.process_scene(&scene, temp.path()).unwrap();
        assert!(processed.processed_scene.exists());
        assert_eq!(processed.global_usage, GlobalUsage::FOG_LINEAR);
        assert!(!processed.referenced_objects.is_empty());
    }

    #[test]
    fn test_usage_tags_include_global() {
        let db = sample();
        let mat = db.asset_id("Assets/hero.mat").unwrap();
        let objects = db.objects_in_asset(&mat).unwrap();
        let tags = db.usage_tags(&objects, GlobalUsage::LIGHTMAP_BAKED).unwrap();
        assert!(tags.contains("lit"));
        assert!(tags.contains("global:lightmap_baked"));
    }

    #[test]
    fn test_parse_json_format() {
        let json = r#"{
            "unsaved_changes": true,
            "assets": [
                { "path": "Assets/a.prefab", "objects": [{ "local_id": 1 }] }
            ]
        }"#;
        let db = ContentDatabase::from_json_str(json).unwrap();
        assert_eq!(db.len(), 1);
        assert!(db.has_unsaved_changes());
    }
}
