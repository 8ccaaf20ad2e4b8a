//! Packing output: destination files, their objects, and write commands.
//!
//! Destination files are addressed by internal names of the form
//! `archive:/<generated>/<generated>`. Every map here is ordered so that two
//! builds of the same content produce identical data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::content::ids::{AssetId, ObjectId};
use crate::content::usage::UsageTagSet;

/// Build the internal name of a destination file from a generated name.
pub fn internal_file_name(generated: &str) -> String {
    format!("archive:/{0}/{0}", generated)
}

/// The last path segment of an internal name, used as the on-disk name.
pub fn file_name_of(internal_name: &str) -> &str {
    internal_name.rsplit('/').next().unwrap_or(internal_name)
}

/// An object and the index it is written under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializationInfo {
    pub object: ObjectId,
    pub serialization_index: i64,
}

/// Scene data attached to a scene's destination file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneWriteInfo {
    pub scene: AssetId,
    pub processed_scene: PathBuf,
}

/// Instruction to serialize one destination file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteCommand {
    pub internal_name: String,
    pub file_name: String,
    pub bundle_name: String,
    /// Objects in ascending serialization index order
    pub serialize_objects: Vec<SerializationInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<SceneWriteInfo>,
}

/// Where an object ends up after writing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub file: String,
    pub serialization_index: i64,
}

/// Global map from every written object to its destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceMap {
    entries: BTreeMap<ObjectId, ObjectLocation>,
}

impl ReferenceMap {
    pub fn add_mappings(&mut self, command: &WriteCommand) {
        for info in &command.serialize_objects {
            self.entries.insert(
                info.object.clone(),
                ObjectLocation {
                    file: command.internal_name.clone(),
                    serialization_index: info.serialization_index,
                },
            );
        }
    }

    pub fn get(&self, object: &ObjectId) -> Option<&ObjectLocation> {
        self.entries.get(object)
    }

    pub fn contains(&self, object: &ObjectId) -> bool {
        self.entries.contains_key(object)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &ObjectLocation)> {
        self.entries.iter()
    }
}

/// Everything the packing, command, and write steps share.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteData {
    /// Files each asset or scene needs loaded, its own file first
    pub asset_to_files: BTreeMap<AssetId, Vec<String>>,
    /// Objects assigned to each file, in assignment order
    pub file_to_objects: BTreeMap<String, Vec<ObjectId>>,
    /// Bundle each file is archived into
    pub file_to_bundle: BTreeMap<String, String>,
    /// Scene files and the scene they hold
    pub scene_files: BTreeMap<String, SceneWriteInfo>,
    /// Usage tags per file
    pub file_to_usage: BTreeMap<String, UsageTagSet>,
    pub reference_map: ReferenceMap,
    /// Objects each scene file needs from other files
    pub preload_info: BTreeMap<String, Vec<ObjectId>>,
    pub write_commands: Vec<WriteCommand>,
}

impl WriteData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a destination file belonging to `bundle`.
    pub fn add_file(&mut self, file: &str, bundle: &str) {
        self.file_to_bundle.entry(file.to_string()).or_insert_with(|| bundle.to_string());
        self.file_to_objects.entry(file.to_string()).or_default();
    }

    /// Assign an object to a file. Returns false if the file already has it.
    pub fn add_object(&mut self, file: &str, object: ObjectId) -> bool {
        let objects = self.file_to_objects.entry(file.to_string()).or_default();
        if objects.contains(&object) {
            return false;
        }
        objects.push(object);
        true
    }

    /// Remove an object from every file it was assigned to.
    pub fn remove_object(&mut self, object: &ObjectId) {
        for objects in self.file_to_objects.values_mut() {
            objects.retain(|existing| existing != object);
        }
    }

    /// Record that `asset` needs `file` loaded.
    pub fn add_asset_file(&mut self, asset: AssetId, file: &str) {
        let files = self.asset_to_files.entry(asset).or_default();
        if !files.iter().any(|existing| existing == file) {
            files.push(file.to_string());
        }
    }

    /// The file an object is currently assigned to.
    pub fn file_of(&self, object: &ObjectId) -> Option<&str> {
        self.file_to_objects
            .iter()
            .find(|(_, objects)| objects.contains(object))
            .map(|(file, _)| file.as_str())
    }

    /// Files archived into `bundle`, in name order.
    pub fn files_in_bundle(&self, bundle: &str) -> Vec<&str> {
        self.file_to_bundle
            .iter()
            .filter(|(_, owner)| owner.as_str() == bundle)
            .map(|(file, _)| file.as_str())
            .collect()
    }

    /// Every bundle name, in order.
    pub fn bundles(&self) -> Vec<&str> {
        let mut bundles: Vec<&str> = self.file_to_bundle.values().map(String::as_str).collect();
        bundles.sort_unstable();
        bundles.dedup();
        bundles
    }

    /// The command that writes `file`.
    pub fn command(&self, file: &str) -> Option<&WriteCommand> {
        self.write_commands.iter().find(|command| command.internal_name == file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(path: &str, local_id: i64) -> ObjectId {
        ObjectId::new(AssetId::from_path(path), local_id, path)
    }

    #[test]
    fn test_internal_names() {
        let internal = internal_file_name("CAB-1234");
        assert_eq!(internal, "archive:/CAB-1234/CAB-1234");
        assert_eq!(file_name_of(&internal), "CAB-1234");
        assert_eq!(file_name_of("plain"), "plain");
    }

    #[test]
    fn test_add_object_dedupes() {
        let mut data = WriteData::new();
        data.add_file("f", "bundle");
        assert!(data.add_object("f", object("a", 1)));
        assert!(!data.add_object("f", object("a", 1)));
        assert_eq!(data.file_to_objects["f"].len(), 1);
        assert_eq!(data.file_of(&object("a", 1)), Some("f"));
    }

    #[test]
    fn test_remove_object_everywhere() {
        let mut data = WriteData::new();
        data.add_object("f1", object("a", 1));
        data.add_object("f2", object("a", 1));
        data.remove_object(&object("a", 1));
        assert!(data.file_of(&object("a", 1)).is_none());
    }

    #[test]
    fn test_bundles_and_files() {
        let mut data = WriteData::new();
        data.add_file("archive:/b/b", "beta");
        data.add_file("archive:/a/a", "alpha");
        data.add_file("archive:/a/a.sharedAssets", "alpha");
        assert_eq!(data.bundles(), vec!["alpha", "beta"]);
        assert_eq!(data.files_in_bundle("alpha"), vec!["archive:/a/a", "archive:/a/a.sharedAssets"]);
    }

    #[test]
    fn test_reference_map_from_command() {
        let command = WriteCommand {
            internal_name: "archive:/x/x".to_string(),
            file_name: "x".to_string(),
            bundle_name: "x".to_string(),
            serialize_objects: vec![SerializationInfo { object: object("a", 1), serialization_index: 42 }],
            scene: None,
        };
        let mut map = ReferenceMap::default();
        map.add_mappings(&command);
        let location = map.get(&object("a", 1)).unwrap();
        assert_eq!(location.file, "archive:/x/x");
        assert_eq!(location.serialization_index, 42);
    }
}
