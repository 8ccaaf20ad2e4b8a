//! Reference serializer writing destination files as JSON documents.

use serde::Serialize;
use std::fs;
use std::path::Path;

use super::ids::ObjectId;
use super::service::{ContentError, ContentSerializer, WriteRequest};
use crate::build::result::{ResourceFile, WriteResult};
use crate::build::write_data::{ObjectLocation, WriteCommand};

/// Extension of the streamed side file written next to a serialized file.
pub const STREAM_EXTENSION: &str = "resS";

#[derive(Serialize)]
struct SerializedDocument<'a> {
    name: &'a str,
    bundle: &'a str,
    objects: Vec<SerializedEntry<'a>>,
    usage: Vec<&'a str>,
    preload: Vec<SerializedReference<'a>>,
    settings: &'a std::collections::BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scene: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct SerializedEntry<'a> {
    index: i64,
    object: &'a ObjectId,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<StreamRange>,
}

#[derive(Serialize)]
struct StreamRange {
    offset: u64,
    size: u64,
}

#[derive(Serialize)]
struct SerializedReference<'a> {
    object: &'a ObjectId,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a ObjectLocation>,
}

/// Writes each command as `<file name>` plus an optional `<file name>.resS`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFileSerializer;

impl JsonFileSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl ContentSerializer for JsonFileSerializer {
    fn write(&self, command: &WriteCommand, request: &WriteRequest<'_>) -> Result<WriteResult, ContentError> {
        fs::create_dir_all(request.output_folder)?;

        let mut stream = Vec::new();
        let mut objects = Vec::with_capacity(command.serialize_objects.len());
        for info in &command.serialize_objects {
            let size = request.content.stream_data_size(&info.object);
            let range = if size > 0 {
                let offset = stream.len() as u64;
                append_stream_data(&mut stream, &info.object, size);
                Some(StreamRange { offset, size })
            } else {
                None
            };
            objects.push(SerializedEntry {
                index: info.serialization_index,
                object: &info.object,
                stream: range,
            });
        }

        let scene = match &command.scene {
            Some(scene) => Some(read_processed_scene(&scene.processed_scene)?),
            None => None,
        };

        let document = SerializedDocument {
            name: &command.internal_name,
            bundle: &command.bundle_name,
            objects,
            usage: request.usage.iter().collect(),
            preload: request
                .preload
                .iter()
                .map(|object| SerializedReference {
                    object,
                    location: request.reference_map.get(object),
                })
                .collect(),
            settings: request.settings,
            scene,
        };

        let main_path = request.output_folder.join(&command.file_name);
        fs::write(&main_path, serde_json::to_vec_pretty(&document)?)?;

        let mut resource_files = vec![ResourceFile {
            file_alias: command.internal_name.clone(),
            path: main_path,
            serialized: true,
        }];

        if !stream.is_empty() {
            let stream_path = request
                .output_folder
                .join(format!("{}.{}", command.file_name, STREAM_EXTENSION));
            fs::write(&stream_path, &stream)?;
            resource_files.push(ResourceFile {
                file_alias: format!("{}.{}", command.internal_name, STREAM_EXTENSION),
                path: stream_path,
                serialized: false,
            });
        }

        Ok(WriteResult {
            internal_name: command.internal_name.clone(),
            resource_files,
            object_count: command.serialize_objects.len(),
        })
    }
}

fn read_processed_scene(path: &Path) -> Result<serde_json::Value, ContentError> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Deterministic filler standing in for streamed texture or mesh data.
fn append_stream_data(stream: &mut Vec<u8>, object: &ObjectId, size: u64) {
    let seed = object.asset.hash().as_bytes()[0] ^ (object.local_id as u8);
    stream.extend((0..size).map(|i| seed.wrapping_add(i as u8)));
}
