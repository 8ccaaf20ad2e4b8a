//! Reference bundle archive format.
//!
//! Layout (little-endian):
//!
//! ```text
//! "BSMB" | version: u32 | compression: u8 | entry count: u32
//! per entry: alias len: u32 | alias | serialized: u8 | raw len: u64 | stored len: u64 | data
//! ```
//!
//! With LZ4 compression each entry's data is an LZ4 block with the raw size
//! prepended.

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use super::service::{ContentArchiver, ContentError};
use crate::build::result::ResourceFile;
use crate::config::Compression;

const MAGIC: &[u8; 4] = b"BSMB";
const ARCHIVE_VERSION: u32 = 1;

/// A file recovered from an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub alias: String,
    pub serialized: bool,
    pub data: Vec<u8>,
}

/// Writes bundle archives in the `BSMB` format.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileArchiver;

impl FileArchiver {
    pub fn new() -> Self {
        Self
    }

    /// Encode resources into archive bytes.
    pub fn encode(resources: &[ResourceFile], compression: Compression) -> Result<Vec<u8>, ContentError> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&ARCHIVE_VERSION.to_le_bytes());
        out.push(compression_tag(compression));
        out.extend_from_slice(&(resources.len() as u32).to_le_bytes());

        for resource in resources {
            let raw = fs::read(&resource.path)?;
            let stored = match compression {
                Compression::None => raw.clone(),
                Compression::Lz4 => lz4_flex::compress_prepend_size(&raw),
            };
            out.extend_from_slice(&(resource.file_alias.len() as u32).to_le_bytes());
            out.extend_from_slice(resource.file_alias.as_bytes());
            out.push(u8::from(resource.serialized));
            out.extend_from_slice(&(raw.len() as u64).to_le_bytes());
            out.extend_from_slice(&(stored.len() as u64).to_le_bytes());
            out.extend_from_slice(&stored);
        }

        Ok(out)
    }
}

impl ContentArchiver for FileArchiver {
    fn archive(&self, resources: &[ResourceFile], output: &Path, compression: Compression) -> Result<u32, ContentError> {
        let bytes = Self::encode(resources, compression)?;
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(output, &bytes)?;
        Ok(checksum(&bytes))
    }
}

/// Read every entry of an archive file.
pub fn read_archive(path: &Path) -> Result<Vec<ArchiveEntry>, ContentError> {
    let bytes = fs::read(path)?;
    let mut cursor = Cursor::new(bytes.as_slice());

    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(ContentError::Archive("not a bundle archive".to_string()));
    }
    let version = read_u32(&mut cursor)?;
    if version != ARCHIVE_VERSION {
        return Err(ContentError::Archive(format!("unsupported archive version {version}")));
    }
    let compression = match read_u8(&mut cursor)? {
        0 => Compression::None,
        1 => Compression::Lz4,
        other => return Err(ContentError::Archive(format!("unknown compression tag {other}"))),
    };

    let count = read_u32(&mut cursor)? as u64;
    // Every entry header takes at least 21 bytes.
    let count = checked_len(&cursor, count.saturating_mul(21), "entry table")? / 21;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let alias_len = read_u32(&mut cursor)? as u64;
        let alias_len = checked_len(&cursor, alias_len, "alias")?;
        let mut alias = vec![0u8; alias_len];
        cursor.read_exact(&mut alias)?;
        let serialized = read_u8(&mut cursor)? != 0;
        let raw_len = read_u64(&mut cursor)?;
        let stored_len = read_u64(&mut cursor)?;
        let stored_len = checked_len(&cursor, stored_len, "entry data")?;
        let mut stored = vec![0u8; stored_len];
        cursor.read_exact(&mut stored)?;

        let data = match compression {
            Compression::None => stored,
            Compression::Lz4 => decompress(&stored, raw_len)?,
        };
        let raw_len = raw_len as usize;
        if data.len() != raw_len {
            return Err(ContentError::Archive(format!(
                "entry size mismatch: expected {raw_len}, found {}",
                data.len()
            )));
        }

        entries.push(ArchiveEntry {
            alias: String::from_utf8(alias).map_err(|e| ContentError::Archive(e.to_string()))?,
            serialized,
            data,
        });
    }

    Ok(entries)
}

/// `len` as a buffer size, if that many bytes remain after the cursor.
fn checked_len(cursor: &Cursor<&[u8]>, len: u64, what: &str) -> Result<usize, ContentError> {
    let remaining = (cursor.get_ref().len() as u64).saturating_sub(cursor.position());
    if len > remaining {
        return Err(ContentError::Archive(format!("{what} length {len} exceeds the {remaining} bytes left")));
    }
    Ok(len as usize)
}

/// Decompress one LZ4 entry whose prepended size must equal `raw_len`. LZ4
/// expands at most 255 times, which bounds the allocation.
fn decompress(stored: &[u8], raw_len: u64) -> Result<Vec<u8>, ContentError> {
    let prefix: [u8; 4] = stored
        .get(..4)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| ContentError::Archive("truncated lz4 entry".to_string()))?;
    let declared = u32::from_le_bytes(prefix) as u64;
    if declared != raw_len || declared > (stored.len() as u64).saturating_mul(255) {
        return Err(ContentError::Archive(format!("implausible lz4 entry size {declared}")));
    }
    lz4_flex::decompress_size_prepended(stored).map_err(|e| ContentError::Archive(e.to_string()))
}

/// 32-bit FNV-1a checksum of archive bytes.
pub fn checksum(data: &[u8]) -> u32 {
    const FNV_OFFSET: u32 = 0x811c9dc5;
    const FNV_PRIME: u32 = 0x01000193;

    let mut hash = FNV_OFFSET;
    for byte in data {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn compression_tag(compression: Compression) -> u8 {
    match compression {
        Compression::None => 0,
        Compression::Lz4 => 1,
    }
}

fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8, ContentError> {
    let mut buf = [0u8; 1];
    cursor.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, ContentError> {
    let mut buf = [0u8; 4];
    cursor.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(cursor: &mut Cursor<&[u8]>) -> Result<u64, ContentError> {
    let mut buf = [0u8; 8];
    cursor.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn resources(dir: &Path) -> Vec<ResourceFile> {
        let main = dir.join("CAB-a");
        let stream = dir.join("CAB-a.resS");
        fs::write(&main, b"{\"objects\":[1,2,3]}").unwrap();
        fs::write(&stream, vec![7u8; 4096]).unwrap();
        vec![
            ResourceFile {
                file_alias: "archive:/CAB-a/CAB-a".to_string(),
                path: main,
                serialized: true,
            },
            ResourceFile {
                file_alias: "archive:/CAB-a/CAB-a.resS".to_string(),
                path: stream,
                serialized: false,
            },
        ]
    }

    #[test]
    fn test_lz4_archive_shrinks_and_reads_back() {
        let temp = TempDir::new().unwrap();
        let files = resources(temp.path());
        let plain = temp.path().join("plain.bundle");
        let packed = temp.path().join("packed.bundle");

        FileArchiver::new().archive(&files, &plain, Compression::None).unwrap();
        FileArchiver::new().archive(&files, &packed, Compression::Lz4).unwrap();
        assert!(fs::metadata(&packed).unwrap().len() < fs::metadata(&plain).unwrap().len());

        let entries = read_archive(&packed).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].alias, "archive:/CAB-a/CAB-a");
        assert!(entries[0].serialized);
        assert_eq!(entries[1].data, vec![7u8; 4096]);
    }

    #[test]
    fn test_checksum_matches_file() {
        let temp = TempDir::new().unwrap();
        let files = resources(temp.path());
        let out = temp.path().join("out/a.bundle");
        let sum = FileArchiver::new().archive(&files, &out, Compression::Lz4).unwrap();
        assert_eq!(sum, checksum(&fs::read(&out).unwrap()));
    }

    #[test]
    fn test_rejects_foreign_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("junk");
        fs::write(&path, b"PK\x03\x04 not a bundle").unwrap();
        assert!(matches!(read_archive(&path), Err(ContentError::Archive(_))));
    }

    #[test]
    fn test_rejects_lengths_past_end_of_file() {
        let temp = TempDir::new().unwrap();
        let mut header = Vec::new();
        header.extend_from_slice(MAGIC);
        header.extend_from_slice(&ARCHIVE_VERSION.to_le_bytes());
        header.push(compression_tag(Compression::None));

        let huge_count = temp.path().join("count");
        let mut bytes = header.clone();
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        fs::write(&huge_count, &bytes).unwrap();
        assert!(matches!(read_archive(&huge_count), Err(ContentError::Archive(_))));

        let huge_entry = temp.path().join("entry");
        let mut bytes = header;
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(b'a');
        bytes.push(1);
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 32]);
        fs::write(&huge_entry, &bytes).unwrap();
        assert!(matches!(read_archive(&huge_entry), Err(ContentError::Archive(_))));
    }

    #[test]
    fn test_rejects_implausible_lz4_size() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("packed.bundle");
        FileArchiver::new().archive(&resources(temp.path()), &path, Compression::Lz4).unwrap();

        // Rewrite the second entry's prepended size to claim 4 GiB.
        let mut bytes = fs::read(&path).unwrap();
        let marker = b"archive:/CAB-a/CAB-a.resS";
        let alias_at = bytes.windows(marker.len()).position(|w| w == marker).unwrap();
        let data_at = alias_at + marker.len() + 1 + 8 + 8;
        bytes[data_at..data_at + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        fs::write(&path, &bytes).unwrap();
        assert!(matches!(read_archive(&path), Err(ContentError::Archive(_))));
    }
}
