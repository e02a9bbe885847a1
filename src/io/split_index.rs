//! On-disk split index ("sidecar") for BSON dump files.
//!
//! # Layout (version 1)
//!
//! ```text
//! magic    8 bytes   b"BSONSPLT"
//! version  u32 LE    1
//! count    u64 LE    number of records
//! records  count x (start u64 LE, length u64 LE)
//! digest   32 bytes  SHA-256 of everything above
//! ```
//!
//! The index is a cache. Reading it never fails hard: a missing file, a foreign
//! magic, an unknown version, a short read or a digest mismatch all come back as
//! [`SplitError::NoSplitIndex`], and the caller rescans the source.
//!
//! Files without the magic are tried once as the legacy layout, a plain sequence
//! of BSON documents `{ s: <start>, l: <length> }`. A legacy index is reported as
//! [`IndexFormat::Legacy`] so the caller can rewrite it in the current layout.

use crate::error::{Result, SplitError};
use bson::{doc, Bson, Document};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

pub const MAGIC: &[u8; 8] = b"BSONSPLT";
pub const VERSION: u32 = 1;
const DIGEST_LEN: usize = 32;
const FIXED_LEN: usize = MAGIC.len() + 4 + 8;

/// One persisted split: a byte range of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub start: u64,
    pub length: u64,
}

impl IndexEntry {
    #[must_use]
    pub const fn new(start: u64, length: u64) -> Self {
        Self { start, length }
    }
}

/// Layout an index was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Current,
    Legacy,
}

/// Sidecar path for `source`: `.<name>.splits`, next to the source or in `dir`.
#[must_use]
pub fn sidecar_path(source: &Path, dir: Option<&Path>) -> PathBuf {
    let name = source
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    let file = format!(".{name}.splits");
    match dir {
        Some(dir) => dir.join(file),
        None => source.with_file_name(file),
    }
}

/// Serialize `entries` in the current layout.
///
/// # Errors
///
/// Returns an error only if `out` fails.
pub fn write_index<W: Write>(entries: &[IndexEntry], mut out: W) -> Result<()> {
    let mut buf = Vec::with_capacity(FIXED_LEN + entries.len() * 16 + DIGEST_LEN);
    buf.extend_from_slice(MAGIC);
    buf.write_u32::<LittleEndian>(VERSION)?;
    buf.write_u64::<LittleEndian>(entries.len() as u64)?;
    for entry in entries {
        buf.write_u64::<LittleEndian>(entry.start)?;
        buf.write_u64::<LittleEndian>(entry.length)?;
    }
    let digest = Sha256::digest(&buf);
    buf.extend_from_slice(digest.as_slice());
    out.write_all(&buf)?;
    out.flush()?;
    Ok(())
}

/// Deserialize an index, accepting the current or the legacy layout.
///
/// `path` only labels errors.
///
/// # Errors
///
/// Returns [`SplitError::NoSplitIndex`] for any unusable input.
pub fn read_index<R: Read>(mut input: R, path: &Path) -> Result<(Vec<IndexEntry>, IndexFormat)> {
    let no_index = |reason: String| SplitError::NoSplitIndex {
        path: path.to_path_buf(),
        reason,
    };

    let mut bytes = Vec::new();
    input
        .read_to_end(&mut bytes)
        .map_err(|e| no_index(format!("read failed: {e}")))?;
    if bytes.is_empty() {
        return Err(no_index("empty file".to_string()));
    }
    if !bytes.starts_with(MAGIC) {
        return read_legacy(&bytes).map(|e| (e, IndexFormat::Legacy)).ok_or_else(|| {
            no_index("unrecognized format marker".to_string())
        });
    }
    if bytes.len() < FIXED_LEN + DIGEST_LEN {
        return Err(no_index(format!("{} bytes is shorter than the header", bytes.len())));
    }

    let (body, digest) = bytes.split_at(bytes.len() - DIGEST_LEN);
    if Sha256::digest(body).as_slice() != digest {
        return Err(no_index("checksum mismatch".to_string()));
    }

    let mut cursor = Cursor::new(&body[MAGIC.len()..]);
    let version = cursor
        .read_u32::<LittleEndian>()
        .map_err(|e| no_index(e.to_string()))?;
    if version != VERSION {
        return Err(no_index(format!("unsupported version {version}")));
    }
    let count = cursor
        .read_u64::<LittleEndian>()
        .map_err(|e| no_index(e.to_string()))?;
    let expected = (body.len() - FIXED_LEN) as u64 / 16;
    if count != expected || (body.len() - FIXED_LEN) % 16 != 0 {
        return Err(no_index(format!("header declares {count} records, body holds {expected}")));
    }

    let mut entries = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
    for _ in 0..count {
        let start = cursor
            .read_u64::<LittleEndian>()
            .map_err(|e| no_index(e.to_string()))?;
        let length = cursor
            .read_u64::<LittleEndian>()
            .map_err(|e| no_index(e.to_string()))?;
        entries.push(IndexEntry { start, length });
    }
    Ok((entries, IndexFormat::Current))
}

fn as_offset(value: Option<&Bson>) -> Option<u64> {
    match value? {
        Bson::Int64(v) => u64::try_from(*v).ok(),
        Bson::Int32(v) => u64::try_from(*v).ok(),
        _ => None,
    }
}

fn read_legacy(bytes: &[u8]) -> Option<Vec<IndexEntry>> {
    let mut reader = bytes;
    let mut entries = Vec::new();
    while !reader.is_empty() {
        let record = Document::from_reader(&mut reader).ok()?;
        entries.push(IndexEntry {
            start: as_offset(record.get("s"))?,
            length: as_offset(record.get("l"))?,
        });
    }
    Some(entries)
}

/// Write `entries` in the legacy layout. Kept for migration tests and old readers.
///
/// # Errors
///
/// Returns an error if encoding or `out` fails.
pub fn write_legacy_index<W: Write>(entries: &[IndexEntry], mut out: W) -> Result<()> {
    for entry in entries {
        let record = doc! {
            "s": i64::try_from(entry.start).map_err(|e| SplitError::Bson(e.to_string()))?,
            "l": i64::try_from(entry.length).map_err(|e| SplitError::Bson(e.to_string()))?,
        };
        record.to_writer(&mut out)?;
    }
    out.flush()?;
    Ok(())
}

/// Load the index stored at `path`.
///
/// # Errors
///
/// Returns [`SplitError::NoSplitIndex`] when the file is missing or unusable.
pub fn load(path: &Path) -> Result<(Vec<IndexEntry>, IndexFormat)> {
    let file = File::open(path).map_err(|e| SplitError::NoSplitIndex {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    read_index(file, path)
}

/// Persist `entries` at `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`SplitError::Io`] if the file cannot be created, written or synced.
pub fn save(path: &Path, entries: &[IndexEntry]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    write_index(entries, &mut file)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<IndexEntry> {
        vec![IndexEntry::new(0, 4096), IndexEntry::new(4096, 5000), IndexEntry::new(9096, 17)]
    }

    #[test]
    fn sidecar_names_follow_convention() {
        let src = Path::new("/data/dump/orders.bson");
        assert_eq!(sidecar_path(src, None), PathBuf::from("/data/dump/.orders.bson.splits"));
        assert_eq!(
            sidecar_path(src, Some(Path::new("/tmp/idx"))),
            PathBuf::from("/tmp/idx/.orders.bson.splits")
        );
    }

    #[test]
    fn written_index_reads_back_unchanged() {
        for entries in [sample(), Vec::new()] {
            let mut bytes = Vec::new();
            write_index(&entries, &mut bytes).unwrap();
            assert_eq!(bytes.len(), FIXED_LEN + entries.len() * 16 + DIGEST_LEN);
            let (back, format) = read_index(bytes.as_slice(), Path::new("x")).unwrap();
            assert_eq!(back, entries);
            assert_eq!(format, IndexFormat::Current);
        }
    }

    #[test]
    fn saved_index_loads_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(".orders.bson.splits");
        save(&path, &sample()).unwrap();
        assert_eq!(load(&path).unwrap(), (sample(), IndexFormat::Current));
    }

    #[test]
    fn missing_sidecar_is_no_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".absent.bson.splits");
        let err = load(&path).unwrap_err();
        assert!(matches!(err, SplitError::NoSplitIndex { path: ref p, .. } if *p == path));
        assert!(err.is_recoverable());
    }

    #[test]
    fn other_version_is_no_index() {
        let mut bytes = Vec::new();
        write_index(&sample(), &mut bytes).unwrap();
        bytes.truncate(bytes.len() - DIGEST_LEN);
        bytes[MAGIC.len()..MAGIC.len() + 4].copy_from_slice(&(VERSION + 1).to_le_bytes());
        let digest = Sha256::digest(&bytes);
        bytes.extend_from_slice(digest.as_slice());

        let err = read_index(bytes.as_slice(), Path::new("x")).unwrap_err();
        assert!(matches!(err, SplitError::NoSplitIndex { ref reason, .. } if reason.contains("version 2")));
    }

    #[test]
    fn flipped_byte_fails_checksum() {
        let mut bytes = Vec::new();
        write_index(&sample(), &mut bytes).unwrap();
        bytes[FIXED_LEN + 3] ^= 0xff;
        let err = read_index(bytes.as_slice(), Path::new("x")).unwrap_err();
        assert!(matches!(err, SplitError::NoSplitIndex { ref reason, .. } if reason.contains("checksum")));
    }

    #[test]
    fn legacy_layout_is_recognized() {
        let mut bytes = Vec::new();
        write_legacy_index(&sample(), &mut bytes).unwrap();
        let (entries, format) = read_index(bytes.as_slice(), Path::new("x")).unwrap();
        assert_eq!(entries, sample());
        assert_eq!(format, IndexFormat::Legacy);
    }

    #[test]
    fn garbage_is_no_index() {
        let err = read_index(&b"not an index at all"[..], Path::new("x")).unwrap_err();
        assert!(err.is_recoverable());
    }
}
