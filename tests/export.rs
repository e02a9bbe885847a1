//! Dump files cut into part files.

use docsplit::export::{export_file, part_path, ExportOptions};
use docsplit::io::split_index;
use docsplit::testing::*;
use docsplit::{BsonFileReader, BsonFileSplitter, JobConf, SplitError};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn dump(dir: &Path) -> anyhow::Result<PathBuf> {
    let path = dir.join("orders.bson");
    write_bson_file(&path, &varied_docs(400, 300))?;
    Ok(path)
}

fn options(split_size: u64) -> ExportOptions {
    ExportOptions {
        split_size: Some(split_size),
        threads: Some(3),
        ..ExportOptions::default()
    }
}

#[test]
fn parts_concatenate_to_the_source() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let source = dump(dir.path())?;
    let out = dir.path().join("parts");

    let parts = export_file(&source, &out, &options(4096))?;
    assert!(parts.len() > 1);
    for (i, part) in parts.iter().enumerate() {
        assert_eq!(part, &part_path(&out, &source, i, None));
    }
    assert_eq!(
        parts[0].file_name().and_then(|n| n.to_str()),
        Some("orders.00000.bson")
    );

    let mut rebuilt = Vec::new();
    for part in &parts {
        rebuilt.extend(fs::read(part)?);
    }
    assert_eq!(rebuilt, fs::read(&source)?);
    assert!(!split_index::sidecar_path(&source, None).exists());
    Ok(())
}

#[test]
fn each_part_is_a_readable_dump() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let source = dump(dir.path())?;
    let parts = export_file(&source, &dir.path().join("parts"), &options(2048))?;

    let splitter = BsonFileSplitter::from_conf(&JobConf::new())?;
    let mut docs = 0;
    for part in &parts {
        for split in splitter.compute_splits(part, u64::MAX)? {
            docs += BsonFileReader::open(&split)?.collect::<docsplit::Result<Vec<_>>>()?.len();
        }
    }
    assert_eq!(docs, 400);
    Ok(())
}

#[test]
fn missing_source_is_unreadable() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let err = export_file(&dir.path().join("nope.bson"), dir.path(), &options(1024)).unwrap_err();
    assert!(matches!(err, SplitError::SourceUnreadable { .. }));
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn gzip_parts_decode_to_the_source() -> anyhow::Result<()> {
    use docsplit::io::compression::{codec_by_name, open_reader};
    use std::io::Read;

    let dir = TempDir::new()?;
    let source = dump(dir.path())?;
    let options = ExportOptions {
        codec: Some(codec_by_name("gzip")?),
        ..options(4096)
    };
    let parts = export_file(&source, &dir.path().join("parts"), &options)?;

    let mut rebuilt = Vec::new();
    for part in &parts {
        assert_eq!(part.extension().and_then(|e| e.to_str()), Some("gz"));
        open_reader(part)?.read_to_end(&mut rebuilt)?;
    }
    assert_eq!(rebuilt, fs::read(&source)?);
    Ok(())
}
