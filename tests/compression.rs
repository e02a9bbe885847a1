//! Compressed dump files: codec lookup, single-split planning and decoding.

use docsplit::config::JobConf;
use docsplit::io::compression::{codec_by_name, is_compressed, register_codec, wrap_writer, CompressionCodec};
use docsplit::testing::{encode, varied_docs};
use docsplit::{BsonFileReader, BsonFileSplitter, SplitError};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write_compressed(path: &Path, codec: &Arc<dyn CompressionCodec>, docs: usize) -> anyhow::Result<()> {
    let mut writer = wrap_writer(File::create(path)?, Some(codec))?;
    for doc in varied_docs(i32::try_from(docs)?, 200) {
        writer.write_all(&encode(&doc))?;
    }
    writer.flush()?;
    Ok(())
}

fn plan_and_read(path: &Path) -> anyhow::Result<usize> {
    let splitter = BsonFileSplitter::from_conf(&JobConf::new())?.with_split_size(512);
    let splits = splitter.load_or_compute(path)?;
    assert_eq!(splits.len(), 1, "a compressed dump must not be cut");
    assert_eq!(splits[0].start, 0);
    let docs = BsonFileReader::open(&splits[0])?.collect::<docsplit::Result<Vec<_>>>()?;
    Ok(docs.len())
}

#[cfg(any(
    feature = "compression-gzip",
    feature = "compression-zstd",
    feature = "compression-bzip2",
    feature = "compression-xz"
))]
mod builtin {
    use super::*;

    fn round_trip(name: &str, ext: &str) -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let codec = codec_by_name(name)?;
        assert_eq!(codec.extensions()[0], ext);
        let path = dir.path().join(format!("dump.bson{ext}"));
        write_compressed(&path, &codec, 300)?;
        assert!(is_compressed(&path));
        assert_eq!(plan_and_read(&path)?, 300);
        Ok(())
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn gzip_dump() -> anyhow::Result<()> {
        round_trip("gzip", ".gz")
    }

    #[cfg(feature = "compression-zstd")]
    #[test]
    fn zstd_dump() -> anyhow::Result<()> {
        round_trip("zstd", ".zst")
    }

    #[cfg(feature = "compression-bzip2")]
    #[test]
    fn bzip2_dump() -> anyhow::Result<()> {
        round_trip("bzip2", ".bz2")
    }

    #[cfg(feature = "compression-xz")]
    #[test]
    fn xz_dump() -> anyhow::Result<()> {
        round_trip("xz", ".xz")
    }

    #[test]
    fn codec_names_ignore_case() {
        let any = ["GZIP", "Zstd", "BZIP2", "Xz"]
            .iter()
            .any(|name| codec_by_name(name).is_ok());
        assert!(any);
    }
}

#[test]
fn unknown_codec_is_a_config_error() {
    let err = codec_by_name("lz77").err().map(|e| e.is_config_error());
    assert_eq!(err, Some(true));
}

#[test]
fn plain_dump_is_not_compressed() {
    assert!(!is_compressed("dump.bson"));
    assert!(!is_compressed("archive.gz.bson"));
}

/// Stores bytes reversed in blocks, so reading without the codec would fail.
struct Reversing;

impl CompressionCodec for Reversing {
    fn name(&self) -> &str {
        "reversing"
    }

    fn extensions(&self) -> &[&str] {
        &[".rev"]
    }

    fn wrap_reader_dyn(&self, mut reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        buf.reverse();
        Ok(Box::new(std::io::Cursor::new(buf)))
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        Ok(Box::new(ReversingWriter { inner: writer, buf: Vec::new() }))
    }
}

struct ReversingWriter {
    inner: Box<dyn Write>,
    buf: Vec<u8>,
}

impl Write for ReversingWriter {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut out = std::mem::take(&mut self.buf);
        out.reverse();
        self.inner.write_all(&out)?;
        self.inner.flush()
    }
}

#[test]
fn registered_codec_is_used_for_its_extension() -> anyhow::Result<()> {
    register_codec(Arc::new(Reversing));
    let dir = TempDir::new()?;
    let path = dir.path().join("dump.bson.rev");
    let codec = codec_by_name("reversing")?;
    write_compressed(&path, &codec, 50)?;

    assert!(is_compressed(&path));
    assert_eq!(plan_and_read(&path)?, 50);

    let splitter = BsonFileSplitter::from_conf(&JobConf::new())?;
    let err = splitter.starting_position(&path, 10).unwrap_err();
    assert!(matches!(err, SplitError::InvalidConfig { .. }));
    Ok(())
}
