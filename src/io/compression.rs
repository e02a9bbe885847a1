//! Pluggable compression codecs for dump files and exported splits.
//!
//! A codec is chosen by file extension only. Sniffing magic bytes is unsafe for
//! BSON: the first four bytes are a little-endian length, and some lengths spell
//! another format's signature (a 23 106-byte document starts with `BZ`).
//!
//! A compressed dump cannot be entered at an arbitrary offset, so the file splitter
//! treats any file with a codec extension as a single split. Readers decompress
//! it transparently through [`open_reader`].
//!
//! ## Built-in codecs
//!
//! - **Gzip** (`.gz`) via `flate2` (feature: `compression-gzip`)
//! - **Zstd** (`.zst`) via `zstd` (feature: `compression-zstd`)
//! - **Bzip2** (`.bz2`) via `bzip2` (feature: `compression-bzip2`)
//! - **Xz** (`.xz`) via `xz2` (feature: `compression-xz`)
//!
//! Extra codecs can be added at runtime with [`register_codec`].

use crate::error::{Result, SplitError};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

/// Global codec registry.
static CODEC_REGISTRY: RwLock<Option<Vec<Arc<dyn CompressionCodec>>>> = RwLock::new(None);

fn init_registry() -> Vec<Arc<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Arc::new(GzipCodec),
        #[cfg(feature = "compression-zstd")]
        Arc::new(ZstdCodec),
        #[cfg(feature = "compression-bzip2")]
        Arc::new(Bzip2Codec),
        #[cfg(feature = "compression-xz")]
        Arc::new(XzCodec),
    ]
}

fn registry() -> Vec<Arc<dyn CompressionCodec>> {
    let mut lock = CODEC_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(init_registry).clone()
}

/// Register a custom codec alongside the built-in ones.
pub fn register_codec(codec: Arc<dyn CompressionCodec>) {
    let mut lock = CODEC_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(init_registry).push(codec);
}

/// A stream compression algorithm.
pub trait CompressionCodec: Send + Sync {
    /// Short name, as accepted by `bsonsplit export -c`.
    fn name(&self) -> &str;

    /// Lowercase extensions with the leading dot, preferred one first.
    fn extensions(&self) -> &[&str];

    /// Wrap a reader with decompression.
    ///
    /// # Errors
    ///
    /// Returns an error if the decoder cannot be initialized.
    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>>;

    /// Wrap a writer with compression.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoder cannot be initialized.
    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>>;
}

/// Codec whose extension ends `path`, if any.
#[must_use]
pub fn codec_for_path(path: impl AsRef<Path>) -> Option<Arc<dyn CompressionCodec>> {
    let path_str = path.as_ref().to_string_lossy().to_lowercase();
    registry()
        .into_iter()
        .find(|codec| codec.extensions().iter().any(|ext| path_str.ends_with(ext)))
}

/// Codec registered under `name`.
///
/// # Errors
///
/// Returns [`SplitError::InvalidConfig`] when no such codec is compiled in.
pub fn codec_by_name(name: &str) -> Result<Arc<dyn CompressionCodec>> {
    registry()
        .into_iter()
        .find(|codec| codec.name().eq_ignore_ascii_case(name))
        .ok_or_else(|| {
            SplitError::invalid_config("compression", format!("unknown or disabled codec '{name}'"))
        })
}

/// True when `path` names a stream that cannot be split at byte offsets.
#[must_use]
pub fn is_compressed(path: impl AsRef<Path>) -> bool {
    codec_for_path(path).is_some()
}

/// Open `path` for reading, decompressing when its extension names a codec.
///
/// # Errors
///
/// Returns [`SplitError::SourceUnreadable`] if the file cannot be opened.
pub fn open_reader(path: impl AsRef<Path>) -> Result<Box<dyn Read>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| SplitError::SourceUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    match codec_for_path(path) {
        Some(codec) => Ok(codec.wrap_reader_dyn(Box::new(reader))?),
        None => Ok(Box::new(reader)),
    }
}

/// Wrap `writer` with `codec`, or buffer it when there is none.
///
/// # Errors
///
/// Returns an error if the encoder cannot be initialized.
pub fn wrap_writer<W: Write + 'static>(
    writer: W,
    codec: Option<&Arc<dyn CompressionCodec>>,
) -> Result<Box<dyn Write>> {
    let buffered = BufWriter::new(writer);
    match codec {
        Some(codec) => Ok(codec.wrap_writer_dyn(Box::new(buffered))?),
        None => Ok(Box::new(buffered)),
    }
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        use flate2::read::MultiGzDecoder;
        Ok(Box::new(MultiGzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        Ok(Box::new(GzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read>)
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        zstd::stream::write::Encoder::new(writer, 3)
            .map(|e| Box::new(e.auto_finish()) as Box<dyn Write>)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn extensions(&self) -> &[&str] {
        &[".bz2", ".bzip2"]
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        use bzip2::read::MultiBzDecoder;
        Ok(Box::new(MultiBzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        use bzip2::Compression;
        use bzip2::write::BzEncoder;
        Ok(Box::new(BzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn extensions(&self) -> &[&str] {
        &[".xz"]
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        use xz2::read::XzDecoder;
        Ok(Box::new(XzDecoder::new_multi_decoder(reader)))
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        use xz2::write::XzEncoder;
        Ok(Box::new(XzEncoder::new(writer, 6)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_dump_is_not_compressed() {
        assert!(!is_compressed("dump/orders.bson"));
        assert!(codec_by_name("lz4").is_err());
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn gzip_detected_by_extension_only() {
        assert!(is_compressed("dump/orders.bson.GZ"));
        assert_eq!(codec_by_name("GZIP").unwrap().name(), "gzip");
    }
}
