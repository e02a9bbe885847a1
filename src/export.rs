//! Cutting a dump file into standalone part files.
//!
//! Each split of a dump becomes `{stem}.{index:05}.bson[.ext]` in the output
//! directory, optionally compressed. Parts are whole documents, so they can be
//! read on their own and concatenate back to the source. Export never writes a
//! split index next to the source.

use crate::config::{keys, JobConf};
use crate::error::{Result, SplitError};
use crate::file_splitter::BsonFileSplitter;
use crate::io::compression::{is_compressed, open_reader, wrap_writer, CompressionCodec};
use crate::split::FileSplit;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// How parts are written.
#[derive(Default, Clone)]
pub struct ExportOptions {
    /// Target part size in bytes; the configured file split size otherwise.
    pub split_size: Option<u64>,
    pub codec: Option<Arc<dyn CompressionCodec>>,
    /// Worker threads, one per CPU by default.
    pub threads: Option<usize>,
}

/// Plan `source` and write every split to `dir`. Returns the part paths in
/// split order.
///
/// # Errors
///
/// [`SplitError::SourceUnreadable`] when the source cannot be read, scan errors
/// from [`BsonFileSplitter::load_or_compute`], and [`SplitError::Io`] when a
/// part cannot be written.
pub fn export_file(source: &Path, dir: &Path, options: &ExportOptions) -> Result<Vec<PathBuf>> {
    let conf = JobConf::new().with(keys::BSON_WRITE_SPLITS, "false");
    let mut splitter = BsonFileSplitter::from_conf(&conf)?;
    if let Some(bytes) = options.split_size {
        splitter = splitter.with_split_size(bytes);
    }
    let splits = splitter.load_or_compute(source)?;
    fs::create_dir_all(dir)?;
    let parts = export_splits(&splits, dir, options.codec.as_ref(), options.threads)?;
    info!(parts = parts.len(), dir = %dir.display(), "export finished");
    Ok(parts)
}

/// Output path of part `index` of `source`.
#[must_use]
pub fn part_path(dir: &Path, source: &Path, index: usize, codec: Option<&Arc<dyn CompressionCodec>>) -> PathBuf {
    let stem = source
        .file_stem()
        .map_or_else(|| "part".into(), |s| s.to_string_lossy().into_owned());
    let ext = codec.and_then(|c| c.extensions().first().copied()).unwrap_or("");
    dir.join(format!("{stem}.{index:05}.bson{ext}"))
}

/// Copy the bytes of `split` to `dest`, through `codec` when given. Returns the
/// number of uncompressed bytes copied.
///
/// # Errors
///
/// [`SplitError::SourceUnreadable`] for the source and [`SplitError::Io`] for
/// the destination.
pub fn write_part(split: &FileSplit, dest: &Path, codec: Option<&Arc<dyn CompressionCodec>>) -> Result<u64> {
    let mut reader: Box<dyn Read> = if is_compressed(&split.path) {
        open_reader(&split.path)?
    } else {
        let unreadable = |source: io::Error| SplitError::SourceUnreadable {
            path: split.path.clone(),
            source,
        };
        let mut file = File::open(&split.path).map_err(unreadable)?;
        file.seek(SeekFrom::Start(split.start)).map_err(unreadable)?;
        Box::new(file.take(split.length))
    };
    let mut writer = wrap_writer(File::create(dest)?, codec)?;
    let copied = io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    Ok(copied)
}

/// Write each of `splits` to its own part in `dir`.
///
/// # Errors
///
/// Fails with the first part that cannot be written.
#[cfg(feature = "parallel-io")]
pub fn export_splits(
    splits: &[FileSplit],
    dir: &Path,
    codec: Option<&Arc<dyn CompressionCodec>>,
    threads: Option<usize>,
) -> Result<Vec<PathBuf>> {
    use rayon::prelude::*;
    let threads = threads.unwrap_or_else(num_cpus::get).clamp(1, splits.len().max(1));
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(io::Error::other)?;
    pool.install(|| {
        splits
            .par_iter()
            .enumerate()
            .map(|(i, split)| export_one(i, split, dir, codec))
            .collect()
    })
}

/// Write each of `splits` to its own part in `dir`.
///
/// # Errors
///
/// Fails with the first part that cannot be written.
#[cfg(not(feature = "parallel-io"))]
pub fn export_splits(
    splits: &[FileSplit],
    dir: &Path,
    codec: Option<&Arc<dyn CompressionCodec>>,
    _threads: Option<usize>,
) -> Result<Vec<PathBuf>> {
    splits
        .iter()
        .enumerate()
        .map(|(i, split)| export_one(i, split, dir, codec))
        .collect()
}

fn export_one(
    index: usize,
    split: &FileSplit,
    dir: &Path,
    codec: Option<&Arc<dyn CompressionCodec>>,
) -> Result<PathBuf> {
    let dest = part_path(dir, &split.path, index, codec);
    let bytes = write_part(split, &dest, codec)?;
    info!(part = index, bytes, path = %dest.display(), "wrote part");
    Ok(dest)
}
