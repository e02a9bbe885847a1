//! Split planning for BSON dump files.
//!
//! [`BsonFileSplitter`] walks a dump's document boundaries with the
//! [`BsonScanner`] and cuts it into byte ranges of roughly the target size, never
//! inside a document. The result is cached in a sidecar index
//! ([`crate::io::split_index`]) so later planning runs skip the scan.
//!
//! # Split rule
//!
//! Documents accumulate into the current split. When adding the next document
//! would bring the split to the target size or beyond, the current split is
//! closed at that document's start and a new one begins there. A document larger
//! than the target gets a split to itself. The last split ends at the last
//! complete document; a truncated trailing document is end of data.
//!
//! # Configuration
//!
//! - `bson.split.read_splits=false`: one whole-file split, no scan, no sidecar.
//! - `bson.split.write_splits=false`: scan, but do not persist the sidecar.
//! - `bson.split.splits_path`: directory for sidecars instead of the source's own.
//! - Target size: see [`JobConf::file_split_size`].
//!
//! Files whose extension names a compression codec are never cut: they become a
//! single split, and readers decompress them from the start.

use crate::config::JobConf;
use crate::error::{Result, SplitError};
use crate::io::compression::is_compressed;
use crate::io::scanner::BsonScanner;
use crate::io::split_index::{self, IndexEntry, IndexFormat};
use crate::split::FileSplit;
use std::fs::{self, File};
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const PROGRESS_EVERY: u64 = 1000;

/// Plans splits for dump files under one job configuration.
#[derive(Debug, Clone)]
pub struct BsonFileSplitter {
    split_size: u64,
    read_splits: bool,
    write_splits: bool,
    splits_dir: Option<PathBuf>,
    key_field: String,
    locations: Vec<String>,
}

impl BsonFileSplitter {
    /// Settings taken from `conf`.
    ///
    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] for malformed size or flag values.
    pub fn from_conf(conf: &JobConf) -> Result<Self> {
        Ok(Self {
            split_size: conf.file_split_size(None)?,
            read_splits: conf.bson_read_splits()?,
            write_splits: conf.bson_write_splits()?,
            splits_dir: conf.bson_splits_path(),
            key_field: conf.input_key(),
            locations: vec!["localhost".to_string()],
        })
    }

    /// Override the target split size in bytes.
    #[must_use]
    pub fn with_split_size(mut self, bytes: u64) -> Self {
        self.split_size = bytes.max(1);
        self
    }

    /// Hosts attached to every split.
    #[must_use]
    pub fn with_locations(mut self, locations: Vec<String>) -> Self {
        self.locations = locations;
        self
    }

    #[must_use]
    pub const fn split_size(&self) -> u64 {
        self.split_size
    }

    /// Sidecar location for `source` under this configuration.
    #[must_use]
    pub fn sidecar_path(&self, source: &Path) -> PathBuf {
        split_index::sidecar_path(source, self.splits_dir.as_deref())
    }

    fn file_split(&self, path: &Path, start: u64, length: u64) -> FileSplit {
        FileSplit {
            path: path.to_path_buf(),
            start,
            length,
            key_field: self.key_field.clone(),
            locations: self.locations.clone(),
        }
    }

    fn whole_file(&self, path: &Path) -> Result<Vec<FileSplit>> {
        let len = file_len(path)?;
        if len == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![self.file_split(path, 0, len)])
    }

    /// Scan `path` and cut it at document boundaries into splits of at most
    /// `target` bytes (unless a single document is larger).
    ///
    /// Does not read or write the sidecar.
    ///
    /// # Errors
    ///
    /// Returns [`SplitError::SourceUnreadable`] if the file cannot be opened and
    /// [`SplitError::MalformedDocument`] on a corrupt length prefix.
    pub fn compute_splits(&self, path: &Path, target: u64) -> Result<Vec<FileSplit>> {
        let total = file_len(path)?;
        let file = open(path)?;
        debug!(path = %path.display(), target, "generating splits");

        let mut scanner = BsonScanner::new(BufReader::new(file));
        let mut splits = Vec::new();
        let mut cur_start = 0;
        let mut cur_len = 0;
        let mut docs: u64 = 0;

        while let Some((start, len)) = scanner.next_boundary()? {
            let len = u64::from(len);
            if cur_len > 0 && cur_len + len >= target {
                let split = self.file_split(path, cur_start, cur_len);
                debug!(index = splits.len(), start = split.start, length = split.length, "new split");
                splits.push(split);
                cur_start = start;
                cur_len = 0;
            }
            cur_len += len;
            docs += 1;
            if docs % PROGRESS_EVERY == 0 {
                #[allow(clippy::cast_precision_loss)]
                let pct = 100.0 * scanner.position() as f64 / total.max(1) as f64;
                debug!(docs, percent = pct, path = %path.display(), "scanning");
            }
        }
        if cur_len > 0 {
            splits.push(self.file_split(path, cur_start, cur_len));
        }
        if scanner.position() < total {
            warn!(
                path = %path.display(),
                trailing = total - scanner.position(),
                "ignoring truncated trailing document"
            );
        }
        info!(path = %path.display(), docs, splits = splits.len(), "computed splits");
        Ok(splits)
    }

    /// Splits for `path`, from the sidecar when it is usable, otherwise by scanning
    /// (and then persisting the sidecar).
    ///
    /// # Errors
    ///
    /// Returns [`SplitError::SourceUnreadable`] if the source cannot be read. A
    /// missing or damaged sidecar is never an error.
    pub fn load_or_compute(&self, path: &Path) -> Result<Vec<FileSplit>> {
        if is_compressed(path) {
            info!(path = %path.display(), "compressed input is not splittable; using one split");
            return self.whole_file(path);
        }
        if !self.read_splits {
            info!(path = %path.display(), "reading splits is disabled; using one split");
            return self.whole_file(path);
        }

        let sidecar = self.sidecar_path(path);
        match self.load_sidecar(path, &sidecar) {
            Ok(splits) => return Ok(splits),
            Err(e @ SplitError::NoSplitIndex { .. }) => debug!("{e}; rescanning"),
            Err(e) => return Err(e),
        }

        let splits = self.compute_splits(path, self.split_size)?;
        self.persist(&sidecar, &splits);
        Ok(splits)
    }

    fn load_sidecar(&self, source: &Path, sidecar: &Path) -> Result<Vec<FileSplit>> {
        let stale = |reason: String| SplitError::NoSplitIndex {
            path: sidecar.to_path_buf(),
            reason,
        };

        let (entries, format) = split_index::load(sidecar)?;
        if is_newer(source, sidecar) {
            return Err(stale("source modified after the index was written".to_string()));
        }
        let total = file_len(source)?;
        let mut expected = 0;
        for entry in &entries {
            if entry.start != expected || entry.length == 0 {
                return Err(stale(format!("record at {} breaks contiguity", entry.start)));
            }
            expected = entry.start + entry.length;
        }
        if expected > total {
            return Err(stale(format!("index covers {expected} bytes, file has {total}")));
        }

        let splits: Vec<FileSplit> = entries
            .iter()
            .map(|e| self.file_split(source, e.start, e.length))
            .collect();
        info!(path = %source.display(), splits = splits.len(), "loaded split index");
        if format == IndexFormat::Legacy {
            debug!(path = %sidecar.display(), "upgrading legacy split index");
            self.persist(sidecar, &splits);
        }
        Ok(splits)
    }

    // A sidecar that cannot be written only costs a rescan next time.
    fn persist(&self, sidecar: &Path, splits: &[FileSplit]) {
        if !self.write_splits {
            info!("writing splits is disabled; skipping split index");
            return;
        }
        let entries: Vec<IndexEntry> = splits
            .iter()
            .map(|s| IndexEntry::new(s.start, s.length))
            .collect();
        match split_index::save(sidecar, &entries) {
            Ok(()) => debug!(path = %sidecar.display(), records = entries.len(), "wrote split index"),
            Err(e) => warn!(path = %sidecar.display(), error = %e, "could not write split index"),
        }
    }

    /// Splits for several files, in order.
    ///
    /// # Errors
    ///
    /// Fails on the first file that cannot be read.
    pub fn splits_for_paths(&self, paths: &[PathBuf]) -> Result<Vec<FileSplit>> {
        let mut all = Vec::new();
        for path in paths {
            all.extend(self.load_or_compute(path)?);
        }
        Ok(all)
    }

    /// First document boundary at or after byte `offset`.
    ///
    /// Used when the scheduler hands out plain byte ranges. The walk starts from
    /// the nearest known split start before `offset`, so it only scans within one
    /// split. Returns the file length when no document starts at or after `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] for a non-zero offset into a compressed
    /// file, and scan errors from [`Self::compute_splits`].
    pub fn starting_position(&self, path: &Path, offset: u64) -> Result<u64> {
        if offset == 0 {
            return Ok(0);
        }
        if is_compressed(path) {
            return Err(SplitError::invalid_config(
                path.display().to_string(),
                "compressed inputs have no byte-addressable document boundaries",
            ));
        }
        let splits = if self.read_splits {
            self.load_or_compute(path)?
        } else {
            self.compute_splits(path, self.split_size)?
        };
        let seek_from = splits
            .iter()
            .map(|s| s.start)
            .filter(|start| *start <= offset)
            .max()
            .unwrap_or(0);

        let mut file = open(path)?;
        file.seek(SeekFrom::Start(seek_from))?;
        let mut scanner = BsonScanner::at(BufReader::new(file), seek_from);
        let mut pos = seek_from;
        while pos < offset {
            match scanner.next_boundary()? {
                Some((start, len)) => pos = start + u64::from(len),
                None => return file_len(path),
            }
        }
        Ok(pos)
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| SplitError::SourceUnreadable {
        path: path.to_path_buf(),
        source,
    })
}

fn file_len(path: &Path) -> Result<u64> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|source| SplitError::SourceUnreadable {
            path: path.to_path_buf(),
            source,
        })
}

fn is_newer(source: &Path, sidecar: &Path) -> bool {
    let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified()).ok();
    matches!((modified(source), modified(sidecar)), (Some(s), Some(i)) if s > i)
}
