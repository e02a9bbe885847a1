//! Error types for split planning.
//!
//! The taxonomy has three tiers:
//! - **Recovered locally**: [`SplitError::TruncatedStream`], [`SplitError::NoSplitIndex`]
//!   and [`SplitError::SamplingUnsupported`]. Callers inside this crate catch these
//!   specifically and fall back (end-of-stream, rescan, simpler strategy).
//! - **Configuration errors**: surfaced to the job submitter before any work starts.
//! - **Fatal environment errors**: abort planning, no partial plan is produced.

use crate::store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = SplitError> = std::result::Result<T, E>;

/// Top-level error type for split planning.
#[derive(Error, Debug)]
pub enum SplitError {
    /// Fewer bytes remained than a header or a declared document body needs.
    #[error("truncated document stream at offset {offset}: needed {needed} bytes, {available} available")]
    TruncatedStream {
        offset: u64,
        needed: u64,
        available: u64,
    },

    /// The split index sidecar is absent, of an unknown version, or damaged.
    #[error("no usable split index at '{}': {reason}", path.display())]
    NoSplitIndex { path: PathBuf, reason: String },

    /// Strategy flags or queries that cannot be honored together.
    #[error("conflicting split configuration: {0}")]
    SplitConfigConflict(String),

    /// The server cannot run the random-sample operator.
    #[error("random sampling is not supported by the server for '{namespace}'")]
    SamplingUnsupported { namespace: String },

    /// Shard or collection metadata could not be fetched at all.
    #[error("collection topology unavailable for '{namespace}': {source}")]
    TopologyUnavailable {
        namespace: String,
        #[source]
        source: StoreError,
    },

    /// A configuration value could not be parsed.
    #[error("invalid configuration for '{key}': {reason}")]
    InvalidConfig { key: String, reason: String },

    /// A forced strategy name did not resolve to a strategy.
    #[error("unknown splitter '{0}'")]
    UnknownSplitter(String),

    /// The source file could not be opened or read at all.
    #[error("cannot read source '{}': {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A store query failed while calculating splits.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A document could not be decoded.
    #[error("malformed document at offset {offset}: {reason}")]
    MalformedDocument { offset: u64, reason: String },

    /// BSON (de)serialization failed outside of a scan.
    #[error("bson error: {0}")]
    Bson(String),

    /// I/O errors (sidecar writes, exports)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SplitError {
    /// Build an [`SplitError::InvalidConfig`] for `key`.
    pub fn invalid_config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Conditions the crate recovers from without surfacing them.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::TruncatedStream { .. } | Self::NoSplitIndex { .. } | Self::SamplingUnsupported { .. }
        )
    }

    /// Errors that belong to the job submitter, reported before any work starts.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::SplitConfigConflict(_) | Self::InvalidConfig { .. } | Self::UnknownSplitter(_)
        )
    }
}

impl From<bson::ser::Error> for SplitError {
    fn from(e: bson::ser::Error) -> Self {
        Self::Bson(e.to_string())
    }
}

impl From<bson::de::Error> for SplitError {
    fn from(e: bson::de::Error) -> Self {
        Self::Bson(e.to_string())
    }
}
