//! Core traits for the backing document store.
//!
//! These traits are the driver collaborator seen by the split planner. They are
//! synchronous: planning is a single blocking phase, so implementations that wrap
//! an async driver are expected to block internally.

use crate::store::uri::StoreUri;
use bson::{Bson, Document};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Core Error Type
// ============================================================================

/// Error reported by a [`DocumentStore`].
#[derive(Debug, Clone)]
pub struct StoreError {
    pub message: String,
    pub kind: StoreErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The server does not implement the command (e.g. shard metadata on a standalone).
    Unsupported,
    /// Namespace or metadata collection missing.
    NotFound,
    Unauthorized,
    Network,
    Timeout,
    ServiceUnavailable,
    /// The server ran the command and reported failure.
    CommandFailed,
    InvalidInput,
    Other,
}

impl StoreErrorKind {
    /// Connectivity failures, as opposed to capability or input failures.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::ServiceUnavailable)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for StoreError {}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// Metadata Types
// ============================================================================

/// `db.collection` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Collection statistics as reported by the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionStats {
    pub sharded: bool,
    pub count: u64,
    /// Average document size in bytes. Zero for an empty collection.
    pub avg_obj_size: u64,
}

impl CollectionStats {
    #[must_use]
    pub const fn estimated_size_bytes(&self) -> u64 {
        self.count.saturating_mul(self.avg_obj_size)
    }
}

/// Server identity and capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerInfo {
    pub version: (u32, u32, u32),
    /// True when talking to a query router rather than a data-bearing node.
    pub is_router: bool,
}

impl ServerInfo {
    /// The random-sample aggregation stage arrived in 3.2.
    #[must_use]
    pub fn supports_sample(&self) -> bool {
        self.version >= (3, 2, 0)
    }
}

/// One shard as listed by the cluster config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardInfo {
    pub name: String,
    /// Raw host string, e.g. `rs0/host1:27018,host2:27018`.
    pub host: String,
}

impl ShardInfo {
    /// Member hosts with any replica-set prefix removed.
    #[must_use]
    pub fn hosts(&self) -> Vec<String> {
        let list = match self.host.find('/') {
            Some(idx) if idx > 0 => &self.host[idx + 1..],
            _ => self.host.as_str(),
        };
        list.split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// One chunk of a sharded collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkInfo {
    pub shard: String,
    pub min: Document,
    pub max: Document,
}

/// A find request, as a cursor would issue it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindRequest {
    pub filter: Document,
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    pub skip: u64,
    pub limit: Option<u64>,
    /// Inclusive index lower bound.
    pub min: Option<Document>,
    /// Exclusive index upper bound.
    pub max: Option<Document>,
    /// Route the read to a single shard.
    pub shard: Option<String>,
    pub no_timeout: bool,
}

impl FindRequest {
    pub fn new(filter: Document) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    #[must_use]
    pub const fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

// ============================================================================
// DocumentStore - the driver collaborator
// ============================================================================

/// Synchronous metadata and query operations on one deployment.
pub trait DocumentStore: Send + Sync {
    /// Server version and role.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached.
    fn server_info(&self) -> StoreResult<ServerInfo>;

    /// Count, average size and sharded flag for a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached or the command fails.
    fn collection_stats(&self, ns: &Namespace) -> StoreResult<CollectionStats>;

    /// All shards of the cluster.
    ///
    /// # Errors
    ///
    /// Returns [`StoreErrorKind::Unsupported`] or [`StoreErrorKind::NotFound`] on a
    /// deployment without shard metadata, and a transient kind when unreachable.
    fn list_shards(&self) -> StoreResult<Vec<ShardInfo>>;

    /// Chunks of one collection, in config order.
    ///
    /// # Errors
    ///
    /// Same contract as [`DocumentStore::list_shards`].
    fn list_chunks(&self, ns: &Namespace) -> StoreResult<Vec<ChunkInfo>>;

    /// Run a find and materialize the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the query is invalid or the server cannot be reached.
    fn find(&self, ns: &Namespace, request: &FindRequest) -> StoreResult<Vec<Document>>;

    /// Exact count of documents matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query is invalid or the server cannot be reached.
    fn count(&self, ns: &Namespace, filter: &Document) -> StoreResult<u64>;

    /// `$sample` of `size` documents, projected to and sorted by `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreErrorKind::Unsupported`] on servers without the operator.
    fn sample(&self, ns: &Namespace, size: u64, key: &Document) -> StoreResult<Vec<Document>>;

    /// Index split points for chunks of at most `max_chunk_size_mb`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreErrorKind::Unsupported`] where the command is unavailable.
    fn split_vector(
        &self,
        ns: &Namespace,
        key_pattern: &Document,
        max_chunk_size_mb: u64,
    ) -> StoreResult<Vec<Document>>;
}

/// Opens store handles for URIs. Passed explicitly into planning and readers.
pub trait StoreConnector: Send + Sync {
    /// Connect to the deployment named by `uri`.
    ///
    /// # Errors
    ///
    /// Returns a transient error kind if the deployment is unreachable.
    fn connect(&self, uri: &StoreUri) -> StoreResult<Arc<dyn DocumentStore>>;
}

/// Value of `field` in `doc`, following dotted paths.
#[must_use]
pub fn lookup<'a>(doc: &'a Document, field: &str) -> Option<&'a Bson> {
    let mut parts = field.split('.');
    let first = parts.next()?;
    let mut cur = doc.get(first)?;
    for part in parts {
        cur = match cur {
            Bson::Document(d) => d.get(part)?,
            _ => return None,
        };
    }
    Some(cur)
}
