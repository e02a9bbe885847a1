//! # docsplit
//!
//! Split planning for batch jobs that read a document database or BSON dump
//! files. A planner cuts one input into independent slices so a scheduler can
//! hand each slice to its own worker, with locality hints where the data lives.
//!
//! ## Key Features
//!
//! - **Six collection strategies** - single, paginating, sample, split-vector,
//!   shard-chunk and shard-range, picked from the deployment's topology
//! - **Dump file splitting** - document-aligned byte ranges, cached in a sidecar
//!   index so a file is scanned once
//! - **Shard locality** - chunk splits name the hosts that hold their data, with
//!   proxy remapping for clusters whose shard addresses are not routable
//! - **Multiple inputs** - collections and dump files planned together into one
//!   tagged list
//! - **Compressed dumps** - gzip, zstd, bzip2 and xz, each behind a feature flag
//!
//! ## Quick Start
//!
//! ```
//! use docsplit::config::{keys, JobConf};
//! use docsplit::splitter::{plan_collection, SplitterKind};
//! use docsplit::store::{InMemoryStore, Namespace};
//! use docsplit::testing::{assert_partition_covers, seed_sequential};
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let store = InMemoryStore::new();
//! let ns = Namespace::new("shop", "orders");
//! seed_sequential(&store, &ns, 5000);
//!
//! let conf = JobConf::new()
//!     .with(keys::INPUT_URI, "mongodb://localhost:27017/shop.orders")
//!     .with(keys::USE_SAMPLING, "false")
//!     .with(keys::USE_RANGE_QUERIES, "true");
//!
//! let plan = plan_collection(&conf, &store)?;
//! assert_eq!(plan.used, SplitterKind::Paginating);
//! assert_eq!(plan.splits.len(), 5);
//! assert_partition_covers(&store, &ns, &Default::default(), &plan.splits);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Split descriptors
//!
//! A [`SplitDescriptor`] is a half-open key range `[lower, upper)` plus the base
//! query, projection, sort and target URI a worker needs to open its cursor. It
//! is pure data: planning never opens cursors, and [`reader::CollectionReader`]
//! builds the cursor from it once, on the worker. Within one plan the ranges are
//! contiguous and disjoint, so the descriptors together read each matching
//! document exactly once.
//!
//! A [`FileSplit`] is the dump-file counterpart: a byte range that starts on a
//! document boundary.
//!
//! ### Topology
//!
//! [`topology::inspect`] takes a fresh snapshot of the deployment for each run:
//! sharding, shard hosts, chunks, document count and size, and which commands the
//! server supports. A server without shard metadata is simply unsharded.
//!
//! ### Strategy selection
//!
//! [`splitter::factory::select`] is a pure function of configuration and
//! topology. A named override always wins; otherwise sharded collections read
//! from shards directly use chunk or shard splits, servers with `$sample` use
//! sampling, and range-query pagination or a single split are the remaining
//! choices. When sampling turns out to be unavailable,
//! [`splitter::plan_collection`] falls back to split-vector or a single split.
//!
//! ### The store
//!
//! Planning talks to the database only through the [`store::DocumentStore`] and
//! [`store::StoreConnector`] traits. [`store::InMemoryStore`] implements both for
//! tests and local runs.
//!
//! ## Feature Flags
//!
//! - `parallel-io` (default) - [`export`] writes parts in parallel
//! - `compression-gzip`, `compression-zstd`, `compression-bzip2`,
//!   `compression-xz` (default) - codecs for compressed dumps
//!
//! ## Module Overview
//!
//! - [`config`] - job configuration keys and typed access
//! - [`error`] - the error taxonomy
//! - [`export`] - dump files cut into standalone parts
//! - [`file_splitter`] - splits for dump files
//! - [`io`] - document scanner, split index sidecar, compression, globbing
//! - [`multi`] - several inputs in one tagged plan
//! - [`reader`] - worker-side readers for both kinds of split
//! - [`split`] - descriptor types
//! - [`splitter`] - collection strategies, selection and planning
//! - [`store`] - the store traits, URI handling and the in-memory store
//! - [`testing`] - fixtures and plan assertions
//! - [`topology`] - deployment snapshots

pub mod config;
pub mod error;
pub mod export;
pub mod file_splitter;
pub mod io;
pub mod multi;
pub mod reader;
pub mod split;
pub mod splitter;
pub mod store;
pub mod testing;
pub mod topology;

pub use config::JobConf;
pub use error::{Result, SplitError};
pub use file_splitter::BsonFileSplitter;
pub use multi::{aggregate, inputs_from_conf, plan_job, InputSource, InputTag, TaggedSplit};
pub use reader::{BsonFileReader, CollectionReader};
pub use split::{BoundsMode, FileSplit, InputSplit, SplitDescriptor};
pub use splitter::{plan_collection, CollectionPlan, SplitContext, SplitterKind};
pub use topology::Topology;
