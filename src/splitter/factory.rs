//! Strategy selection.
//!
//! [`select`] is a pure decision over the configuration and an already-inspected
//! [`Topology`]. In order:
//!
//! 1. `mongo.splitter.class` names a strategy: use it, whatever the topology.
//! 2. `create_input_splits=false`: single split.
//! 3. Sharded and `read_from_shards`: shard-chunk, or shard-range when
//!    `read_shard_chunks=false` or no chunk metadata was found.
//! 4. `$sample` available and `use_sampling`: sample.
//! 5. `use_range_queries`: paginating.
//! 6. Single split.

use crate::config::JobConf;
use crate::error::Result;
use crate::splitter::SplitterKind;
use crate::topology::Topology;
use tracing::debug;

/// # Errors
///
/// - [`crate::SplitError::UnknownSplitter`] for an unrecognized override.
/// - [`crate::SplitError::InvalidConfig`] for a malformed flag.
pub fn select(conf: &JobConf, topology: &Topology) -> Result<SplitterKind> {
    if let Some(name) = conf.splitter_name() {
        let kind = name.parse::<SplitterKind>()?;
        debug!(splitter = %kind, "using configured splitter");
        return Ok(kind);
    }
    if !conf.create_input_splits()? {
        debug!("input split creation disabled");
        return Ok(SplitterKind::Single);
    }
    if topology.sharded && conf.read_from_shards()? {
        if conf.read_shard_chunks()? && !topology.chunks.is_empty() {
            return Ok(SplitterKind::ShardChunk);
        }
        return Ok(SplitterKind::ShardRange);
    }
    if topology.supports_sample && conf.use_sampling()? {
        return Ok(SplitterKind::Sample);
    }
    if conf.use_range_queries()? {
        return Ok(SplitterKind::Paginating);
    }
    Ok(SplitterKind::Single)
}
