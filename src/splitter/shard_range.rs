//! One descriptor per shard.
//!
//! Coarser than [`super::shard_chunk`]: each shard is read in one piece, routed
//! to that shard and pointed at its hosts. The key range is the envelope of the
//! shard's chunks (lowest `min` to highest `max`). Because every cursor is
//! pinned to one shard, envelopes may overlap without reading a document twice.
//! A shard that owns no chunk of the collection gets an unbounded range.

use crate::error::Result;
use crate::split::{BoundsMode, SplitDescriptor};
use crate::splitter::shard_chunk::chunk_key;
use crate::splitter::{bound_value, check_range_conflict, log_split, SplitContext};
use crate::store::order::compare;
use crate::store::traits::ChunkInfo;
use bson::Bson;
use std::cmp::Ordering;
use tracing::debug;

/// # Errors
///
/// - [`crate::SplitError::InvalidConfig`] for compound chunk bounds.
/// - [`crate::SplitError::SplitConfigConflict`] for a conflicting query in
///   range-query mode.
pub fn calculate(ctx: &SplitContext<'_>) -> Result<Vec<SplitDescriptor>> {
    let mode = ctx.bounds_mode()?;
    let query = ctx.conf.query()?;

    let mut splits = Vec::with_capacity(ctx.topology.shards.len());
    for (shard, hosts) in &ctx.topology.shards {
        let owned: Vec<&ChunkInfo> = ctx
            .topology
            .chunks
            .iter()
            .filter(|c| &c.shard == shard)
            .collect();

        let mut split = match owned.first() {
            Some(first) => {
                let key = chunk_key(first)?;
                if mode == BoundsMode::RangeQuery {
                    check_range_conflict(&query, &key)?;
                }
                let (lower, upper) = envelope(&owned, &key)?;
                ctx.base_descriptor(&key)?.with_bounds(lower, upper)
            }
            None => {
                debug!(shard = %shard, "shard owns no chunks; reading it unbounded");
                ctx.base_descriptor(&ctx.conf.input_key())?
            }
        };
        split.shard = Some(shard.clone());
        split.input_uri = ctx.uri.with_hosts(hosts);
        split.locations.clone_from(hosts);
        log_split(&split);
        splits.push(split);
    }
    Ok(splits)
}

/// Lowest lower bound and highest upper bound over `chunks`. An open bound on
/// either side wins.
fn envelope(chunks: &[&ChunkInfo], key: &str) -> Result<(Option<Bson>, Option<Bson>)> {
    let mut lower: Option<Option<Bson>> = None;
    let mut upper: Option<Option<Bson>> = None;
    for chunk in chunks {
        let min = bound_value(&chunk.min, key)?;
        let max = bound_value(&chunk.max, key)?;
        lower = Some(match (lower, min) {
            (None, m) => m,
            (Some(None), _) | (_, None) => None,
            (Some(Some(cur)), Some(m)) => Some(if compare(&m, &cur) == Ordering::Less { m } else { cur }),
        });
        upper = Some(match (upper, max) {
            (None, m) => m,
            (Some(None), _) | (_, None) => None,
            (Some(Some(cur)), Some(m)) => Some(if compare(&m, &cur) == Ordering::Greater { m } else { cur }),
        });
    }
    Ok((lower.flatten(), upper.flatten()))
}
