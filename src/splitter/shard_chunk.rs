//! One descriptor per shard chunk.
//!
//! Bounds come straight from each chunk's `min`/`max`, with `MinKey`/`MaxKey`
//! turned into open ends. Descriptors are interleaved round-robin over the
//! shards so the first tasks a scheduler starts land on different shards.
//!
//! # Locality
//!
//! A descriptor's locations are the owning shard's hosts. When
//! `mongo.input.mongos_hosts` lists proxies that run on the same machines as the
//! shard's members (same host name, any port), those proxies replace the shard
//! hosts: workers can reach them even when internal shard addresses are not
//! routable from the compute cluster.
//!
//! # Routing
//!
//! - `read_from_shards`: the URI is rewritten to the owning shard's hosts.
//! - otherwise, with proxies configured: the matched proxy, or one picked
//!   round-robin by chunk position.
//! - otherwise the input URI is used as is.

use crate::config::keys;
use crate::error::{Result, SplitError};
use crate::split::{BoundsMode, SplitDescriptor};
use crate::splitter::{bound_value, check_range_conflict, log_split, SplitContext};
use crate::store::traits::{ChunkInfo, StoreError, StoreErrorKind};
use crate::store::uri::host_name;
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info};

/// # Errors
///
/// - [`SplitError::Store`] when a chunk names a shard missing from the shard list
///   and reads go to shards directly.
/// - [`SplitError::InvalidConfig`] for compound chunk bounds.
/// - [`SplitError::SplitConfigConflict`] for a conflicting query in range-query mode.
pub fn calculate(ctx: &SplitContext<'_>) -> Result<Vec<SplitDescriptor>> {
    let read_from_shards = ctx.conf.read_from_shards()?;
    let mongos = ctx.conf.mongos_hosts();
    let mode = ctx.bounds_mode()?;
    let query = ctx.conf.query()?;
    if !mongos.is_empty() {
        info!(proxies = mongos.len(), "spreading reads over configured proxies");
    }

    let mut per_shard: BTreeMap<&str, VecDeque<SplitDescriptor>> = BTreeMap::new();
    for (position, chunk) in ctx.topology.chunks.iter().enumerate() {
        let key = chunk_key(chunk)?;
        if mode == BoundsMode::RangeQuery {
            check_range_conflict(&query, &key)?;
        }
        let shard_hosts = ctx.topology.shard_hosts(&chunk.shard);
        if read_from_shards && shard_hosts.is_empty() {
            return Err(SplitError::Store(StoreError::new(
                StoreErrorKind::NotFound,
                format!("chunk owner '{}' is not in the shard list", chunk.shard),
            )));
        }

        let mut split = ctx
            .base_descriptor(&key)?
            .with_bounds(bound_value(&chunk.min, &key)?, bound_value(&chunk.max, &key)?);

        let proxies = matching_hosts(&mongos, shard_hosts);
        split.locations = if proxies.is_empty() {
            shard_hosts.to_vec()
        } else {
            proxies.clone()
        };
        split.input_uri = if read_from_shards {
            ctx.uri.with_hosts(shard_hosts)
        } else if let Some(proxy) = proxies.first() {
            ctx.uri.with_hosts(std::slice::from_ref(proxy))
        } else if !mongos.is_empty() {
            ctx.uri.with_hosts(std::slice::from_ref(&mongos[position % mongos.len()]))
        } else {
            ctx.uri.clone()
        };

        per_shard.entry(chunk.shard.as_str()).or_default().push_back(split);
    }

    let splits = interleave(per_shard);
    for split in &splits {
        log_split(split);
    }
    debug!(chunks = splits.len(), "created chunk splits");
    Ok(splits)
}

/// Field name of a chunk's shard key.
pub(crate) fn chunk_key(chunk: &ChunkInfo) -> Result<String> {
    let mut fields = chunk.min.keys();
    match (fields.next(), fields.next()) {
        (Some(field), None) => Ok(field.clone()),
        _ => Err(SplitError::invalid_config(
            keys::SPLIT_KEY_PATTERN,
            format!("chunk bound {} must have exactly one field", chunk.min),
        )),
    }
}

/// Entries of `candidates` whose host name matches one of `hosts`.
fn matching_hosts(candidates: &[String], hosts: &[String]) -> Vec<String> {
    candidates
        .iter()
        .filter(|c| hosts.iter().any(|h| host_name(h) == host_name(c)))
        .cloned()
        .collect()
}

/// Take one descriptor from each shard in turn until all are used.
fn interleave(mut per_shard: BTreeMap<&str, VecDeque<SplitDescriptor>>) -> Vec<SplitDescriptor> {
    let total = per_shard.values().map(VecDeque::len).sum();
    let mut out = Vec::with_capacity(total);
    while out.len() < total {
        for queue in per_shard.values_mut() {
            if let Some(split) = queue.pop_front() {
                out.push(split);
            }
        }
    }
    out
}
