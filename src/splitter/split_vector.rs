//! Boundaries from the server's index split points.
//!
//! The store walks the split-key index and reports a point every
//! `split_size_mb` megabytes. `k` points give `k + 1` descriptors. No points
//! (a small collection) gives one unbounded split.
//!
//! Only a data-bearing server answers this; a router reports it unsupported,
//! and so does this strategy.

use crate::error::Result;
use crate::split::SplitDescriptor;
use crate::splitter::{bound_value, SplitContext};
use tracing::{info, warn};

/// # Errors
///
/// - [`crate::SplitError::Store`] when the server refuses the command.
/// - [`crate::SplitError::InvalidConfig`] for a compound key.
/// - [`crate::SplitError::SplitConfigConflict`] for a conflicting query in range-query mode.
pub fn calculate(ctx: &SplitContext<'_>) -> Result<Vec<SplitDescriptor>> {
    let mode = ctx.bounds_mode()?;
    let key = ctx.range_key(mode)?;
    let pattern = ctx.conf.split_key_pattern()?;
    let split_size_mb = ctx.conf.split_size_mb()?;

    info!(namespace = %ctx.namespace, key = %pattern, split_size_mb, "running split vector");
    let points = ctx.store.split_vector(&ctx.namespace, &pattern, split_size_mb)?;
    if points.is_empty() {
        warn!("no split points were calculated; using a single split. Lower mongo.input.split_size if this is undesirable");
    }

    let mut boundaries = Vec::with_capacity(points.len());
    for point in &points {
        if let Some(value) = bound_value(point, &key)? {
            boundaries.push(value);
        }
    }
    ctx.descriptors_from_boundaries(&key, mode, boundaries)
}
