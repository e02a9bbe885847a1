//! Boundaries from a random sample of the split key.
//!
//! The collection statistics give the number of splits:
//!
//! ```text
//! docs_per_split = floor(split_size_mb * 1 MiB / avg_obj_size)
//! n              = ceil(count / docs_per_split)
//! ```
//!
//! When `n <= 1` the result is a single unbounded split. Otherwise the server is
//! asked for `n * samples_per_split` random documents projected to and sorted by
//! the key. Every `samples_per_split`-th sample after the first group becomes a
//! boundary, which gives `n - 1` boundaries and `n` splits. Oversampling keeps
//! the boundaries close to the true quantiles.

use crate::error::{Result, SplitError};
use crate::split::{single, SplitDescriptor};
use crate::splitter::{single as single_split, SplitContext};
use crate::store::traits::{lookup, StoreErrorKind};
use tracing::{debug, warn};

const MIB: u64 = 1024 * 1024;

/// # Errors
///
/// - [`SplitError::SamplingUnsupported`] when the server has no `$sample`.
/// - [`SplitError::InvalidConfig`] for a compound split key or bad sizes.
/// - [`SplitError::SplitConfigConflict`] for a conflicting query in range-query mode.
pub fn calculate(ctx: &SplitContext<'_>) -> Result<Vec<SplitDescriptor>> {
    let unsupported = || SplitError::SamplingUnsupported {
        namespace: ctx.namespace.to_string(),
    };
    if !ctx.topology.supports_sample {
        return Err(unsupported());
    }

    let mode = ctx.bounds_mode()?;
    let key = ctx.range_key(mode)?;
    let split_size_mb = ctx.conf.split_size_mb()?;
    let samples_per_split = ctx.conf.samples_per_split()?;

    let count = ctx.topology.count;
    let avg = ctx.topology.avg_obj_size;
    if count == 0 || avg == 0 {
        debug!(namespace = %ctx.namespace, "empty collection; one split");
        return single_split::calculate(ctx);
    }
    let docs_per_split = (split_size_mb.saturating_mul(MIB) / avg).max(1);
    let num_splits = count.div_ceil(docs_per_split);
    if num_splits <= 1 {
        warn!(
            count,
            docs_per_split,
            "not enough documents for more than one split; consider a lower mongo.input.split_size"
        );
        return single_split::calculate(ctx);
    }

    let total_samples = num_splits.saturating_mul(samples_per_split);
    let samples = ctx
        .store
        .sample(&ctx.namespace, total_samples, &single(&key, 1))
        .map_err(|e| {
            if e.kind == StoreErrorKind::Unsupported {
                unsupported()
            } else {
                SplitError::Store(e)
            }
        })?;
    debug!(requested = total_samples, received = samples.len(), "sampled split keys");

    let step = usize::try_from(samples_per_split).unwrap_or(usize::MAX);
    let boundaries = samples
        .iter()
        .skip(step)
        .step_by(step)
        .filter_map(|s| lookup(s, &key).cloned())
        .collect();
    ctx.descriptors_from_boundaries(&key, mode, boundaries)
}
