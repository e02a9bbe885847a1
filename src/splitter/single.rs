//! One split over the whole collection: the universal fallback.

use crate::error::Result;
use crate::split::SplitDescriptor;
use crate::splitter::{log_split, SplitContext};

/// A single unbounded descriptor carrying the full configured query.
///
/// # Errors
///
/// Returns [`crate::SplitError::InvalidConfig`] if the query, projection or sort
/// does not parse.
pub fn calculate(ctx: &SplitContext<'_>) -> Result<Vec<SplitDescriptor>> {
    let split = ctx.base_descriptor(&ctx.conf.input_key())?;
    log_split(&split);
    Ok(vec![split])
}
