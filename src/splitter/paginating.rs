//! Range-query pagination.
//!
//! Walks the collection in key order, asking each time for the key of the
//! document `split_min_docs` places past the current lower bound. That key is
//! the next boundary. The walk ends when fewer documents remain, so a collection
//! of `n` matching documents yields `ceil(n / split_min_docs)` splits, or one
//! when `n` is zero. The first split has no lower bound and the last has no upper
//! bound.
//!
//! Each probe is a `skip(min_docs).limit(1)` query, issued sequentially.
//!
//! Bounds always go into the filter, and the base query is ANDed with them. A
//! base query that constrains the split key itself is rejected.

use crate::config::keys;
use crate::error::{Result, SplitError};
use crate::split::{and_filters, single, BoundsMode, SplitDescriptor};
use crate::splitter::{log_split, SplitContext};
use crate::store::order::values_equal;
use crate::store::traits::{lookup, FindRequest};
use bson::{doc, Bson};

/// # Errors
///
/// - [`SplitError::InvalidConfig`] when range queries are disabled or the split
///   key is compound.
/// - [`SplitError::SplitConfigConflict`] when the query constrains the split key.
/// - [`SplitError::Store`] if a probe fails.
pub fn calculate(ctx: &SplitContext<'_>) -> Result<Vec<SplitDescriptor>> {
    if !ctx.conf.use_range_queries()? {
        return Err(SplitError::invalid_config(
            keys::USE_RANGE_QUERIES,
            "pagination requires range queries to be enabled",
        ));
    }
    let key = ctx.range_key(BoundsMode::RangeQuery)?;
    let min_docs = ctx.conf.split_min_docs()?;
    let query = ctx.conf.query()?;

    let mut base = ctx.base_descriptor(&key)?;
    base.bounds_mode = BoundsMode::RangeQuery;

    let mut splits = Vec::new();
    let mut lower: Option<Bson> = None;
    loop {
        let filter = match &lower {
            None => query.clone(),
            Some(min) => and_filters(&query, single(&key, doc! { "$gte": min.clone() })),
        };
        let mut probe = FindRequest::new(filter)
            .sort(single(&key, 1))
            .skip(min_docs)
            .limit(1);
        probe.projection = Some(single(&key, 1));

        let upper = ctx
            .store
            .find(&ctx.namespace, &probe)?
            .first()
            .and_then(|d| lookup(d, &key).cloned());

        if let (Some(l), Some(u)) = (&lower, &upper) {
            if values_equal(l, u) {
                return Err(SplitError::invalid_config(
                    keys::SPLIT_KEY_PATTERN,
                    format!("more than {min_docs} documents share the key value {u}; choose a more selective split key"),
                ));
            }
        }
        let split = base.clone().with_bounds(lower.take(), upper.clone());
        log_split(&split);
        splits.push(split);

        match upper {
            Some(next) => lower = Some(next),
            None => break,
        }
    }
    Ok(splits)
}
