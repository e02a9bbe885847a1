//! Split strategies for live collections.
//!
//! Each strategy is a variant of [`SplitterKind`] and a pure function from a
//! [`SplitContext`] (configuration, store handle, topology snapshot) to a list of
//! [`SplitDescriptor`]s. Every strategy upholds the same contract: within one
//! run, the descriptors' key ranges are contiguous and disjoint, and together
//! with the base query they match every document of the query exactly once.
//!
//! | Strategy      | Descriptors                                   | Module          |
//! |---------------|-----------------------------------------------|-----------------|
//! | `Single`      | one, unbounded                                | [`single`]      |
//! | `Paginating`  | one per `split_min_docs` documents            | [`paginating`]  |
//! | `Sample`      | boundaries from a `$sample` of the key        | [`sample`]      |
//! | `SplitVector` | boundaries from the `splitVector` command     | [`split_vector`]|
//! | `ShardChunk`  | one per chunk, with shard locality            | [`shard_chunk`] |
//! | `ShardRange`  | one per shard, routed to that shard           | [`shard_range`] |
//!
//! Which strategy runs is decided by [`factory::select`], and
//! [`plan_collection`] drives the whole planning step for one collection input.

pub mod factory;
pub mod paginating;
pub mod sample;
pub mod shard_chunk;
pub mod shard_range;
pub mod single;
pub mod split_vector;

use crate::config::JobConf;
use crate::error::{Result, SplitError};
use crate::split::{single as single_field, BoundsMode, SplitDescriptor};
use crate::store::order::{is_open_bound, type_rank};
use crate::store::traits::{DocumentStore, Namespace, StoreConnector};
use crate::store::uri::StoreUri;
use crate::topology::{self, Topology};
use bson::{Bson, Document};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// The closed set of collection strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SplitterKind {
    Single,
    Paginating,
    Sample,
    SplitVector,
    ShardChunk,
    ShardRange,
}

impl SplitterKind {
    pub const ALL: [Self; 6] = [
        Self::Single,
        Self::Paginating,
        Self::Sample,
        Self::SplitVector,
        Self::ShardChunk,
        Self::ShardRange,
    ];

    /// Canonical name, as accepted in `mongo.splitter.class`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Paginating => "paginating",
            Self::Sample => "sample",
            Self::SplitVector => "split-vector",
            Self::ShardChunk => "shard-chunk",
            Self::ShardRange => "shard-range",
        }
    }

    /// Run this strategy.
    ///
    /// # Errors
    ///
    /// Strategy-specific; see each module.
    pub fn calculate(self, ctx: &SplitContext<'_>) -> Result<Vec<SplitDescriptor>> {
        match self {
            Self::Single => single::calculate(ctx),
            Self::Paginating => paginating::calculate(ctx),
            Self::Sample => sample::calculate(ctx),
            Self::SplitVector => split_vector::calculate(ctx),
            Self::ShardChunk => shard_chunk::calculate(ctx),
            Self::ShardRange => shard_range::calculate(ctx),
        }
    }
}

impl fmt::Display for SplitterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SplitterKind {
    type Err = SplitError;

    /// Accepts the canonical names and the historical class names, ignoring case,
    /// `-`, `_` and a package prefix.
    fn from_str(s: &str) -> Result<Self> {
        let simple = s.rsplit('.').next().unwrap_or(s);
        let norm: String = simple
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        let kind = match norm.as_str() {
            "single" | "singlemongosplitter" => Self::Single,
            "paginating" | "mongopaginatingsplitter" => Self::Paginating,
            "sample" | "samplesplitter" => Self::Sample,
            "splitvector" | "standalone" | "standalonemongosplitter" => Self::SplitVector,
            "shardchunk" | "shardchunkmongosplitter" => Self::ShardChunk,
            "shardrange" | "shard" | "shardmongosplitter" => Self::ShardRange,
            _ => return Err(SplitError::UnknownSplitter(s.to_string())),
        };
        Ok(kind)
    }
}

/// Everything a strategy reads. Built once per collection input.
pub struct SplitContext<'a> {
    pub conf: &'a JobConf,
    pub uri: &'a StoreUri,
    pub namespace: Namespace,
    pub store: &'a dyn DocumentStore,
    pub topology: &'a Topology,
}

impl SplitContext<'_> {
    /// Bounds mode configured for bounded strategies.
    ///
    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] for a malformed flag.
    pub fn bounds_mode(&self) -> Result<BoundsMode> {
        Ok(if self.conf.use_range_queries()? {
            BoundsMode::RangeQuery
        } else {
            BoundsMode::IndexBounds
        })
    }

    /// An unbounded descriptor carrying the configured query, projection, sort,
    /// cursor flags and login URI.
    ///
    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] if any of those fail to parse.
    pub fn base_descriptor(&self, key_field: &str) -> Result<SplitDescriptor> {
        let mut d = SplitDescriptor::unbounded(self.uri.clone(), key_field, self.conf.query()?);
        d.fields = self.conf.fields()?;
        d.sort = self.conf.sort()?;
        d.no_timeout = self.conf.no_timeout()?;
        d.bounds_mode = self.bounds_mode()?;
        d.auth_uri = self.conf.auth_uri()?;
        Ok(d)
    }

    /// Boundary field for strategies that bound a single key, with the query
    /// checked for a conflicting clause on it when bounds go into the filter.
    ///
    /// # Errors
    ///
    /// [`SplitError::InvalidConfig`] for a compound key and
    /// [`SplitError::SplitConfigConflict`] when the query constrains the key.
    pub fn range_key(&self, mode: BoundsMode) -> Result<String> {
        let key = self.conf.split_key()?;
        if mode == BoundsMode::RangeQuery {
            check_range_conflict(&self.conf.query()?, &key)?;
        }
        Ok(key)
    }

    /// Turn sorted boundary values into contiguous descriptors with open ends.
    ///
    /// `k` boundaries give `k + 1` descriptors. Duplicates are dropped so no
    /// descriptor is empty by construction. In range-query mode only boundaries
    /// of the most common type bracket are kept: `$gte`/`$lt` across brackets
    /// match nothing, and the open first split already takes every key outside
    /// the bracket.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::base_descriptor`] errors.
    pub fn descriptors_from_boundaries(
        &self,
        key: &str,
        mode: BoundsMode,
        boundaries: Vec<Bson>,
    ) -> Result<Vec<SplitDescriptor>> {
        let mut base = self.base_descriptor(key)?;
        base.bounds_mode = mode;

        let bracket = dominant_bracket(&boundaries);
        let mut points: Vec<Bson> = Vec::with_capacity(boundaries.len());
        for b in boundaries {
            if mode == BoundsMode::RangeQuery && Some(type_rank(&b)) != bracket {
                debug!(boundary = %b, "dropping boundary outside the key's type bracket");
                continue;
            }
            if points.last() != Some(&b) {
                points.push(b);
            }
        }

        let mut lower: Option<Bson> = None;
        let mut out = Vec::with_capacity(points.len() + 1);
        for point in points {
            let d = base.clone().with_bounds(lower.take(), Some(point.clone()));
            log_split(&d);
            out.push(d);
            lower = Some(point);
        }
        let last = base.with_bounds(lower, None);
        log_split(&last);
        out.push(last);
        Ok(out)
    }
}

fn dominant_bracket(values: &[Bson]) -> Option<u8> {
    let mut counts = [0usize; 14];
    for v in values {
        counts[usize::from(type_rank(v))] += 1;
    }
    let (rank, n) = counts.iter().enumerate().max_by_key(|&(rank, n)| (*n, std::cmp::Reverse(rank)))?;
    (*n > 0).then_some(rank).and_then(|r| u8::try_from(r).ok())
}

pub(crate) fn log_split(d: &SplitDescriptor) {
    debug!(
        lower = ?d.lower,
        upper = ?d.upper,
        shard = d.shard.as_deref().unwrap_or("-"),
        uri = %d.input_uri,
        "created split"
    );
}

/// Value of a single-field bound document, with `MinKey`/`MaxKey` as open.
///
/// # Errors
///
/// Returns [`SplitError::InvalidConfig`] for a compound bound.
pub fn bound_value(bound: &Document, key_pattern: &str) -> Result<Option<Bson>> {
    let mut iter = bound.iter();
    match (iter.next(), iter.next()) {
        (Some((_, value)), None) => Ok(Some(value.clone()).filter(|v| !is_open_bound(v))),
        (None, _) => Ok(None),
        _ => Err(SplitError::invalid_config(
            key_pattern,
            format!("compound chunk bound {bound} cannot be used as a range"),
        )),
    }
}

/// Reject a query that already constrains `key`, at the top level or inside
/// `$and`/`$or`/`$nor`. Such a query would fight the range clauses.
///
/// # Errors
///
/// Returns [`SplitError::SplitConfigConflict`] naming the key.
pub fn check_range_conflict(query: &Document, key: &str) -> Result<()> {
    if query_mentions(query, key) {
        return Err(SplitError::SplitConfigConflict(format!(
            "range-query splitting on '{key}' conflicts with a query that constrains '{key}': {query}"
        )));
    }
    Ok(())
}

fn query_mentions(query: &Document, key: &str) -> bool {
    query.iter().any(|(field, value)| match field.as_str() {
        "$and" | "$or" | "$nor" => match value {
            Bson::Array(clauses) => clauses.iter().any(|c| match c {
                Bson::Document(d) => query_mentions(d, key),
                _ => false,
            }),
            _ => false,
        },
        f => f == key || f.starts_with(&format!("{key}.")),
    })
}

/// Drop descriptors whose cursor returns nothing. Probes with `limit 1`.
///
/// # Errors
///
/// Returns [`SplitError::Store`] if a probe fails.
pub fn filter_empty(
    store: &dyn DocumentStore,
    ns: &Namespace,
    splits: Vec<SplitDescriptor>,
) -> Result<Vec<SplitDescriptor>> {
    let before = splits.len();
    let mut kept = Vec::with_capacity(before);
    for split in splits {
        let mut probe = split.find_request();
        probe.limit = Some(1);
        probe.projection = Some(single_field("_id", 1));
        if store.find(ns, &probe)?.is_empty() {
            debug!(lower = ?split.lower, upper = ?split.upper, "dropping empty split");
        } else {
            kept.push(split);
        }
    }
    if kept.len() < before {
        info!(dropped = before - kept.len(), kept = kept.len(), "filtered empty splits");
    }
    Ok(kept)
}

/// Strategy chosen for a run, and what actually produced the splits.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionPlan {
    pub selected: SplitterKind,
    /// Differs from `selected` when sampling fell back.
    pub used: SplitterKind,
    pub topology: Topology,
    pub splits: Vec<SplitDescriptor>,
}

/// Plan one collection input end to end.
///
/// Connects through `connector`, inspects the topology, selects a strategy and
/// runs it. When sampling is unsupported, falls back to split-vector if the
/// server has it and to a single split otherwise. Applies
/// `mongo.input.split.filter_empty` last.
///
/// # Errors
///
/// Configuration errors, [`SplitError::TopologyUnavailable`], and store failures
/// from the strategy.
pub fn plan_collection(conf: &JobConf, connector: &dyn StoreConnector) -> Result<CollectionPlan> {
    let uri = conf.input_uri()?;
    let namespace = uri.namespace()?;
    let login = match conf.auth_uri()? {
        Some(auth) => uri.authenticated_by(&auth),
        None => uri.clone(),
    };
    let store = connector.connect(&login).map_err(|source| SplitError::TopologyUnavailable {
        namespace: namespace.to_string(),
        source,
    })?;
    let topology = topology::inspect(store.as_ref(), &namespace)?;
    let selected = factory::select(conf, &topology)?;
    info!(namespace = %namespace, splitter = %selected, "selected splitter");

    let ctx = SplitContext {
        conf,
        uri: &uri,
        namespace: namespace.clone(),
        store: store.as_ref(),
        topology: &topology,
    };

    let (used, splits) = match selected.calculate(&ctx) {
        Ok(splits) => (selected, splits),
        Err(e @ SplitError::SamplingUnsupported { .. }) => {
            let fallback = if topology.supports_split_vector {
                SplitterKind::SplitVector
            } else {
                SplitterKind::Single
            };
            warn!(error = %e, fallback = %fallback, "sampling unavailable; falling back");
            (fallback, fallback.calculate(&ctx)?)
        }
        Err(e) => return Err(e),
    };

    let splits = if conf.filter_empty()? {
        filter_empty(store.as_ref(), &namespace, splits)?
    } else {
        splits
    };
    info!(namespace = %namespace, splitter = %used, splits = splits.len(), "calculated splits");
    Ok(CollectionPlan {
        selected,
        used,
        topology,
        splits,
    })
}
