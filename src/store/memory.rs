//! In-memory [`DocumentStore`] for tests and local runs.
//!
//! `InMemoryStore` keeps every namespace in a shared `Arc<Mutex<..>>`, so clones
//! handed out by [`StoreConnector::connect`] observe the same data. It models the
//! parts of a deployment that split planning touches: filters, sort, skip, limit,
//! projection, index bounds, shard routing, `$sample`, `splitVector`, collection
//! statistics, shard/chunk metadata and server capabilities.
//!
//! Fault injection: [`InMemoryStore::set_unreachable`] makes every call fail with
//! a transient [`StoreErrorKind::Network`] error.

use crate::store::order::{compare, type_rank, values_equal};
use crate::store::traits::{
    lookup, ChunkInfo, CollectionStats, DocumentStore, FindRequest, Namespace, ServerInfo,
    ShardInfo, StoreConnector, StoreError, StoreErrorKind, StoreResult,
};
use crate::store::uri::StoreUri;
use bson::{Bson, Document};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

const MIB: u64 = 1024 * 1024;

// ============================================================================
// Seeded PRNG for $sample
// ============================================================================

struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    #[inline]
    const fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform index in `0..bound`.
    #[allow(clippy::cast_possible_truncation)]
    fn below(&mut self, bound: usize) -> usize {
        (self.next_u64() % bound as u64) as usize
    }
}

// ============================================================================
// State
// ============================================================================

struct State {
    collections: HashMap<Namespace, Vec<Document>>,
    sharded: HashSet<Namespace>,
    shards: Vec<ShardInfo>,
    chunks: HashMap<Namespace, Vec<ChunkInfo>>,
    avg_obj_size: HashMap<Namespace, u64>,
    version: (u32, u32, u32),
    is_router: bool,
    split_vector_supported: bool,
    unreachable: bool,
    seed: u64,
    connections: Vec<StoreUri>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            collections: HashMap::new(),
            sharded: HashSet::new(),
            shards: Vec::new(),
            chunks: HashMap::new(),
            avg_obj_size: HashMap::new(),
            version: (4, 4, 0),
            is_router: false,
            split_vector_supported: true,
            unreachable: false,
            seed: 0x5EED,
            connections: Vec::new(),
        }
    }
}

/// Shared in-memory deployment.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock only means a test panicked mid-call; the data is still usable.
    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Append documents to `ns`, creating it if needed.
    pub fn insert_many(&self, ns: &Namespace, docs: impl IntoIterator<Item = Document>) {
        self.state()
            .collections
            .entry(ns.clone())
            .or_default()
            .extend(docs);
    }

    /// Documents currently stored in `ns`.
    #[must_use]
    pub fn documents(&self, ns: &Namespace) -> Vec<Document> {
        self.state().collections.get(ns).cloned().unwrap_or_default()
    }

    pub fn set_version(&self, major: u32, minor: u32, patch: u32) {
        self.state().version = (major, minor, patch);
    }

    /// Pretend to be a query router (mongos).
    pub fn set_router(&self, is_router: bool) {
        self.state().is_router = is_router;
    }

    pub fn set_split_vector_supported(&self, supported: bool) {
        self.state().split_vector_supported = supported;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    pub fn set_seed(&self, seed: u64) {
        self.state().seed = seed;
    }

    /// Report `size` as the average object size of `ns` instead of measuring it.
    pub fn set_avg_obj_size(&self, ns: &Namespace, size: u64) {
        self.state().avg_obj_size.insert(ns.clone(), size);
    }

    pub fn add_shard(&self, name: &str, host: &str) {
        self.state().shards.push(ShardInfo {
            name: name.to_string(),
            host: host.to_string(),
        });
    }

    /// Mark `ns` as sharded. Chunks are added separately.
    pub fn shard_collection(&self, ns: &Namespace) {
        self.state().sharded.insert(ns.clone());
    }

    pub fn add_chunk(&self, ns: &Namespace, shard: &str, min: Document, max: Document) {
        self.state()
            .chunks
            .entry(ns.clone())
            .or_default()
            .push(ChunkInfo {
                shard: shard.to_string(),
                min,
                max,
            });
    }

    /// Every URI passed to [`StoreConnector::connect`], in call order.
    #[must_use]
    pub fn connections(&self) -> Vec<StoreUri> {
        self.state().connections.clone()
    }

    fn check_reachable(state: &State) -> StoreResult<()> {
        if state.unreachable {
            return Err(StoreError::new(StoreErrorKind::Network, "connection refused"));
        }
        Ok(())
    }
}

// ============================================================================
// Query evaluation
// ============================================================================

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(v) => *v != 0,
        Bson::Int64(v) => *v != 0,
        Bson::Double(v) => *v != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

fn clause_list<'a>(op: &str, value: &'a Bson) -> StoreResult<Vec<&'a Document>> {
    match value {
        Bson::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| match item {
                Bson::Document(d) => Ok(d),
                _ => Err(StoreError::new(
                    StoreErrorKind::InvalidInput,
                    format!("{op} entries must be documents"),
                )),
            })
            .collect(),
        _ => Err(StoreError::new(
            StoreErrorKind::InvalidInput,
            format!("{op} must be a non-empty array"),
        )),
    }
}

/// True when `doc` satisfies `filter`.
///
/// # Errors
///
/// Returns [`StoreErrorKind::InvalidInput`] for unknown operators or malformed clauses.
pub fn matches(doc: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, cond) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clause_list(key, cond)? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" | "$nor" => {
                let mut any = false;
                for clause in clause_list(key, cond)? {
                    if matches(doc, clause)? {
                        any = true;
                        break;
                    }
                }
                if key == "$or" { any } else { !any }
            }
            op if op.starts_with('$') => {
                return Err(StoreError::new(
                    StoreErrorKind::InvalidInput,
                    format!("unsupported top-level operator {op}"),
                ));
            }
            field => field_matches(lookup(doc, field), cond)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn is_operator_doc(cond: &Bson) -> Option<&Document> {
    match cond {
        Bson::Document(d) if d.keys().next().is_some_and(|k| k.starts_with('$')) => Some(d),
        _ => None,
    }
}

fn equals(value: Option<&Bson>, target: &Bson) -> bool {
    match value {
        None => matches!(target, Bson::Null),
        Some(Bson::Array(items)) if !matches!(target, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, target))
        }
        Some(v) => values_equal(v, target),
    }
}

// Range operators only compare within one type bracket.
fn ordered(value: Option<&Bson>, target: &Bson, accept: fn(Ordering) -> bool) -> bool {
    match value {
        Some(v) if type_rank(v) == type_rank(target) => accept(compare(v, target)),
        _ => false,
    }
}

fn field_matches(value: Option<&Bson>, cond: &Bson) -> StoreResult<bool> {
    let Some(ops) = is_operator_doc(cond) else {
        return Ok(equals(value, cond));
    };
    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => equals(value, arg),
            "$ne" => !equals(value, arg),
            "$gt" => ordered(value, arg, Ordering::is_gt),
            "$gte" => ordered(value, arg, Ordering::is_ge),
            "$lt" => ordered(value, arg, Ordering::is_lt),
            "$lte" => ordered(value, arg, Ordering::is_le),
            "$in" | "$nin" => {
                let Bson::Array(options) = arg else {
                    return Err(StoreError::new(
                        StoreErrorKind::InvalidInput,
                        format!("{op} needs an array"),
                    ));
                };
                let found = options.iter().any(|o| equals(value, o));
                if op == "$in" { found } else { !found }
            }
            "$exists" => value.is_some() == truthy(arg),
            "$not" => {
                if is_operator_doc(arg).is_none() {
                    return Err(StoreError::new(
                        StoreErrorKind::InvalidInput,
                        "$not needs an operator document",
                    ));
                }
                !field_matches(value, arg)?
            }
            other => {
                return Err(StoreError::new(
                    StoreErrorKind::InvalidInput,
                    format!("unsupported operator {other}"),
                ));
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Compare the key fields of `doc` against an index bound document.
fn compare_to_bound(doc: &Document, bound: &Document) -> Ordering {
    for (field, bound_value) in bound {
        let c = compare(lookup(doc, field).unwrap_or(&Bson::Null), bound_value);
        if c != Ordering::Equal {
            return c;
        }
    }
    Ordering::Equal
}

fn sort_documents(docs: &mut [Document], sort: &Document) {
    docs.sort_by(|a, b| {
        for (field, dir) in sort {
            let c = compare(
                lookup(a, field).unwrap_or(&Bson::Null),
                lookup(b, field).unwrap_or(&Bson::Null),
            );
            let c = if matches!(dir, Bson::Int32(d) if *d < 0)
                || matches!(dir, Bson::Int64(d) if *d < 0)
                || matches!(dir, Bson::Double(d) if *d < 0.0)
            {
                c.reverse()
            } else {
                c
            };
            if c != Ordering::Equal {
                return c;
            }
        }
        Ordering::Equal
    });
}

fn project(doc: &Document, projection: &Document) -> Document {
    let inclusive = projection
        .iter()
        .any(|(k, v)| k != "_id" && truthy(v));
    if inclusive {
        let mut out = Document::new();
        let keep_id = projection.get("_id").is_none_or(truthy);
        if keep_id {
            if let Some(id) = doc.get("_id") {
                out.insert("_id", id.clone());
            }
        }
        for (field, v) in projection {
            if field == "_id" || !truthy(v) {
                continue;
            }
            let top = field.split('.').next().unwrap_or(field);
            if let Some(value) = doc.get(top) {
                out.insert(top, value.clone());
            }
        }
        out
    } else {
        let mut out = doc.clone();
        for (field, v) in projection {
            if !truthy(v) {
                out.remove(field);
            }
        }
        out
    }
}

fn encoded_size(doc: &Document) -> StoreResult<u64> {
    bson::to_vec(doc)
        .map(|bytes| bytes.len() as u64)
        .map_err(|e| StoreError::new(StoreErrorKind::Other, e.to_string()))
}

impl State {
    fn collection(&self, ns: &Namespace) -> &[Document] {
        self.collections.get(ns).map_or(&[], Vec::as_slice)
    }

    // Documents outside every chunk belong to the first (primary) shard.
    fn owner<'a>(&'a self, ns: &Namespace, doc: &Document) -> Option<&'a str> {
        let chunks = self.chunks.get(ns)?;
        chunks
            .iter()
            .find(|c| {
                compare_to_bound(doc, &c.min) != Ordering::Less
                    && compare_to_bound(doc, &c.max) == Ordering::Less
            })
            .map(|c| c.shard.as_str())
            .or_else(|| self.shards.first().map(|s| s.name.as_str()))
    }

    fn avg_size(&self, ns: &Namespace) -> StoreResult<u64> {
        if let Some(size) = self.avg_obj_size.get(ns) {
            return Ok(*size);
        }
        let docs = self.collection(ns);
        if docs.is_empty() {
            return Ok(0);
        }
        let mut total = 0;
        for doc in docs {
            total += encoded_size(doc)?;
        }
        Ok(total / docs.len() as u64)
    }
}

// ============================================================================
// DocumentStore / StoreConnector
// ============================================================================

impl DocumentStore for InMemoryStore {
    fn server_info(&self) -> StoreResult<ServerInfo> {
        let state = self.state();
        Self::check_reachable(&state)?;
        Ok(ServerInfo {
            version: state.version,
            is_router: state.is_router,
        })
    }

    fn collection_stats(&self, ns: &Namespace) -> StoreResult<CollectionStats> {
        let state = self.state();
        Self::check_reachable(&state)?;
        Ok(CollectionStats {
            sharded: state.sharded.contains(ns),
            count: state.collection(ns).len() as u64,
            avg_obj_size: state.avg_size(ns)?,
        })
    }

    fn list_shards(&self) -> StoreResult<Vec<ShardInfo>> {
        let state = self.state();
        Self::check_reachable(&state)?;
        if state.shards.is_empty() {
            return Err(StoreError::new(
                StoreErrorKind::Unsupported,
                "not running with sharding enabled",
            ));
        }
        Ok(state.shards.clone())
    }

    fn list_chunks(&self, ns: &Namespace) -> StoreResult<Vec<ChunkInfo>> {
        let state = self.state();
        Self::check_reachable(&state)?;
        if state.shards.is_empty() {
            return Err(StoreError::new(
                StoreErrorKind::Unsupported,
                "not running with sharding enabled",
            ));
        }
        Ok(state.chunks.get(ns).cloned().unwrap_or_default())
    }

    fn find(&self, ns: &Namespace, request: &FindRequest) -> StoreResult<Vec<Document>> {
        let state = self.state();
        Self::check_reachable(&state)?;

        let mut hits = Vec::new();
        for doc in state.collection(ns) {
            if let Some(min) = &request.min {
                if compare_to_bound(doc, min) == Ordering::Less {
                    continue;
                }
            }
            if let Some(max) = &request.max {
                if compare_to_bound(doc, max) != Ordering::Less {
                    continue;
                }
            }
            if let Some(shard) = &request.shard {
                if state.owner(ns, doc).is_some_and(|owner| owner != shard) {
                    continue;
                }
            }
            if matches(doc, &request.filter)? {
                hits.push(doc.clone());
            }
        }
        drop(state);

        if let Some(sort) = &request.sort {
            sort_documents(&mut hits, sort);
        }
        let skip = usize::try_from(request.skip).unwrap_or(usize::MAX);
        let limit = request
            .limit
            .filter(|l| *l > 0)
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));

        Ok(hits
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|d| match &request.projection {
                Some(p) => project(&d, p),
                None => d,
            })
            .collect())
    }

    fn count(&self, ns: &Namespace, filter: &Document) -> StoreResult<u64> {
        let state = self.state();
        Self::check_reachable(&state)?;
        let mut n = 0;
        for doc in state.collection(ns) {
            if matches(doc, filter)? {
                n += 1;
            }
        }
        Ok(n)
    }

    fn sample(&self, ns: &Namespace, size: u64, key: &Document) -> StoreResult<Vec<Document>> {
        let state = self.state();
        Self::check_reachable(&state)?;
        if state.version < (3, 2, 0) {
            return Err(StoreError::new(
                StoreErrorKind::Unsupported,
                "unrecognized pipeline stage name: '$sample'",
            ));
        }

        // Partial Fisher-Yates: distinct documents, like $sample on a small request.
        let docs = state.collection(ns);
        let mut order: Vec<usize> = (0..docs.len()).collect();
        let take = usize::try_from(size).unwrap_or(usize::MAX).min(order.len());
        let mut rng = SplitMix64::new(state.seed);
        for i in 0..take {
            let j = i + rng.below(order.len() - i);
            order.swap(i, j);
        }

        let mut projection = key.clone();
        projection.insert("_id", Bson::Int32(i32::from(key.contains_key("_id"))));
        let mut picked: Vec<Document> = order[..take]
            .iter()
            .map(|&i| project(&docs[i], &projection))
            .collect();
        drop(state);
        sort_documents(&mut picked, key);
        Ok(picked)
    }

    fn split_vector(
        &self,
        ns: &Namespace,
        key_pattern: &Document,
        max_chunk_size_mb: u64,
    ) -> StoreResult<Vec<Document>> {
        let state = self.state();
        Self::check_reachable(&state)?;
        if state.is_router || !state.split_vector_supported {
            return Err(StoreError::new(
                StoreErrorKind::Unsupported,
                "no such command: 'splitVector'",
            ));
        }
        if max_chunk_size_mb == 0 {
            return Err(StoreError::new(
                StoreErrorKind::InvalidInput,
                "maxChunkSize must be positive",
            ));
        }

        let avg = state.avg_size(ns)?.max(1);
        let mut docs = state.collection(ns).to_vec();
        drop(state);
        sort_documents(&mut docs, key_pattern);

        let limit = max_chunk_size_mb.saturating_mul(MIB);
        let mut points = Vec::new();
        let mut acc = 0;
        let mut last: Option<Document> = None;
        for doc in &docs {
            let mut point = Document::new();
            for field in key_pattern.keys() {
                point.insert(field.clone(), lookup(doc, field).cloned().unwrap_or(Bson::Null));
            }
            if acc >= limit && last.as_ref() != Some(&point) {
                points.push(point.clone());
                acc = 0;
            }
            acc += avg;
            last = Some(point);
        }
        Ok(points)
    }
}

impl StoreConnector for InMemoryStore {
    fn connect(&self, uri: &StoreUri) -> StoreResult<Arc<dyn DocumentStore>> {
        let mut state = self.state();
        Self::check_reachable(&state)?;
        state.connections.push(uri.clone());
        drop(state);
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn numbered(n: i32) -> (InMemoryStore, Namespace) {
        let store = InMemoryStore::new();
        let ns = Namespace::new("test", "nums");
        store.insert_many(&ns, (0..n).map(|i| doc! { "_id": i, "even": i % 2 == 0 }));
        (store, ns)
    }

    #[test]
    fn filters_combine_operators() {
        let (store, ns) = numbered(100);
        let filter = doc! { "$and": [ { "_id": { "$gte": 10_i64 } }, { "_id": { "$lt": 20.0 } } ], "even": true };
        assert_eq!(store.count(&ns, &filter).unwrap(), 5);
        let filter = doc! { "$or": [ { "_id": { "$lt": 5 } }, { "_id": { "$gte": 95 } } ] };
        assert_eq!(store.count(&ns, &filter).unwrap(), 10);
        let filter = doc! { "_id": { "$in": [1, 2, 300] } };
        assert_eq!(store.count(&ns, &filter).unwrap(), 2);
    }

    #[test]
    fn not_takes_other_types_and_missing_keys() {
        let (store, ns) = numbered(10);
        store.insert_many(&ns, [doc! { "_id": "x" }, doc! { "_id": 99, "even": "odd" }]);
        let below = doc! { "_id": { "$not": { "$gte": 4 } } };
        assert_eq!(store.count(&ns, &below).unwrap(), 5);
        let no_flag = doc! { "even": { "$not": { "$eq": true } } };
        assert_eq!(store.count(&ns, &no_flag).unwrap(), 7);
        let bad = doc! { "_id": { "$not": 4 } };
        assert_eq!(store.count(&ns, &bad).unwrap_err().kind, StoreErrorKind::InvalidInput);
    }

    #[test]
    fn find_honours_sort_skip_limit() {
        let (store, ns) = numbered(50);
        let req = FindRequest::new(Document::new())
            .sort(doc! { "_id": -1 })
            .skip(3)
            .limit(2);
        let got = store.find(&ns, &req).unwrap();
        let ids: Vec<i32> = got.iter().map(|d| d.get_i32("_id").unwrap()).collect();
        assert_eq!(ids, vec![46, 45]);
    }

    #[test]
    fn index_bounds_are_half_open() {
        let (store, ns) = numbered(50);
        let mut req = FindRequest::new(Document::new());
        req.min = Some(doc! { "_id": 10 });
        req.max = Some(doc! { "_id": 20 });
        assert_eq!(store.find(&ns, &req).unwrap().len(), 10);
    }

    #[test]
    fn sample_is_seeded_and_distinct() {
        let (store, ns) = numbered(1000);
        let a = store.sample(&ns, 50, &doc! { "_id": 1 }).unwrap();
        let b = store.sample(&ns, 50, &doc! { "_id": 1 }).unwrap();
        assert_eq!(a, b);
        let mut ids: Vec<i32> = a.iter().map(|d| d.get_i32("_id").unwrap()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn sample_needs_a_modern_server() {
        let (store, ns) = numbered(10);
        store.set_version(3, 0, 12);
        let err = store.sample(&ns, 2, &doc! { "_id": 1 }).unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::Unsupported);
    }

    #[test]
    fn unreachable_store_fails_transiently() {
        let (store, ns) = numbered(1);
        store.set_unreachable(true);
        assert!(store.collection_stats(&ns).unwrap_err().kind.is_transient());
    }

    #[test]
    fn shard_routing_uses_chunk_ownership() {
        let (store, ns) = numbered(10);
        store.add_shard("sh0", "rs0/a:27018");
        store.add_shard("sh1", "rs1/b:27018");
        store.add_chunk(&ns, "sh0", doc! { "_id": Bson::MinKey }, doc! { "_id": 4 });
        store.add_chunk(&ns, "sh1", doc! { "_id": 4 }, doc! { "_id": Bson::MaxKey });
        let mut req = FindRequest::new(Document::new());
        req.shard = Some("sh1".to_string());
        assert_eq!(store.find(&ns, &req).unwrap().len(), 6);
    }
}
