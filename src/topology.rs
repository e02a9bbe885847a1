//! Collection topology: a one-shot snapshot of what the deployment looks like.
//!
//! [`inspect`] gathers server capabilities, collection statistics and, for a
//! sharded collection, the shard and chunk layout. It is called once per
//! planning run and the result is never cached across runs.
//!
//! Missing shard metadata is not an error. A standalone server or replica set has
//! no config database, and the inspector reports such collections as unsharded.
//! Only connectivity failures abort with [`SplitError::TopologyUnavailable`].

use crate::error::{Result, SplitError};
use crate::store::traits::{
    ChunkInfo, CollectionStats, DocumentStore, Namespace, ServerInfo, StoreError, StoreErrorKind,
};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Shape of the deployment serving one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    pub namespace: Namespace,
    pub sharded: bool,
    /// Shard name to member hosts.
    pub shards: BTreeMap<String, Vec<String>>,
    /// Chunks of this collection, in config order.
    pub chunks: Vec<ChunkInfo>,
    pub server: ServerInfo,
    pub supports_sample: bool,
    pub supports_split_vector: bool,
    pub count: u64,
    pub avg_obj_size: u64,
}

impl Topology {
    /// An unsharded topology from already-known facts.
    #[must_use]
    pub fn standalone(namespace: Namespace, server: ServerInfo, stats: &CollectionStats) -> Self {
        Self {
            namespace,
            sharded: false,
            shards: BTreeMap::new(),
            chunks: Vec::new(),
            supports_sample: server.supports_sample(),
            supports_split_vector: !server.is_router,
            server,
            count: stats.count,
            avg_obj_size: stats.avg_obj_size,
        }
    }

    /// Hosts of `shard`, empty when the shard is unknown.
    #[must_use]
    pub fn shard_hosts(&self, shard: &str) -> &[String] {
        self.shards.get(shard).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub const fn estimated_size_bytes(&self) -> u64 {
        self.count.saturating_mul(self.avg_obj_size)
    }
}

fn unavailable(ns: &Namespace, source: StoreError) -> SplitError {
    SplitError::TopologyUnavailable {
        namespace: ns.to_string(),
        source,
    }
}

// Capability failures mean "no shard metadata here"; anything else is fatal.
fn is_absent_metadata(e: &StoreError) -> bool {
    matches!(
        e.kind,
        StoreErrorKind::Unsupported | StoreErrorKind::NotFound | StoreErrorKind::Unauthorized
    )
}

/// Snapshot the topology of `ns`.
///
/// # Errors
///
/// Returns [`SplitError::TopologyUnavailable`] when the server cannot be reached
/// or a metadata command fails for a reason other than missing shard metadata.
pub fn inspect(store: &dyn DocumentStore, ns: &Namespace) -> Result<Topology> {
    let server = store.server_info().map_err(|e| unavailable(ns, e))?;
    let stats = match store.collection_stats(ns) {
        Ok(stats) => stats,
        Err(e) if e.kind == StoreErrorKind::NotFound => {
            debug!(namespace = %ns, "collection not found; treating as empty");
            CollectionStats::default()
        }
        Err(e) => return Err(unavailable(ns, e)),
    };

    let mut topology = Topology::standalone(ns.clone(), server, &stats);
    if !stats.sharded {
        debug!(namespace = %ns, count = stats.count, "collection is not sharded");
        return Ok(topology);
    }

    let shards = match store.list_shards() {
        Ok(shards) => shards,
        Err(e) if is_absent_metadata(&e) => {
            warn!(namespace = %ns, error = %e, "no shard metadata; treating as unsharded");
            return Ok(topology);
        }
        Err(e) => return Err(unavailable(ns, e)),
    };
    let chunks = match store.list_chunks(ns) {
        Ok(chunks) => chunks,
        Err(e) if is_absent_metadata(&e) => {
            warn!(namespace = %ns, error = %e, "no chunk metadata; treating as unsharded");
            return Ok(topology);
        }
        Err(e) => return Err(unavailable(ns, e)),
    };

    topology.sharded = true;
    topology.shards = shards.iter().map(|s| (s.name.clone(), s.hosts())).collect();
    topology.chunks = chunks;
    debug!(
        namespace = %ns,
        shards = topology.shards.len(),
        chunks = topology.chunks.len(),
        "collection is sharded"
    );
    Ok(topology)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use bson::{doc, Bson};

    fn ns() -> Namespace {
        Namespace::new("db", "coll")
    }

    #[test]
    fn standalone_is_not_sharded() {
        let store = InMemoryStore::new();
        store.insert_many(&ns(), (0..10).map(|i| doc! { "_id": i }));
        let topo = inspect(&store, &ns()).unwrap();
        assert!(!topo.sharded);
        assert_eq!(topo.count, 10);
        assert!(topo.supports_sample);
        assert!(topo.supports_split_vector);
    }

    #[test]
    fn sharded_flag_without_config_metadata_degrades() {
        let store = InMemoryStore::new();
        store.shard_collection(&ns());
        let topo = inspect(&store, &ns()).unwrap();
        assert!(!topo.sharded);
    }

    #[test]
    fn sharded_collection_lists_hosts_and_chunks() {
        let store = InMemoryStore::new();
        store.set_router(true);
        store.add_shard("sh01", "rs1/a:27018,b:27018");
        store.shard_collection(&ns());
        store.add_chunk(&ns(), "sh01", doc! { "_id": Bson::MinKey }, doc! { "_id": Bson::MaxKey });
        let topo = inspect(&store, &ns()).unwrap();
        assert!(topo.sharded);
        assert_eq!(topo.shard_hosts("sh01"), ["a:27018", "b:27018"]);
        assert_eq!(topo.chunks.len(), 1);
        assert!(!topo.supports_split_vector);
    }

    #[test]
    fn unreachable_is_fatal() {
        let store = InMemoryStore::new();
        store.set_unreachable(true);
        let err = inspect(&store, &ns()).unwrap_err();
        assert!(matches!(err, SplitError::TopologyUnavailable { .. }));
    }

    #[test]
    fn old_servers_cannot_sample() {
        let store = InMemoryStore::new();
        store.set_version(3, 0, 4);
        assert!(!inspect(&store, &ns()).unwrap().supports_sample);
    }
}
