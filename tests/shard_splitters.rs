//! Integration tests for the sharded strategies: chunk splits, shard splits,
//! locality and URI routing.

use bson::{doc, Bson, Document};
use docsplit::config::{keys, JobConf};
use docsplit::splitter::{factory, plan_collection, SplitContext, SplitterKind};
use docsplit::store::{InMemoryStore, Namespace};
use docsplit::testing::*;
use docsplit::topology;
use docsplit::{SplitDescriptor, SplitError};

fn ns() -> Namespace {
    Namespace::new("hadoop", "test")
}

fn run(kind: SplitterKind, conf: &JobConf, store: &InMemoryStore) -> docsplit::Result<Vec<SplitDescriptor>> {
    let uri = conf.input_uri()?;
    let namespace = uri.namespace()?;
    let topology = topology::inspect(store, &namespace)?;
    let ctx = SplitContext {
        conf,
        uri: &uri,
        namespace,
        store,
        topology: &topology,
    };
    kind.calculate(&ctx)
}

fn hosts(list: &[&str]) -> Vec<String> {
    list.iter().map(|h| (*h).to_string()).collect()
}

/// Two shards in two data centres, split on `i` at 500, behind routers that
/// share machines with some shard members.
fn multi_dc_cluster() -> InMemoryStore {
    let store = InMemoryStore::new();
    store.set_router(true);
    store.add_shard("sh01", "sh01/mongo.sh01.dc1:27017,mongo.sh01.dc2:27017");
    store.add_shard("sh02", "sh02/mongo.sh02.dc1:27027,mongo.sh02.dc2:27027");
    store.shard_collection(&ns());
    store.add_chunk(&ns(), "sh01", doc! { "i": Bson::MinKey }, doc! { "i": 500 });
    store.add_chunk(&ns(), "sh02", doc! { "i": 500 }, doc! { "i": Bson::MaxKey });
    store.insert_many(&ns(), (0..1000).map(|i| doc! { "_id": i, "i": i }));
    store
}

fn multi_dc_conf() -> JobConf {
    JobConf::new()
        .with(keys::INPUT_URI, "mongodb://mongo.dc1:27018,mongo.dc2:27018/hadoop.test")
        .with(keys::MONGOS_HOSTS, "mongo.sh01.dc1:27018 mongo.sh02.dc2:27018")
}

// ============================================================================
// Shard chunk
// ============================================================================

#[test]
fn chunk_splits_prefer_colocated_proxies() -> anyhow::Result<()> {
    let store = multi_dc_cluster();
    let splits = run(SplitterKind::ShardChunk, &multi_dc_conf(), &store)?;

    assert_eq!(splits.len(), 2);
    assert_eq!(splits[0].locations[0], "mongo.sh01.dc1:27018");
    assert_eq!(splits[1].locations[0], "mongo.sh02.dc2:27018");
    assert_eq!(splits[0].input_uri.hosts, hosts(&["mongo.sh01.dc1:27018"]));
    assert_eq!(splits[1].input_uri.hosts, hosts(&["mongo.sh02.dc2:27018"]));
    assert!(splits.iter().all(|s| s.key_field == "i"));
    assert_eq!(splits[0].upper, Some(Bson::Int32(500)));
    assert_eq!(splits[1].lower, Some(Bson::Int32(500)));
    assert_partition_covers(&store, &ns(), &Document::new(), &splits);
    Ok(())
}

#[test]
fn chunk_splits_without_proxies_point_at_shard_hosts() -> anyhow::Result<()> {
    let store = multi_dc_cluster();
    let conf = multi_dc_conf().with(keys::MONGOS_HOSTS, "");
    let splits = run(SplitterKind::ShardChunk, &conf, &store)?;

    assert_eq!(splits[0].locations, hosts(&["mongo.sh01.dc1:27017", "mongo.sh01.dc2:27017"]));
    assert_eq!(splits[1].locations, hosts(&["mongo.sh02.dc1:27027", "mongo.sh02.dc2:27027"]));
    // Reads still go through the configured router.
    for split in &splits {
        assert_eq!(split.input_uri, conf.input_uri()?);
    }
    Ok(())
}

#[test]
fn read_from_shards_rewrites_the_uri() -> anyhow::Result<()> {
    let store = multi_dc_cluster();
    let conf = multi_dc_conf()
        .with(keys::MONGOS_HOSTS, "")
        .with(keys::READ_FROM_SHARDS, "true");
    let splits = run(SplitterKind::ShardChunk, &conf, &store)?;

    assert_eq!(
        splits[0].input_uri.to_string(),
        "mongodb://mongo.sh01.dc1:27017,mongo.sh01.dc2:27017/hadoop.test"
    );
    assert_eq!(
        splits[1].input_uri.to_string(),
        "mongodb://mongo.sh02.dc1:27027,mongo.sh02.dc2:27027/hadoop.test"
    );
    Ok(())
}

#[test]
fn read_from_shards_wins_over_proxies_for_the_uri() -> anyhow::Result<()> {
    let store = multi_dc_cluster();
    let conf = multi_dc_conf().with(keys::READ_FROM_SHARDS, "true");
    let splits = run(SplitterKind::ShardChunk, &conf, &store)?;

    assert_eq!(splits[0].input_uri.hosts, hosts(&["mongo.sh01.dc1:27017", "mongo.sh01.dc2:27017"]));
    assert_eq!(splits[0].locations, hosts(&["mongo.sh01.dc1:27018"]));
    Ok(())
}

#[test]
fn unmatched_proxies_are_assigned_round_robin() -> anyhow::Result<()> {
    let ns = ns();
    let store = InMemoryStore::new();
    store.set_router(true);
    store.add_shard("a", "a/db-a:27017");
    store.shard_collection(&ns);
    for (lo, hi) in [(Bson::MinKey, Bson::Int32(10)), (Bson::Int32(10), Bson::Int32(20)), (Bson::Int32(20), Bson::MaxKey)] {
        store.add_chunk(&ns, "a", doc! { "_id": lo }, doc! { "_id": hi });
    }
    seed_sequential(&store, &ns, 30);

    let conf = JobConf::new()
        .with(keys::INPUT_URI, "mongodb://router:27017/hadoop.test")
        .with(keys::MONGOS_HOSTS, "proxy1:27017 proxy2:27017");
    let splits = run(SplitterKind::ShardChunk, &conf, &store)?;

    let targets: Vec<&str> = splits.iter().map(|s| s.input_uri.hosts[0].as_str()).collect();
    assert_eq!(targets, vec!["proxy1:27017", "proxy2:27017", "proxy1:27017"]);
    assert!(splits.iter().all(|s| s.locations == hosts(&["db-a:27017"])));
    Ok(())
}

#[test]
fn chunks_interleave_across_shards() -> anyhow::Result<()> {
    let ns = ns();
    let store = InMemoryStore::new();
    store.set_router(true);
    store.add_shard("a", "a/db-a:27017");
    store.add_shard("b", "b/db-b:27017");
    store.shard_collection(&ns);
    let bound = |i: i32| match i {
        0 => Bson::MinKey,
        6 => Bson::MaxKey,
        i => Bson::Int32(i * 10),
    };
    // a owns the first three chunks, b the last three.
    for i in 0..6 {
        let owner = if i < 3 { "a" } else { "b" };
        store.add_chunk(&ns, owner, doc! { "_id": bound(i) }, doc! { "_id": bound(i + 1) });
    }
    seed_sequential(&store, &ns, 60);

    let conf = JobConf::new().with(keys::INPUT_URI, "mongodb://router:27017/hadoop.test");
    let splits = run(SplitterKind::ShardChunk, &conf, &store)?;

    let owners: Vec<&str> = splits.iter().map(|s| s.locations[0].as_str()).collect();
    assert_eq!(owners, vec!["db-a:27017", "db-b:27017", "db-a:27017", "db-b:27017", "db-a:27017", "db-b:27017"]);
    assert_partition_covers(&store, &ns, &Document::new(), &splits);
    Ok(())
}

#[test]
fn chunk_on_unknown_shard_fails_when_reading_from_shards() {
    let store = multi_dc_cluster();
    store.add_chunk(&ns(), "sh99", doc! { "i": 2000 }, doc! { "i": 3000 });
    let conf = multi_dc_conf().with(keys::READ_FROM_SHARDS, "true");
    let err = run(SplitterKind::ShardChunk, &conf, &store).unwrap_err();
    assert!(matches!(err, SplitError::Store(_)));
}

#[test]
fn chunk_splits_reject_a_query_on_the_shard_key_in_range_mode() {
    let store = multi_dc_cluster();
    let conf = multi_dc_conf()
        .with(keys::USE_RANGE_QUERIES, "true")
        .with(keys::QUERY, r#"{"i": {"$gte": 100}}"#);
    let err = run(SplitterKind::ShardChunk, &conf, &store).unwrap_err();
    assert!(matches!(err, SplitError::SplitConfigConflict(_)));
}

#[test]
fn range_mode_chunk_splits_cover_a_filtered_collection() -> anyhow::Result<()> {
    let ns = ns();
    let store = two_shard_cluster(&ns, 1000);
    let conf = JobConf::new()
        .with(keys::INPUT_URI, "mongodb://router:27017/hadoop.test")
        .with(keys::USE_RANGE_QUERIES, "true")
        .with(keys::QUERY, r#"{"value": {"$gte": 250, "$lt": 750}}"#);
    let splits = run(SplitterKind::ShardChunk, &conf, &store)?;
    assert_eq!(splits.len(), 2);
    assert_contiguous_bounds(&splits);
    assert_partition_covers(&store, &ns, &conf.query()?, &splits);
    Ok(())
}

// ============================================================================
// Shard range
// ============================================================================

#[test]
fn shard_splits_are_routed_to_their_shard() -> anyhow::Result<()> {
    let ns = ns();
    let store = two_shard_cluster(&ns, 1000);
    let conf = JobConf::new().with(keys::INPUT_URI, "mongodb://router:27017/hadoop.test");
    let splits = run(SplitterKind::ShardRange, &conf, &store)?;

    assert_eq!(splits.len(), 2);
    assert_eq!(splits[0].shard.as_deref(), Some("sh01"));
    assert_eq!(splits[1].shard.as_deref(), Some("sh02"));
    assert_eq!(splits[0].upper, Some(Bson::Int32(500)));
    assert_eq!(splits[1].lower, Some(Bson::Int32(500)));
    assert_eq!(splits[0].input_uri.hosts, splits[0].locations);
    assert_eq!(splits[1].locations, hosts(&["mongo.sh02.dc1:27017", "mongo.sh02.dc2:27017"]));
    assert_partition_covers(&store, &ns, &Document::new(), &splits);
    Ok(())
}

#[test]
fn shard_without_chunks_is_read_unbounded() -> anyhow::Result<()> {
    let ns = ns();
    let store = two_shard_cluster(&ns, 100);
    store.add_shard("sh03", "sh03/mongo.sh03.dc1:27017");
    let conf = JobConf::new().with(keys::INPUT_URI, "mongodb://router:27017/hadoop.test");
    let splits = run(SplitterKind::ShardRange, &conf, &store)?;

    assert_eq!(splits.len(), 3);
    let empty = &splits[2];
    assert_eq!(empty.shard.as_deref(), Some("sh03"));
    assert!(empty.is_unbounded());
    // Routed to a shard that owns nothing, so it reads nothing.
    assert_partition_covers(&store, &ns, &Document::new(), &splits);
    Ok(())
}

// ============================================================================
// Selection on sharded clusters
// ============================================================================

#[test]
fn selection_on_sharded_clusters() -> anyhow::Result<()> {
    let ns = ns();
    let store = two_shard_cluster(&ns, 100);
    let topology = topology::inspect(&store, &ns)?;
    assert!(topology.sharded);
    assert_eq!(topology.chunks.len(), 2);

    let base = JobConf::new().with(keys::INPUT_URI, "mongodb://router:27017/hadoop.test");
    let cases = [
        (base.clone(), SplitterKind::Sample),
        (base.clone().with(keys::READ_FROM_SHARDS, "true"), SplitterKind::ShardChunk),
        (
            base.clone()
                .with(keys::READ_FROM_SHARDS, "true")
                .with(keys::READ_SHARD_CHUNKS, "false"),
            SplitterKind::ShardRange,
        ),
        (
            base.clone()
                .with(keys::USE_SAMPLING, "false")
                .with(keys::USE_RANGE_QUERIES, "true"),
            SplitterKind::Paginating,
        ),
        (base.clone().with(keys::USE_SAMPLING, "false"), SplitterKind::Single),
        (base.clone().with(keys::CREATE_INPUT_SPLITS, "false"), SplitterKind::Single),
        (
            base.clone()
                .with(keys::CREATE_INPUT_SPLITS, "false")
                .with(keys::SPLITTER_CLASS, "ShardChunkMongoSplitter"),
            SplitterKind::ShardChunk,
        ),
    ];
    for (conf, expected) in cases {
        assert_eq!(factory::select(&conf, &topology)?, expected, "{conf:?}");
    }
    Ok(())
}

#[test]
fn read_from_shards_without_chunks_selects_shard_range() -> anyhow::Result<()> {
    let ns = ns();
    let store = InMemoryStore::new();
    store.set_router(true);
    store.add_shard("sh01", "sh01/h1:27017");
    store.shard_collection(&ns);
    seed_sequential(&store, &ns, 10);

    let conf = JobConf::new()
        .with(keys::INPUT_URI, "mongodb://router:27017/hadoop.test")
        .with(keys::READ_FROM_SHARDS, "true");
    let plan = plan_collection(&conf, &store)?;
    assert_eq!(plan.used, SplitterKind::ShardRange);
    assert_eq!(plan.splits.len(), 1);
    assert_eq!(plan.splits[0].shard.as_deref(), Some("sh01"));
    Ok(())
}

#[test]
fn planning_a_sharded_collection_end_to_end() -> anyhow::Result<()> {
    let ns = ns();
    let store = two_shard_cluster(&ns, 1000);
    let conf = JobConf::new()
        .with(keys::INPUT_URI, "mongodb://router:27017/hadoop.test")
        .with(keys::READ_FROM_SHARDS, "true")
        .with(keys::FILTER_EMPTY, "true")
        .with(keys::USE_RANGE_QUERIES, "true")
        .with(keys::QUERY, r#"{"value": {"$lt": 100}}"#);
    let plan = plan_collection(&conf, &store)?;

    assert_eq!(plan.selected, SplitterKind::ShardChunk);
    // sh02's chunk starts at 500, so nothing in it matches.
    assert_eq!(plan.splits.len(), 1);
    assert_eq!(plan.splits[0].input_uri.hosts[0], "mongo.sh01.dc1:27017");
    assert_partition_covers(&store, &ns, &conf.query()?, &plan.splits);
    Ok(())
}
