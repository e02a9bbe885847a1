//! Collections and dump files with predictable contents.

use crate::store::memory::InMemoryStore;
use crate::store::traits::Namespace;
use bson::{doc, Bson, Document};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// `{_id: i, value: i}` for `i` in `0..n`.
#[must_use]
pub fn sequential_docs(n: i32) -> Vec<Document> {
    (0..n).map(|i| doc! { "_id": i, "value": i }).collect()
}

/// Insert [`sequential_docs`] into `ns`.
pub fn seed_sequential(store: &InMemoryStore, ns: &Namespace, n: i32) {
    store.insert_many(ns, sequential_docs(n));
}

/// Documents of varying size: `{_id: i, pad: "x" * (i * 37 % max_pad)}`.
///
/// Sizes vary so split cuts do not line up with a fixed stride.
#[must_use]
pub fn varied_docs(n: i32, max_pad: usize) -> Vec<Document> {
    let max_pad = max_pad.max(1);
    (0..n)
        .map(|i| {
            let pad = usize::try_from(i).unwrap_or(0) * 37 % max_pad;
            doc! { "_id": i, "pad": "x".repeat(pad) }
        })
        .collect()
}

/// Encoded bytes of one document.
///
/// # Panics
///
/// Panics if the document cannot be encoded, which only happens for documents
/// over the 16 MiB limit.
#[must_use]
pub fn encode(doc: &Document) -> Vec<u8> {
    let mut buf = Vec::new();
    doc.to_writer(&mut buf)
        .unwrap_or_else(|e| panic!("cannot encode {doc}: {e}"));
    buf
}

/// Write `docs` back to back to `path`. Returns `(start, length)` of each.
///
/// # Errors
///
/// Returns any I/O error from creating or writing the file.
pub fn write_bson_file(path: &Path, docs: &[Document]) -> io::Result<Vec<(u64, u64)>> {
    let mut out = BufWriter::new(File::create(path)?);
    let mut offsets = Vec::with_capacity(docs.len());
    let mut pos = 0;
    for d in docs {
        let bytes = encode(d);
        out.write_all(&bytes)?;
        let len = bytes.len() as u64;
        offsets.push((pos, len));
        pos += len;
    }
    out.flush()?;
    Ok(offsets)
}

/// A router in front of two shards holding `{_id: 0..n}` of `ns`.
///
/// `sh01` owns `[MinKey, n/2)` and `sh02` owns `[n/2, MaxKey)`. Each shard is a
/// two-member replica set in two data centres, `mongo.shNN.dc{1,2}:27017`.
#[must_use]
pub fn two_shard_cluster(ns: &Namespace, n: i32) -> InMemoryStore {
    let store = InMemoryStore::new();
    store.set_router(true);
    store.add_shard("sh01", "sh01/mongo.sh01.dc1:27017,mongo.sh01.dc2:27017");
    store.add_shard("sh02", "sh02/mongo.sh02.dc1:27017,mongo.sh02.dc2:27017");
    store.shard_collection(ns);
    let mid = n / 2;
    store.add_chunk(ns, "sh01", doc! { "_id": Bson::MinKey }, doc! { "_id": mid });
    store.add_chunk(ns, "sh02", doc! { "_id": mid }, doc! { "_id": Bson::MaxKey });
    seed_sequential(&store, ns, n);
    store
}
