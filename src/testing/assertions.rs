//! Plan-level assertions. All of them panic with a description of the first
//! violation found.

use crate::io::scanner::BsonScanner;
use crate::split::{FileSplit, SplitDescriptor};
use crate::store::order::values_equal;
use crate::store::traits::{DocumentStore, FindRequest, Namespace};
use bson::{Bson, Document};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Every document matching `query` is returned by exactly one descriptor.
///
/// Runs each descriptor's cursor against `store` and compares the `_id`s seen
/// with those of a plain `find(query)`.
///
/// # Panics
///
/// Panics on a store error, a document read by two descriptors, or a document
/// read by none.
pub fn assert_partition_covers(
    store: &dyn DocumentStore,
    ns: &Namespace,
    query: &Document,
    splits: &[SplitDescriptor],
) {
    let expected = store
        .find(ns, &FindRequest::new(query.clone()))
        .unwrap_or_else(|e| panic!("base query failed: {e}"));

    let mut seen: HashMap<String, usize> = HashMap::new();
    for (i, split) in splits.iter().enumerate() {
        let docs = store
            .find(ns, &split.find_request())
            .unwrap_or_else(|e| panic!("split {i} cursor failed: {e}"));
        for doc in docs {
            let id = doc.get("_id").map_or_else(|| "<none>".to_string(), Bson::to_string);
            if let Some(prev) = seen.insert(id.clone(), i) {
                panic!("document {id} read by splits {prev} and {i}:\n  {:?}\n  {:?}", splits[prev], split);
            }
        }
    }

    for doc in &expected {
        let id = doc.get("_id").map_or_else(|| "<none>".to_string(), Bson::to_string);
        assert!(seen.contains_key(&id), "document {id} matched the query but no split read it");
    }
    assert_eq!(
        seen.len(),
        expected.len(),
        "splits read {} documents, the query matches {}",
        seen.len(),
        expected.len()
    );
}

/// The first descriptor starts open, the last ends open, and each upper bound
/// is the next lower bound.
///
/// # Panics
///
/// Panics on the first break in the chain.
pub fn assert_contiguous_bounds(splits: &[SplitDescriptor]) {
    assert!(!splits.is_empty(), "no splits");
    assert_eq!(splits[0].lower, None, "first split has a lower bound");
    assert_eq!(splits[splits.len() - 1].upper, None, "last split has an upper bound");
    for (i, pair) in splits.windows(2).enumerate() {
        let joined = match (&pair[0].upper, &pair[1].lower) {
            (Some(u), Some(l)) => values_equal(u, l),
            _ => false,
        };
        assert!(
            joined,
            "splits {i} and {} do not meet: upper {:?}, lower {:?}",
            i + 1,
            pair[0].upper,
            pair[1].lower
        );
    }
}

/// Splits of one file are contiguous from offset zero, each starts on a
/// document boundary, and together they end at the last complete document.
///
/// # Panics
///
/// Panics if the file cannot be scanned or on the first violation.
pub fn assert_file_splits_reconstruct(path: &Path, splits: &[FileSplit]) {
    let file = File::open(path).unwrap_or_else(|e| panic!("cannot open {}: {e}", path.display()));
    let mut scanner = BsonScanner::new(BufReader::new(file));
    let mut boundaries = Vec::new();
    let mut end = 0;
    while let Some((start, len)) = scanner
        .next_boundary()
        .unwrap_or_else(|e| panic!("cannot scan {}: {e}", path.display()))
    {
        boundaries.push(start);
        end = start + u64::from(len);
    }

    let mut expected = 0;
    for (i, split) in splits.iter().enumerate() {
        assert_eq!(split.start, expected, "split {i} does not start where split {} ended", i.wrapping_sub(1));
        assert!(
            boundaries.binary_search(&split.start).is_ok(),
            "split {i} starts at {} which is not a document boundary",
            split.start
        );
        expected = split.end();
    }
    assert_eq!(expected, end, "splits end at {expected}, documents end at {end}");
}
