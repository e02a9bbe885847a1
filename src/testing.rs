//! Test support for split planning.
//!
//! Fixtures build collections and dump files with predictable keys, and the
//! assertions check the properties every plan must have:
//!
//! - [`assert_partition_covers`]: the descriptors of a collection plan match each
//!   document of the base query exactly once.
//! - [`assert_contiguous_bounds`]: bounds chain from an open start to an open end.
//! - [`assert_file_splits_reconstruct`]: file splits start on document
//!   boundaries and together cover the file with no gap or overlap.
//!
//! ```
//! use docsplit::store::{InMemoryStore, Namespace};
//! use docsplit::testing::*;
//!
//! let store = InMemoryStore::new();
//! let ns = Namespace::new("test", "items");
//! seed_sequential(&store, &ns, 100);
//! assert_eq!(store.documents(&ns).len(), 100);
//! ```

mod assertions;
mod fixtures;

pub use assertions::*;
pub use fixtures::*;
