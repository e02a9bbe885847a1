//! The backing document store, as seen by split planning.
//!
//! Planning never talks to a driver directly. It is handed a [`StoreConnector`],
//! opens a [`DocumentStore`] for the input URI, and issues only the metadata and
//! query calls defined in [`traits`]. [`memory::InMemoryStore`] implements both
//! traits over shared in-memory state for tests and local runs.

pub mod memory;
pub mod order;
pub mod traits;
pub mod uri;

pub use memory::InMemoryStore;
pub use traits::{
    lookup, ChunkInfo, CollectionStats, DocumentStore, FindRequest, Namespace, ServerInfo,
    ShardInfo, StoreConnector, StoreError, StoreErrorKind, StoreResult,
};
pub use uri::StoreUri;
