//! Byte-level formats: the document scanner, the split index sidecar, compression
//! codecs and glob expansion for file inputs.

pub mod compression;
pub mod glob;
pub mod scanner;
pub mod split_index;
