//! Split descriptors: the unit of work handed to one worker.
//!
//! A [`SplitDescriptor`] is pure data. It carries the half-open key range
//! `[lower, upper)` of one slice of a collection plus everything needed to build
//! the cursor for it, but it never opens one. Cursor construction is the job of
//! [`crate::reader::CollectionReader`], done once per worker.
//!
//! A [`FileSplit`] is the flat-file counterpart: a byte range of a dump file that
//! starts on a document boundary.
//!
//! Both travel to workers through the job configuration, so both serialize to
//! BSON bytes with `to_bytes` / `from_bytes`.

use crate::error::Result;
use crate::store::order::compare;
use crate::store::traits::FindRequest;
use crate::store::uri::StoreUri;
use bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::PathBuf;

/// How a descriptor's key range reaches the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundsMode {
    /// Range clauses ANDed into the filter.
    #[default]
    RangeQuery,
    /// Index `min`/`max` hints on the cursor; the filter stays the base query.
    IndexBounds,
}

/// One contiguous slice of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitDescriptor {
    /// Where the worker connects. May be rewritten to a shard or proxy host.
    pub input_uri: StoreUri,
    /// Boundary field.
    pub key_field: String,
    /// Inclusive lower bound; `None` is unbounded.
    pub lower: Option<Bson>,
    /// Exclusive upper bound; `None` is unbounded.
    pub upper: Option<Bson>,
    /// Base query, always ANDed with the range.
    pub query: Document,
    pub fields: Option<Document>,
    pub sort: Option<Document>,
    pub bounds_mode: BoundsMode,
    /// Route the cursor to this shard only.
    pub shard: Option<String>,
    /// Candidate hosts for locality-aware scheduling.
    pub locations: Vec<String>,
    pub no_timeout: bool,
    /// Credentials and login database for the worker's connection.
    pub auth_uri: Option<StoreUri>,
}

impl SplitDescriptor {
    /// A descriptor over the whole collection.
    pub fn unbounded(input_uri: StoreUri, key_field: impl Into<String>, query: Document) -> Self {
        Self {
            input_uri,
            key_field: key_field.into(),
            lower: None,
            upper: None,
            query,
            fields: None,
            sort: None,
            bounds_mode: BoundsMode::RangeQuery,
            shard: None,
            locations: Vec::new(),
            no_timeout: false,
            auth_uri: None,
        }
    }

    #[must_use]
    pub fn with_bounds(mut self, lower: Option<Bson>, upper: Option<Bson>) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    /// `{key: {$gte: lower, $lt: upper}}`, with an absent upper side omitted.
    ///
    /// Range operators only match within the bounds' type bracket, so an open
    /// lower end is written `{key: {$not: {$gte: upper}}}`. The first split then
    /// also takes documents whose key is missing or of another type.
    #[must_use]
    pub fn range_filter(&self) -> Document {
        let range = match (&self.lower, &self.upper) {
            (None, None) => return Document::new(),
            (None, Some(upper)) => doc! { "$not": { "$gte": upper.clone() } },
            (Some(lower), None) => doc! { "$gte": lower.clone() },
            (Some(lower), Some(upper)) => doc! { "$gte": lower.clone(), "$lt": upper.clone() },
        };
        single(&self.key_field, range)
    }

    /// Filter the worker's cursor runs with.
    #[must_use]
    pub fn cursor_filter(&self) -> Document {
        match self.bounds_mode {
            BoundsMode::IndexBounds => self.query.clone(),
            BoundsMode::RangeQuery => and_filters(&self.query, self.range_filter()),
        }
    }

    /// Where the worker connects: `input_uri`, logged in through `auth_uri`
    /// when one is set.
    #[must_use]
    pub fn connection_uri(&self) -> StoreUri {
        match &self.auth_uri {
            Some(auth) => self.input_uri.authenticated_by(auth),
            None => self.input_uri.clone(),
        }
    }

    /// The full cursor request for this slice.
    #[must_use]
    pub fn find_request(&self) -> FindRequest {
        let mut request = FindRequest::new(self.cursor_filter());
        request.projection.clone_from(&self.fields);
        request.sort.clone_from(&self.sort);
        request.shard.clone_from(&self.shard);
        request.no_timeout = self.no_timeout;
        if self.bounds_mode == BoundsMode::IndexBounds {
            request.min = self.lower.as_ref().map(|v| single(&self.key_field, v.clone()));
            request.max = self.upper.as_ref().map(|v| single(&self.key_field, v.clone()));
        }
        request
    }

    /// True when a boundary value `key` falls inside `[lower, upper)`.
    #[must_use]
    pub fn contains_key(&self, key: &Bson) -> bool {
        self.lower
            .as_ref()
            .is_none_or(|l| compare(key, l) != Ordering::Less)
            && self
                .upper
                .as_ref()
                .is_none_or(|u| compare(key, u) == Ordering::Less)
    }

    /// # Errors
    ///
    /// Returns [`crate::SplitError::Bson`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bson::to_vec(self)?)
    }

    /// # Errors
    ///
    /// Returns [`crate::SplitError::Bson`] if the bytes are not a descriptor.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bson::from_slice(bytes)?)
    }
}

/// `{field: value}`.
pub fn single(field: &str, value: impl Into<Bson>) -> Document {
    let mut d = Document::new();
    d.insert(field, value);
    d
}

/// `base AND extra`, without wrapping when either side is empty.
#[must_use]
pub fn and_filters(base: &Document, extra: Document) -> Document {
    match (base.is_empty(), extra.is_empty()) {
        (_, true) => base.clone(),
        (true, false) => extra,
        (false, false) => doc! { "$and": [base.clone(), extra] },
    }
}

/// A byte range of a BSON dump file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSplit {
    pub path: PathBuf,
    pub start: u64,
    pub length: u64,
    /// Field readers use as the record key.
    pub key_field: String,
    pub locations: Vec<String>,
}

impl FileSplit {
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.start + self.length
    }

    /// # Errors
    ///
    /// Returns [`crate::SplitError::Bson`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bson::to_vec(self)?)
    }

    /// # Errors
    ///
    /// Returns [`crate::SplitError::Bson`] if the bytes are not a file split.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bson::from_slice(bytes)?)
    }
}

/// Either kind of split, as produced by the multi-input aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputSplit {
    Collection(SplitDescriptor),
    File(FileSplit),
}

impl InputSplit {
    #[must_use]
    pub fn locations(&self) -> &[String] {
        match self {
            Self::Collection(d) => &d.locations,
            Self::File(f) => &f.locations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri() -> StoreUri {
        StoreUri::parse("mongodb://localhost:27017/test.items").unwrap()
    }

    #[test]
    fn range_is_anded_with_base_query() {
        let d = SplitDescriptor::unbounded(uri(), "_id", doc! { "status": "A" })
            .with_bounds(Some(Bson::Int32(10)), Some(Bson::Int32(20)));
        assert_eq!(
            d.cursor_filter(),
            doc! { "$and": [ { "status": "A" }, { "_id": { "$gte": 10, "$lt": 20 } } ] }
        );
    }

    #[test]
    fn open_lower_end_takes_other_brackets() {
        let d = SplitDescriptor::unbounded(uri(), "_id", Document::new())
            .with_bounds(None, Some(Bson::Int32(5)));
        assert_eq!(d.cursor_filter(), doc! { "_id": { "$not": { "$gte": 5 } } });
        let d = d.with_bounds(Some(Bson::Int32(5)), None);
        assert_eq!(d.cursor_filter(), doc! { "_id": { "$gte": 5 } });
        assert!(SplitDescriptor::unbounded(uri(), "_id", Document::new())
            .cursor_filter()
            .is_empty());
    }

    #[test]
    fn index_bounds_go_to_hints() {
        let mut d = SplitDescriptor::unbounded(uri(), "_id", doc! { "x": 1 })
            .with_bounds(Some(Bson::Int32(1)), None);
        d.bounds_mode = BoundsMode::IndexBounds;
        let req = d.find_request();
        assert_eq!(req.filter, doc! { "x": 1 });
        assert_eq!(req.min, Some(doc! { "_id": 1 }));
        assert_eq!(req.max, None);
    }

    #[test]
    fn descriptor_survives_the_wire() {
        let mut d = SplitDescriptor::unbounded(uri(), "_id", doc! { "a": { "$gt": 2 } })
            .with_bounds(Some(Bson::String("m".into())), None);
        d.locations = vec!["h1".into(), "h2".into()];
        d.shard = Some("sh0".into());
        d.auth_uri = Some(StoreUri::parse("mongodb://u:p@auth/admin").unwrap());
        let back = SplitDescriptor::from_bytes(&d.to_bytes().unwrap()).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn contains_key_is_half_open() {
        let d = SplitDescriptor::unbounded(uri(), "_id", Document::new())
            .with_bounds(Some(Bson::Int32(10)), Some(Bson::Int32(20)));
        assert!(d.contains_key(&Bson::Int64(10)));
        assert!(!d.contains_key(&Bson::Int32(20)));
        assert!(!d.contains_key(&Bson::Int32(9)));
    }
}
