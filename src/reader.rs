//! Worker-side readers for both kinds of split.
//!
//! [`CollectionReader`] turns a [`SplitDescriptor`] into a cursor. The request
//! is built from the descriptor once, at open time, and the store handle comes
//! from a connector the caller passes in.
//!
//! [`BsonFileReader`] reads the documents of one [`FileSplit`]. Plain files are
//! read from the split's start offset up to its end; compressed files are always
//! a single split and are decoded from the beginning.

use crate::error::{Result, SplitError};
use crate::io::compression::{is_compressed, open_reader};
use crate::io::scanner::BsonScanner;
use crate::split::{FileSplit, SplitDescriptor};
use crate::store::traits::{lookup, FindRequest, StoreConnector};
use bson::{Bson, Document};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use tracing::debug;

/// Documents of one collection split.
#[derive(Debug)]
pub struct CollectionReader {
    request: FindRequest,
    key_field: String,
    docs: std::vec::IntoIter<Document>,
}

impl CollectionReader {
    /// Connect to the descriptor's URI, through its login URI if any, and run
    /// its cursor.
    ///
    /// # Errors
    ///
    /// - [`SplitError::InvalidConfig`] if the URI names no collection.
    /// - [`SplitError::Store`] if the connection or the query fails.
    pub fn open(split: &SplitDescriptor, connector: &dyn StoreConnector) -> Result<Self> {
        let namespace = split.input_uri.namespace()?;
        let request = split.find_request();
        let store = connector.connect(&split.connection_uri())?;
        let docs = store.find(&namespace, &request)?;
        debug!(
            namespace = %namespace,
            lower = ?split.lower,
            upper = ?split.upper,
            docs = docs.len(),
            "opened split cursor"
        );
        Ok(Self {
            request,
            key_field: split.key_field.clone(),
            docs: docs.into_iter(),
        })
    }

    /// The request the cursor was opened with.
    #[must_use]
    pub const fn request(&self) -> &FindRequest {
        &self.request
    }

    /// Next document with its key value, `Null` when the field is absent.
    pub fn next_record(&mut self) -> Option<(Bson, Document)> {
        let doc = self.docs.next()?;
        let key = lookup(&doc, &self.key_field).cloned().unwrap_or(Bson::Null);
        Some((key, doc))
    }
}

impl Iterator for CollectionReader {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        self.docs.next()
    }
}

/// Documents of one file split.
pub struct BsonFileReader {
    scanner: BsonScanner<Box<dyn Read>>,
    /// Offset where the split ends; `None` reads to end of stream.
    end: Option<u64>,
    done: bool,
}

impl BsonFileReader {
    /// # Errors
    ///
    /// - [`SplitError::SourceUnreadable`] if the file cannot be opened.
    /// - [`SplitError::InvalidConfig`] for a compressed split not starting at zero.
    pub fn open(split: &FileSplit) -> Result<Self> {
        if is_compressed(&split.path) {
            if split.start != 0 {
                return Err(SplitError::invalid_config(
                    split.path.display().to_string(),
                    "compressed inputs can only be read from the start",
                ));
            }
            return Ok(Self {
                scanner: BsonScanner::new(open_reader(&split.path)?),
                end: None,
                done: false,
            });
        }

        let mut file = File::open(&split.path).map_err(|source| SplitError::SourceUnreadable {
            path: split.path.clone(),
            source,
        })?;
        file.seek(SeekFrom::Start(split.start))?;
        let reader: Box<dyn Read> = Box::new(BufReader::new(file).take(split.length));
        Ok(Self {
            scanner: BsonScanner::at(reader, split.start),
            end: Some(split.end()),
            done: false,
        })
    }
}

impl Iterator for BsonFileReader {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.end.is_some_and(|end| self.scanner.position() >= end) {
            return None;
        }
        match self.scanner.next_document() {
            Ok(Some(doc)) => Some(Ok(doc)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
