//! Boundary scanner for length-prefixed BSON streams.
//!
//! A dump file is a plain concatenation of documents. Each document starts with
//! its total length (header included) as a little-endian `i32`, so boundaries can
//! be walked by reading four bytes and skipping the rest, with no decoding.
//!
//! Running out of bytes is reported as [`SplitError::TruncatedStream`], which every
//! caller treats as end of data. A header that cannot be a document length is
//! [`SplitError::MalformedDocument`], which is real corruption and is surfaced.
//! That includes any length over [`MAX_DOCUMENT_LEN`], so a corrupt prefix in
//! the middle of a file is never mistaken for its end.

use crate::error::{Result, SplitError};
use bson::Document;
use byteorder::{ByteOrder, LittleEndian};
use std::io::{self, Read};

/// Size of the length prefix.
pub const HEADER_LEN: u64 = 4;

/// Smallest valid document: header plus the trailing NUL.
pub const MIN_DOCUMENT_LEN: u32 = 5;

/// Largest document a server will store.
pub const MAX_DOCUMENT_LEN: u32 = 16 * 1024 * 1024;

/// Walks documents in a byte stream.
#[derive(Debug)]
pub struct BsonScanner<R> {
    reader: R,
    position: u64,
    /// Length declared by the header read last, until its body is consumed.
    pending: Option<u32>,
}

impl<R: Read> BsonScanner<R> {
    /// Scanner over a stream positioned at offset zero.
    pub const fn new(reader: R) -> Self {
        Self::at(reader, 0)
    }

    /// Scanner over a stream already positioned at `position`, a document boundary.
    pub const fn at(reader: R, position: u64) -> Self {
        Self {
            reader,
            position,
            pending: None,
        }
    }

    /// Bytes consumed so far, including any header read by [`Self::read_header`].
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read the next length prefix and return the declared document length.
    ///
    /// The body is left unread. Calling this twice without consuming the body
    /// returns the same length.
    ///
    /// # Errors
    ///
    /// [`SplitError::TruncatedStream`] when fewer than four bytes remain (zero at a
    /// clean end of file), [`SplitError::MalformedDocument`] when the prefix is
    /// not a plausible document length.
    pub fn read_header(&mut self) -> Result<u32> {
        if let Some(len) = self.pending {
            return Ok(len);
        }
        let mut buf = [0u8; 4];
        let got = read_fully(&mut self.reader, &mut buf)?;
        if got < buf.len() {
            let offset = self.position;
            self.position += got as u64;
            return Err(SplitError::TruncatedStream {
                offset,
                needed: HEADER_LEN,
                available: got as u64,
            });
        }
        let declared = LittleEndian::read_i32(&buf);
        let len = u32::try_from(declared)
            .ok()
            .filter(|len| (MIN_DOCUMENT_LEN..=MAX_DOCUMENT_LEN).contains(len))
            .ok_or_else(|| SplitError::MalformedDocument {
                offset: self.position,
                reason: format!("invalid document length {declared}"),
            })?;
        self.position += HEADER_LEN;
        self.pending = Some(len);
        Ok(len)
    }

    /// Advance past the current document without decoding it.
    ///
    /// Reads the header first if [`Self::read_header`] has not been called.
    /// Returns the document's total length.
    ///
    /// # Errors
    ///
    /// [`SplitError::TruncatedStream`] when the body is shorter than declared.
    pub fn skip_document(&mut self) -> Result<u32> {
        let len = self.read_header()?;
        let body = u64::from(len) - HEADER_LEN;
        let skipped = io::copy(&mut (&mut self.reader).take(body), &mut io::sink())?;
        self.finish_body(len, skipped)?;
        Ok(len)
    }

    /// Consume and decode the current document.
    ///
    /// # Errors
    ///
    /// [`SplitError::TruncatedStream`] for a short body, and
    /// [`SplitError::MalformedDocument`] when the bytes do not decode.
    pub fn read_document(&mut self) -> Result<Document> {
        let len = self.read_header()?;
        let start = self.position - HEADER_LEN;
        let mut buf = vec![0u8; len as usize];
        LittleEndian::write_u32(&mut buf[..4], len);
        let got = read_fully(&mut self.reader, &mut buf[4..])?;
        self.finish_body(len, got as u64)?;
        Document::from_reader(buf.as_slice()).map_err(|e| SplitError::MalformedDocument {
            offset: start,
            reason: e.to_string(),
        })
    }

    /// Start offset and length of the next document, or `None` at end of data.
    ///
    /// # Errors
    ///
    /// Only [`SplitError::MalformedDocument`] and I/O failures escape; truncation
    /// ends the walk.
    pub fn next_boundary(&mut self) -> Result<Option<(u64, u32)>> {
        let start = self.position - if self.pending.is_some() { HEADER_LEN } else { 0 };
        match self.skip_document() {
            Ok(len) => Ok(Some((start, len))),
            Err(SplitError::TruncatedStream { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Next decoded document, or `None` at end of data.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::next_boundary`].
    pub fn next_document(&mut self) -> Result<Option<Document>> {
        match self.read_document() {
            Ok(doc) => Ok(Some(doc)),
            Err(SplitError::TruncatedStream { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn finish_body(&mut self, len: u32, got: u64) -> Result<()> {
        let body = u64::from(len) - HEADER_LEN;
        let start = self.position - HEADER_LEN;
        self.position += got;
        self.pending = None;
        if got < body {
            return Err(SplitError::TruncatedStream {
                offset: start,
                needed: u64::from(len),
                available: HEADER_LEN + got,
            });
        }
        Ok(())
    }
}

/// Fill `buf` as far as the stream allows; returns the number of bytes read.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
