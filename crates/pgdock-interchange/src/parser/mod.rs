//! Chunk-incremental stream parsers.
//!
//! Upload bytes arrive in arbitrarily split chunks. Each parser keeps the
//! unconsumed tail of the stream, and any partially assembled row, inside
//! `ParserState`, so feeding the same bytes under any chunking always yields
//! the same rows. A parse call only ever consumes complete units (rows,
//! tokens, tags); whatever it cannot finish stays pending for the next call.

mod delimited;
mod json;
mod xml;

#[cfg(test)]
mod tests;

use pgdock_core::ParsedRow;
use thiserror::Error;

use crate::options::ImportFormat;

/// Errors from the stream parsers.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{format} parse error: {message}")]
    Malformed {
        format: &'static str,
        message: String,
    },

    #[error("input ended inside an unterminated {0}")]
    UnexpectedEof(&'static str),
}

/// Rows, and possibly a header, completed by one parse call.
#[derive(Debug, Default)]
pub struct ChunkOutput {
    pub rows: Vec<ParsedRow>,
    /// Set by the call that completes the header (first row in header mode,
    /// the `columns` array in JSON, the `<header>` element in XML).
    pub header: Option<Vec<String>>,
}

/// Caller-owned parser state for one logical stream.
#[derive(Debug)]
pub struct ParserState {
    inner: Inner,
}

#[derive(Debug)]
enum Inner {
    Delimited(delimited::DelimitedState),
    Json(json::JsonState),
    Xml(xml::XmlState),
}

impl ParserState {
    /// Creates fresh parser state for one stream. `use_header` controls
    /// whether the first delimited row is read as column names; JSON and XML
    /// name their columns in the document itself.
    pub fn new(format: ImportFormat, use_header: bool) -> Self {
        let inner = match format {
            ImportFormat::Csv => {
                Inner::Delimited(delimited::DelimitedState::new(b',', "csv", use_header))
            }
            ImportFormat::Tsv => {
                Inner::Delimited(delimited::DelimitedState::new(b'\t', "tsv", use_header))
            }
            ImportFormat::Json => Inner::Json(json::JsonState::new()),
            ImportFormat::Xml => Inner::Xml(xml::XmlState::new()),
        };
        Self { inner }
    }

    /// Consumes one chunk of input, returning whatever rows it completed.
    pub fn parse_chunk(&mut self, chunk: &[u8]) -> Result<ChunkOutput, ParseError> {
        match &mut self.inner {
            Inner::Delimited(state) => state.parse_chunk(chunk),
            Inner::Json(state) => state.parse_chunk(chunk),
            Inner::Xml(state) => state.parse_chunk(chunk),
        }
    }

    /// Signals end of input, flushing any final unterminated row and
    /// rejecting streams cut off mid-construct.
    pub fn finish(&mut self) -> Result<ChunkOutput, ParseError> {
        match &mut self.inner {
            Inner::Delimited(state) => state.finish(),
            Inner::Json(state) => state.finish(),
            Inner::Xml(state) => state.finish(),
        }
    }

    /// Bytes held back for the next chunk.
    pub fn pending(&self) -> &[u8] {
        match &self.inner {
            Inner::Delimited(state) => state.pending(),
            Inner::Json(state) => state.pending(),
            Inner::Xml(state) => state.pending(),
        }
    }

    /// Header column names, once the stream has produced them.
    pub fn header(&self) -> Option<&[String]> {
        match &self.inner {
            Inner::Delimited(state) => state.header(),
            Inner::Json(state) => state.header(),
            Inner::Xml(state) => state.header(),
        }
    }
}
