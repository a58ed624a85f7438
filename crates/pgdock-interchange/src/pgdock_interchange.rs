//! Chunk-incremental parsing and COPY bulk loading.
//!
//! This crate turns uploaded CSV/TSV, JSON, or XML byte streams into rows and
//! streams them into PostgreSQL over the COPY text protocol. Uploads arrive in
//! arbitrarily split chunks, so every parser carries its leftover bytes between
//! calls and a chunk boundary can never change what is parsed.
//!
//! # Architecture
//!
//! ```text
//! bytes → ParserState → ParsedRow → ColumnMapping → WireLine → BulkLoader → COPY
//!         (per format)              (header or      (escaped    (channel per
//!                                    positional)     text line)   chunk batch)
//! ```
//!
//! `ImportSession` wires the stages together for one logical upload; the
//! individual stages stay public for callers that need finer control.

mod loader;
mod mapping;
mod options;
mod parser;
mod session;
mod wire;

pub use loader::{BulkLoader, LoadError, LoadPhase};
pub use mapping::{ColumnBinding, ColumnMapping, MappingError};
pub use options::{ByteaEncoding, ImportFormat, ImportOptions};
pub use parser::{ChunkOutput, ParseError, ParserState};
pub use session::{ImportError, ImportProgress, ImportSession};
pub use wire::{
    ByteaDecodeError, ConvertError, NULL_MARKER, TERMINATOR_LINE, WireLine, copy_directive,
    decode_bytea, encode_octal, escape_copy_text, to_wire_line,
};
