//! pgdock core - shared abstractions for the bulk import and restore engines
//!
//! This crate provides the pieces both engines depend on:
//!
//! - `FieldValue` / `ParsedRow` - the value model produced by the stream parsers
//! - `TableColumn` - target-table metadata supplied by the caller's introspection
//! - `PgdockError` - the database-facing error type drivers map into
//! - `Connection` / `CopyChannel` - the async seams the engines drive
//! - `TruncationLedger` - truncate-once bookkeeping shared across both engines

mod connection;
mod error;
mod truncation;
mod types;

pub use connection::*;
pub use error::*;
pub use truncation::*;
pub use types::*;
