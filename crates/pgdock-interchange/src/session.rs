//! End-to-end import orchestration.
//!
//! An [`ImportSession`] owns one logical import: it feeds chunks through the
//! format parser, builds the column mapping as soon as a header or first row
//! allows, converts rows to wire lines, and ships each batch over its own
//! bulk-load stream. Chunks map one-to-one onto caller request cycles, so no
//! channel stays open between `push_chunk` calls.

use std::sync::Arc;

use pgdock_core::{Connection, ParsedRow, TableColumn, TruncationLedger};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::loader::{BulkLoader, LoadError};
use crate::mapping::{ColumnMapping, MappingError};
use crate::options::ImportOptions;
use crate::parser::{ParseError, ParserState};
use crate::wire::{to_wire_line, ConvertError};

/// Errors during an import session
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Conversion error: {0}")]
    Convert(#[from] ConvertError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),
}

/// Running counters for one import, safe to serialize into a status payload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportProgress {
    /// Chunks accepted so far
    pub chunks: u64,
    /// Rows the parser has emitted
    pub rows_parsed: u64,
    /// Rows the server has acknowledged
    pub rows_loaded: u64,
}

/// One logical import of a byte stream into a table.
///
/// Rows that arrive before the mapping can be built (a header that shows up
/// late in the stream, or not at all) are buffered and flushed the moment the
/// mapping exists. Any error is terminal for the session; callers discard it
/// and start over with a fresh one.
pub struct ImportSession {
    connection: Arc<dyn Connection>,
    table: String,
    columns: Vec<TableColumn>,
    options: ImportOptions,
    state: ParserState,
    mapping: Option<ColumnMapping>,
    buffered: Vec<ParsedRow>,
    ledger: TruncationLedger,
    progress: ImportProgress,
}

impl ImportSession {
    pub fn new(
        connection: Arc<dyn Connection>,
        table: impl Into<String>,
        columns: Vec<TableColumn>,
        options: ImportOptions,
    ) -> Self {
        let state = ParserState::new(options.format, options.use_header);
        Self {
            connection,
            table: table.into(),
            columns,
            options,
            state,
            mapping: None,
            buffered: Vec::new(),
            ledger: TruncationLedger::new(),
            progress: ImportProgress::default(),
        }
    }

    /// Shares truncation bookkeeping with other streams of the same run.
    pub fn with_ledger(mut self, ledger: TruncationLedger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn progress(&self) -> &ImportProgress {
        &self.progress
    }

    /// Feeds one chunk of input and loads every row that became mappable.
    pub async fn push_chunk(&mut self, chunk: &[u8]) -> Result<ImportProgress, ImportError> {
        let output = self.state.parse_chunk(chunk)?;
        self.progress.chunks += 1;
        self.progress.rows_parsed += output.rows.len() as u64;
        self.buffered.extend(output.rows);

        self.build_mapping_if_ready(false)?;
        if self.mapping.is_some() {
            self.flush().await?;
        }
        Ok(self.progress.clone())
    }

    /// Signals end of input, flushes whatever is still buffered, and returns
    /// the final counters.
    pub async fn finish(mut self) -> Result<ImportProgress, ImportError> {
        let output = self.state.finish()?;
        self.progress.rows_parsed += output.rows.len() as u64;
        self.buffered.extend(output.rows);

        self.build_mapping_if_ready(true)?;
        if self.mapping.is_some() {
            self.flush().await?;
        }
        info!(
            table = %self.table,
            rows_parsed = self.progress.rows_parsed,
            rows_loaded = self.progress.rows_loaded,
            "import finished"
        );
        Ok(self.progress)
    }

    /// Builds the mapping once a header or usable first row exists.
    ///
    /// With `use_header` set, positional rows wait for the header until end of
    /// input; named rows (JSON objects, named XML cols) map immediately from
    /// their own names.
    fn build_mapping_if_ready(&mut self, at_end: bool) -> Result<(), ImportError> {
        if self.mapping.is_some() {
            return Ok(());
        }

        let header = self.state.header().filter(|names| !names.is_empty());
        let mapping = if let Some(names) = header {
            ColumnMapping::build(&self.columns, Some(names), None, self.options.omit_serial)?
        } else {
            let Some(first) = self.buffered.first() else {
                return Ok(());
            };
            if let Some(names) = first.names() {
                ColumnMapping::build(&self.columns, Some(names), None, self.options.omit_serial)?
            } else if !self.options.use_header || at_end {
                ColumnMapping::build(
                    &self.columns,
                    None,
                    Some(first.arity()),
                    self.options.omit_serial,
                )?
            } else {
                // Header may still arrive in a later chunk; keep buffering.
                return Ok(());
            }
        };

        debug!(
            table = %self.table,
            columns = mapping.len(),
            serial_omitted = mapping.serial_omitted(),
            "column mapping built"
        );
        self.mapping = Some(mapping);
        Ok(())
    }

    /// Converts and ships all buffered rows over one bulk-load stream.
    async fn flush(&mut self) -> Result<(), ImportError> {
        if self.buffered.is_empty() {
            return Ok(());
        }
        let rows = std::mem::take(&mut self.buffered);
        let Some(mapping) = self.mapping.as_ref() else {
            return Ok(());
        };

        let mut lines = Vec::with_capacity(rows.len());
        for row in &rows {
            lines.push(to_wire_line(row, mapping, &self.options)?);
        }
        let columns: Vec<&str> = mapping.target_names().collect();

        let mut loader = BulkLoader::new(Arc::clone(&self.connection));
        loader
            .begin(&self.table, &columns, self.options.truncate, &self.ledger)
            .await?;
        loader.send_lines(&lines).await?;
        let rows_loaded = loader.finish().await?;
        self.progress.rows_loaded += rows_loaded;
        Ok(())
    }
}
