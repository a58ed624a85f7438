//! Bulk-load channel driver.
//!
//! Owns one COPY stream from open to finalize. Phases move strictly
//! `Idle -> HeaderSent -> Streaming -> Finalized`; any wire failure parks the
//! loader in `Failed` and every later call reports the stream as aborted
//! rather than silently swallowing a partial load.

use std::sync::Arc;

use pgdock_core::{Connection, CopyChannel, PgdockError, TruncationLedger};
use thiserror::Error;
use tracing::debug;

use crate::wire::{copy_directive, quote_table, WireLine, TERMINATOR_LINE};

/// Where a [`BulkLoader`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    /// No channel open yet.
    Idle,
    /// Channel open, load-begin directive sent, no data lines yet.
    HeaderSent,
    /// At least one data line sent.
    Streaming,
    /// Terminator sent and server row count collected.
    Finalized,
    /// A wire or truncate failure aborted the stream.
    Failed,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("bulk load channel failed after {lines_sent} line(s): {source}")]
    Wire {
        lines_sent: u64,
        #[source]
        source: PgdockError,
    },
    #[error("truncate of {table} failed: {source}")]
    Truncate {
        table: String,
        #[source]
        source: PgdockError,
    },
    #[error("cannot {operation} while bulk load is {phase:?}")]
    Phase {
        operation: &'static str,
        phase: LoadPhase,
    },
    #[error("bulk load stream already aborted")]
    StreamAborted,
}

/// Streams escaped wire lines into one table over a COPY channel.
///
/// One loader drives one stream. Callers that import a logical table across
/// several streams share a [`TruncationLedger`] so the optional pre-load
/// truncate runs once per table, not once per stream.
pub struct BulkLoader {
    connection: Arc<dyn Connection>,
    channel: Option<Box<dyn CopyChannel>>,
    phase: LoadPhase,
    lines_sent: u64,
}

impl BulkLoader {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            channel: None,
            phase: LoadPhase::Idle,
            lines_sent: 0,
        }
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    /// Data lines successfully handed to the channel so far. The terminator
    /// line is not counted.
    pub fn lines_sent(&self) -> u64 {
        self.lines_sent
    }

    /// Opens the channel: optional one-time truncate, then the COPY directive.
    pub async fn begin(
        &mut self,
        table: &str,
        columns: &[&str],
        truncate: bool,
        ledger: &TruncationLedger,
    ) -> Result<(), LoadError> {
        match self.phase {
            LoadPhase::Idle => {}
            LoadPhase::Failed => return Err(LoadError::StreamAborted),
            phase => {
                return Err(LoadError::Phase {
                    operation: "begin",
                    phase,
                })
            }
        }

        if truncate && !ledger.contains(table) {
            let sql = format!("TRUNCATE TABLE {}", quote_table(table));
            if let Err(source) = self.connection.execute(&sql).await {
                self.phase = LoadPhase::Failed;
                return Err(LoadError::Truncate {
                    table: table.to_string(),
                    source,
                });
            }
            ledger.mark(table);
            debug!(table, "truncated before bulk load");
        }

        let directive = copy_directive(table, columns);
        match self.connection.copy_in(&directive).await {
            Ok(channel) => {
                self.channel = Some(channel);
                self.phase = LoadPhase::HeaderSent;
                debug!(table, columns = columns.len(), "bulk load channel open");
                Ok(())
            }
            Err(source) => Err(self.abort(source)),
        }
    }

    /// Streams a batch of pre-escaped lines.
    pub async fn send_lines(&mut self, lines: &[WireLine]) -> Result<(), LoadError> {
        match self.phase {
            LoadPhase::HeaderSent | LoadPhase::Streaming => {}
            LoadPhase::Failed => return Err(LoadError::StreamAborted),
            phase => {
                return Err(LoadError::Phase {
                    operation: "send",
                    phase,
                })
            }
        }
        let Some(channel) = self.channel.as_mut() else {
            return Err(LoadError::StreamAborted);
        };

        for line in lines {
            if let Err(source) = channel.send(line.as_bytes()).await {
                return Err(self.abort(source));
            }
            self.lines_sent += 1;
        }
        self.phase = LoadPhase::Streaming;
        Ok(())
    }

    /// Sends the terminator and collects the server-reported row count.
    pub async fn finish(&mut self) -> Result<u64, LoadError> {
        match self.phase {
            LoadPhase::HeaderSent | LoadPhase::Streaming => {}
            LoadPhase::Failed => return Err(LoadError::StreamAborted),
            phase => {
                return Err(LoadError::Phase {
                    operation: "finish",
                    phase,
                })
            }
        }
        let Some(mut channel) = self.channel.take() else {
            return Err(LoadError::StreamAborted);
        };

        if let Err(source) = channel.send(TERMINATOR_LINE.as_bytes()).await {
            return Err(self.abort(source));
        }
        match channel.finish().await {
            Ok(rows) => {
                self.phase = LoadPhase::Finalized;
                debug!(rows, lines = self.lines_sent, "bulk load finalized");
                Ok(rows)
            }
            Err(source) => Err(self.abort(source)),
        }
    }

    /// Poisons the loader. Dropping the channel without finish aborts the
    /// server-side load, so the partial stream is never committed.
    fn abort(&mut self, source: PgdockError) -> LoadError {
        self.phase = LoadPhase::Failed;
        self.channel = None;
        LoadError::Wire {
            lines_sent: self.lines_sent,
            source,
        }
    }
}

impl std::fmt::Debug for BulkLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkLoader")
            .field("phase", &self.phase)
            .field("lines_sent", &self.lines_sent)
            .finish()
    }
}
