//! Connection and bulk-copy seams implemented by database drivers

use crate::Result;
use async_trait::async_trait;

/// A database connection as seen by the import and restore engines.
///
/// The surface is deliberately small: the engines issue raw SQL and open
/// bulk-load channels; result-set queries, introspection, and pooling are the
/// surrounding application's concern. PostgreSQL's wire protocol is
/// single-flight per connection, so callers must not interleave `execute`
/// and an open copy channel on the same connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Driver name (e.g. "postgresql")
    fn driver_name(&self) -> &str;

    /// Role name the session is running as. Feeds the restore classifier's
    /// self-affecting detection.
    fn session_user(&self) -> &str;

    /// Execute a single SQL statement, returning the affected-row count.
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Open a bulk-load channel with the given load-begin directive
    /// (e.g. `COPY "t" ("a", "b") FROM STDIN`).
    async fn copy_in(&self, directive: &str) -> Result<Box<dyn CopyChannel>>;
}

/// One open bulk-load channel.
///
/// Lines arrive pre-escaped in the wire format, terminator included; the
/// channel only moves bytes. Dropping a channel without `finish` aborts the
/// load server-side.
#[async_trait]
pub trait CopyChannel: Send {
    /// Send one wire-format line (terminating newline included)
    async fn send(&mut self, line: &[u8]) -> Result<()>;

    /// Complete the load, returning the server-reported row count
    async fn finish(self: Box<Self>) -> Result<u64>;
}
