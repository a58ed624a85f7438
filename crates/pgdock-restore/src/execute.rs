//! Policy-driven statement execution.
//!
//! One [`RestoreExecutor`] drives one restore run: each statement is
//! classified, then handled by exactly one policy branch per category.
//! Ownership transfers and privilege grants are queued and replayed by
//! [`finalize`](RestoreExecutor::finalize) after everything they refer to
//! exists; statements that would alter the acting role are deferred to the
//! very end. Raw COPY data blocks stream over a bulk-load channel and share
//! truncation bookkeeping with the statement path.

use std::sync::Arc;

use pgdock_core::{Connection, PgdockError, TruncationLedger};
use thiserror::Error;
use tracing::{debug, warn};

use crate::classify::{classify, StatementCategory};
use crate::log::{Disposition, RestoreLog, RunSummary};
use crate::options::{ErrorMode, RestoreOptions};

/// How much of a failing statement is kept for diagnostics.
const STATEMENT_SNIPPET_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum ExecuteError {
    /// A statement the server rejected.
    #[error("Statement failed: {message} (statement: {statement})")]
    Statement {
        /// First 200 characters of the failing statement.
        statement: String,
        /// SQLSTATE reported by the server, when available.
        code: Option<String>,
        message: String,
    },

    #[error("Copy stream failed after {lines_sent} line(s): {message}")]
    CopyBlock { lines_sent: u64, message: String },
}

/// Mutable state of one restore run.
///
/// Owned by a single executor; the truncation ledger inside is shared by
/// handle with the bulk-load path so a table is truncated at most once no
/// matter which path touches it first.
#[derive(Debug, Default)]
pub struct ExecutionState {
    deferred: Vec<String>,
    ownership_queue: Vec<String>,
    rights_queue: Vec<String>,
    truncated: TruncationLedger,
}

impl ExecutionState {
    /// Self-affecting statements awaiting replay.
    pub fn deferred(&self) -> &[String] {
        &self.deferred
    }

    pub fn ownership_queue(&self) -> &[String] {
        &self.ownership_queue
    }

    pub fn rights_queue(&self) -> &[String] {
        &self.rights_queue
    }

    pub fn truncated(&self) -> &TruncationLedger {
        &self.truncated
    }
}

type CategoryFilter = Box<dyn Fn(StatementCategory) -> bool + Send + Sync>;

/// Executes classified statements under operator policy.
pub struct RestoreExecutor {
    connection: Arc<dyn Connection>,
    options: RestoreOptions,
    state: ExecutionState,
    log: RestoreLog,
    category_filter: Option<CategoryFilter>,
}

impl RestoreExecutor {
    pub fn new(connection: Arc<dyn Connection>, options: RestoreOptions) -> Self {
        Self {
            connection,
            options,
            state: ExecutionState::default(),
            log: RestoreLog::new(),
            category_filter: None,
        }
    }

    /// Replaces the default log, e.g. with a streaming or resized one.
    pub fn with_log(mut self, log: RestoreLog) -> Self {
        self.log = log;
        self
    }

    /// Restricts the directly-executed categories (cluster, db, schema,
    /// unknown) beyond the boolean policy toggles.
    pub fn with_category_filter(
        mut self,
        filter: impl Fn(StatementCategory) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.category_filter = Some(Box::new(filter));
        self
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn log(&self) -> &RestoreLog {
        &self.log
    }

    pub fn summary(&self) -> RunSummary {
        self.log.summary()
    }

    /// Truncation bookkeeping handle, for sharing with an import session
    /// loading into the same tables during this run.
    pub fn truncation_ledger(&self) -> TruncationLedger {
        self.state.truncated.clone()
    }

    /// Classifies and handles one statement. Failures are logged and
    /// returned; the caller picks abort-vs-continue (or uses
    /// [`run_batch`](Self::run_batch)).
    pub async fn execute(&mut self, sql: &str) -> Result<Disposition, ExecuteError> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Ok(Disposition::Skipped);
        }
        let category = classify(sql, self.connection.session_user());

        let disposition = match category {
            StatementCategory::ConnectionChange => {
                self.skip(category, sql, "connection switching is the caller's concern")
            }
            StatementCategory::SelfAffecting => {
                if self.options.defer_self {
                    self.state.deferred.push(sql.to_string());
                    self.log.record(Disposition::Deferred, category, snippet(sql));
                    debug!(statement = snippet(sql), "self-affecting statement deferred");
                    Disposition::Deferred
                } else if self.options.superuser || self.options.server_scope {
                    self.run(category, sql).await?
                } else {
                    self.skip(category, sql, "self-affecting statement needs elevated privilege")
                }
            }
            StatementCategory::Drop => {
                if self.options.allow_drops {
                    self.run(category, sql).await?
                } else {
                    self.log.record(Disposition::Blocked, category, snippet(sql));
                    debug!(statement = snippet(sql), "drop statement blocked");
                    Disposition::Blocked
                }
            }
            StatementCategory::OwnershipChange => {
                if self.options.ownership {
                    self.state.ownership_queue.push(sql.to_string());
                    self.log.record(Disposition::Queued, category, snippet(sql));
                    Disposition::Queued
                } else {
                    self.skip(category, sql, "ownership changes disabled")
                }
            }
            StatementCategory::Rights => {
                if self.options.rights {
                    self.state.rights_queue.push(sql.to_string());
                    self.log.record(Disposition::Queued, category, snippet(sql));
                    Disposition::Queued
                } else {
                    self.skip(category, sql, "rights changes disabled")
                }
            }
            StatementCategory::ClusterObject => {
                let (allowed, reason) = self.cluster_allowed(sql);
                if allowed {
                    self.filtered_run(category, sql).await?
                } else {
                    self.skip(category, sql, reason)
                }
            }
            StatementCategory::DbObject => {
                if self.options.schema_create {
                    self.filtered_run(category, sql).await?
                } else {
                    self.skip(category, sql, "schema creation disabled")
                }
            }
            StatementCategory::Data => {
                if self.options.data {
                    if self.options.truncate {
                        self.truncate_data_target(sql).await?;
                    }
                    self.run(category, sql).await?
                } else {
                    self.skip(category, sql, "data statements disabled")
                }
            }
            StatementCategory::SchemaObject | StatementCategory::Unknown => {
                self.filtered_run(category, sql).await?
            }
        };
        Ok(disposition)
    }

    /// Runs a whole batch under the configured error mode, then finalizes.
    pub async fn run_batch<I, S>(&mut self, statements: I) -> Result<RunSummary, ExecuteError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for sql in statements {
            if let Err(error) = self.execute(sql.as_ref()).await {
                match self.options.error_mode {
                    ErrorMode::Abort => return Err(error),
                    ErrorMode::Continue => {}
                }
            }
        }
        self.finalize().await
    }

    /// Replays the held-back phases in order: ownership transfers, then
    /// rights, then the deferred self-affecting statements. Replay bypasses
    /// classification so nothing is deferred twice.
    pub async fn finalize(&mut self) -> Result<RunSummary, ExecuteError> {
        let ownership = std::mem::take(&mut self.state.ownership_queue);
        self.replay(ownership, StatementCategory::OwnershipChange)
            .await?;
        let rights = std::mem::take(&mut self.state.rights_queue);
        self.replay(rights, StatementCategory::Rights).await?;
        let deferred = std::mem::take(&mut self.state.deferred);
        self.replay(deferred, StatementCategory::SelfAffecting)
            .await?;
        Ok(self.log.summary())
    }

    /// Streams one raw COPY data block (directive plus `\.`-terminated
    /// lines) over a bulk-load channel, honoring the data and truncate
    /// policies and the shared truncation ledger.
    pub async fn execute_copy_block(
        &mut self,
        directive: &str,
        block: &str,
    ) -> Result<u64, ExecuteError> {
        if !self.options.data {
            self.skip(StatementCategory::Data, directive, "data statements disabled");
            return Ok(0);
        }
        if self.options.truncate {
            self.truncate_data_target(directive).await?;
        }

        let mut channel = match self.connection.copy_in(directive).await {
            Ok(channel) => channel,
            Err(source) => return Err(self.copy_failed(directive, 0, source)),
        };
        let mut lines_sent = 0u64;
        for line in block.lines() {
            if line == "\\." {
                break;
            }
            let mut owned = String::with_capacity(line.len() + 1);
            owned.push_str(line);
            owned.push('\n');
            if let Err(source) = channel.send(owned.as_bytes()).await {
                return Err(self.copy_failed(directive, lines_sent, source));
            }
            lines_sent += 1;
        }
        if let Err(source) = channel.send(b"\\.\n").await {
            return Err(self.copy_failed(directive, lines_sent, source));
        }
        match channel.finish().await {
            Ok(rows) => {
                debug!(rows, lines = lines_sent, "copy block loaded");
                self.log
                    .record(Disposition::Executed, StatementCategory::Data, snippet(directive));
                Ok(rows)
            }
            Err(source) => Err(self.copy_failed(directive, lines_sent, source)),
        }
    }

    async fn replay(
        &mut self,
        statements: Vec<String>,
        category: StatementCategory,
    ) -> Result<(), ExecuteError> {
        for sql in statements {
            if let Err(error) = self.run(category, &sql).await {
                match self.options.error_mode {
                    ErrorMode::Abort => return Err(error),
                    ErrorMode::Continue => {}
                }
            }
        }
        Ok(())
    }

    async fn filtered_run(
        &mut self,
        category: StatementCategory,
        sql: &str,
    ) -> Result<Disposition, ExecuteError> {
        if let Some(filter) = &self.category_filter {
            if !filter(category) {
                return Ok(self.skip(category, sql, "filtered by caller policy"));
            }
        }
        self.run(category, sql).await
    }

    async fn run(
        &mut self,
        category: StatementCategory,
        sql: &str,
    ) -> Result<Disposition, ExecuteError> {
        match self.connection.execute(sql).await {
            Ok(rows) => {
                debug!(category = category.as_str(), rows, "statement executed");
                self.log.record(Disposition::Executed, category, snippet(sql));
                Ok(Disposition::Executed)
            }
            Err(source) => {
                let error = statement_error(sql, source);
                self.log.record(Disposition::Failed, category, error.to_string());
                warn!(category = category.as_str(), %error, "statement failed");
                Err(error)
            }
        }
    }

    fn skip(&mut self, category: StatementCategory, sql: &str, reason: &str) -> Disposition {
        debug!(category = category.as_str(), reason, "statement skipped");
        self.log
            .record(Disposition::Skipped, category, format!("{reason}: {}", snippet(sql)));
        Disposition::Skipped
    }

    /// Cluster objects are gated by the toggle matching the object named.
    fn cluster_allowed(&self, sql: &str) -> (bool, &'static str) {
        let object = sql.split_whitespace().nth(1);
        match object {
            Some(word) if word.eq_ignore_ascii_case("TABLESPACE") => {
                (self.options.tablespaces, "tablespace changes disabled")
            }
            Some(word) if word.eq_ignore_ascii_case("DATABASE") => {
                (self.options.schema_create, "schema creation disabled")
            }
            _ => (self.options.roles, "role changes disabled"),
        }
    }

    /// One-time truncation of a data statement's target, tracked in the
    /// shared ledger. Only COPY and INSERT name a loadable target.
    async fn truncate_data_target(&mut self, sql: &str) -> Result<(), ExecuteError> {
        let Some(table) = data_target(sql) else {
            return Ok(());
        };
        if self.state.truncated.contains(&table) {
            return Ok(());
        }
        let statement = format!("TRUNCATE TABLE {table}");
        match self.connection.execute(&statement).await {
            Ok(_) => {
                debug!(table = %table, "truncated before restore load");
                self.state.truncated.mark(table);
                Ok(())
            }
            Err(source) => {
                let error = statement_error(&statement, source);
                self.log
                    .record(Disposition::Failed, StatementCategory::Data, error.to_string());
                Err(error)
            }
        }
    }

    fn copy_failed(
        &mut self,
        directive: &str,
        lines_sent: u64,
        source: PgdockError,
    ) -> ExecuteError {
        let error = ExecuteError::CopyBlock {
            lines_sent,
            message: source.to_string(),
        };
        self.log.record(
            Disposition::Failed,
            StatementCategory::Data,
            format!("{error}: {}", snippet(directive)),
        );
        warn!(lines_sent, %error, "copy block failed");
        error
    }
}

impl std::fmt::Debug for RestoreExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestoreExecutor")
            .field("options", &self.options)
            .field("deferred", &self.state.deferred.len())
            .field("ownership_queue", &self.state.ownership_queue.len())
            .field("rights_queue", &self.state.rights_queue.len())
            .finish()
    }
}

fn snippet(sql: &str) -> String {
    sql.chars().take(STATEMENT_SNIPPET_CHARS).collect()
}

fn statement_error(sql: &str, source: PgdockError) -> ExecuteError {
    ExecuteError::Statement {
        statement: snippet(sql),
        code: source.server_code().map(str::to_string),
        message: source.to_string(),
    }
}

/// Table named by a COPY or INSERT statement, identifier kept verbatim.
fn data_target(sql: &str) -> Option<String> {
    let mut words = sql.split_whitespace();
    let first = words.next()?;
    let raw = if first.eq_ignore_ascii_case("COPY") {
        words.next()?
    } else if first.eq_ignore_ascii_case("INSERT") {
        let into = words.next()?;
        if !into.eq_ignore_ascii_case("INTO") {
            return None;
        }
        words.next()?
    } else {
        return None;
    };
    let name = raw.split('(').next()?.trim_end_matches(';');
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pgdock_core::CopyChannel;
    use std::sync::Mutex;

    /// Records every executed statement; fails any statement containing the
    /// configured marker.
    struct TrackingConnection {
        user: &'static str,
        executed: Mutex<Vec<String>>,
        directives: Mutex<Vec<String>>,
        sent: Arc<Mutex<Vec<String>>>,
        fail_containing: Option<&'static str>,
    }

    impl TrackingConnection {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                user: "app",
                executed: Mutex::new(Vec::new()),
                directives: Mutex::new(Vec::new()),
                sent: Arc::new(Mutex::new(Vec::new())),
                fail_containing: None,
            })
        }

        fn failing_on(marker: &'static str) -> Arc<Self> {
            Arc::new(Self {
                user: "app",
                executed: Mutex::new(Vec::new()),
                directives: Mutex::new(Vec::new()),
                sent: Arc::new(Mutex::new(Vec::new())),
                fail_containing: Some(marker),
            })
        }

        fn executed_sql(&self) -> Vec<String> {
            self.executed.lock().unwrap().clone()
        }

        fn sent_lines(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Connection for TrackingConnection {
        fn driver_name(&self) -> &str {
            "postgresql"
        }

        fn session_user(&self) -> &str {
            self.user
        }

        async fn execute(&self, sql: &str) -> pgdock_core::Result<u64> {
            if let Some(marker) = self.fail_containing {
                if sql.contains(marker) {
                    return Err(PgdockError::Server {
                        code: Some("42501".to_string()),
                        message: "permission denied".to_string(),
                    });
                }
            }
            self.executed.lock().unwrap().push(sql.to_string());
            Ok(0)
        }

        async fn copy_in(&self, directive: &str) -> pgdock_core::Result<Box<dyn CopyChannel>> {
            self.directives.lock().unwrap().push(directive.to_string());
            Ok(Box::new(RecordingChannel {
                sent: Arc::clone(&self.sent),
                data_lines: 0,
            }))
        }
    }

    struct RecordingChannel {
        sent: Arc<Mutex<Vec<String>>>,
        data_lines: u64,
    }

    #[async_trait]
    impl CopyChannel for RecordingChannel {
        async fn send(&mut self, line: &[u8]) -> pgdock_core::Result<()> {
            let text = String::from_utf8_lossy(line).into_owned();
            if text != "\\.\n" {
                self.data_lines += 1;
            }
            self.sent.lock().unwrap().push(text);
            Ok(())
        }

        async fn finish(self: Box<Self>) -> pgdock_core::Result<u64> {
            Ok(self.data_lines)
        }
    }

    fn executor(conn: &Arc<TrackingConnection>) -> RestoreExecutor {
        RestoreExecutor::new(
            Arc::clone(conn) as Arc<dyn Connection>,
            RestoreOptions::default(),
        )
    }

    fn executor_with(conn: &Arc<TrackingConnection>, options: RestoreOptions) -> RestoreExecutor {
        RestoreExecutor::new(Arc::clone(conn) as Arc<dyn Connection>, options)
    }

    #[tokio::test]
    async fn test_schema_objects_execute_inline() {
        let conn = TrackingConnection::new();
        let mut exec = executor(&conn);
        let disposition = exec.execute("CREATE TABLE t (id int)").await.unwrap();
        assert_eq!(disposition, Disposition::Executed);
        assert_eq!(conn.executed_sql(), vec!["CREATE TABLE t (id int)".to_string()]);
    }

    #[tokio::test]
    async fn test_rights_are_queued_until_finalize() {
        let conn = TrackingConnection::new();
        let mut exec = executor(&conn);
        let disposition = exec.execute("GRANT SELECT ON t TO analyst").await.unwrap();
        assert_eq!(disposition, Disposition::Queued);
        assert!(conn.executed_sql().is_empty());
        assert_eq!(exec.state().rights_queue().len(), 1);

        let summary = exec.finalize().await.unwrap();
        assert_eq!(conn.executed_sql(), vec!["GRANT SELECT ON t TO analyst".to_string()]);
        assert_eq!(summary.queued, 1);
        assert_eq!(summary.executed, 1);
        assert!(exec.state().rights_queue().is_empty());
    }

    #[tokio::test]
    async fn test_membership_grant_to_acting_user_is_deferred() {
        let conn = TrackingConnection::new();
        let mut exec = executor(&conn);
        let disposition = exec.execute("GRANT admin TO app").await.unwrap();
        assert_eq!(disposition, Disposition::Deferred);
        assert!(conn.executed_sql().is_empty());
        assert_eq!(exec.state().deferred(), ["GRANT admin TO app"]);

        exec.finalize().await.unwrap();
        assert_eq!(conn.executed_sql(), vec!["GRANT admin TO app".to_string()]);
    }

    #[tokio::test]
    async fn test_finalize_replays_ownership_then_rights_then_deferred() {
        let conn = TrackingConnection::new();
        let mut exec = executor(&conn);
        exec.execute("GRANT admin TO app").await.unwrap();
        exec.execute("GRANT SELECT ON t TO carol").await.unwrap();
        exec.execute("ALTER TABLE t OWNER TO bob").await.unwrap();
        assert!(conn.executed_sql().is_empty());

        exec.finalize().await.unwrap();
        assert_eq!(
            conn.executed_sql(),
            vec![
                "ALTER TABLE t OWNER TO bob".to_string(),
                "GRANT SELECT ON t TO carol".to_string(),
                "GRANT admin TO app".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_drop_blocked_by_default_and_allowed_by_policy() {
        let conn = TrackingConnection::new();
        let mut exec = executor(&conn);
        let disposition = exec.execute("DROP TABLE users").await.unwrap();
        assert_eq!(disposition, Disposition::Blocked);
        assert!(conn.executed_sql().is_empty());

        let conn = TrackingConnection::new();
        let mut exec = executor_with(&conn, RestoreOptions::default().with_allow_drops(true));
        let disposition = exec.execute("DROP TABLE users").await.unwrap();
        assert_eq!(disposition, Disposition::Executed);
        assert_eq!(conn.executed_sql(), vec!["DROP TABLE users".to_string()]);
    }

    #[tokio::test]
    async fn test_data_disabled_skips_statement() {
        let conn = TrackingConnection::new();
        let mut exec = executor_with(&conn, RestoreOptions::default().with_data(false));
        let disposition = exec.execute("INSERT INTO t VALUES (1)").await.unwrap();
        assert_eq!(disposition, Disposition::Skipped);
        assert!(conn.executed_sql().is_empty());
        assert_eq!(exec.summary().skipped, 1);
    }

    #[tokio::test]
    async fn test_truncate_policy_truncates_each_target_once() {
        let conn = TrackingConnection::new();
        let mut exec = executor_with(&conn, RestoreOptions::default().with_truncate(true));
        exec.execute("INSERT INTO users VALUES (1)").await.unwrap();
        exec.execute("INSERT INTO users VALUES (2)").await.unwrap();
        exec.execute("INSERT INTO orders VALUES (1)").await.unwrap();

        assert_eq!(
            conn.executed_sql(),
            vec![
                "TRUNCATE TABLE users".to_string(),
                "INSERT INTO users VALUES (1)".to_string(),
                "INSERT INTO users VALUES (2)".to_string(),
                "TRUNCATE TABLE orders".to_string(),
                "INSERT INTO orders VALUES (1)".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_truncation_dedup_crosses_identifier_spellings() {
        let conn = TrackingConnection::new();
        let mut exec = executor_with(&conn, RestoreOptions::default().with_truncate(true));
        // the bulk-load path records its target without quotes
        exec.truncation_ledger().mark("public.users");

        exec.execute(r#"INSERT INTO "public"."users" VALUES (1)"#)
            .await
            .unwrap();
        assert_eq!(
            conn.executed_sql(),
            vec![r#"INSERT INTO "public"."users" VALUES (1)"#.to_string()]
        );
    }

    #[tokio::test]
    async fn test_connection_change_is_never_executed() {
        let conn = TrackingConnection::new();
        let mut exec = executor(&conn);
        let disposition = exec.execute("\\connect other_db").await.unwrap();
        assert_eq!(disposition, Disposition::Skipped);
        assert!(conn.executed_sql().is_empty());
    }

    #[tokio::test]
    async fn test_role_creation_gated_by_toggle() {
        let conn = TrackingConnection::new();
        let mut exec = executor(&conn);
        assert_eq!(
            exec.execute("CREATE ROLE analyst").await.unwrap(),
            Disposition::Skipped
        );

        let conn = TrackingConnection::new();
        let mut exec = executor_with(&conn, RestoreOptions::default().with_roles(true));
        assert_eq!(
            exec.execute("CREATE ROLE analyst").await.unwrap(),
            Disposition::Executed
        );
    }

    #[tokio::test]
    async fn test_tablespace_creation_gated_by_toggle() {
        let conn = TrackingConnection::new();
        let mut exec = executor_with(&conn, RestoreOptions::default().with_roles(true));
        assert_eq!(
            exec.execute("CREATE TABLESPACE fast LOCATION '/ssd'")
                .await
                .unwrap(),
            Disposition::Skipped
        );

        let conn = TrackingConnection::new();
        let mut exec = executor_with(&conn, RestoreOptions::default().with_tablespaces(true));
        assert_eq!(
            exec.execute("CREATE TABLESPACE fast LOCATION '/ssd'")
                .await
                .unwrap(),
            Disposition::Executed
        );
    }

    #[tokio::test]
    async fn test_category_filter_skips_disallowed_categories() {
        let conn = TrackingConnection::new();
        let mut exec = executor(&conn)
            .with_category_filter(|category| category != StatementCategory::SchemaObject);
        assert_eq!(
            exec.execute("CREATE TABLE t (id int)").await.unwrap(),
            Disposition::Skipped
        );
        assert_eq!(
            exec.execute("SET search_path = public").await.unwrap(),
            Disposition::Executed
        );
    }

    #[tokio::test]
    async fn test_abort_mode_stops_batch_at_first_failure() {
        let conn = TrackingConnection::failing_on("boom");
        let mut exec = executor(&conn);
        let result = exec
            .run_batch(["CREATE TABLE boom (id int)", "CREATE TABLE ok (id int)"])
            .await;
        assert!(result.is_err());
        assert!(conn.executed_sql().is_empty());
        assert_eq!(exec.summary().failed, 1);
    }

    #[tokio::test]
    async fn test_continue_mode_records_failure_and_proceeds() {
        let conn = TrackingConnection::failing_on("boom");
        let mut exec = executor_with(
            &conn,
            RestoreOptions::default().with_error_mode(ErrorMode::Continue),
        );
        let summary = exec
            .run_batch(["CREATE TABLE boom (id int)", "CREATE TABLE ok (id int)"])
            .await
            .unwrap();
        assert_eq!(conn.executed_sql(), vec!["CREATE TABLE ok (id int)".to_string()]);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.executed, 1);
    }

    #[tokio::test]
    async fn test_statement_error_carries_code_and_snippet() {
        let conn = TrackingConnection::failing_on("boom");
        let mut exec = executor(&conn);
        let long_tail = "x".repeat(300);
        let sql = format!("CREATE TABLE boom (c {long_tail})");
        let err = exec.execute(&sql).await.unwrap_err();
        match err {
            ExecuteError::Statement {
                statement,
                code,
                message,
            } => {
                assert_eq!(statement.chars().count(), 200);
                assert_eq!(code.as_deref(), Some("42501"));
                assert!(message.contains("permission denied"));
            }
            other => panic!("expected statement error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_copy_block_streams_lines_and_shares_truncation() {
        let conn = TrackingConnection::new();
        let mut exec = executor_with(&conn, RestoreOptions::default().with_truncate(true));
        let rows = exec
            .execute_copy_block("COPY users (id) FROM stdin;", "1\n2\n\\.\n")
            .await
            .unwrap();
        assert_eq!(rows, 2);
        assert_eq!(
            conn.sent_lines(),
            vec!["1\n".to_string(), "2\n".to_string(), "\\.\n".to_string()]
        );
        assert_eq!(conn.executed_sql(), vec!["TRUNCATE TABLE users".to_string()]);

        // a later data statement against the same table must not re-truncate
        exec.execute("INSERT INTO users VALUES (3)").await.unwrap();
        assert_eq!(
            conn.executed_sql(),
            vec![
                "TRUNCATE TABLE users".to_string(),
                "INSERT INTO users VALUES (3)".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_copy_block_skipped_when_data_disabled() {
        let conn = TrackingConnection::new();
        let mut exec = executor_with(&conn, RestoreOptions::default().with_data(false));
        let rows = exec
            .execute_copy_block("COPY users (id) FROM stdin;", "1\n\\.\n")
            .await
            .unwrap();
        assert_eq!(rows, 0);
        assert!(conn.sent_lines().is_empty());
    }
}
