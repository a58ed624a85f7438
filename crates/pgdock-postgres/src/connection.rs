//! PostgreSQL connection implementation.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use native_tls::{Certificate, TlsConnector};
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::{Client, Config, CopyInSink, NoTls, SimpleQueryMessage};

use pgdock_core::{Connection, CopyChannel, PgdockError, Result};

use crate::options::{ConnectOptions, SslMode};

fn map_server_error(error: tokio_postgres::Error) -> PgdockError {
    let Some(db_error) = error.as_db_error() else {
        return PgdockError::Connection(error.to_string());
    };

    let mut message = db_error.message().to_string();
    if let Some(detail) = db_error.detail() {
        if !detail.trim().is_empty() {
            message.push_str(&format!(" (detail: {detail})"));
        }
    }
    if let Some(hint) = db_error.hint() {
        if !hint.trim().is_empty() {
            message.push_str(&format!(" (hint: {hint})"));
        }
    }

    PgdockError::Server {
        code: Some(db_error.code().code().to_string()),
        message,
    }
}

/// Copy-path errors keep their SQLSTATE when the server rejected the data;
/// anything else is a broken stream.
fn map_copy_error(error: tokio_postgres::Error) -> PgdockError {
    if error.as_db_error().is_some() {
        map_server_error(error)
    } else {
        PgdockError::Copy(error.to_string())
    }
}

/// A live connection to one PostgreSQL database.
///
/// The wrapped client multiplexes concurrent statements itself, so the
/// connection is shared by reference without extra locking.
pub struct PostgresConnection {
    client: Client,
    session_user: String,
}

impl PostgresConnection {
    /// Connects, spawns the background socket task, and resolves the
    /// session user the server actually authenticated.
    pub async fn connect(options: ConnectOptions) -> Result<Self> {
        tracing::info!(
            host = %options.host,
            port = options.port,
            database = %options.database,
            ssl_mode = %options.ssl_mode,
            "connecting to PostgreSQL database"
        );

        let mut config = Config::new();
        config
            .host(&options.host)
            .port(options.port)
            .dbname(&options.database)
            .user(&options.user)
            .application_name(&options.application_name)
            .ssl_mode(options.ssl_mode.wire_mode());
        if let Some(password) = &options.password {
            config.password(password);
        }
        if let Some(timeout) = options.connect_timeout {
            config.connect_timeout(timeout);
        }

        let client = match options.ssl_mode {
            SslMode::Disable => {
                let (client, connection) =
                    config.connect(NoTls).await.map_err(connect_failed)?;
                tokio::spawn(async move {
                    if let Err(error) = connection.await {
                        tracing::error!(%error, "PostgreSQL connection error");
                    }
                });
                client
            }
            SslMode::Prefer | SslMode::Require => {
                let tls = build_tls(&options)?;
                let (client, connection) =
                    config.connect(tls).await.map_err(connect_failed)?;
                tokio::spawn(async move {
                    if let Err(error) = connection.await {
                        tracing::error!(%error, "PostgreSQL connection error");
                    }
                });
                client
            }
        };

        let session_user = resolve_session_user(&client).await?;
        tracing::info!(
            host = %options.host,
            database = %options.database,
            session_user = %session_user,
            "PostgreSQL connection established"
        );
        Ok(Self {
            client,
            session_user,
        })
    }
}

fn connect_failed(error: tokio_postgres::Error) -> PgdockError {
    PgdockError::Connection(format!("Failed to connect to PostgreSQL: {error}"))
}

fn build_tls(options: &ConnectOptions) -> Result<MakeTlsConnector> {
    let mut builder = TlsConnector::builder();
    if let Some(path) = &options.ssl_root_cert {
        let pem = std::fs::read(path).map_err(|e| {
            PgdockError::Connection(format!("Failed to read CA certificate: {e}"))
        })?;
        let certificate = Certificate::from_pem(&pem).map_err(|e| {
            PgdockError::Connection(format!("Failed to parse CA certificate: {e}"))
        })?;
        builder.add_root_certificate(certificate);
    } else {
        // without a CA to verify against, take the certificate the server
        // presents (matches libpq's sslmode=require)
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    }
    let connector = builder
        .build()
        .map_err(|e| PgdockError::Connection(format!("Failed to build TLS connector: {e}")))?;
    Ok(MakeTlsConnector::new(connector))
}

/// `current_user` as the server reports it, so self-affecting statement
/// detection works even when authentication mapped the login elsewhere.
async fn resolve_session_user(client: &Client) -> Result<String> {
    let messages = client
        .simple_query("SELECT current_user")
        .await
        .map_err(map_server_error)?;
    for message in messages {
        if let SimpleQueryMessage::Row(row) = message {
            if let Some(user) = row.try_get(0).map_err(map_server_error)? {
                return Ok(user.to_string());
            }
        }
    }
    Err(PgdockError::Connection(
        "server did not report current_user".to_string(),
    ))
}

#[async_trait]
impl Connection for PostgresConnection {
    fn driver_name(&self) -> &str {
        "postgresql"
    }

    fn session_user(&self) -> &str {
        &self.session_user
    }

    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str) -> Result<u64> {
        // simple_query because restore statements (COPY, utility commands,
        // multi-word DDL) are not all preparable
        let messages = self
            .client
            .simple_query(sql)
            .await
            .map_err(map_server_error)?;

        let mut affected = 0;
        for message in messages {
            if let SimpleQueryMessage::CommandComplete(rows) = message {
                affected = rows;
            }
        }
        tracing::debug!(affected_rows = affected, "statement executed");
        Ok(affected)
    }

    #[tracing::instrument(skip(self))]
    async fn copy_in(&self, directive: &str) -> Result<Box<dyn CopyChannel>> {
        let sink: CopyInSink<Bytes> = self
            .client
            .copy_in(directive)
            .await
            .map_err(map_copy_error)?;
        tracing::debug!(directive, "copy channel opened");
        Ok(Box::new(PgCopyChannel {
            sink: Box::pin(sink),
        }))
    }
}

impl std::fmt::Debug for PostgresConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConnection")
            .field("session_user", &self.session_user)
            .finish()
    }
}

/// One open COPY FROM STDIN stream. Dropping it without `finish` makes the
/// server abort the load, which is exactly the poisoned-loader contract.
struct PgCopyChannel {
    sink: Pin<Box<CopyInSink<Bytes>>>,
}

#[async_trait]
impl CopyChannel for PgCopyChannel {
    async fn send(&mut self, line: &[u8]) -> Result<()> {
        self.sink
            .send(Bytes::copy_from_slice(line))
            .await
            .map_err(map_copy_error)
    }

    async fn finish(mut self: Box<Self>) -> Result<u64> {
        self.sink.as_mut().finish().await.map_err(map_copy_error)
    }
}
