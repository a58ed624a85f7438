//! Error types for pgdock

use thiserror::Error;

/// Database-facing error type. Drivers map their native errors into this;
/// the import and restore engines wrap it in their own error enums.
#[derive(Debug, Error)]
pub enum PgdockError {
    #[error("connection error: {0}")]
    Connection(String),

    /// Error reported by the server. `code` carries the SQLSTATE when the
    /// driver was able to extract one.
    #[error("{message}")]
    Server {
        code: Option<String>,
        message: String,
    },

    #[error("copy channel error: {0}")]
    Copy(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PgdockError {
    /// SQLSTATE of a server-reported error, if any.
    pub fn server_code(&self) -> Option<&str> {
        match self {
            PgdockError::Server { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Result type alias for pgdock operations
pub type Result<T> = std::result::Result<T, PgdockError>;
