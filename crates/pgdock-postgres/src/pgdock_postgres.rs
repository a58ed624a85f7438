//! PostgreSQL driver implementation.

mod connection;
mod options;

pub use connection::PostgresConnection;
pub use options::{ConnectOptions, SslMode};
