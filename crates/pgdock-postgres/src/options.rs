//! Connection settings for the PostgreSQL driver.

use std::path::PathBuf;
use std::time::Duration;

/// TLS posture for the server link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    /// Plain TCP only.
    Disable,
    /// TLS when the server supports it, plain otherwise.
    Prefer,
    /// TLS or fail.
    Require,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
        }
    }

    pub(crate) fn wire_mode(&self) -> tokio_postgres::config::SslMode {
        match self {
            SslMode::Disable => tokio_postgres::config::SslMode::Disable,
            SslMode::Prefer => tokio_postgres::config::SslMode::Prefer,
            SslMode::Require => tokio_postgres::config::SslMode::Require,
        }
    }
}

impl std::fmt::Display for SslMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub ssl_mode: SslMode,
    /// CA certificate (PEM) to verify the server against. Without one,
    /// `prefer` and `require` accept whatever certificate the server
    /// presents.
    pub ssl_root_cert: Option<PathBuf>,
    pub connect_timeout: Option<Duration>,
    /// Reported to the server as `application_name`.
    pub application_name: String,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: None,
            ssl_mode: SslMode::Prefer,
            ssl_root_cert: None,
            connect_timeout: Some(Duration::from_secs(30)),
            application_name: "pgdock".to_string(),
        }
    }
}

impl ConnectOptions {
    pub fn new(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_ssl_mode(mut self, mode: SslMode) -> Self {
        self.ssl_mode = mode;
        self
    }

    pub fn with_ssl_root_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ssl_root_cert = Some(path.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ConnectOptions::default();
        assert_eq!(options.host, "localhost");
        assert_eq!(options.port, 5432);
        assert_eq!(options.database, "postgres");
        assert_eq!(options.ssl_mode, SslMode::Prefer);
        assert!(options.password.is_none());
        assert_eq!(options.application_name, "pgdock");
    }

    #[test]
    fn test_builders_compose() {
        let options = ConnectOptions::new("db.internal", "inventory")
            .with_port(5433)
            .with_user("loader")
            .with_password("secret")
            .with_ssl_mode(SslMode::Require)
            .with_application_name("pgdock-import");
        assert_eq!(options.host, "db.internal");
        assert_eq!(options.port, 5433);
        assert_eq!(options.database, "inventory");
        assert_eq!(options.user, "loader");
        assert_eq!(options.password.as_deref(), Some("secret"));
        assert_eq!(options.ssl_mode, SslMode::Require);
        assert_eq!(options.application_name, "pgdock-import");
    }

    #[test]
    fn test_ssl_mode_names() {
        assert_eq!(SslMode::Disable.as_str(), "disable");
        assert_eq!(SslMode::Prefer.to_string(), "prefer");
        assert_eq!(SslMode::Require.as_str(), "require");
    }
}
