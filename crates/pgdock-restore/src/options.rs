//! Operator policy for one restore run.

use serde::{Deserialize, Serialize};

/// What to do when a statement fails against the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Stop the batch at the first failure; remaining statements stay
    /// unexecuted.
    Abort,
    /// Record the failure in the log and keep going.
    Continue,
}

/// Policy switches consulted per statement category.
///
/// The defaults restore schema and data as the dump describes them while
/// refusing everything that reaches outside the target database: no drops,
/// no role or tablespace creation, and self-affecting role edits held back
/// until the end of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreOptions {
    /// Execute data statements (COPY/INSERT/UPDATE/DELETE/TRUNCATE).
    pub data: bool,
    /// Truncate each data target once before its first load.
    pub truncate: bool,
    /// Execute DROP statements instead of blocking them.
    pub allow_drops: bool,
    /// Queue and replay ownership transfers.
    pub ownership: bool,
    /// Queue and replay GRANT/REVOKE statements.
    pub rights: bool,
    /// Execute CREATE/ALTER SCHEMA and CREATE/ALTER DATABASE.
    pub schema_create: bool,
    /// Execute role, user, and group creation.
    pub roles: bool,
    /// Execute tablespace creation.
    pub tablespaces: bool,
    /// Hold statements that would alter the acting role until `finalize`.
    pub defer_self: bool,
    /// Abort or continue on statement failure.
    pub error_mode: ErrorMode,
    /// The session runs with elevated privilege; self-affecting statements
    /// may execute inline when deferral is off.
    pub superuser: bool,
    /// The run targets the whole server rather than one database.
    pub server_scope: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            data: true,
            truncate: false,
            allow_drops: false,
            ownership: true,
            rights: true,
            schema_create: true,
            roles: false,
            tablespaces: false,
            defer_self: true,
            error_mode: ErrorMode::Abort,
            superuser: false,
            server_scope: false,
        }
    }
}

impl RestoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(mut self, data: bool) -> Self {
        self.data = data;
        self
    }

    pub fn with_truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    pub fn with_allow_drops(mut self, allow: bool) -> Self {
        self.allow_drops = allow;
        self
    }

    pub fn with_ownership(mut self, ownership: bool) -> Self {
        self.ownership = ownership;
        self
    }

    pub fn with_rights(mut self, rights: bool) -> Self {
        self.rights = rights;
        self
    }

    pub fn with_schema_create(mut self, schema_create: bool) -> Self {
        self.schema_create = schema_create;
        self
    }

    pub fn with_roles(mut self, roles: bool) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_tablespaces(mut self, tablespaces: bool) -> Self {
        self.tablespaces = tablespaces;
        self
    }

    pub fn with_defer_self(mut self, defer: bool) -> Self {
        self.defer_self = defer;
        self
    }

    pub fn with_error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    pub fn with_superuser(mut self, superuser: bool) -> Self {
        self.superuser = superuser;
        self
    }

    pub fn with_server_scope(mut self, server_scope: bool) -> Self {
        self.server_scope = server_scope;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_conservative() {
        let options = RestoreOptions::default();
        assert!(options.data);
        assert!(!options.truncate);
        assert!(!options.allow_drops);
        assert!(options.ownership);
        assert!(options.rights);
        assert!(options.schema_create);
        assert!(!options.roles);
        assert!(!options.tablespaces);
        assert!(options.defer_self);
        assert_eq!(options.error_mode, ErrorMode::Abort);
        assert!(!options.superuser);
        assert!(!options.server_scope);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let options: RestoreOptions =
            serde_json::from_str(r#"{"allow_drops": true, "error_mode": "continue"}"#).unwrap();
        assert!(options.allow_drops);
        assert_eq!(options.error_mode, ErrorMode::Continue);
        assert!(options.defer_self);
        assert!(options.data);
    }
}
