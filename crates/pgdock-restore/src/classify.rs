//! Statement classification.
//!
//! [`classify`] inspects one trimmed SQL statement plus the acting role name
//! and produces exactly one category; the executor keys its whole policy off
//! the result. Matching is anchored at the statement head, case-insensitive
//! for keywords and unquoted identifiers, and exact for quoted identifiers.

use serde::{Deserialize, Serialize};

/// Restore policy contract: every statement lands in exactly one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementCategory {
    /// Meta command switching the connection (`\connect`, `\c`).
    ConnectionChange,
    /// Alters the privileges or identity of the acting role itself.
    SelfAffecting,
    /// `DROP ...`
    Drop,
    /// `ALTER ... OWNER TO` or `REASSIGN OWNED`.
    OwnershipChange,
    /// `GRANT` / `REVOKE` on objects.
    Rights,
    /// Role, user, group, database, or tablespace definition.
    ClusterObject,
    /// Schema definition.
    DbObject,
    /// Tables, views, indexes, functions, and the rest of the in-schema DDL.
    SchemaObject,
    /// `COPY` / `INSERT` / `UPDATE` / `DELETE` / `TRUNCATE`.
    Data,
    /// Anything unmatched; executed under default policy.
    Unknown,
}

impl StatementCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionChange => "connection_change",
            Self::SelfAffecting => "self_affecting",
            Self::Drop => "drop",
            Self::OwnershipChange => "ownership_change",
            Self::Rights => "rights",
            Self::ClusterObject => "cluster_object",
            Self::DbObject => "db_object",
            Self::SchemaObject => "schema_object",
            Self::Data => "data",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for StatementCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Words that may sit between CREATE/ALTER and the object keyword.
const NOISE_WORDS: &[&str] = &[
    "OR",
    "REPLACE",
    "UNIQUE",
    "TEMP",
    "TEMPORARY",
    "UNLOGGED",
    "GLOBAL",
    "LOCAL",
    "IF",
    "NOT",
    "EXISTS",
    "CONCURRENTLY",
    "MATERIALIZED",
    "RECURSIVE",
    "FOREIGN",
];

const SCHEMA_OBJECTS: &[&str] = &[
    "TABLE",
    "VIEW",
    "INDEX",
    "SEQUENCE",
    "FUNCTION",
    "PROCEDURE",
    "TRIGGER",
    "TYPE",
    "DOMAIN",
    "AGGREGATE",
    "OPERATOR",
    "RULE",
    "EXTENSION",
];

const CLUSTER_OBJECTS: &[&str] = &["ROLE", "USER", "GROUP", "DATABASE", "TABLESPACE"];

const DATA_STATEMENTS: &[&str] = &["COPY", "INSERT", "UPDATE", "DELETE", "TRUNCATE"];

/// Classifies one statement. Pure: the same text and user always yield the
/// same category. Checks run in precedence order, first match wins:
/// connection meta, self-affecting role edits, DROP, ownership transfer,
/// GRANT/REVOKE, definition statements, COMMENT, data statements, unknown.
pub fn classify(sql: &str, acting_user: &str) -> StatementCategory {
    let text = sql.trim_start();
    if text.starts_with('\\') {
        return classify_meta(text);
    }

    let tokens: Vec<&str> = text.split_whitespace().collect();
    let Some(&first) = tokens.first() else {
        return StatementCategory::Unknown;
    };

    if is_self_affecting(&tokens, acting_user) {
        return StatementCategory::SelfAffecting;
    }
    if word_eq(first, "DROP") {
        return StatementCategory::Drop;
    }
    if word_eq(first, "REASSIGN") || (word_eq(first, "ALTER") && has_owner_to(&tokens)) {
        return StatementCategory::OwnershipChange;
    }
    if word_eq(first, "GRANT") || word_eq(first, "REVOKE") {
        return StatementCategory::Rights;
    }
    if word_eq(first, "CREATE") || word_eq(first, "ALTER") {
        return classify_definition(&tokens);
    }
    if word_eq(first, "COMMENT") {
        return StatementCategory::SchemaObject;
    }
    if DATA_STATEMENTS.iter().any(|kw| word_eq(first, kw)) {
        return StatementCategory::Data;
    }
    StatementCategory::Unknown
}

fn classify_meta(text: &str) -> StatementCategory {
    let word = text.split_whitespace().next().unwrap_or(text);
    if word == "\\connect" || word == "\\c" {
        StatementCategory::ConnectionChange
    } else {
        StatementCategory::Unknown
    }
}

fn classify_definition(tokens: &[&str]) -> StatementCategory {
    let object = tokens[1..]
        .iter()
        .find(|t| !NOISE_WORDS.iter().any(|n| word_eq(t, n)));
    let Some(object) = object else {
        return StatementCategory::Unknown;
    };
    if CLUSTER_OBJECTS.iter().any(|k| word_eq(object, k)) {
        return StatementCategory::ClusterObject;
    }
    if word_eq(object, "SCHEMA") {
        return StatementCategory::DbObject;
    }
    if SCHEMA_OBJECTS.iter().any(|k| word_eq(object, k)) {
        return StatementCategory::SchemaObject;
    }
    StatementCategory::Unknown
}

/// Detects statements that would change the acting role's own privileges or
/// identity: `ALTER/DROP ROLE|USER <me>`, role-membership `GRANT <role> TO
/// <me>` / `REVOKE <role> FROM <me>` (no `ON` clause), and
/// `REASSIGN OWNED BY <me>`.
fn is_self_affecting(tokens: &[&str], user: &str) -> bool {
    if user.is_empty() {
        return false;
    }
    let Some(&first) = tokens.first() else {
        return false;
    };

    if word_eq(first, "ALTER")
        && tokens.len() >= 3
        && (word_eq(tokens[1], "ROLE") || word_eq(tokens[1], "USER"))
    {
        return ident_matches(tokens[2], user);
    }

    if word_eq(first, "DROP")
        && tokens.len() >= 3
        && (word_eq(tokens[1], "ROLE") || word_eq(tokens[1], "USER"))
    {
        return tokens[2..]
            .iter()
            .filter(|t| !word_eq(t, "IF") && !word_eq(t, "EXISTS"))
            .any(|t| list_matches(t, user));
    }

    // A GRANT/REVOKE without ON grants or revokes role membership.
    if word_eq(first, "GRANT") && !contains_word(tokens, "ON") {
        if let Some(to) = position_of(tokens, "TO") {
            return tokens[to + 1..]
                .iter()
                .take_while(|t| !word_eq(t, "WITH") && !word_eq(t, "GRANTED"))
                .any(|t| list_matches(t, user));
        }
    }
    if word_eq(first, "REVOKE") && !contains_word(tokens, "ON") {
        if let Some(from) = position_of(tokens, "FROM") {
            return tokens[from + 1..]
                .iter()
                .take_while(|t| {
                    !word_eq(t, "CASCADE") && !word_eq(t, "RESTRICT") && !word_eq(t, "GRANTED")
                })
                .any(|t| list_matches(t, user));
        }
    }

    if word_eq(first, "REASSIGN")
        && tokens.len() >= 4
        && word_eq(tokens[1], "OWNED")
        && word_eq(tokens[2], "BY")
    {
        let to = position_of(tokens, "TO").unwrap_or(tokens.len());
        return tokens[3..to].iter().any(|t| list_matches(t, user));
    }

    false
}

fn word_eq(token: &str, keyword: &str) -> bool {
    token.eq_ignore_ascii_case(keyword)
}

fn contains_word(tokens: &[&str], keyword: &str) -> bool {
    tokens.iter().any(|t| word_eq(t, keyword))
}

fn position_of(tokens: &[&str], keyword: &str) -> Option<usize> {
    tokens.iter().position(|t| word_eq(t, keyword))
}

fn has_owner_to(tokens: &[&str]) -> bool {
    tokens
        .windows(2)
        .any(|pair| word_eq(pair[0], "OWNER") && word_eq(pair[1], "TO"))
}

/// `token` may be a comma-joined identifier list (`a,b,c`).
fn list_matches(token: &str, user: &str) -> bool {
    token
        .split(',')
        .filter(|part| !part.is_empty())
        .any(|part| ident_matches(part, user))
}

/// Unquoted identifiers fold case; quoted identifiers compare exactly.
fn ident_matches(token: &str, user: &str) -> bool {
    let token = token.trim_end_matches(';');
    if let Some(inner) = token.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        inner.replace("\"\"", "\"") == user
    } else {
        token.eq_ignore_ascii_case(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(sql: &str) -> StatementCategory {
        classify(sql, "app")
    }

    mod self_affecting_tests {
        use super::*;

        #[test]
        fn test_alter_role_acting_user() {
            assert_eq!(cat("ALTER ROLE app PASSWORD 'x'"), StatementCategory::SelfAffecting);
            assert_eq!(cat("ALTER USER APP SET search_path = s"), StatementCategory::SelfAffecting);
            assert_eq!(cat("alter role app rename to other"), StatementCategory::SelfAffecting);
        }

        #[test]
        fn test_alter_role_other_user_is_cluster() {
            assert_eq!(cat("ALTER ROLE analyst PASSWORD 'x'"), StatementCategory::ClusterObject);
        }

        #[test]
        fn test_quoted_identifier_compares_exactly() {
            assert_eq!(cat("ALTER ROLE \"app\" NOLOGIN"), StatementCategory::SelfAffecting);
            // quoted "App" is a different role from unquoted app
            assert_eq!(cat("ALTER ROLE \"App\" NOLOGIN"), StatementCategory::ClusterObject);
        }

        #[test]
        fn test_drop_role_acting_user() {
            assert_eq!(cat("DROP ROLE app"), StatementCategory::SelfAffecting);
            assert_eq!(cat("DROP ROLE IF EXISTS legacy, app;"), StatementCategory::SelfAffecting);
            assert_eq!(cat("DROP ROLE analyst"), StatementCategory::Drop);
        }

        #[test]
        fn test_membership_grant_to_acting_user() {
            assert_eq!(cat("GRANT admin TO app"), StatementCategory::SelfAffecting);
            assert_eq!(cat("GRANT admin TO carol, app WITH ADMIN OPTION"), StatementCategory::SelfAffecting);
            assert_eq!(cat("REVOKE admin FROM app CASCADE"), StatementCategory::SelfAffecting);
            // membership of someone else stays a rights statement
            assert_eq!(cat("GRANT admin TO carol"), StatementCategory::Rights);
        }

        #[test]
        fn test_grant_with_on_clause_is_never_membership() {
            assert_eq!(cat("GRANT SELECT ON app TO analyst"), StatementCategory::Rights);
            assert_eq!(cat("REVOKE ALL ON SCHEMA s FROM app"), StatementCategory::Rights);
        }

        #[test]
        fn test_reassign_owned_by_acting_user() {
            assert_eq!(cat("REASSIGN OWNED BY app TO archive"), StatementCategory::SelfAffecting);
            assert_eq!(cat("REASSIGN OWNED BY old TO app"), StatementCategory::OwnershipChange);
        }
    }

    mod taxonomy_tests {
        use super::*;

        #[test]
        fn test_connection_meta_commands() {
            assert_eq!(cat("\\connect other_db"), StatementCategory::ConnectionChange);
            assert_eq!(cat("\\c other_db"), StatementCategory::ConnectionChange);
        }

        #[test]
        fn test_drop_statements() {
            assert_eq!(cat("DROP TABLE users CASCADE"), StatementCategory::Drop);
            assert_eq!(cat("DROP INDEX IF EXISTS idx"), StatementCategory::Drop);
        }

        #[test]
        fn test_owner_to_is_ownership_change() {
            assert_eq!(cat("ALTER TABLE users OWNER TO bob"), StatementCategory::OwnershipChange);
            assert_eq!(cat("ALTER DATABASE app_db OWNER TO bob"), StatementCategory::OwnershipChange);
        }

        #[test]
        fn test_grant_on_object_is_rights() {
            assert_eq!(cat("GRANT SELECT ON t TO role"), StatementCategory::Rights);
            assert_eq!(cat("REVOKE INSERT ON t FROM role"), StatementCategory::Rights);
        }

        #[test]
        fn test_cluster_objects() {
            assert_eq!(cat("CREATE ROLE analyst LOGIN"), StatementCategory::ClusterObject);
            assert_eq!(cat("CREATE USER bob"), StatementCategory::ClusterObject);
            assert_eq!(cat("CREATE DATABASE app_db"), StatementCategory::ClusterObject);
            assert_eq!(cat("CREATE TABLESPACE fast LOCATION '/ssd'"), StatementCategory::ClusterObject);
        }

        #[test]
        fn test_schema_is_db_object() {
            assert_eq!(cat("CREATE SCHEMA reporting"), StatementCategory::DbObject);
            assert_eq!(cat("ALTER SCHEMA reporting RENAME TO analytics"), StatementCategory::DbObject);
        }

        #[test]
        fn test_schema_objects_skip_noise_words() {
            assert_eq!(cat("CREATE TABLE t (id int)"), StatementCategory::SchemaObject);
            assert_eq!(cat("CREATE OR REPLACE FUNCTION f() RETURNS int AS $$ SELECT 1 $$ LANGUAGE sql"), StatementCategory::SchemaObject);
            assert_eq!(cat("CREATE UNIQUE INDEX CONCURRENTLY idx ON t (id)"), StatementCategory::SchemaObject);
            assert_eq!(cat("CREATE MATERIALIZED VIEW mv AS SELECT 1"), StatementCategory::SchemaObject);
            assert_eq!(cat("CREATE TEMP TABLE IF NOT EXISTS scratch (x int)"), StatementCategory::SchemaObject);
            assert_eq!(cat("COMMENT ON TABLE t IS 'users'"), StatementCategory::SchemaObject);
        }

        #[test]
        fn test_data_statements() {
            assert_eq!(cat("COPY users (id) FROM stdin;"), StatementCategory::Data);
            assert_eq!(cat("INSERT INTO users VALUES (1)"), StatementCategory::Data);
            assert_eq!(cat("UPDATE users SET name = 'x'"), StatementCategory::Data);
            assert_eq!(cat("DELETE FROM users"), StatementCategory::Data);
            assert_eq!(cat("TRUNCATE users"), StatementCategory::Data);
        }

        #[test]
        fn test_unmatched_is_unknown() {
            assert_eq!(cat("SET search_path = public"), StatementCategory::Unknown);
            assert_eq!(cat("BEGIN"), StatementCategory::Unknown);
            assert_eq!(cat("SELECT pg_catalog.setval('s', 42)"), StatementCategory::Unknown);
            assert_eq!(cat(""), StatementCategory::Unknown);
        }
    }
}
