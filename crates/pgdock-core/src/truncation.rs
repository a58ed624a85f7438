//! Shared truncate-once bookkeeping.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Records which tables have already been truncated during the current run.
///
/// Both the bulk-load streamer and the restore executor can truncate a target
/// table before loading into it. A run may reach the same table through both
/// paths (a raw COPY block and a follow-up data statement, or several chunks
/// of one upload), so the ledger is a cheaply cloneable handle over shared
/// state and every clone observes the same set. Entries are keyed by the
/// normalized identifier, so `public.users` and `"public"."users"` are one
/// table.
#[derive(Debug, Clone, Default)]
pub struct TruncationLedger {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl TruncationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `table` has already been truncated in this run.
    pub fn contains(&self, table: &str) -> bool {
        let key = normalize_key(table);
        match self.inner.lock() {
            Ok(set) => set.contains(&key),
            Err(poisoned) => poisoned.into_inner().contains(&key),
        }
    }

    /// Records that `table` has been truncated.
    pub fn mark(&self, table: impl Into<String>) {
        let key = normalize_key(&table.into());
        match self.inner.lock() {
            Ok(mut set) => {
                set.insert(key);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(key);
            }
        }
    }

    /// Number of distinct tables truncated so far.
    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(set) => set.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Canonical key for a table reference. Quoted identifier parts keep their
/// inner text exactly (`""` unescaped); unquoted parts fold ASCII case. That
/// matches how the server resolves the two spellings, so `USERS` and
/// `"users"` share an entry while `"Users"` stays distinct.
fn normalize_key(table: &str) -> String {
    let mut key = String::with_capacity(table.len());
    let mut chars = table.trim().chars().peekable();
    let mut in_quotes = false;
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    key.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            _ if in_quotes => key.push(ch),
            _ => key.push(ch.to_ascii_lowercase()),
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let ledger = TruncationLedger::new();
        let other = ledger.clone();

        assert!(!ledger.contains("public.users"));
        other.mark("public.users");
        assert!(ledger.contains("public.users"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_mark_is_idempotent() {
        let ledger = TruncationLedger::new();
        ledger.mark("public.users");
        ledger.mark("public.users");
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_spelling_variants_share_one_entry() {
        let ledger = TruncationLedger::new();
        ledger.mark("public.users");

        assert!(ledger.contains(r#""public"."users""#));
        assert!(ledger.contains("PUBLIC.Users"));
        ledger.mark(r#""public"."users""#);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_quoted_mixed_case_is_a_distinct_table() {
        let ledger = TruncationLedger::new();
        ledger.mark(r#""Users""#);

        assert!(ledger.contains(r#""Users""#));
        assert!(!ledger.contains("users"));
        assert!(!ledger.contains(r#""users""#));
    }
}
