//! Bounded restore log and run summary.

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;

use crate::classify::StatementCategory;

const DEFAULT_CAPACITY: usize = 1000;

/// What the executor decided to do with one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Executed,
    Skipped,
    Deferred,
    Queued,
    Blocked,
    Failed,
}

/// One retained log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub disposition: Disposition,
    pub category: StatementCategory,
    pub message: String,
}

/// Counts plus whatever entries survived trimming, ready for the web layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub executed: u64,
    pub skipped: u64,
    pub deferred: u64,
    pub queued: u64,
    pub blocked: u64,
    pub failed: u64,
    pub by_category: BTreeMap<StatementCategory, u64>,
    pub retained: usize,
    pub dropped: u64,
}

/// Append-only log with bounded retention.
///
/// Counters always move, so [`RestoreLog::summary`] stays accurate after the
/// oldest entries have been trimmed. Streaming mode additionally keeps
/// successful-statement entries out of storage to bound memory on huge dumps;
/// they are still counted.
#[derive(Debug)]
pub struct RestoreLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    dropped: u64,
    streaming: bool,
    executed: u64,
    skipped: u64,
    deferred: u64,
    queued: u64,
    blocked: u64,
    failed: u64,
    by_category: BTreeMap<StatementCategory, u64>,
}

impl Default for RestoreLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RestoreLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            dropped: 0,
            streaming: false,
            executed: 0,
            skipped: 0,
            deferred: 0,
            queued: 0,
            blocked: 0,
            failed: 0,
            by_category: BTreeMap::new(),
        }
    }

    /// Suppresses `Executed` entries from retention (they stay counted).
    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn record(
        &mut self,
        disposition: Disposition,
        category: StatementCategory,
        message: impl Into<String>,
    ) {
        match disposition {
            Disposition::Executed => self.executed += 1,
            Disposition::Skipped => self.skipped += 1,
            Disposition::Deferred => self.deferred += 1,
            Disposition::Queued => self.queued += 1,
            Disposition::Blocked => self.blocked += 1,
            Disposition::Failed => self.failed += 1,
        }
        *self.by_category.entry(category).or_insert(0) += 1;

        if self.streaming && disposition == Disposition::Executed {
            return;
        }
        self.entries.push_back(LogEntry {
            disposition,
            category,
            message: message.into(),
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            self.dropped += 1;
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            executed: self.executed,
            skipped: self.skipped,
            deferred: self.deferred,
            queued: self.queued,
            blocked: self.blocked,
            failed: self.failed,
            by_category: self.by_category.clone(),
            retained: self.entries.len(),
            dropped: self.dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_trims_oldest_but_keeps_counts() {
        let mut log = RestoreLog::with_capacity(2);
        log.record(Disposition::Executed, StatementCategory::SchemaObject, "one");
        log.record(Disposition::Executed, StatementCategory::SchemaObject, "two");
        log.record(Disposition::Failed, StatementCategory::Data, "three");

        let messages: Vec<&str> = log.entries().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["two", "three"]);

        let summary = log.summary();
        assert_eq!(summary.executed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.retained, 2);
        assert_eq!(summary.dropped, 1);
    }

    #[test]
    fn test_streaming_suppresses_executed_entries() {
        let mut log = RestoreLog::new().streaming(true);
        log.record(Disposition::Executed, StatementCategory::Data, "copy users");
        log.record(Disposition::Skipped, StatementCategory::Drop, "drop blocked");

        assert_eq!(log.len(), 1);
        let summary = log.summary();
        assert_eq!(summary.executed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.by_category[&StatementCategory::Data], 1);
    }

    #[test]
    fn test_summary_counts_by_category() {
        let mut log = RestoreLog::new();
        log.record(Disposition::Queued, StatementCategory::Rights, "grant");
        log.record(Disposition::Queued, StatementCategory::Rights, "revoke");
        log.record(Disposition::Blocked, StatementCategory::Drop, "drop");

        let summary = log.summary();
        assert_eq!(summary.by_category[&StatementCategory::Rights], 2);
        assert_eq!(summary.by_category[&StatementCategory::Drop], 1);
        assert_eq!(summary.queued, 2);
        assert_eq!(summary.blocked, 1);
    }

    #[test]
    fn test_summary_serializes_with_string_category_keys() {
        let mut log = RestoreLog::new();
        log.record(Disposition::Executed, StatementCategory::SchemaObject, "create");
        let json = serde_json::to_value(log.summary()).unwrap();
        assert_eq!(json["by_category"]["schema_object"], 1);
        assert_eq!(json["executed"], 1);
    }
}
