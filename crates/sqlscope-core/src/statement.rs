//! Executed statement records and the read-only log view over them.
//!
//! The driver owns the log; the engine only asks for its length and for
//! slices of it. [`MemoryLog`] is an in-process recorder for hosts whose
//! driver does not keep its own log.

use std::borrow::Cow;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One executed database statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementRecord {
    pub text: String,
    pub duration_seconds: f64,
    pub sequence_index: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
}

impl StatementRecord {
    pub fn new(text: impl Into<String>, duration_seconds: f64, sequence_index: u64) -> Self {
        Self {
            text: text.into(),
            duration_seconds,
            sequence_index,
            executed_at: None,
        }
    }

    pub fn with_executed_at(mut self, at: DateTime<Utc>) -> Self {
        self.executed_at = Some(at);
        self
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_seconds * 1000.0
    }
}

/// Append-only sequence of executed statements, addressed by offset.
///
/// Implementations must never reorder or mutate records already visible
/// through [`slice`](StatementLog::slice). A log may be reset (emptied) by
/// its owner; scopes open across a reset fail to close.
pub trait StatementLog {
    /// Number of records currently in the log.
    fn len(&self) -> usize;

    /// Records in `range`. The range is clamped to the current length.
    fn slice(&self, range: Range<usize>) -> Cow<'_, [StatementRecord]>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StatementLog for [StatementRecord] {
    fn len(&self) -> usize {
        <[StatementRecord]>::len(self)
    }

    fn slice(&self, range: Range<usize>) -> Cow<'_, [StatementRecord]> {
        Cow::Borrowed(&self[clamp(range, self.len())])
    }
}

impl StatementLog for Vec<StatementRecord> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn slice(&self, range: Range<usize>) -> Cow<'_, [StatementRecord]> {
        StatementLog::slice(self.as_slice(), range)
    }
}

impl<L: StatementLog + ?Sized> StatementLog for &L {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn slice(&self, range: Range<usize>) -> Cow<'_, [StatementRecord]> {
        (**self).slice(range)
    }
}

fn clamp(range: Range<usize>, len: usize) -> Range<usize> {
    let end = range.end.min(len);
    range.start.min(end)..end
}

/// Source of process-unique sequence indices.
static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn next_sequence_index() -> u64 {
    NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

/// In-memory statement recorder for one execution context.
///
/// Sequence indices come from a process-wide counter, so they stay unique
/// and increasing across [`reset`](MemoryLog::reset) calls.
#[derive(Debug, Default)]
pub struct MemoryLog {
    records: Mutex<Vec<StatementRecord>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StatementRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a statement and return its sequence index.
    pub fn record(&self, text: impl Into<String>, duration: Duration) -> u64 {
        let seq = next_sequence_index();
        let record = StatementRecord::new(text, duration.as_secs_f64(), seq)
            .with_executed_at(Utc::now());
        self.lock().push(record);
        seq
    }

    /// Run `execute` and record `text` with its measured duration.
    ///
    /// The statement is recorded even if `execute` returns an error value.
    pub fn record_timed<T>(&self, text: impl Into<String>, execute: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let out = execute();
        self.record(text, started.elapsed());
        out
    }

    /// Drop all records. Open scopes over this log will fail to end.
    pub fn reset(&self) {
        self.lock().clear();
    }

    pub fn snapshot(&self) -> Vec<StatementRecord> {
        self.lock().clone()
    }
}

impl StatementLog for MemoryLog {
    fn len(&self) -> usize {
        self.lock().len()
    }

    fn slice(&self, range: Range<usize>) -> Cow<'_, [StatementRecord]> {
        let records = self.lock();
        let range = clamp(range, records.len());
        Cow::Owned(records[range].to_vec())
    }
}
