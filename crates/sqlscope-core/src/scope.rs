//! Per-scope statement deltas.
//!
//! A scope remembers the log length and the time at `begin`. At `end` the
//! records appended since then form the scope's slice. Nested scopes need no
//! bookkeeping: each handle carries its own offset and slices may overlap.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::{PatternGroup, aggregate, count_by_kind};
use crate::classify::{Classification, ClassifyInput, Finding, ScopeFlags, classify};
use crate::config::{self, ThresholdConfig};
use crate::error::ScopeError;
use crate::statement::{StatementLog, StatementRecord};

/// An open instrumentation span.
///
/// Not `Clone`: one handle, one `end`.
#[derive(Debug)]
pub struct ScopeHandle {
    label: String,
    start_sequence_index: usize,
    start_time: Instant,
    started_at: DateTime<Utc>,
    ended: bool,
}

impl ScopeHandle {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Log offset captured at `begin`.
    pub fn start_sequence_index(&self) -> usize {
        self.start_sequence_index
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

/// Result of closing a scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeReport {
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub total_statement_count: usize,
    /// Summed statement time, seconds.
    pub total_time: f64,
    /// Wall-clock time between `begin` and `end`, seconds.
    pub elapsed: f64,
    pub groups: Vec<PatternGroup>,
    pub kinds: BTreeMap<String, usize>,
    pub flags: ScopeFlags,
    pub findings: Vec<Finding>,
}

impl ScopeReport {
    /// Build a report from an already materialized slice.
    pub fn from_records(
        label: impl Into<String>,
        records: &[StatementRecord],
        elapsed: Duration,
        config: &ThresholdConfig,
    ) -> Self {
        let groups = aggregate(records);
        let total_time: f64 = records.iter().map(|r| r.duration_seconds).sum();
        let Classification { flags, findings } = classify(
            &ClassifyInput {
                records,
                groups: &groups,
                total_time,
            },
            config,
        );

        Self {
            label: label.into(),
            started_at: Utc::now(),
            total_statement_count: records.len(),
            total_time,
            elapsed: elapsed.as_secs_f64(),
            groups,
            kinds: count_by_kind(records),
            flags,
            findings,
        }
    }

    /// Mean statement time in seconds, 0 for an empty scope.
    pub fn time_per_statement(&self) -> f64 {
        if self.total_statement_count == 0 {
            0.0
        } else {
            self.total_time / self.total_statement_count as f64
        }
    }
}

/// Opens and closes scopes over one statement log.
pub struct ScopeTracker<L> {
    log: L,
    config: ThresholdConfig,
}

impl<L: StatementLog> ScopeTracker<L> {
    /// Tracker using the process-wide thresholds.
    pub fn new(log: L) -> Self {
        Self::with_config(log, config::global().clone())
    }

    pub fn with_config(log: L, config: ThresholdConfig) -> Self {
        Self { log, config }
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    pub fn begin(&self, label: impl Into<String>) -> ScopeHandle {
        ScopeHandle {
            label: label.into(),
            start_sequence_index: self.log.len(),
            start_time: Instant::now(),
            started_at: Utc::now(),
            ended: false,
        }
    }

    /// Close `handle` and report on the statements executed since `begin`.
    ///
    /// The handle is spent after the first call, whether it succeeded or not;
    /// later calls return [`ScopeError::AlreadyEnded`] and count nothing.
    pub fn end(&self, handle: &mut ScopeHandle) -> Result<ScopeReport, ScopeError> {
        if handle.ended {
            return Err(ScopeError::AlreadyEnded {
                label: handle.label.clone(),
            });
        }
        handle.ended = true;

        let elapsed = handle.start_time.elapsed();
        let len = self.log.len();
        let start = handle.start_sequence_index;
        if len < start {
            return Err(ScopeError::LogShrunk { start, len });
        }

        let slice = self.log.slice(start..len);
        let mut report =
            ScopeReport::from_records(handle.label.clone(), &slice, elapsed, &self.config);
        report.started_at = handle.started_at;
        Ok(report)
    }
}
