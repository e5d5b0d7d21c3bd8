//! Batch statistics over a window of parsed records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::{PatternGroup, aggregate, count_by_kind};
use crate::batch::advisor;
use crate::classify::{ClassifyInput, FlagKind, ScopeFlags, classify};
use crate::config::{self, ThresholdConfig};
use crate::format::clip;
use crate::statement::StatementRecord;

/// Patterns listed in the report.
pub const TOP_PATTERNS: usize = 10;
/// A pattern repeated more often than this counts as high-frequency.
pub const HIGH_FREQUENCY_COUNT: usize = 10;
/// N+1 candidates listed in the report.
pub const TOP_N_PLUS_ONE: usize = 3;
/// Slow query examples are cut to this many characters.
const SLOW_EXAMPLE_LEN: usize = 200;
/// Pattern examples are cut to this many characters.
const PATTERN_EXAMPLE_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlowQuery {
    /// Seconds.
    pub time: f64,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlowQuerySummary {
    pub count: usize,
    /// Seconds.
    pub threshold: f64,
    pub percent: f64,
    /// Slowest first.
    pub queries: Vec<SlowQuery>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternSummary {
    pub pattern: String,
    pub fingerprint: u64,
    pub count: usize,
    pub total_time: f64,
    pub avg_time: f64,
    pub max_time: f64,
    pub example: String,
}

impl From<&PatternGroup> for PatternSummary {
    fn from(g: &PatternGroup) -> Self {
        Self {
            pattern: g.pattern.clone(),
            fingerprint: g.fingerprint,
            count: g.count,
            total_time: g.total_time,
            avg_time: g.avg_time,
            max_time: g.max_time,
            example: clip(&g.example_text, PATTERN_EXAMPLE_LEN),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub generated_at: DateTime<Utc>,
    pub total_queries: usize,
    /// Seconds.
    pub total_time: f64,
    /// Seconds.
    pub average_query_time: f64,
    /// Seconds the statements span; see [`analysis_window`].
    pub analysis_window: f64,
    pub queries_per_second: f64,
    pub slow_queries: SlowQuerySummary,
    /// Top patterns by total time.
    pub query_patterns: Vec<PatternSummary>,
    /// Many small identical statements, at most [`TOP_N_PLUS_ONE`].
    pub n_plus_one_candidates: Vec<PatternSummary>,
    pub statement_kinds: BTreeMap<String, usize>,
    pub flags: ScopeFlags,
    /// Ranked, most severe first.
    pub recommendations: Vec<String>,
    /// Every group, untruncated. Same grouping as a live scope over the
    /// same records.
    #[serde(skip)]
    pub groups: Vec<PatternGroup>,
}

impl BatchReport {
    /// Groups repeated more than [`HIGH_FREQUENCY_COUNT`] times.
    pub fn high_frequency_patterns(&self) -> impl Iterator<Item = &PatternGroup> {
        self.groups
            .iter()
            .filter(|g| g.count > HIGH_FREQUENCY_COUNT)
    }
}

/// Analyze with the process-wide thresholds and a slow threshold in seconds.
pub fn analyze(records: &[StatementRecord], slow_threshold_secs: f64) -> BatchReport {
    let config = ThresholdConfig {
        slow_statement_ms: slow_threshold_secs * 1000.0,
        ..config::global().clone()
    };
    analyze_with(records, &config)
}

pub fn analyze_with(records: &[StatementRecord], config: &ThresholdConfig) -> BatchReport {
    let groups = aggregate(records);
    let total_queries = records.len();
    let total_time: f64 = records.iter().map(|r| r.duration_seconds).sum();

    let classification = classify(
        &ClassifyInput {
            records,
            groups: &groups,
            total_time,
        },
        config,
    );

    let slow_queries = match classification.finding(FlagKind::SlowStatement) {
        Some(finding) => SlowQuerySummary {
            count: finding.count,
            threshold: config.slow_statement_ms / 1000.0,
            percent: finding.count as f64 / total_queries as f64 * 100.0,
            queries: finding
                .statements
                .iter()
                .map(|s| SlowQuery {
                    time: s.duration_ms / 1000.0,
                    sql: clip(&s.text, SLOW_EXAMPLE_LEN),
                })
                .collect(),
        },
        None => SlowQuerySummary {
            count: 0,
            threshold: config.slow_statement_ms / 1000.0,
            percent: 0.0,
            queries: Vec::new(),
        },
    };

    let cheap_secs = config.cheap_statement_ms / 1000.0;
    let n_plus_one_candidates = groups
        .iter()
        .filter(|g| g.count > HIGH_FREQUENCY_COUNT && g.avg_time < cheap_secs)
        .take(TOP_N_PLUS_ONE)
        .map(PatternSummary::from)
        .collect();

    let window = analysis_window(records, total_time);
    let queries_per_second = if window > 0.0 {
        total_queries as f64 / window
    } else {
        0.0
    };

    let mut report = BatchReport {
        generated_at: Utc::now(),
        total_queries,
        total_time,
        average_query_time: if total_queries > 0 {
            total_time / total_queries as f64
        } else {
            0.0
        },
        analysis_window: window,
        queries_per_second,
        slow_queries,
        query_patterns: groups.iter().take(TOP_PATTERNS).map(PatternSummary::from).collect(),
        n_plus_one_candidates,
        statement_kinds: count_by_kind(records),
        flags: classification.flags,
        recommendations: Vec::new(),
        groups,
    };
    report.recommendations = advisor::recommend(&report)
        .into_iter()
        .map(|r| r.description)
        .collect();
    report
}

/// Seconds covered by `records`.
///
/// The span between the earliest and latest timestamp when at least two are
/// known and distinct; otherwise the summed statement time.
pub fn analysis_window(records: &[StatementRecord], total_time: f64) -> f64 {
    let mut stamps = records.iter().filter_map(|r| r.executed_at);
    if let Some(first) = stamps.next() {
        let (min, max) = stamps.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t)));
        let span = (max - min).num_microseconds().unwrap_or(0) as f64 / 1_000_000.0;
        if span > 0.0 {
            return span;
        }
    }
    total_time
}
