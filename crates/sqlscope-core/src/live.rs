//! Live reporting of flagged scopes as structured `tracing` events.
//!
//! One event per fired flag. All qualifying N+1 groups of a scope go into a
//! single event, so an N+1 storm produces one warning, not hundreds.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classify::{FlagKind, Severity};
use crate::format::clip;
use crate::scope::ScopeReport;

/// Length at which SQL text is cut in log events.
const MAX_EVENT_SQL_LEN: usize = 200;

/// One structured event emitted for a fired flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveEvent {
    pub scope_label: String,
    pub flag_type: FlagKind,
    pub severity: Severity,
    pub count: usize,
    pub duration_ms: f64,
    pub threshold: f64,
    pub example_sql: String,
    /// Offending patterns or statements, at most `top_k`.
    pub offenders: Vec<String>,
}

/// Turn a report into its events. Pure; see [`emit`] for the logging side.
pub fn events(report: &ScopeReport) -> Vec<LiveEvent> {
    report
        .findings
        .iter()
        .map(|finding| {
            let (duration_ms, example_sql, offenders) = match finding.kind {
                FlagKind::SlowStatement => (
                    finding.observed,
                    finding
                        .statements
                        .first()
                        .map(|s| s.text.clone())
                        .unwrap_or_default(),
                    finding
                        .statements
                        .iter()
                        .map(|s| format!("{:.1}ms {}", s.duration_ms, truncate(&s.text)))
                        .collect(),
                ),
                FlagKind::NPlusOne => (
                    finding.groups.iter().map(|g| g.total_time_ms()).sum(),
                    finding
                        .groups
                        .first()
                        .map(|g| g.example_text.clone())
                        .unwrap_or_default(),
                    finding
                        .groups
                        .iter()
                        .map(|g| format!("x{} {}", g.count, g.pattern))
                        .collect(),
                ),
                FlagKind::SlowScope => (
                    finding.observed,
                    report
                        .groups
                        .first()
                        .map(|g| g.example_text.clone())
                        .unwrap_or_default(),
                    finding
                        .groups
                        .iter()
                        .map(|g| {
                            format!("{:.1}ms x{} {}", g.total_time_ms(), g.count, g.pattern)
                        })
                        .collect(),
                ),
            };

            LiveEvent {
                scope_label: report.label.clone(),
                flag_type: finding.kind,
                severity: finding.severity,
                count: finding.count,
                duration_ms,
                threshold: finding.threshold,
                example_sql: truncate(&example_sql),
                offenders,
            }
        })
        .collect()
}

/// Log the scope summary and one event per fired flag.
pub fn emit(report: &ScopeReport) {
    if report.total_statement_count > 0 {
        info!(
            target: "sqlscope::live",
            scope_label = %report.label,
            count = report.total_statement_count,
            duration_ms = report.total_time * 1000.0,
            elapsed_ms = report.elapsed * 1000.0,
            "{} statements in {:.2}ms for {}",
            report.total_statement_count,
            report.total_time * 1000.0,
            report.label
        );
    }

    if report.flags.suspected_n_plus_one {
        debug!(
            target: "sqlscope::live",
            scope_label = %report.label,
            kinds = ?report.kinds,
            "statement breakdown"
        );
    }

    for event in events(report) {
        warn!(
            target: "sqlscope::live",
            scope_label = %event.scope_label,
            flag_type = event.flag_type.as_str(),
            severity = ?event.severity,
            count = event.count,
            duration_ms = event.duration_ms,
            threshold = event.threshold,
            example_sql = %event.example_sql,
            offenders = ?event.offenders,
            "{} in {}",
            event.flag_type.as_str(),
            event.scope_label
        );
    }
}

fn truncate(sql: &str) -> String {
    clip(sql, MAX_EVENT_SQL_LEN)
}
