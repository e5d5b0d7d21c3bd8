//! Report rendering: pretty JSON for files, plain text for terminals.
//!
//! Numbers are printed here only. Reports keep seconds as `f64` and the
//! helpers below pick the unit.

use std::fs;
use std::path::Path;

use crate::batch::BatchReport;
use crate::error::BatchError;
use crate::scope::ScopeReport;

/// Pattern column width in text tables.
const PATTERN_COL: usize = 80;

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

pub fn to_json(report: &BatchReport) -> Result<String, BatchError> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Serialize `report` and write it to `path`, replacing any existing file.
pub fn write_report(report: &BatchReport, path: &Path) -> Result<(), BatchError> {
    let json = to_json(report)?;
    fs::write(path, json + "\n").map_err(|source| BatchError::Write {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

pub fn render_text(report: &BatchReport) -> String {
    let mut lines = vec![
        "SQL statement analysis".to_string(),
        "======================".to_string(),
        format!("Generated:           {}", report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")),
        format!("Total queries:       {}", report.total_queries),
        format!("Total time:          {}", format_secs(report.total_time)),
        format!("Average query time:  {}", format_secs(report.average_query_time)),
        format!("Analysis window:     {}", format_secs(report.analysis_window)),
        format!("Queries per second:  {:.2}", report.queries_per_second),
        String::new(),
    ];

    let slow = &report.slow_queries;
    lines.push(format!(
        "Slow queries (> {}): {} ({:.1}%)",
        format_secs(slow.threshold),
        slow.count,
        slow.percent
    ));
    for q in &slow.queries {
        lines.push(format!("  {:>9}  {}", format_secs(q.time), q.sql));
    }
    lines.push(String::new());

    if !report.query_patterns.is_empty() {
        lines.push("Top patterns by total time".to_string());
        lines.push(format!(
            "  {:>6}  {:>9}  {:>9}  {:>9}  pattern",
            "count", "total", "avg", "max"
        ));
        for p in &report.query_patterns {
            lines.push(format!(
                "  {:>6}  {:>9}  {:>9}  {:>9}  {}",
                p.count,
                format_secs(p.total_time),
                format_secs(p.avg_time),
                format_secs(p.max_time),
                clip(&p.pattern, PATTERN_COL)
            ));
        }
        lines.push(String::new());
    }

    if !report.n_plus_one_candidates.is_empty() {
        lines.push("Possible N+1 patterns".to_string());
        for p in &report.n_plus_one_candidates {
            lines.push(format!(
                "  x{:<5} avg {:>9}  {}",
                p.count,
                format_secs(p.avg_time),
                clip(&p.pattern, PATTERN_COL)
            ));
        }
        lines.push(String::new());
    }

    if !report.statement_kinds.is_empty() {
        let kinds: Vec<String> = report
            .statement_kinds
            .iter()
            .map(|(k, n)| format!("{k}={n}"))
            .collect();
        lines.push(format!("Statement kinds: {}", kinds.join(" ")));
        lines.push(String::new());
    }

    lines.push("Recommendations".to_string());
    for (i, r) in report.recommendations.iter().enumerate() {
        lines.push(format!("  {}. {}", i + 1, r));
    }

    lines.join("\n") + "\n"
}

/// One-block summary of a single scope, for debugging.
pub fn render_scope_text(report: &ScopeReport) -> String {
    let mut lines = vec![format!(
        "{}: {} statements, {} statement time, {} elapsed ({} per statement)",
        report.label,
        report.total_statement_count,
        format_secs(report.total_time),
        format_secs(report.elapsed),
        format_secs(report.time_per_statement())
    )];

    for f in &report.findings {
        lines.push(format!("  [{:?}] {}: {}", f.severity, f.kind.as_str(), f.title));
    }
    for g in report.groups.iter().take(5) {
        lines.push(format!(
            "  x{:<5} {:>9}  {}",
            g.count,
            format_secs(g.total_time),
            clip(&g.pattern, PATTERN_COL)
        ));
    }

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Format a duration given in seconds.
///
/// `"1.250s"` from one second up, `"12.3ms"` below, `"850us"` under a
/// millisecond, `"0"` for zero.
pub fn format_secs(secs: f64) -> String {
    if secs <= 0.0 {
        "0".to_string()
    } else if secs >= 1.0 {
        format!("{:.3}s", secs)
    } else if secs >= 0.001 {
        format!("{:.1}ms", secs * 1000.0)
    } else {
        format!("{:.0}us", secs * 1_000_000.0)
    }
}

/// Cut `s` to `max_chars` characters, marking the cut with `...`.
pub(crate) fn clip(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
