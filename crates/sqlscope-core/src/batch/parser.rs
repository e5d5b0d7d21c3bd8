//! Statement log line parser.
//!
//! Recognized line formats:
//! - JSON object per line: `{"sql": "...", "time": 0.012, "timestamp": "..."}`
//!   where `time` is seconds (number or numeric string) and `timestamp` is
//!   optional.
//! - Query trace: `... [SQL] (0.012s) SELECT ...`
//! - Slow query summary: `... Slow queries detected ... [3] 0.512s: SELECT ...`
//!   (the Spanish `Consultas lentas detectadas` marker is accepted too).
//!
//! Anything else is a [`MalformedLogLine`], which callers skip.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::error::MalformedLogLine;

/// Which format a line matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFormat {
    Json,
    SqlTrace,
    SlowSummary,
}

/// A statement extracted from one log line.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStatement {
    pub text: String,
    pub duration_seconds: f64,
    pub executed_at: Option<DateTime<Utc>>,
    pub format: LineFormat,
}

const SQL_TRACE_MARKER: &str = "[SQL] (";
const SLOW_SUMMARY_MARKERS: &[&str] = &["Slow queries detected", "Consultas lentas detectadas"];

/// Try each known format in turn. `line_number` is only used for the error.
pub fn parse_line(line: &str, line_number: usize) -> Result<ParsedStatement, MalformedLogLine> {
    let trimmed = line.trim();
    let parsed = if trimmed.starts_with('{') {
        parse_json(trimmed)
    } else {
        parse_sql_trace(trimmed).or_else(|| parse_slow_summary(trimmed))
    };
    parsed.ok_or(MalformedLogLine { line_number })
}

fn parse_json(line: &str) -> Option<ParsedStatement> {
    let value: Value = serde_json::from_str(line).ok()?;
    let obj = value.as_object()?;

    let text = obj.get("sql")?.as_str()?.to_string();
    let duration_seconds = match obj.get("time")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    if !is_valid_duration(duration_seconds) {
        return None;
    }

    let executed_at = obj
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(parse_timestamp);

    Some(ParsedStatement {
        text,
        duration_seconds,
        executed_at,
        format: LineFormat::Json,
    })
}

/// `[SQL] (0.012s) SELECT ...`
fn parse_sql_trace(line: &str) -> Option<ParsedStatement> {
    let pos = line.find(SQL_TRACE_MARKER)?;
    let rest = &line[pos + SQL_TRACE_MARKER.len()..];
    let (secs, sql) = rest.split_once("s) ")?;
    let duration_seconds: f64 = secs.parse().ok()?;
    if !is_valid_duration(duration_seconds) || sql.trim().is_empty() {
        return None;
    }

    Some(ParsedStatement {
        text: sql.trim().to_string(),
        duration_seconds,
        executed_at: None,
        format: LineFormat::SqlTrace,
    })
}

/// `<marker> ... [N] 0.512s: SELECT ...`
fn parse_slow_summary(line: &str) -> Option<ParsedStatement> {
    let start = SLOW_SUMMARY_MARKERS
        .iter()
        .find_map(|m| line.find(m).map(|pos| pos + m.len()))?;
    let mut rest = &line[start..];

    // First `[digits] <secs>s: ` after the marker.
    while let Some(open) = rest.find('[') {
        let candidate = &rest[open + 1..];
        if let Some(parsed) = parse_indexed_entry(candidate) {
            return Some(parsed);
        }
        rest = candidate;
    }
    None
}

/// Parse `N] 0.512s: SQL` (the part after `[`).
fn parse_indexed_entry(s: &str) -> Option<ParsedStatement> {
    let (index, rest) = s.split_once("] ")?;
    if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (secs, sql) = rest.split_once("s: ")?;
    let duration_seconds: f64 = secs.parse().ok()?;
    if !is_valid_duration(duration_seconds) || sql.trim().is_empty() {
        return None;
    }

    Some(ParsedStatement {
        text: sql.trim().to_string(),
        duration_seconds,
        executed_at: None,
        format: LineFormat::SlowSummary,
    })
}

fn is_valid_duration(secs: f64) -> bool {
    secs.is_finite() && secs >= 0.0
}

/// RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS[.fff]` taken as UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}
