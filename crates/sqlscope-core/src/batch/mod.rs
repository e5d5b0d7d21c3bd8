//! Offline analysis of persisted statement logs.
//!
//! Lines are parsed into [`StatementRecord`]s and handed to the same
//! aggregation and classification code the live path uses.

pub mod advisor;
pub mod analyze;
pub mod parser;

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use tracing::{debug, info};

use crate::error::BatchError;
use crate::statement::StatementRecord;

pub use analyze::{BatchReport, PatternSummary, SlowQuery, SlowQuerySummary, analyze, analyze_with};
pub use parser::{LineFormat, ParsedStatement, parse_line};

/// Records recovered from a log plus line accounting.
#[derive(Debug, Default)]
pub struct ParsedLog {
    pub records: Vec<StatementRecord>,
    pub lines: usize,
    pub skipped: usize,
}

/// Parse every line of `reader`. Unrecognized lines are skipped.
///
/// Invalid UTF-8 is replaced rather than treated as an error, since log
/// files routinely mix in binary noise.
pub fn parse_reader<R: Read>(reader: R) -> std::io::Result<ParsedLog> {
    let mut reader = BufReader::new(reader);
    let mut parsed = ParsedLog::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        parsed.lines += 1;
        let line = String::from_utf8_lossy(&buf);

        match parse_line(&line, parsed.lines) {
            Ok(stmt) => {
                let mut record = StatementRecord::new(
                    stmt.text,
                    stmt.duration_seconds,
                    parsed.records.len() as u64,
                );
                record.executed_at = stmt.executed_at;
                parsed.records.push(record);
            }
            Err(e) => {
                parsed.skipped += 1;
                debug!("skipping log line: {}", e);
            }
        }
    }

    Ok(parsed)
}

/// Open and parse a log file.
pub fn load(path: &Path) -> Result<ParsedLog, BatchError> {
    let file = File::open(path).map_err(|source| BatchError::SourceUnavailable {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = parse_reader(file).map_err(|source| BatchError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    info!(
        "Parsed {}: {} statements from {} lines ({} skipped)",
        path.display(),
        parsed.records.len(),
        parsed.lines,
        parsed.skipped
    );
    Ok(parsed)
}
