//! Grouping of statements by normalized pattern.
//!
//! Both the live scope path and the batch analyzer group through
//! [`PatternAggregator`], so the same record sequence always yields the same
//! groups regardless of where it came from.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::normalize::{fingerprint, normalize, statement_kind};
use crate::statement::StatementRecord;

/// Aggregate over all statements sharing one normalized pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternGroup {
    pub pattern: String,
    pub fingerprint: u64,
    pub count: usize,
    /// Seconds.
    pub total_time: f64,
    /// Seconds. Always `<= max_time`.
    pub avg_time: f64,
    /// Seconds.
    pub max_time: f64,
    /// Raw text of the first statement seen for this pattern.
    pub example_text: String,
    #[serde(skip)]
    first_seen: usize,
}

impl PatternGroup {
    pub fn avg_time_ms(&self) -> f64 {
        self.avg_time * 1000.0
    }

    pub fn total_time_ms(&self) -> f64 {
        self.total_time * 1000.0
    }
}

struct Accumulator {
    pattern: String,
    count: usize,
    total_time: f64,
    max_time: f64,
    example_text: String,
}

/// Single-pass grouping state.
///
/// Memory is bounded by the number of distinct patterns: only one example
/// text is kept per group.
#[derive(Default)]
pub struct PatternAggregator {
    index: HashMap<String, usize>,
    groups: Vec<Accumulator>,
}

impl PatternAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: &StatementRecord) {
        let pattern = normalize(&record.text);
        let duration = record.duration_seconds;

        if let Some(&i) = self.index.get(&pattern) {
            let acc = &mut self.groups[i];
            acc.count += 1;
            acc.total_time += duration;
            if duration > acc.max_time {
                acc.max_time = duration;
            }
            return;
        }

        self.index.insert(pattern.clone(), self.groups.len());
        self.groups.push(Accumulator {
            pattern,
            count: 1,
            total_time: duration,
            max_time: duration,
            example_text: record.text.clone(),
        });
    }

    /// Number of distinct patterns seen so far.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Finish into groups ordered by total time, then count, then first seen.
    pub fn finish(self) -> Vec<PatternGroup> {
        let mut groups: Vec<PatternGroup> = self
            .groups
            .into_iter()
            .enumerate()
            .map(|(first_seen, acc)| {
                // Clamp guards against float rounding pushing the mean past the max.
                let avg_time = (acc.total_time / acc.count as f64).min(acc.max_time);
                PatternGroup {
                    fingerprint: fingerprint(&acc.pattern),
                    pattern: acc.pattern,
                    count: acc.count,
                    total_time: acc.total_time,
                    avg_time,
                    max_time: acc.max_time,
                    example_text: acc.example_text,
                    first_seen,
                }
            })
            .collect();

        groups.sort_by(compare_groups);
        groups
    }
}

fn compare_groups(a: &PatternGroup, b: &PatternGroup) -> Ordering {
    b.total_time
        .total_cmp(&a.total_time)
        .then_with(|| b.count.cmp(&a.count))
        .then_with(|| a.first_seen.cmp(&b.first_seen))
}

/// Group `records` by normalized pattern.
pub fn aggregate(records: &[StatementRecord]) -> Vec<PatternGroup> {
    let mut aggregator = PatternAggregator::new();
    for record in records {
        aggregator.push(record);
    }
    aggregator.finish()
}

/// Statement count per leading keyword.
pub fn count_by_kind(records: &[StatementRecord]) -> BTreeMap<String, usize> {
    let mut kinds = BTreeMap::new();
    for record in records {
        *kinds.entry(statement_kind(&record.text)).or_insert(0) += 1;
    }
    kinds
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(text: &str, secs: f64, seq: u64) -> StatementRecord {
        StatementRecord::new(text, secs, seq)
    }

    #[test]
    fn test_groups_by_pattern() {
        let records = vec![
            rec("SELECT * FROM post WHERE id = 1", 0.002, 0),
            rec("SELECT * FROM post WHERE id = 2", 0.004, 1),
            rec("SELECT * FROM author WHERE id = 9", 0.001, 2),
        ];
        let groups = aggregate(&records);
        assert_eq!(groups.len(), 2);

        let post = &groups[0];
        assert_eq!(post.pattern, "SELECT * FROM post WHERE id = ?");
        assert_eq!(post.count, 2);
        assert!((post.total_time - 0.006).abs() < 1e-12);
        assert!((post.avg_time - 0.003).abs() < 1e-12);
        assert_eq!(post.max_time, 0.004);
        assert_eq!(post.example_text, "SELECT * FROM post WHERE id = 1");
    }

    #[test]
    fn test_example_is_first_seen() {
        let records = vec![
            rec("SELECT 1", 0.001, 0),
            rec("SELECT 2", 0.500, 1),
        ];
        let groups = aggregate(&records);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].example_text, "SELECT 1");
        assert_eq!(groups[0].max_time, 0.5);
    }

    #[test]
    fn test_conservation() {
        let records: Vec<_> = (0..57)
            .map(|i| {
                let text = match i % 3 {
                    0 => format!("SELECT * FROM a WHERE id = {i}"),
                    1 => format!("UPDATE b SET n = '{i}'"),
                    _ => "COMMIT".to_string(),
                };
                rec(&text, (i as f64) * 0.0005, i)
            })
            .collect();
        let groups = aggregate(&records);

        let count: usize = groups.iter().map(|g| g.count).sum();
        assert_eq!(count, records.len());

        let grouped: f64 = groups.iter().map(|g| g.total_time).sum();
        let raw: f64 = records.iter().map(|r| r.duration_seconds).sum();
        assert!((grouped - raw).abs() < 1e-9);

        for g in &groups {
            assert!(g.avg_time <= g.max_time);
        }
    }

    #[test]
    fn test_ordering_total_time_then_count_then_first_seen() {
        let records = vec![
            rec("SELECT a", 0.010, 0),
            rec("SELECT b", 0.005, 1),
            rec("SELECT b", 0.005, 2),
            rec("SELECT c", 0.030, 3),
            rec("SELECT d", 0.010, 4),
        ];
        let groups = aggregate(&records);
        let patterns: Vec<_> = groups.iter().map(|g| g.pattern.as_str()).collect();
        // c (30ms), then b (10ms, count 2), a (10ms, first), d (10ms)
        assert_eq!(patterns, vec!["SELECT c", "SELECT b", "SELECT a", "SELECT d"]);
    }

    #[test]
    fn test_nan_durations_sort_without_panic() {
        let records: Vec<_> = (0..40)
            .map(|i| {
                let secs = if i % 7 == 0 { f64::NAN } else { i as f64 * 0.001 };
                rec(&format!("SELECT * FROM t{}", "x".repeat(i as usize + 1)), secs, i)
            })
            .collect();
        let groups = aggregate(&records);
        assert_eq!(groups.len(), 40);
        assert_eq!(groups.iter().map(|g| g.count).sum::<usize>(), 40);
    }

    #[test]
    fn test_empty() {
        assert!(aggregate(&[]).is_empty());
        assert!(PatternAggregator::new().is_empty());
    }

    #[test]
    fn test_fingerprint_matches_pattern() {
        let groups = aggregate(&[rec("DELETE FROM t WHERE id = 5", 0.001, 0)]);
        assert_eq!(groups[0].fingerprint, fingerprint("DELETE FROM t WHERE id = ?"));
    }

    #[test]
    fn test_count_by_kind() {
        let records = vec![
            rec("SELECT 1", 0.0, 0),
            rec("select 2", 0.0, 1),
            rec("INSERT INTO t VALUES (1)", 0.0, 2),
        ];
        let kinds = count_by_kind(&records);
        assert_eq!(kinds.get("SELECT"), Some(&2));
        assert_eq!(kinds.get("INSERT"), Some(&1));
    }
}
