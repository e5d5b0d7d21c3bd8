//! Heuristic recommendations over a batch report.

use serde::Serialize;

use crate::batch::analyze::{BatchReport, HIGH_FREQUENCY_COUNT};
use crate::classify::Severity;

/// More statements than this in one analysis window suggests caching.
pub const HIGH_VOLUME_COUNT: usize = 50;

const ALL_CLEAR: &str = "Database performance looks good!";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub id: String,
    pub severity: Severity,
    pub description: String,
}

pub trait Advisor: Send + Sync {
    fn id(&self) -> &'static str;
    fn evaluate(&self, report: &BatchReport) -> Option<Recommendation>;
}

pub fn all_advisors() -> Vec<Box<dyn Advisor>> {
    vec![
        Box::new(SlowQueryAdvisor),
        Box::new(NPlusOneAdvisor),
        Box::new(HighFrequencyAdvisor),
        Box::new(HighVolumeAdvisor),
    ]
}

/// Run every advisor, most severe first. Ties keep declaration order.
///
/// Never empty: when nothing fires a single all-clear entry is returned.
pub fn recommend(report: &BatchReport) -> Vec<Recommendation> {
    let mut out: Vec<Recommendation> = all_advisors()
        .iter()
        .filter_map(|a| a.evaluate(report))
        .collect();
    out.sort_by(|a, b| b.severity.cmp(&a.severity));

    if out.is_empty() {
        out.push(Recommendation {
            id: "all_clear".to_string(),
            severity: Severity::Info,
            description: ALL_CLEAR.to_string(),
        });
    }
    out
}

// ============================================================
// SlowQueryAdvisor
// ============================================================

pub struct SlowQueryAdvisor;

impl Advisor for SlowQueryAdvisor {
    fn id(&self) -> &'static str {
        "slow_queries"
    }

    fn evaluate(&self, report: &BatchReport) -> Option<Recommendation> {
        let n = report.slow_queries.count;
        if n == 0 {
            return None;
        }
        Some(Recommendation {
            id: self.id().to_string(),
            severity: Severity::Warning,
            description: format!(
                "Found {n} slow queries. Consider adding indexes or optimizing these queries."
            ),
        })
    }
}

// ============================================================
// NPlusOneAdvisor
// ============================================================

pub struct NPlusOneAdvisor;

impl Advisor for NPlusOneAdvisor {
    fn id(&self) -> &'static str {
        "n_plus_one"
    }

    fn evaluate(&self, report: &BatchReport) -> Option<Recommendation> {
        let worst = report.n_plus_one_candidates.first()?;
        Some(Recommendation {
            id: self.id().to_string(),
            severity: Severity::Critical,
            description: format!(
                "Found {} likely N+1 pattern(s); the worst ran {} times: {}. \
                 Fetch related rows in one statement instead of one per parent row.",
                report.n_plus_one_candidates.len(),
                worst.count,
                worst.pattern
            ),
        })
    }
}

// ============================================================
// HighFrequencyAdvisor
// ============================================================

pub struct HighFrequencyAdvisor;

impl Advisor for HighFrequencyAdvisor {
    fn id(&self) -> &'static str {
        "high_frequency"
    }

    fn evaluate(&self, report: &BatchReport) -> Option<Recommendation> {
        let k = report.high_frequency_patterns().count();
        if k == 0 {
            return None;
        }
        Some(Recommendation {
            id: self.id().to_string(),
            severity: Severity::Warning,
            description: format!(
                "Found {k} query patterns with high frequency (more than \
                 {HIGH_FREQUENCY_COUNT} executions). Consider batching or eager loading \
                 to reduce N+1 queries."
            ),
        })
    }
}

// ============================================================
// HighVolumeAdvisor
// ============================================================

pub struct HighVolumeAdvisor;

impl Advisor for HighVolumeAdvisor {
    fn id(&self) -> &'static str {
        "high_volume"
    }

    fn evaluate(&self, report: &BatchReport) -> Option<Recommendation> {
        if report.total_queries <= HIGH_VOLUME_COUNT {
            return None;
        }
        Some(Recommendation {
            id: self.id().to_string(),
            severity: Severity::Info,
            description: "High query count detected. Consider implementing caching or query \
                          optimization."
                .to_string(),
        })
    }
}
