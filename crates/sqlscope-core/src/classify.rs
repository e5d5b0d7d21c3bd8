//! Threshold rules over one scope (or batch window) of statements.
//!
//! Each rule is independent; any subset may fire. Classification is
//! advisory only and never affects the observed unit of work.

use serde::Serialize;

use crate::aggregate::PatternGroup;
use crate::config::ThresholdConfig;
use crate::statement::StatementRecord;

// ============================================================
// Core types
// ============================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    SlowStatement,
    NPlusOne,
    SlowScope,
}

impl FlagKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FlagKind::SlowStatement => "slow_statement",
            FlagKind::NPlusOne => "n_plus_one",
            FlagKind::SlowScope => "slow_scope",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScopeFlags {
    pub slow_statements: bool,
    pub suspected_n_plus_one: bool,
    pub slow_scope: bool,
}

impl ScopeFlags {
    pub fn any(&self) -> bool {
        self.slow_statements || self.suspected_n_plus_one || self.slow_scope
    }
}

/// A statement that crossed the slow threshold.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlaggedStatement {
    pub sequence_index: u64,
    pub duration_ms: f64,
    pub text: String,
}

/// One fired rule with the evidence behind it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Finding {
    pub kind: FlagKind,
    pub severity: Severity,
    pub title: String,
    /// Number of offending statements (slow / N+1) or statements in scope.
    pub count: usize,
    /// Observed value compared against `threshold` (ms or count).
    pub observed: f64,
    pub threshold: f64,
    /// Top offending statements, slowest first.
    pub statements: Vec<FlaggedStatement>,
    /// Top offending groups, by total time.
    pub groups: Vec<PatternGroup>,
}

/// What the rules look at.
pub struct ClassifyInput<'a> {
    pub records: &'a [StatementRecord],
    /// Groups as returned by [`aggregate`](crate::aggregate::aggregate).
    pub groups: &'a [PatternGroup],
    /// Summed statement time in seconds.
    pub total_time: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Classification {
    pub flags: ScopeFlags,
    pub findings: Vec<Finding>,
}

impl Classification {
    pub fn finding(&self, kind: FlagKind) -> Option<&Finding> {
        self.findings.iter().find(|f| f.kind == kind)
    }
}

// ============================================================
// Rules
// ============================================================

pub trait ClassifierRule: Send + Sync {
    fn kind(&self) -> FlagKind;
    fn evaluate(&self, input: &ClassifyInput, config: &ThresholdConfig) -> Option<Finding>;
}

pub fn all_rules() -> Vec<Box<dyn ClassifierRule>> {
    vec![
        Box::new(SlowStatementRule),
        Box::new(NPlusOneRule),
        Box::new(SlowScopeRule),
    ]
}

/// Run every rule and collect flags.
pub fn classify(input: &ClassifyInput, config: &ThresholdConfig) -> Classification {
    let mut out = Classification::default();
    for rule in all_rules() {
        let Some(finding) = rule.evaluate(input, config) else {
            continue;
        };
        match rule.kind() {
            FlagKind::SlowStatement => out.flags.slow_statements = true,
            FlagKind::NPlusOne => out.flags.suspected_n_plus_one = true,
            FlagKind::SlowScope => out.flags.slow_scope = true,
        }
        out.findings.push(finding);
    }
    out
}

// ============================================================
// SlowStatementRule
// ============================================================

pub struct SlowStatementRule;

impl ClassifierRule for SlowStatementRule {
    fn kind(&self) -> FlagKind {
        FlagKind::SlowStatement
    }

    fn evaluate(&self, input: &ClassifyInput, config: &ThresholdConfig) -> Option<Finding> {
        let threshold = config.slow_statement_ms;
        let mut slow: Vec<&StatementRecord> = input
            .records
            .iter()
            .filter(|r| r.duration_ms() > threshold)
            .collect();
        if slow.is_empty() {
            return None;
        }

        slow.sort_by(|a, b| b.duration_seconds.total_cmp(&a.duration_seconds));
        let worst = slow[0].duration_ms();

        let severity = if worst > threshold * 10.0 {
            Severity::Critical
        } else {
            Severity::Warning
        };

        Some(Finding {
            kind: FlagKind::SlowStatement,
            severity,
            title: format!("{} slow statement(s), worst {worst:.1}ms", slow.len()),
            count: slow.len(),
            observed: worst,
            threshold,
            statements: slow
                .iter()
                .take(config.top_k)
                .map(|r| FlaggedStatement {
                    sequence_index: r.sequence_index,
                    duration_ms: r.duration_ms(),
                    text: r.text.clone(),
                })
                .collect(),
            groups: Vec::new(),
        })
    }
}

// ============================================================
// NPlusOneRule
// ============================================================

/// Flags repeated structurally identical statements.
///
/// Fires when the scope runs more statements than the count threshold, when
/// one pattern alone exceeds it, or when a pattern repeats at least
/// `min_group_size_for_n_plus_one` times while staying cheap on average.
pub struct NPlusOneRule;

impl NPlusOneRule {
    fn group_qualifies(group: &PatternGroup, config: &ThresholdConfig) -> bool {
        group.count > config.scope_statement_count_threshold
            || (group.count >= config.min_group_size_for_n_plus_one
                && group.avg_time_ms() < config.cheap_statement_ms)
    }
}

impl ClassifierRule for NPlusOneRule {
    fn kind(&self) -> FlagKind {
        FlagKind::NPlusOne
    }

    fn evaluate(&self, input: &ClassifyInput, config: &ThresholdConfig) -> Option<Finding> {
        let threshold = config.scope_statement_count_threshold;
        let total = input.records.len();

        let mut groups: Vec<PatternGroup> = input
            .groups
            .iter()
            .filter(|g| Self::group_qualifies(g, config))
            .take(config.top_k)
            .cloned()
            .collect();

        if groups.is_empty() {
            if total <= threshold {
                return None;
            }
            // Only the scope-wide count fired: show the most repeated patterns.
            let mut by_count: Vec<&PatternGroup> = input.groups.iter().collect();
            by_count.sort_by(|a, b| b.count.cmp(&a.count));
            groups = by_count.into_iter().take(config.top_k).cloned().collect();
        }

        let largest = groups.iter().map(|g| g.count).max().unwrap_or(0);
        let critical = threshold.saturating_mul(2);
        let severity = if total > critical || largest > critical {
            Severity::Critical
        } else {
            Severity::Warning
        };

        Some(Finding {
            kind: FlagKind::NPlusOne,
            severity,
            title: format!(
                "{total} statements, {} repeated pattern(s), largest x{largest}",
                groups.len()
            ),
            count: total,
            observed: largest as f64,
            threshold: threshold as f64,
            statements: Vec::new(),
            groups,
        })
    }
}

// ============================================================
// SlowScopeRule
// ============================================================

pub struct SlowScopeRule;

impl ClassifierRule for SlowScopeRule {
    fn kind(&self) -> FlagKind {
        FlagKind::SlowScope
    }

    fn evaluate(&self, input: &ClassifyInput, config: &ThresholdConfig) -> Option<Finding> {
        let total_ms = input.total_time * 1000.0;
        let budget = config.slow_scope_ms();
        if total_ms <= budget {
            return None;
        }

        let severity = if total_ms > budget * 5.0 {
            Severity::Critical
        } else {
            Severity::Warning
        };

        Some(Finding {
            kind: FlagKind::SlowScope,
            severity,
            title: format!(
                "{total_ms:.1}ms of statement time in {} statement(s)",
                input.records.len()
            ),
            count: input.records.len(),
            observed: total_ms,
            threshold: budget,
            statements: Vec::new(),
            groups: input.groups.iter().take(config.top_k).cloned().collect(),
        })
    }
}
