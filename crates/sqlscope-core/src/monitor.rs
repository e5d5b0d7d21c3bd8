//! The single hook point hosts call into.
//!
//! [`QueryMonitor`] wraps a [`ScopeTracker`] and the live reporter, and
//! makes sure nothing it does can fail the unit of work being observed:
//! errors and panics inside analysis are logged and turned into `None`.

use std::panic::{self, AssertUnwindSafe};

use tracing::{error, warn};

use crate::config::{MonitorConfig, ThresholdConfig};
use crate::error::ScopeError;
use crate::live;
use crate::scope::{ScopeHandle, ScopeReport, ScopeTracker};
use crate::statement::StatementLog;

pub struct QueryMonitor<L> {
    tracker: ScopeTracker<L>,
    settings: MonitorConfig,
}

impl<L: StatementLog> QueryMonitor<L> {
    pub fn new(log: L, thresholds: ThresholdConfig, settings: MonitorConfig) -> Self {
        Self {
            tracker: ScopeTracker::with_config(log, thresholds),
            settings,
        }
    }

    pub fn tracker(&self) -> &ScopeTracker<L> {
        &self.tracker
    }

    /// Open a request scope labelled `"METHOD path"`.
    ///
    /// Returns `None` when monitoring is off or the path is excluded.
    pub fn begin_request(&self, method: &str, path: &str) -> Option<ScopeHandle> {
        if !self.settings.enabled || self.settings.is_excluded(path) {
            return None;
        }
        Some(self.tracker.begin(format!("{method} {path}")))
    }

    /// Open a scope for an arbitrary labelled operation.
    pub fn begin(&self, label: impl Into<String>) -> Option<ScopeHandle> {
        self.settings.enabled.then(|| self.tracker.begin(label))
    }

    /// Close `handle`, log its events and return the report.
    ///
    /// Never fails: an invalid scope or a panic during analysis is logged and
    /// yields `None`.
    pub fn finish(&self, handle: &mut ScopeHandle) -> Option<ScopeReport> {
        let label = handle.label().to_string();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<_, ScopeError> {
            let report = self.tracker.end(handle)?;
            live::emit(&report);
            Ok(report)
        }));

        match outcome {
            Ok(Ok(report)) => Some(report),
            Ok(Err(e)) => {
                warn!(scope_label = %label, error = %e, "scope dropped without report");
                None
            }
            Err(_) => {
                error!(scope_label = %label, "query monitoring panicked, scope dropped");
                None
            }
        }
    }

    /// Scope that reports when dropped.
    pub fn operation(&self, label: impl Into<String>) -> ScopeGuard<'_, L> {
        ScopeGuard {
            monitor: self,
            handle: self.begin(label),
        }
    }
}

/// Reports its scope on drop, or earlier via [`finish`](ScopeGuard::finish).
pub struct ScopeGuard<'a, L: StatementLog> {
    monitor: &'a QueryMonitor<L>,
    handle: Option<ScopeHandle>,
}

impl<L: StatementLog> ScopeGuard<'_, L> {
    pub fn finish(mut self) -> Option<ScopeReport> {
        let mut handle = self.handle.take()?;
        self.monitor.finish(&mut handle)
    }
}

impl<L: StatementLog> Drop for ScopeGuard<'_, L> {
    fn drop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            self.monitor.finish(&mut handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::{MemoryLog, StatementRecord};
    use std::borrow::Cow;
    use std::cell::Cell;
    use std::ops::Range;
    use std::time::Duration;

    fn monitor(log: &MemoryLog) -> QueryMonitor<&MemoryLog> {
        QueryMonitor::new(log, ThresholdConfig::default(), MonitorConfig::default())
    }

    #[test]
    fn test_request_scope() {
        let log = MemoryLog::new();
        let m = monitor(&log);
        let mut handle = m.begin_request("GET", "/posts/3/").unwrap();
        for i in 0..25 {
            log.record(
                format!("SELECT * FROM comment WHERE id = {i}"),
                Duration::from_millis(2),
            );
        }
        let report = m.finish(&mut handle).unwrap();
        assert_eq!(report.label, "GET /posts/3/");
        assert!(report.flags.suspected_n_plus_one);
        assert!(!report.flags.slow_statements);
    }

    #[test]
    fn test_excluded_paths_and_disabled() {
        let log = MemoryLog::new();
        let m = monitor(&log);
        assert!(m.begin_request("GET", "/static/css/site.css").is_none());

        let off = QueryMonitor::new(
            &log,
            ThresholdConfig::default(),
            MonitorConfig {
                enabled: false,
                ..Default::default()
            },
        );
        assert!(off.begin_request("GET", "/").is_none());
        assert!(off.begin("task").is_none());
        assert!(off.operation("task").finish().is_none());
    }

    #[test]
    fn test_invalid_scope_is_swallowed() {
        let log = MemoryLog::new();
        log.record("SELECT 1", Duration::ZERO);
        let m = monitor(&log);
        let mut handle = m.begin("op").unwrap();
        log.reset();
        assert!(m.finish(&mut handle).is_none());
        assert!(m.finish(&mut handle).is_none());
    }

    #[test]
    fn test_guard_finish() {
        let log = MemoryLog::new();
        let m = monitor(&log);
        let guard = m.operation("build feed");
        log.record("SELECT 1", Duration::from_millis(1));
        let report = guard.finish().unwrap();
        assert_eq!(report.label, "build feed");
        assert_eq!(report.total_statement_count, 1);
    }

    /// Counts `slice` calls, i.e. scopes actually ended against it.
    #[derive(Default)]
    struct CountingLog {
        inner: MemoryLog,
        slices: Cell<usize>,
    }

    impl StatementLog for CountingLog {
        fn len(&self) -> usize {
            self.inner.len()
        }

        fn slice(&self, range: Range<usize>) -> Cow<'_, [StatementRecord]> {
            self.slices.set(self.slices.get() + 1);
            self.inner.slice(range)
        }
    }

    #[test]
    fn test_guard_reports_on_drop() {
        let log = CountingLog::default();
        let m = QueryMonitor::new(&log, ThresholdConfig::default(), MonitorConfig::default());
        {
            let _guard = m.operation("implicit");
            log.inner.record("SELECT 1", Duration::from_millis(1));
            assert_eq!(log.slices.get(), 0);
        }
        assert_eq!(log.slices.get(), 1);

        // An explicitly finished guard does not end again on drop.
        let guard = m.operation("explicit");
        assert!(guard.finish().is_some());
        assert_eq!(log.slices.get(), 2);
    }

    struct PanickingLog;

    impl StatementLog for PanickingLog {
        fn len(&self) -> usize {
            0
        }

        fn slice(&self, _range: Range<usize>) -> Cow<'_, [StatementRecord]> {
            panic!("driver log unavailable")
        }
    }

    #[test]
    fn test_panic_in_log_does_not_escape() {
        let m = QueryMonitor::new(
            PanickingLog,
            ThresholdConfig::default(),
            MonitorConfig::default(),
        );
        let mut handle = m.begin("op").unwrap();
        assert!(m.finish(&mut handle).is_none());
    }
}
