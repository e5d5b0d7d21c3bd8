//! sqlscope-core: SQL statement observability and N+1 detection.
//!
//! Provides:
//! - `statement` - statement records and the `StatementLog` accessor
//! - `normalize` - literal stripping into comparable patterns
//! - `aggregate` - per-pattern count / total / average / max
//! - `classify` - slow statement, N+1 and slow scope rules
//! - `scope` - begin/end deltas over a statement log
//! - `live` - structured `tracing` events for flagged scopes
//! - `monitor` - failure-isolated hook for hosts (requests, labelled operations)
//! - `batch` - offline log parsing, statistics and recommendations
//! - `format` - JSON and text report rendering
//! - `config` - thresholds, env overrides, process-wide settings

pub mod aggregate;
pub mod batch;
pub mod classify;
pub mod config;
pub mod error;
pub mod format;
pub mod live;
pub mod monitor;
pub mod normalize;
pub mod scope;
pub mod statement;

pub use aggregate::PatternGroup;
pub use batch::BatchReport;
pub use classify::{FlagKind, ScopeFlags, Severity};
pub use config::{MonitorConfig, ThresholdConfig};
pub use error::{BatchError, ConfigError, ScopeError};
pub use monitor::QueryMonitor;
pub use scope::{ScopeHandle, ScopeReport, ScopeTracker};
pub use statement::{MemoryLog, StatementLog, StatementRecord};
