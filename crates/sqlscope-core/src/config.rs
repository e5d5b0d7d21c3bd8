//! Threshold and monitor configuration.
//!
//! [`ThresholdConfig`] is set once at process start (see [`init_global`]) and
//! read-only afterwards, so it can be shared across request threads without
//! synchronization.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default slow statement threshold in milliseconds.
pub const DEFAULT_SLOW_STATEMENT_MS: f64 = 100.0;
/// Default per-scope statement count above which N+1 is suspected.
pub const DEFAULT_SCOPE_STATEMENT_COUNT_THRESHOLD: usize = 20;
/// Default multiplier applied to the slow statement threshold for scopes.
pub const DEFAULT_SLOW_SCOPE_MULTIPLIER: f64 = 2.0;
/// Default minimum group size for the repeated-cheap-statement rule.
pub const DEFAULT_MIN_GROUP_SIZE_FOR_N_PLUS_ONE: usize = 3;
/// Average time below which a statement counts as "cheap".
pub const DEFAULT_CHEAP_STATEMENT_MS: f64 = 10.0;
/// Number of groups/statements attached to a live event.
pub const DEFAULT_TOP_K: usize = 10;

const ENV_SLOW_STATEMENT_MS: &str = "SQLSCOPE_SLOW_STATEMENT_MS";
const ENV_QUERY_COUNT_THRESHOLD: &str = "SQLSCOPE_QUERY_COUNT_THRESHOLD";
const ENV_SLOW_SCOPE_MULTIPLIER: &str = "SQLSCOPE_SLOW_SCOPE_MULTIPLIER";
const ENV_MIN_GROUP_SIZE: &str = "SQLSCOPE_MIN_GROUP_SIZE";
const ENV_VARS: [&str; 4] = [
    ENV_SLOW_STATEMENT_MS,
    ENV_QUERY_COUNT_THRESHOLD,
    ENV_SLOW_SCOPE_MULTIPLIER,
    ENV_MIN_GROUP_SIZE,
];

/// Classification thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub slow_statement_ms: f64,
    pub scope_statement_count_threshold: usize,
    pub slow_scope_multiplier: f64,
    pub min_group_size_for_n_plus_one: usize,
    pub cheap_statement_ms: f64,
    pub top_k: usize,
}

/// Served by [`global`] until [`init_global`] installs something else.
static DEFAULT_THRESHOLDS: ThresholdConfig = ThresholdConfig {
    slow_statement_ms: DEFAULT_SLOW_STATEMENT_MS,
    scope_statement_count_threshold: DEFAULT_SCOPE_STATEMENT_COUNT_THRESHOLD,
    slow_scope_multiplier: DEFAULT_SLOW_SCOPE_MULTIPLIER,
    min_group_size_for_n_plus_one: DEFAULT_MIN_GROUP_SIZE_FOR_N_PLUS_ONE,
    cheap_statement_ms: DEFAULT_CHEAP_STATEMENT_MS,
    top_k: DEFAULT_TOP_K,
};

impl Default for ThresholdConfig {
    fn default() -> Self {
        DEFAULT_THRESHOLDS.clone()
    }
}

impl ThresholdConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(doc: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(doc).map_err(|e| ConfigError::Document(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `SQLSCOPE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Split out from [`from_env`](Self::from_env) so tests do not have to
    /// mutate the process environment.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_SLOW_STATEMENT_MS) {
            self.slow_statement_ms = parse_env(ENV_SLOW_STATEMENT_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_QUERY_COUNT_THRESHOLD) {
            self.scope_statement_count_threshold = parse_env(ENV_QUERY_COUNT_THRESHOLD, &v)?;
        }
        if let Some(v) = lookup(ENV_SLOW_SCOPE_MULTIPLIER) {
            self.slow_scope_multiplier = parse_env(ENV_SLOW_SCOPE_MULTIPLIER, &v)?;
        }
        if let Some(v) = lookup(ENV_MIN_GROUP_SIZE) {
            self.min_group_size_for_n_plus_one = parse_env(ENV_MIN_GROUP_SIZE, &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Apply each override on its own. A bad variable is skipped and
    /// reported; the others still apply.
    pub fn with_valid_overrides<F>(self, lookup: F) -> (Self, Vec<ConfigError>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = self;
        let mut errors = Vec::new();
        for var in ENV_VARS {
            let Some(value) = lookup(var) else {
                continue;
            };
            match config
                .clone()
                .with_overrides(|v| (v == var).then(|| value.clone()))
            {
                Ok(updated) => config = updated,
                Err(e) => errors.push(e),
            }
        }
        (config, errors)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative("slow_statement_ms", self.slow_statement_ms)?;
        check_non_negative("slow_scope_multiplier", self.slow_scope_multiplier)?;
        check_non_negative("cheap_statement_ms", self.cheap_statement_ms)?;
        if self.slow_scope_multiplier == 0.0 {
            return Err(ConfigError::Zero {
                field: "slow_scope_multiplier",
            });
        }
        if self.min_group_size_for_n_plus_one == 0 {
            return Err(ConfigError::Zero {
                field: "min_group_size_for_n_plus_one",
            });
        }
        Ok(())
    }

    /// Scope-level time budget in milliseconds.
    pub fn slow_scope_ms(&self) -> f64 {
        self.slow_statement_ms * self.slow_scope_multiplier
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidNumber { field, value })
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::BadEnv {
        var,
        value: value.to_string(),
    })
}

/// Gates for request scopes opened by the live hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    /// Request paths starting with any of these are not monitored.
    pub excluded_path_prefixes: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            excluded_path_prefixes: vec![
                "/static/".to_string(),
                "/media/".to_string(),
                "/favicon.ico".to_string(),
            ],
        }
    }
}

impl MonitorConfig {
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_path_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

static GLOBAL: OnceLock<ThresholdConfig> = OnceLock::new();

/// Install the process-wide thresholds. Only the first call succeeds.
///
/// Reading [`global`] beforehand does not count as a call.
pub fn init_global(config: ThresholdConfig) -> Result<(), ConfigError> {
    config.validate()?;
    GLOBAL
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)
}

/// Process-wide thresholds, or the defaults if none were installed yet.
pub fn global() -> &'static ThresholdConfig {
    GLOBAL.get().unwrap_or(&DEFAULT_THRESHOLDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = ThresholdConfig::default();
        assert_eq!(c.slow_statement_ms, 100.0);
        assert_eq!(c.scope_statement_count_threshold, 20);
        assert_eq!(c.slow_scope_multiplier, 2.0);
        assert_eq!(c.min_group_size_for_n_plus_one, 3);
        assert_eq!(c.slow_scope_ms(), 200.0);
    }

    #[test]
    fn test_from_json_partial() {
        let c = ThresholdConfig::from_json(r#"{"slow_statement_ms": 50}"#).unwrap();
        assert_eq!(c.slow_statement_ms, 50.0);
        assert_eq!(c.scope_statement_count_threshold, 20);
    }

    #[test]
    fn test_from_json_rejects_negative() {
        let err = ThresholdConfig::from_json(r#"{"slow_statement_ms": -1}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                field: "slow_statement_ms",
                ..
            }
        ));
    }

    #[test]
    fn test_from_json_garbage() {
        assert!(matches!(
            ThresholdConfig::from_json("not json"),
            Err(ConfigError::Document(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let c = ThresholdConfig::default()
            .with_overrides(|var| match var {
                "SQLSCOPE_SLOW_STATEMENT_MS" => Some("250".to_string()),
                "SQLSCOPE_QUERY_COUNT_THRESHOLD" => Some(" 5 ".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(c.slow_statement_ms, 250.0);
        assert_eq!(c.scope_statement_count_threshold, 5);
        assert_eq!(c.min_group_size_for_n_plus_one, 3);
    }

    #[test]
    fn test_overrides_bad_value() {
        let err = ThresholdConfig::default()
            .with_overrides(|var| (var == "SQLSCOPE_MIN_GROUP_SIZE").then(|| "x".to_string()))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::BadEnv {
                var: "SQLSCOPE_MIN_GROUP_SIZE",
                value: "x".to_string()
            }
        );
    }

    #[test]
    fn test_valid_overrides_skip_only_bad_values() {
        let (c, errors) = ThresholdConfig::default().with_valid_overrides(|var| match var {
            "SQLSCOPE_SLOW_STATEMENT_MS" => Some("40".to_string()),
            "SQLSCOPE_MIN_GROUP_SIZE" => Some("lots".to_string()),
            "SQLSCOPE_SLOW_SCOPE_MULTIPLIER" => Some("0".to_string()),
            _ => None,
        });
        assert_eq!(c.slow_statement_ms, 40.0);
        assert_eq!(c.min_group_size_for_n_plus_one, 3);
        assert_eq!(c.slow_scope_multiplier, 2.0);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_zero_multiplier_rejected() {
        let c = ThresholdConfig {
            slow_scope_multiplier: 0.0,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::Zero { .. })));
    }

    #[test]
    fn test_monitor_exclusions() {
        let m = MonitorConfig::default();
        assert!(m.is_excluded("/static/app.css"));
        assert!(m.is_excluded("/favicon.ico"));
        assert!(!m.is_excluded("/posts/1/"));
    }
}
