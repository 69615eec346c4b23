//! Cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::staleness::{DivergenceAlgorithm, StatsDivergenceCalculator};
use crate::types::{PenumbraError, Result};

/// Default number of entries per tier.
pub const DEFAULT_CACHE_SIZE: usize = 1000;

/// Size of the execution-plan tier.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPlanCacheSize {
    /// Same size as the logical-plan tier.
    #[default]
    Default,
    /// Never caches; every lookup builds.
    Disabled,
    /// Explicit size. Zero behaves like [`ExecutionPlanCacheSize::Disabled`].
    Sized(usize),
}

/// Staleness thresholds and intervals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DivergenceConfig {
    /// Tolerated relative drift right after the minimum replan interval.
    pub initial_threshold: f64,
    /// Tolerated relative drift at the target replan interval.
    pub target_threshold: f64,
    /// No check happens more often than this.
    pub min_replan_interval: Duration,
    /// Age at which the threshold reaches its target.
    pub target_replan_interval: Duration,
    /// Decay shape.
    pub algorithm: DivergenceAlgorithm,
}

impl Default for DivergenceConfig {
    fn default() -> Self {
        Self {
            initial_threshold: 0.75,
            target_threshold: 0.10,
            min_replan_interval: Duration::from_secs(10),
            target_replan_interval: Duration::from_secs(7 * 60 * 60),
            algorithm: DivergenceAlgorithm::Exponential,
        }
    }
}

impl DivergenceConfig {
    /// Calculator for these settings.
    pub fn calculator(&self) -> StatsDivergenceCalculator {
        StatsDivergenceCalculator::new(
            self.initial_threshold,
            self.target_threshold,
            self.min_replan_interval,
            self.target_replan_interval,
            self.algorithm,
        )
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("initial_threshold", self.initial_threshold),
            ("target_threshold", self.target_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(PenumbraError::config(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
        }
        if self.target_threshold > self.initial_threshold {
            return Err(PenumbraError::config(
                "target_threshold must not exceed initial_threshold",
            ));
        }
        if self.min_replan_interval > self.target_replan_interval {
            return Err(PenumbraError::config(
                "min_replan_interval must not exceed target_replan_interval",
            ));
        }
        Ok(())
    }
}

/// Sizes of the five cache tiers and staleness settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Raw text to pre-parsed query.
    pub pre_parser_cache_size: usize,
    /// Pre-parsed query to syntax tree.
    pub ast_cache_size: usize,
    /// Syntax tree to logical plan.
    pub logical_plan_cache_size: usize,
    /// Logical plan to execution plan.
    pub execution_plan_cache_size: ExecutionPlanCacheSize,
    /// Query to executable query.
    pub executable_query_cache_size: usize,
    /// Staleness settings.
    pub divergence: DivergenceConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            pre_parser_cache_size: DEFAULT_CACHE_SIZE,
            ast_cache_size: DEFAULT_CACHE_SIZE,
            logical_plan_cache_size: DEFAULT_CACHE_SIZE,
            execution_plan_cache_size: ExecutionPlanCacheSize::Default,
            executable_query_cache_size: DEFAULT_CACHE_SIZE,
            divergence: DivergenceConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Sets every query-shaped tier to `size`.
    pub fn with_cache_size(mut self, size: usize) -> Self {
        self.pre_parser_cache_size = size;
        self.ast_cache_size = size;
        self.logical_plan_cache_size = size;
        self.executable_query_cache_size = size;
        self
    }

    /// Sets the execution-plan tier size.
    pub fn with_execution_plan_cache_size(mut self, size: ExecutionPlanCacheSize) -> Self {
        self.execution_plan_cache_size = size;
        self
    }

    /// Sets the staleness settings.
    pub fn with_divergence(mut self, divergence: DivergenceConfig) -> Self {
        self.divergence = divergence;
        self
    }

    /// Effective execution-plan tier capacity.
    pub fn execution_plan_capacity(&self) -> usize {
        match self.execution_plan_cache_size {
            ExecutionPlanCacheSize::Default => self.logical_plan_cache_size,
            ExecutionPlanCacheSize::Disabled => 0,
            ExecutionPlanCacheSize::Sized(size) => size,
        }
    }

    /// Rejects zero-sized tiers (except the execution-plan tier) and
    /// inconsistent staleness settings.
    pub fn validate(&self) -> Result<()> {
        for (name, size) in [
            ("pre_parser_cache_size", self.pre_parser_cache_size),
            ("ast_cache_size", self.ast_cache_size),
            ("logical_plan_cache_size", self.logical_plan_cache_size),
            ("executable_query_cache_size", self.executable_query_cache_size),
        ] {
            if size == 0 {
                return Err(PenumbraError::config(format!("{name} must be positive")));
            }
        }
        self.divergence.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = CacheConfig::default();
        config.validate().expect("valid");
        assert_eq!(config.execution_plan_capacity(), DEFAULT_CACHE_SIZE);
    }

    #[test]
    fn zero_sizes_are_rejected_except_execution_plans() {
        let err = CacheConfig::default()
            .with_cache_size(0)
            .validate()
            .expect_err("zero");
        assert!(matches!(err, PenumbraError::InvalidConfig(msg) if msg.contains("pre_parser")));

        let config = CacheConfig::default()
            .with_execution_plan_cache_size(ExecutionPlanCacheSize::Sized(0));
        config.validate().expect("valid");
        assert_eq!(config.execution_plan_capacity(), 0);
    }

    #[test]
    fn divergence_settings_are_checked() {
        let bad = DivergenceConfig {
            initial_threshold: 0.1,
            target_threshold: 0.5,
            ..DivergenceConfig::default()
        };
        assert!(CacheConfig::default().with_divergence(bad).validate().is_err());

        let bad = DivergenceConfig {
            initial_threshold: 1.5,
            ..DivergenceConfig::default()
        };
        assert!(CacheConfig::default().with_divergence(bad).validate().is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"ast_cache_size": 5, "execution_plan_cache_size": "disabled"}"#)
                .expect("parse");
        assert_eq!(config.ast_cache_size, 5);
        assert_eq!(config.logical_plan_cache_size, DEFAULT_CACHE_SIZE);
        assert_eq!(config.execution_plan_capacity(), 0);
    }
}
