//! Per-deployment accumulator parameters.

use std::collections::HashSet;
use std::time::Duration;

use crate::error::CoreError;
use crate::series::Position;

/// A tracked series. Cumulative series store a running total of the
/// sampled values instead of the samples themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSpec {
    pub name: String,
    pub cumulative: bool,
}

impl SeriesSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cumulative: false,
        }
    }

    pub fn cumulative(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cumulative: true,
        }
    }
}

/// Bootstrap state used when nothing has been persisted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seed {
    /// Axis position of the first seeded point, or of the first fetched
    /// point when `points` is zero.
    pub origin: Position,
    /// Number of zero-valued points to pre-fill.
    pub points: usize,
}

/// Bounded retry for individual observer calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Delay before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulatorConfig {
    pub step_size: u64,
    pub rollback_window: usize,
    /// Reorg detection is skipped while the axis holds this many points or
    /// fewer, so a freshly seeded series is never rolled back.
    pub minimum_history: usize,
    pub series: Vec<SeriesSpec>,
    pub seed: Seed,
    pub retry: RetryPolicy,
}

impl AccumulatorConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.step_size == 0 {
            return Err(CoreError::InvalidConfig(
                "step size must be at least 1".to_owned(),
            ));
        }
        if self.series.is_empty() {
            return Err(CoreError::InvalidConfig(
                "at least one series must be configured".to_owned(),
            ));
        }
        if self.retry.attempts == 0 {
            return Err(CoreError::InvalidConfig(
                "retry attempts must be at least 1".to_owned(),
            ));
        }
        if self.minimum_history < self.rollback_window {
            return Err(CoreError::InvalidConfig(format!(
                "minimum history ({}) must be at least the rollback window ({})",
                self.minimum_history, self.rollback_window
            )));
        }

        let mut seen = HashSet::with_capacity(self.series.len());
        for spec in &self.series {
            if spec.name.is_empty() {
                return Err(CoreError::InvalidConfig(
                    "series names must not be empty".to_owned(),
                ));
            }
            if matches!(spec.name.as_str(), "blocks_axis" | "step_size" | "lastBlockHash") {
                return Err(CoreError::InvalidConfig(format!(
                    "series name `{}` is reserved",
                    spec.name
                )));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(CoreError::InvalidConfig(format!(
                    "duplicate series name `{}`",
                    spec.name
                )));
            }
        }

        Ok(())
    }

    pub fn series_names(&self) -> impl Iterator<Item = &str> {
        self.series.iter().map(|spec| spec.name.as_str())
    }
}
