//! Forecast configuration

use crate::{ForecastError, Result};
use chrono::NaiveDate;
use fulfillment_nodes::{DateParser, DEFAULT_WINDOW_DAYS};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// Default sparsity threshold (shipments per node)
pub const DEFAULT_SPARSITY_THRESHOLD: usize = 30;
/// Default decay rate of observation weights
pub const DEFAULT_LAMBDA_DECAY: f64 = 0.1;
/// Level always added to a range grid when the range runs past it
pub const TAIL_LEVEL: f64 = 99.0;
/// Largest grid a quantile range may expand to
pub const MAX_RANGE_LEVELS: usize = 10_000;

/// Evenly spaced quantile grid, `end` always included
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantileRange {
    pub start: f64,
    pub end: f64,
    pub increment: f64,
}

impl QuantileRange {
    /// Expand to `start, start + inc, … ≤ end`, then 99 (when below `end`) and `end`
    pub fn levels(&self) -> Result<Vec<f64>> {
        if self.increment <= 0.0 || !self.increment.is_finite() {
            return Err(ForecastError::InvalidConfig(format!(
                "quantile_range increment must be positive, got {}",
                self.increment
            )));
        }
        if !self.start.is_finite() || !self.end.is_finite() || self.start > self.end {
            return Err(ForecastError::InvalidConfig(format!(
                "quantile_range start {} must not exceed end {}",
                self.start, self.end
            )));
        }

        let steps = ((self.end - self.start) / self.increment).floor();
        if steps >= MAX_RANGE_LEVELS as f64 {
            return Err(ForecastError::InvalidConfig(format!(
                "quantile_range yields more than {} levels (increment {})",
                MAX_RANGE_LEVELS, self.increment
            )));
        }

        let mut levels = Vec::new();
        let mut step = 0u32;
        loop {
            let level = self.start + f64::from(step) * self.increment;
            if level > self.end {
                break;
            }
            levels.push(level);
            step += 1;
        }
        if TAIL_LEVEL < self.end {
            levels.push(TAIL_LEVEL);
        }
        levels.push(self.end);
        Ok(levels)
    }
}

/// Configuration as read from disk; CLI flags may override any field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    #[serde(default = "default_sparsity_threshold")]
    pub sparsity_threshold: usize,
    #[serde(default)]
    pub quantile_levels: Option<Vec<f64>>,
    #[serde(default)]
    pub quantile_range: Option<QuantileRange>,
    #[serde(default = "default_lambda_decay")]
    pub lambda_decay: f64,
    #[serde(default)]
    pub recent_window_anchor_date: Option<String>,
    #[serde(default = "default_window_days")]
    pub recent_window_days: i64,
}

fn default_sparsity_threshold() -> usize {
    DEFAULT_SPARSITY_THRESHOLD
}

fn default_lambda_decay() -> f64 {
    DEFAULT_LAMBDA_DECAY
}

fn default_window_days() -> i64 {
    DEFAULT_WINDOW_DAYS
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            sparsity_threshold: DEFAULT_SPARSITY_THRESHOLD,
            quantile_levels: None,
            quantile_range: None,
            lambda_decay: DEFAULT_LAMBDA_DECAY,
            recent_window_anchor_date: None,
            recent_window_days: DEFAULT_WINDOW_DAYS,
        }
    }
}

/// Validated configuration ready for a forecast run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    pub sparsity_threshold: usize,
    /// Ascending, distinct levels in (0, 100]
    pub quantile_levels: Vec<f64>,
    pub lambda_decay: f64,
    pub anchor_date: NaiveDate,
    pub window_days: i64,
}

impl ForecastConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading forecast config from {:?}", path);
        let file = File::open(path)?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    /// Validate every field and build the quantile grid
    ///
    /// Explicit `quantile_levels` win over `quantile_range`.
    pub fn resolve(&self, parser: &mut DateParser) -> Result<ResolvedConfig> {
        let raw_anchor = self
            .recent_window_anchor_date
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ForecastError::MissingAnchorDate)?;
        let anchor_date = parser
            .parse_date(raw_anchor)
            .ok_or_else(|| ForecastError::InvalidAnchorDate(raw_anchor.to_string()))?;

        if self.recent_window_days <= 0 {
            return Err(ForecastError::InvalidConfig(format!(
                "recent_window_days must be positive, got {}",
                self.recent_window_days
            )));
        }
        if !(0.0..=1.0).contains(&self.lambda_decay) {
            return Err(ForecastError::InvalidConfig(format!(
                "lambda_decay must be within [0, 1], got {}",
                self.lambda_decay
            )));
        }

        let mut levels = match (&self.quantile_levels, &self.quantile_range) {
            (Some(levels), _) => levels.clone(),
            (None, Some(range)) => range.levels()?,
            (None, None) => {
                return Err(ForecastError::InvalidConfig(
                    "one of quantile_levels or quantile_range is required".to_string(),
                ))
            }
        };
        if let Some(bad) = levels.iter().find(|l| l.is_nan() || **l <= 0.0 || **l > 100.0) {
            return Err(ForecastError::InvalidConfig(format!(
                "quantile level {} is outside (0, 100]",
                bad
            )));
        }
        levels.sort_by(f64::total_cmp);
        levels.dedup();
        if levels.is_empty() {
            return Err(ForecastError::InvalidConfig(
                "quantile grid is empty".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            sparsity_threshold: self.sparsity_threshold,
            quantile_levels: levels,
            lambda_decay: self.lambda_decay,
            anchor_date,
            window_days: self.recent_window_days,
        })
    }
}
