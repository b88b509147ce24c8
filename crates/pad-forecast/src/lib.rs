//! Promise Padding Forecaster
//!
//! Estimates, per shipping node, the distribution of padding (days added to
//! the unpadded promise) needed to hit delivery-accuracy targets. The
//! distributions feed a downstream optimizer that picks one pad per node.
//!
//! # Two-Phase Model
//!
//! ```text
//! observations ─► aggregator ─► dense nodes ─► weighted quantiles ─┐
//!                             └► sparse lanes ─► similarity blend ◄─┘
//! ```
//!
//! | Phase | Nodes | Method |
//! |-------|-------|--------|
//! | 1 | dense (`count ≥ threshold`) | time-decayed weighted quantiles of the unpadded gap |
//! | 2 | sparse third-party lanes | equal-weight blend of the best-scoring dense lanes |
//!
//! Phase 2 reads the finished phase 1 [`Forecast`], so it cannot start early.

use fulfillment_nodes::{NodeError, NodeKey};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

pub mod config;
pub mod loader;
pub mod pipeline;
pub mod quantile;
pub mod report;
pub mod similarity;

pub use config::{ForecastConfig, QuantileRange, ResolvedConfig};
pub use pipeline::{ForecastOutcome, ForecastPipeline};
pub use quantile::QuantileForecaster;
pub use similarity::{ScoredMatch, SimilarityCache, SimilarityExtrapolator};

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error("Recent window anchor date is not configured")]
    MissingAnchorDate,
    #[error("Unparsable recent window anchor date: {0:?}")]
    InvalidAnchorDate(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Unsupported input format: {0:?}")]
    UnsupportedInput(PathBuf),
}

pub type Result<T> = std::result::Result<T, ForecastError>;

/// Quantile level in percent (0-100), totally ordered so it can key a map
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(transparent)]
pub struct QuantileLevel(f64);

impl QuantileLevel {
    pub fn new(percent: f64) -> Self {
        Self(percent)
    }

    pub fn percent(&self) -> f64 {
        self.0
    }

    pub fn proportion(&self) -> f64 {
        self.0 / 100.0
    }
}

impl PartialEq for QuantileLevel {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QuantileLevel {}

impl PartialOrd for QuantileLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QuantileLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Padding value (days) per quantile level, a non-decreasing step function
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Distribution {
    points: BTreeMap<QuantileLevel, f64>,
}

impl Distribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points(points: impl IntoIterator<Item = (f64, f64)>) -> Self {
        Self {
            points: points
                .into_iter()
                .map(|(level, value)| (QuantileLevel::new(level), value))
                .collect(),
        }
    }

    /// Set the value at `level`, returning the value it replaced
    pub fn insert(&mut self, level: f64, value: f64) -> Option<f64> {
        self.points.insert(QuantileLevel::new(level), value)
    }

    pub fn get(&self, level: f64) -> Option<f64> {
        self.points.get(&QuantileLevel::new(level)).copied()
    }

    pub fn contains_level(&self, level: f64) -> bool {
        self.points.contains_key(&QuantileLevel::new(level))
    }

    /// `(level, value)` pairs in ascending level order
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.points.iter().map(|(level, value)| (level.percent(), *value))
    }

    pub fn max_level(&self) -> Option<f64> {
        self.points.keys().next_back().map(QuantileLevel::percent)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Keep only the highest level among levels sharing a value
    pub fn dedup_by_value(&mut self) {
        let mut kept: Vec<f64> = Vec::with_capacity(self.points.len());
        let mut dropped: Vec<QuantileLevel> = Vec::new();
        for (level, value) in self.points.iter().rev() {
            if kept.iter().any(|k| k == value) {
                dropped.push(*level);
            } else {
                kept.push(*value);
            }
        }
        for level in dropped {
            self.points.remove(&level);
        }
    }
}

/// Forecast distributions per node; an entry is never replaced once inserted
#[derive(Debug, Clone, Default)]
pub struct Forecast {
    nodes: BTreeMap<NodeKey, Distribution>,
}

impl Forecast {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node's distribution; `false` if the node already has one
    pub fn insert(&mut self, key: NodeKey, distribution: Distribution) -> bool {
        match self.nodes.entry(key) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(distribution);
                true
            }
        }
    }

    pub fn get(&self, key: &NodeKey) -> Option<&Distribution> {
        self.nodes.get(key)
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeKey, &Distribution)> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Extend<(NodeKey, Distribution)> for Forecast {
    fn extend<I: IntoIterator<Item = (NodeKey, Distribution)>>(&mut self, iter: I) {
        for (key, distribution) in iter {
            self.insert(key, distribution);
        }
    }
}

impl IntoIterator for Forecast {
    type Item = (NodeKey, Distribution);
    type IntoIter = std::collections::btree_map::IntoIter<NodeKey, Distribution>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

/// Convert a padding value in days to hours
pub fn days_to_hours(days: f64) -> f64 {
    days * 24.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulfillment_nodes::WarehouseId;

    #[test]
    fn test_quantile_levels_are_ordered() {
        let mut levels = vec![
            QuantileLevel::new(99.0),
            QuantileLevel::new(5.0),
            QuantileLevel::new(50.0),
        ];
        levels.sort();
        let percents: Vec<f64> = levels.iter().map(QuantileLevel::percent).collect();
        assert_eq!(percents, vec![5.0, 50.0, 99.0]);
        assert_eq!(QuantileLevel::new(25.0).proportion(), 0.25);
    }

    #[test]
    fn test_dedup_keeps_highest_level_per_value() {
        let mut dist = Distribution::from_points([
            (10.0, -1.0),
            (20.0, 0.0),
            (30.0, 0.0),
            (40.0, 0.0),
            (50.0, 1.0),
            (60.0, 2.0),
            (70.0, 2.0),
        ]);
        dist.dedup_by_value();

        let points: Vec<(f64, f64)> = dist.iter().collect();
        assert_eq!(points, vec![(10.0, -1.0), (40.0, 0.0), (50.0, 1.0), (70.0, 2.0)]);
    }

    #[test]
    fn test_forecast_entries_are_write_once() {
        let key = NodeKey::Warehouse(WarehouseId::new("WH1"));
        let mut forecast = Forecast::new();

        assert!(forecast.insert(key.clone(), Distribution::from_points([(50.0, 1.0)])));
        assert!(!forecast.insert(key.clone(), Distribution::from_points([(50.0, 9.0)])));
        assert_eq!(forecast.get(&key).unwrap().get(50.0), Some(1.0));
        assert_eq!(forecast.len(), 1);
    }

    #[test]
    fn test_days_to_hours() {
        assert_eq!(days_to_hours(1.5), 36.0);
        assert_eq!(days_to_hours(-0.5), -12.0);
    }
}
