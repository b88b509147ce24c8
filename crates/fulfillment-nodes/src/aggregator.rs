//! Shipment grouping, recent-window metrics and sparsity classification
//!
//! Every observation lands in the `All` group (keyed by warehouse) and in
//! exactly one carrier group:
//!
//! | Carrier | Group | Key |
//! |---------|-------|-----|
//! | SWA     | `FirstParty` | warehouse node |
//! | UPS     | `ThirdParty` | lane |
//! | other   | `Others` | warehouse, never forecast |

use crate::carrier::{ShipmentType, ShippingCarrier};
use crate::node::{NodeKey, NodeMetrics, WarehouseId};
use crate::observation::ShipmentObservation;
use crate::registry::NodeRegistry;
use crate::{NodeError, Result};
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Default length of the recent window in days
pub const DEFAULT_WINDOW_DAYS: i64 = 28;

const WEEK_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CarrierGroup {
    All,
    ThirdParty,
    FirstParty,
    Others,
}

/// Forecastable nodes split by observation volume
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparsityPartition {
    pub sparse: Vec<NodeKey>,
    pub dense: Vec<NodeKey>,
}

/// Groups shipment observations by node and derives per-node metrics
#[derive(Debug, Default)]
pub struct ShipmentAggregator {
    registry: NodeRegistry,
    observations: Vec<ShipmentObservation>,
    all: BTreeMap<WarehouseId, Vec<usize>>,
    others: BTreeMap<WarehouseId, Vec<usize>>,
    /// Third-party lanes and first-party warehouse nodes
    forecastable: BTreeMap<NodeKey, Vec<usize>>,
}

impl ShipmentAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one observation into its carrier group
    pub fn add(&mut self, observation: ShipmentObservation) {
        let idx = self.observations.len();
        self.all
            .entry(observation.warehouse.clone())
            .or_default()
            .push(idx);

        let vendor = self
            .registry
            .vendor(&observation.vendor_id, &observation.primary_gl);
        vendor.warehouses.insert(observation.warehouse.clone());
        let primary_gl = vendor.primary_gl.clone();

        let profile = match observation.carrier() {
            Some(ShippingCarrier::Swa) => Some(observation.warehouse_profile(&primary_gl)),
            Some(ShippingCarrier::Ups) => Some(observation.lane_profile(&primary_gl)),
            _ => None,
        };

        match profile {
            Some(profile) => {
                let key = self.registry.get_or_insert(profile).key();
                self.forecastable.entry(key).or_default().push(idx);
            }
            None => {
                debug!(
                    "Carrier {:?} at {} is not forecast",
                    observation.carrier_code, observation.warehouse
                );
                self.others
                    .entry(observation.warehouse.clone())
                    .or_default()
                    .push(idx);
            }
        }

        self.observations.push(observation);
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }

    /// Forecastable node keys, lanes first
    pub fn forecastable_nodes(&self) -> impl Iterator<Item = &NodeKey> {
        self.forecastable.keys()
    }

    /// Observations grouped under a forecastable node
    ///
    /// Unknown nodes yield an empty list and a warning.
    pub fn observations_for(&self, key: &NodeKey) -> Vec<&ShipmentObservation> {
        match self.forecastable.get(key) {
            Some(indices) => indices.iter().map(|&i| &self.observations[i]).collect(),
            None => {
                warn!("No shipment group for node {} ({})", key, key.kind());
                Vec::new()
            }
        }
    }

    /// Total observations in a group, optionally only of one shipment type
    pub fn total_in_group(&self, group: CarrierGroup, shipment_type: Option<ShipmentType>) -> usize {
        match group {
            CarrierGroup::All => self.count_matching(self.all.values(), shipment_type),
            CarrierGroup::Others => self.count_matching(self.others.values(), shipment_type),
            CarrierGroup::ThirdParty => self.count_matching(
                self.forecastable
                    .iter()
                    .filter(|(k, _)| k.is_lane())
                    .map(|(_, v)| v),
                shipment_type,
            ),
            CarrierGroup::FirstParty => self.count_matching(
                self.forecastable
                    .iter()
                    .filter(|(k, _)| !k.is_lane())
                    .map(|(_, v)| v),
                shipment_type,
            ),
        }
    }

    fn count_matching<'a>(
        &self,
        groups: impl Iterator<Item = &'a Vec<usize>>,
        shipment_type: Option<ShipmentType>,
    ) -> usize {
        groups
            .flatten()
            .filter(|&&i| shipment_type.map_or(true, |t| self.observations[i].shipment_type == t))
            .count()
    }

    /// Each forecastable node's share (%) of all first- and third-party shipments
    pub fn shipment_shares(&self) -> BTreeMap<NodeKey, f64> {
        let total: usize = self.forecastable.values().map(Vec::len).sum();
        if total == 0 {
            return BTreeMap::new();
        }
        self.forecastable
            .iter()
            .map(|(key, v)| (key.clone(), v.len() as f64 / total as f64 * 100.0))
            .collect()
    }

    /// Set each forecastable node's total shipment count
    ///
    /// Only dated observations count; undated ones never reach a forecast.
    pub fn update_total_counts(&mut self) {
        for (key, indices) in &self.forecastable {
            if let Some(node) = self.registry.get_mut(key) {
                node.metrics.shipment_count = indices
                    .iter()
                    .filter(|&&i| self.observations[i].order_date.is_some())
                    .count();
            }
        }
    }

    /// Recompute recent delivery accuracy and transit metrics for every node
    ///
    /// The window covers observation days on or after `anchor - window_days`.
    /// Accuracy is the mean of weekly on-time ratios so one bad week weighs
    /// no more than any other.
    pub fn compute_recent_metrics(&mut self, anchor: NaiveDate, window_days: i64) -> Result<()> {
        if window_days <= 0 {
            return Err(NodeError::InvalidWindow(window_days));
        }
        let start = anchor - Duration::days(window_days);
        info!(
            "Computing recent metrics from {} ({} days before {})",
            start, window_days, anchor
        );

        let mut with_data = 0;
        for (key, indices) in &self.forecastable {
            let Some(node) = self.registry.get_mut(key) else {
                continue;
            };
            node.metrics.clear_recent();

            let recent: Vec<&ShipmentObservation> = indices
                .iter()
                .map(|&i| &self.observations[i])
                .filter(|o| o.order_date.is_some_and(|d| d.date() >= start))
                .collect();
            if recent.is_empty() {
                continue;
            }

            apply_recent_window(&mut node.metrics, &recent, start);
            with_data += 1;
        }

        info!(
            "Recent metrics available for {} of {} nodes",
            with_data,
            self.forecastable.len()
        );
        Ok(())
    }

    /// Split forecastable nodes into sparse (`count < threshold`) and dense
    pub fn classify_sparsity(&mut self, threshold: usize) -> SparsityPartition {
        let mut partition = SparsityPartition::default();
        let mut total_shipments = 0;
        let mut sparse_shipments = 0;

        for key in self.forecastable.keys() {
            let Some(node) = self.registry.get_mut(key) else {
                continue;
            };
            let count = node.metrics.shipment_count;
            total_shipments += count;
            node.is_sparse = count < threshold;
            if node.is_sparse {
                sparse_shipments += count;
                partition.sparse.push(key.clone());
            } else {
                partition.dense.push(key.clone());
            }
        }

        info!(
            "Sparsity threshold {}: {} sparse / {} dense nodes ({} of {} shipments sparse)",
            threshold,
            partition.sparse.len(),
            partition.dense.len(),
            sparse_shipments,
            total_shipments
        );
        partition
    }
}

fn apply_recent_window(metrics: &mut NodeMetrics, recent: &[&ShipmentObservation], start: NaiveDate) {
    // week -> (total, unpadded on time, padded on time)
    let mut weeks: BTreeMap<i64, (usize, usize, usize)> = BTreeMap::new();
    for o in recent {
        let Some(date) = o.order_date else { continue };
        let week = (date.date() - start).num_days() / WEEK_DAYS;
        let entry = weeks.entry(week).or_default();
        entry.0 += 1;
        entry.1 += usize::from(o.unpadded_on_time());
        entry.2 += usize::from(o.padded_on_time());
    }

    let unpadded_ratios: Vec<f64> = weeks
        .values()
        .filter(|(total, _, _)| *total > 0)
        .map(|(total, ok, _)| *ok as f64 / *total as f64)
        .collect();
    let padded_ratios: Vec<f64> = weeks
        .values()
        .filter(|(total, _, _)| *total > 0)
        .map(|(total, _, ok)| *ok as f64 / *total as f64)
        .collect();

    metrics.recent_shipment_count = recent.len();
    metrics.recent_unpadded_dea = mean(unpadded_ratios.iter().copied());
    metrics.recent_dea = mean(padded_ratios.iter().copied());
    metrics.recent_unpadded_c2p_days = mean(recent.iter().map(|o| o.unpadded_committed_days));
    metrics.recent_c2p_days = mean(recent.iter().map(|o| o.padded_committed_days));
    metrics.recent_c2d_days = mean(recent.iter().map(|o| o.actual_days));
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}
