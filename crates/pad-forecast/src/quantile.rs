//! Time-decayed weighted quantile forecasts for dense nodes
//!
//! Each dense node's forecast is the weighted nearest-rank quantile of its
//! unpadded gaps (`actual − unpadded_committed`), with newer shipments
//! weighted up by `λ·(1−λ)^√age`.

use crate::config::ResolvedConfig;
use crate::{Distribution, Forecast, QuantileLevel};
use chrono::NaiveDateTime;
use fulfillment_nodes::{NodeKey, ShipmentAggregator, ShipmentObservation};
use rayon::prelude::*;
use tracing::{debug, info, warn};

/// Normalized recency weights, one per date
///
/// Age is measured in whole days back from the newest date. When every raw
/// weight is zero (λ = 0) the weights fall back to uniform.
pub fn time_decay_weights(dates: &[NaiveDateTime], lambda: f64) -> Vec<f64> {
    let Some(newest) = dates.iter().max() else {
        return Vec::new();
    };

    let mut weights: Vec<f64> = dates
        .iter()
        .map(|d| {
            let age_days = (*newest - *d).num_days() as f64;
            lambda * (1.0 - lambda).powf(age_days.sqrt())
        })
        .collect();

    let mut total: f64 = weights.iter().sum();
    if total == 0.0 {
        weights.iter_mut().for_each(|w| *w = 1.0);
        total = weights.len() as f64;
    }
    weights.iter_mut().for_each(|w| *w /= total);
    weights
}

/// Weighted nearest-rank quantiles at `levels` (percent)
///
/// Values are sorted ascending (stable) and paired with their weights; each
/// level takes the first value whose normalized cumulative weight reaches it,
/// or the largest value when none does. Pairs past the shorter slice are
/// ignored.
pub fn weighted_quantiles(values: &[f64], weights: &[f64], levels: &[f64]) -> Distribution {
    let mut pairs: Vec<(f64, f64)> = values.iter().copied().zip(weights.iter().copied()).collect();
    if pairs.is_empty() {
        return Distribution::new();
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut running = 0.0;
    let cumulative: Vec<f64> = pairs
        .iter()
        .map(|(_, w)| {
            running += w;
            running
        })
        .collect();
    let total = running;
    let max_value = pairs[pairs.len() - 1].0;

    let mut out = Distribution::new();
    for &level in levels {
        let q = QuantileLevel::new(level).proportion();
        let value = cumulative
            .iter()
            .position(|c| c / total >= q)
            .map_or(max_value, |i| pairs[i].0);
        out.insert(level, value);
    }
    out
}

/// Add a synthetic zero-padding level to a distribution that skipped zero
///
/// The level lands halfway between the first level with a positive value and
/// the level before it (floored to a whole level), or at half the first level
/// when nothing precedes it. A floored level that already exists, or is not
/// positive, is replaced by the exact midpoint. With no positive value the
/// zero goes one level above the maximum.
pub fn insert_zero(dist: &mut Distribution) {
    let mut entries: Vec<(f64, f64)> = dist.iter().collect();
    if entries.is_empty() {
        return;
    }
    entries.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.total_cmp(&b.0)));

    let Some(i) = entries.iter().position(|(_, v)| *v > 0.0) else {
        if let Some(max_level) = dist.max_level() {
            dist.insert(max_level + 1.0, 0.0);
        }
        return;
    };

    let level = entries[i].0;
    let exact = if i > 0 {
        (entries[i - 1].0 + level) / 2.0
    } else {
        level / 2.0
    };
    let floored = exact.floor();
    let zero_level = if floored <= 0.0 || dist.contains_level(floored) {
        exact
    } else {
        floored
    };
    debug!("Inserted zero padding at level {}", zero_level);
    dist.insert(zero_level, 0.0);
}

/// Weighted quantiles followed by zero insertion and value dedup
pub fn adjusted_quantiles(values: &[f64], weights: &[f64], levels: &[f64]) -> Distribution {
    let mut dist = weighted_quantiles(values, weights, levels);
    let output_has_zero = dist.iter().any(|(_, v)| v == 0.0);
    let input_has_zero = values.contains(&0.0);
    if !output_has_zero && input_has_zero {
        insert_zero(&mut dist);
    }
    dist.dedup_by_value();
    dist
}

/// Phase one forecaster
#[derive(Debug, Clone)]
pub struct QuantileForecaster {
    levels: Vec<f64>,
    lambda_decay: f64,
}

impl QuantileForecaster {
    pub fn new(levels: Vec<f64>, lambda_decay: f64) -> Self {
        Self {
            levels,
            lambda_decay,
        }
    }

    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(config.quantile_levels.clone(), config.lambda_decay)
    }

    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    /// Forecast one node from its observations
    ///
    /// Only observations with a date and a finite gap count; with none the
    /// result is empty.
    pub fn forecast_node(&self, node: &NodeKey, observations: &[&ShipmentObservation]) -> Distribution {
        let (dates, gaps): (Vec<NaiveDateTime>, Vec<f64>) = observations
            .iter()
            .filter_map(|o| {
                let gap = o.unpadded_gap();
                o.order_date.filter(|_| gap.is_finite()).map(|d| (d, gap))
            })
            .unzip();

        if dates.is_empty() {
            warn!("No usable observations for node {}", node);
            return Distribution::new();
        }

        let weights = time_decay_weights(&dates, self.lambda_decay);
        let dist = adjusted_quantiles(&gaps, &weights, &self.levels);
        debug!(
            "Forecast {} from {} observations: {} levels",
            node,
            gaps.len(),
            dist.len()
        );
        dist
    }

    /// Forecast every dense node in parallel
    ///
    /// Nodes without usable observations get no entry.
    pub fn forecast_all(&self, aggregator: &ShipmentAggregator, dense: &[NodeKey]) -> Forecast {
        info!("Forecasting {} dense nodes", dense.len());

        let results: Vec<(NodeKey, Distribution)> = dense
            .par_iter()
            .map(|key| {
                let observations = aggregator.observations_for(key);
                (key.clone(), self.forecast_node(key, &observations))
            })
            .filter(|(_, dist)| !dist.is_empty())
            .collect();

        let mut forecast = Forecast::new();
        forecast.extend(results);
        info!(
            "Phase one produced {} of {} dense forecasts",
            forecast.len(),
            dense.len()
        );
        forecast
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use fulfillment_nodes::{DistanceZone, LaneKey, ShipmentType, WarehouseId, Zip3};
    use proptest::prelude::*;

    fn make_datetime(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .and_then(|d| d.and_hms_opt(9, 0, 0))
            .unwrap()
    }

    fn make_obs(warehouse: &str, day: Option<u32>, unpadded: f64, actual: f64) -> ShipmentObservation {
        ShipmentObservation {
            vendor_id: "V1".to_string(),
            primary_gl: "Furniture".to_string(),
            warehouse: WarehouseId::new(warehouse),
            origin_zip3: Zip3::new(100).unwrap(),
            dest_zip3: Zip3::new(981).unwrap(),
            carrier_code: "UPS".to_string(),
            ship_method: "UPS_GROUND".to_string(),
            shipment_type: ShipmentType::UpsGround,
            distance_zone: DistanceZone::Long,
            order_date: day.map(make_datetime),
            unpadded_committed_days: unpadded,
            padded_committed_days: unpadded + 1.0,
            actual_days: actual,
        }
    }

    fn lane_key(warehouse: &str) -> NodeKey {
        NodeKey::Lane(LaneKey::new(
            WarehouseId::new(warehouse),
            Zip3::new(981).unwrap(),
            "UPS_GROUND",
        ))
    }

    #[test]
    fn test_weighted_quantiles_nearest_rank() {
        let dist = weighted_quantiles(&[3.0, 0.0, 4.0, 1.0, 2.0], &[0.2; 5], &[25.0, 50.0, 75.0]);
        let points: Vec<(f64, f64)> = dist.iter().collect();
        assert_eq!(points, vec![(25.0, 1.0), (50.0, 2.0), (75.0, 3.0)]);
    }

    #[test]
    fn test_weighted_quantiles_respects_weights() {
        // almost all mass on the largest value
        let dist = weighted_quantiles(&[1.0, 2.0, 9.0], &[0.05, 0.05, 0.9], &[8.0, 50.0]);
        assert_eq!(dist.get(8.0), Some(2.0));
        assert_eq!(dist.get(50.0), Some(9.0));
    }

    #[test]
    fn test_weighted_quantiles_empty_input() {
        assert!(weighted_quantiles(&[], &[], &[50.0]).is_empty());
    }

    #[test]
    fn test_zero_inserted_below_lowest_level() {
        let values = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let weights = [0.1, 1.0, 1.0, 1.0, 1.0, 1.0];
        let dist = adjusted_quantiles(&values, &weights, &[10.0, 25.0, 50.0, 75.0]);

        let points: Vec<(f64, f64)> = dist.iter().collect();
        assert_eq!(
            points,
            vec![(5.0, 0.0), (10.0, 1.0), (25.0, 2.0), (50.0, 3.0), (75.0, 4.0)]
        );
    }

    #[test]
    fn test_zero_inserted_between_levels() {
        let mut dist = Distribution::from_points([(10.0, -2.0), (30.0, -1.0), (60.0, 1.0)]);
        insert_zero(&mut dist);
        assert_eq!(dist.get(45.0), Some(0.0));
    }

    #[test]
    fn test_zero_insertion_collision_uses_exact_midpoint() {
        let mut dist = Distribution::from_points([(10.0, -1.0), (11.0, 2.0)]);
        insert_zero(&mut dist);
        assert_eq!(dist.get(10.5), Some(0.0));
        assert_eq!(dist.get(10.0), Some(-1.0));

        let mut lowest = Distribution::from_points([(1.0, 3.0)]);
        insert_zero(&mut lowest);
        assert_eq!(lowest.get(0.5), Some(0.0));
    }

    #[test]
    fn test_zero_appended_when_nothing_positive() {
        let mut dist = Distribution::from_points([(50.0, -2.0), (90.0, -1.0)]);
        insert_zero(&mut dist);
        assert_eq!(dist.get(91.0), Some(0.0));
    }

    #[test]
    fn test_no_zero_insertion_without_zero_input() {
        let dist = adjusted_quantiles(&[1.0, 2.0, 3.0], &[1.0; 3], &[50.0]);
        assert_eq!(dist.len(), 1);
        assert_eq!(dist.get(50.0), Some(2.0));
    }

    #[test]
    fn test_adjusted_quantiles_dedups_values() {
        let dist = adjusted_quantiles(&[1.0, 1.0, 1.0, 5.0], &[1.0; 4], &[10.0, 25.0, 50.0, 90.0]);
        let points: Vec<(f64, f64)> = dist.iter().collect();
        assert_eq!(points, vec![(50.0, 1.0), (90.0, 5.0)]);
    }

    #[test]
    fn test_decay_favors_recent_dates() {
        let dates = [make_datetime(1), make_datetime(10), make_datetime(10)];
        let weights = time_decay_weights(&dates, 0.1);
        assert!(weights[0] < weights[1]);
        assert_eq!(weights[1], weights[2]);
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_decay_zero_lambda_is_uniform() {
        let dates = [make_datetime(1), make_datetime(5), make_datetime(9), make_datetime(12)];
        let weights = time_decay_weights(&dates, 0.0);
        assert!(weights.iter().all(|w| *w == 0.25));
        assert!(time_decay_weights(&[], 0.1).is_empty());
    }

    #[test]
    fn test_forecast_node_skips_undated_observations() {
        let forecaster = QuantileForecaster::new(vec![50.0], 0.1);
        let key = lane_key("WH1");
        let a = make_obs("WH1", Some(3), 2.0, 4.0);
        let b = make_obs("WH1", None, 2.0, 100.0);

        let dist = forecaster.forecast_node(&key, &[&a, &b]);
        assert_eq!(dist.get(50.0), Some(2.0));

        assert!(forecaster.forecast_node(&key, &[&b]).is_empty());
    }

    #[test]
    fn test_forecast_all_omits_empty_nodes() {
        let mut agg = ShipmentAggregator::new();
        for day in 1..=5 {
            agg.add(make_obs("WH1", Some(day), 3.0, 3.0 + f64::from(day)));
        }
        agg.add(make_obs("WH2", None, 3.0, 5.0));

        let forecaster = QuantileForecaster::new(vec![50.0, 90.0], 0.1);
        let forecast = forecaster.forecast_all(&agg, &[lane_key("WH1"), lane_key("WH2")]);

        assert_eq!(forecast.len(), 1);
        assert!(forecast.contains(&lane_key("WH1")));
        assert!(!forecast.contains(&lane_key("WH2")));
    }

    proptest! {
        #[test]
        fn prop_decay_weights_sum_to_one(
            days in prop::collection::vec(1u32..=28, 1..40),
            lambda in 0.0f64..=1.0,
        ) {
            let dates: Vec<NaiveDateTime> = days.iter().map(|d| make_datetime(*d)).collect();
            let weights = time_decay_weights(&dates, lambda);
            prop_assert_eq!(weights.len(), dates.len());
            prop_assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }

        #[test]
        fn prop_quantiles_are_monotone_and_observed(
            values in prop::collection::vec(-10i32..10, 1..40),
        ) {
            let values: Vec<f64> = values.into_iter().map(f64::from).collect();
            let weights = vec![1.0; values.len()];
            let levels = [5.0, 25.0, 50.0, 75.0, 95.0, 100.0];
            let dist = weighted_quantiles(&values, &weights, &levels);

            let outputs: Vec<f64> = dist.iter().map(|(_, v)| v).collect();
            prop_assert!(outputs.windows(2).all(|w| w[0] <= w[1]));
            prop_assert!(outputs.iter().all(|v| values.contains(v)));
        }

        #[test]
        fn prop_adjusted_values_are_distinct_and_keep_zero(
            values in prop::collection::vec(-5i32..5, 1..40),
        ) {
            let values: Vec<f64> = values.into_iter().map(f64::from).collect();
            let weights = vec![1.0; values.len()];
            let dist = adjusted_quantiles(&values, &weights, &[10.0, 30.0, 50.0, 70.0, 90.0]);

            let outputs: Vec<f64> = dist.iter().map(|(_, v)| v).collect();
            for (i, v) in outputs.iter().enumerate() {
                prop_assert!(!outputs[i + 1..].contains(v));
            }
            if values.contains(&0.0) {
                prop_assert!(outputs.contains(&0.0));
            }
        }
    }
}
