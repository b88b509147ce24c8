//! Two-phase forecast run
//!
//! 1. Totals, recent-window metrics and the sparse/dense split
//! 2. Phase one: quantile forecasts for every dense node
//! 3. Phase two: similarity extrapolation for sparse lanes, reading phase one

use crate::config::ResolvedConfig;
use crate::quantile::QuantileForecaster;
use crate::similarity::{SimilarityCache, SimilarityExtrapolator};
use crate::{Forecast, Result};
use fulfillment_nodes::{NodeKey, ShipmentAggregator, SparsityPartition};
use tracing::{info, warn};

/// Everything one run produced
#[derive(Debug, Clone, Default)]
pub struct ForecastOutcome {
    pub forecast: Forecast,
    pub partition: SparsityPartition,
    pub dense_forecasts: usize,
    pub extrapolated_forecasts: usize,
    /// Forecastable nodes left without a distribution
    pub unforecast: Vec<NodeKey>,
}

#[derive(Debug, Clone)]
pub struct ForecastPipeline {
    config: ResolvedConfig,
}

impl ForecastPipeline {
    pub fn new(config: ResolvedConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Derive node metrics and split nodes by sparsity
    pub fn prepare(&self, aggregator: &mut ShipmentAggregator) -> Result<SparsityPartition> {
        aggregator.update_total_counts();
        aggregator.compute_recent_metrics(self.config.anchor_date, self.config.window_days)?;
        Ok(aggregator.classify_sparsity(self.config.sparsity_threshold))
    }

    pub fn run(&self, aggregator: &mut ShipmentAggregator) -> Result<ForecastOutcome> {
        self.run_with_cache(aggregator, &mut SimilarityCache::new())
    }

    /// Run both phases with a caller-supplied similarity cache
    pub fn run_with_cache(
        &self,
        aggregator: &mut ShipmentAggregator,
        cache: &mut SimilarityCache,
    ) -> Result<ForecastOutcome> {
        let partition = self.prepare(aggregator)?;
        let aggregator: &ShipmentAggregator = aggregator;

        let forecaster = QuantileForecaster::from_config(&self.config);
        let dense_forecast = forecaster.forecast_all(aggregator, &partition.dense);

        let sparse_forecast = SimilarityExtrapolator::new(
            aggregator.registry(),
            &partition.dense,
            &dense_forecast,
        )
        .extrapolate_all(&partition.sparse, cache);

        let dense_forecasts = dense_forecast.len();
        let extrapolated_forecasts = sparse_forecast.len();
        let mut forecast = dense_forecast;
        forecast.extend(sparse_forecast);

        let unforecast: Vec<NodeKey> = aggregator
            .forecastable_nodes()
            .filter(|key| !forecast.contains(key))
            .cloned()
            .collect();
        if !unforecast.is_empty() {
            warn!("{} nodes have no forecast", unforecast.len());
        }
        info!(
            "Forecast complete: {} dense, {} extrapolated, {} without forecast",
            dense_forecasts,
            extrapolated_forecasts,
            unforecast.len()
        );

        Ok(ForecastOutcome {
            forecast,
            partition,
            dense_forecasts,
            extrapolated_forecasts,
            unforecast,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::ScoredMatch;
    use chrono::{NaiveDate, NaiveDateTime};
    use fulfillment_nodes::{
        DistanceZone, LaneKey, ShipmentObservation, ShipmentType, WarehouseId, Zip3,
    };

    fn make_datetime(day: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(2024, 3, day).and_then(|d| d.and_hms_opt(12, 0, 0))
    }

    fn make_obs(carrier: &str, warehouse: &str, dest_zip3: u16, day: u32, gap: f64) -> ShipmentObservation {
        let method = if carrier == "SWA" { "SWA" } else { "UPS_GROUND" };
        ShipmentObservation {
            vendor_id: "V1".to_string(),
            primary_gl: "Furniture".to_string(),
            warehouse: WarehouseId::new(warehouse),
            origin_zip3: Zip3::new(100).unwrap(),
            dest_zip3: Zip3::new(dest_zip3).unwrap(),
            carrier_code: carrier.to_string(),
            ship_method: method.to_string(),
            shipment_type: ShipmentType::from_ship_method(method),
            distance_zone: DistanceZone::Medium,
            order_date: make_datetime(day),
            unpadded_committed_days: 3.0,
            padded_committed_days: 4.0,
            actual_days: 3.0 + gap,
        }
    }

    fn lane(dest_zip3: u16) -> NodeKey {
        NodeKey::Lane(LaneKey::new(
            WarehouseId::new("WH1"),
            Zip3::new(dest_zip3).unwrap(),
            "UPS_GROUND",
        ))
    }

    fn make_config(threshold: usize) -> ResolvedConfig {
        ResolvedConfig {
            sparsity_threshold: threshold,
            quantile_levels: vec![50.0, 90.0],
            lambda_decay: 0.1,
            anchor_date: NaiveDate::from_ymd_opt(2024, 3, 29).unwrap(),
            window_days: 28,
        }
    }

    #[test]
    fn test_sparse_lane_borrows_dense_forecast() {
        let mut agg = ShipmentAggregator::new();
        for day in 1..=10 {
            agg.add(make_obs("UPS", "WH1", 981, day, 2.0));
        }
        agg.add(make_obs("UPS", "WH1", 983, 5, 9.0));
        // sparse warehouse node with no lane to borrow from
        agg.add(make_obs("SWA", "WH2", 100, 5, 1.0));

        let outcome = ForecastPipeline::new(make_config(5)).run(&mut agg).unwrap();

        assert_eq!(outcome.partition.dense, vec![lane(981)]);
        assert_eq!(outcome.dense_forecasts, 1);
        assert_eq!(outcome.extrapolated_forecasts, 1);
        assert_eq!(outcome.forecast.get(&lane(983)), outcome.forecast.get(&lane(981)));
        assert_eq!(
            outcome.unforecast,
            vec![NodeKey::Warehouse(WarehouseId::new("WH2"))]
        );

        let dense = agg.registry().get(&lane(981)).unwrap();
        assert_eq!(dense.metrics.shipment_count, 10);
        assert_eq!(dense.metrics.recent_shipment_count, 10);
        assert!(agg.registry().get(&lane(983)).unwrap().is_sparse);
    }

    #[test]
    fn test_run_fills_supplied_cache() {
        let mut agg = ShipmentAggregator::new();
        for day in 1..=3 {
            agg.add(make_obs("UPS", "WH1", 981, day, 1.0));
        }
        agg.add(make_obs("UPS", "WH1", 990, 2, 0.0));

        let mut cache = SimilarityCache::new();
        let pipeline = ForecastPipeline::new(make_config(3));
        let outcome = pipeline.run_with_cache(&mut agg, &mut cache).unwrap();

        assert_eq!(outcome.forecast.len(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_seeded_cache_entry_is_used() {
        let mut agg = ShipmentAggregator::new();
        for day in 1..=3 {
            agg.add(make_obs("UPS", "WH1", 981, day, 1.0));
            agg.add(make_obs("UPS", "WH1", 985, day, 4.0));
        }
        agg.add(make_obs("UPS", "WH1", 990, 2, 0.0));

        // both dense lanes tie for 990; the seeded entry names only 985
        let NodeKey::Lane(sparse) = lane(990) else { unreachable!() };
        let NodeKey::Lane(chosen) = lane(985) else { unreachable!() };
        let profile = agg.registry().lane(&sparse).unwrap();
        let mut cache = SimilarityCache::new();
        cache.insert(
            profile.shipment_type,
            profile.signature(),
            vec![ScoredMatch {
                lane: chosen,
                score: 95,
            }],
        );

        let outcome = ForecastPipeline::new(make_config(3))
            .run_with_cache(&mut agg, &mut cache)
            .unwrap();

        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 0);
        assert_eq!(outcome.forecast.get(&lane(990)), outcome.forecast.get(&lane(985)));
        assert_ne!(outcome.forecast.get(&lane(990)), outcome.forecast.get(&lane(981)));
    }

    #[test]
    fn test_undated_lane_is_sparse_and_extrapolated() {
        let mut agg = ShipmentAggregator::new();
        for day in 1..=5 {
            agg.add(make_obs("UPS", "WH1", 981, day, 2.0));
        }
        for _ in 0..5 {
            let mut undated = make_obs("UPS", "WH1", 982, 1, 7.0);
            undated.order_date = None;
            agg.add(undated);
        }

        let outcome = ForecastPipeline::new(make_config(3)).run(&mut agg).unwrap();

        assert_eq!(outcome.partition.dense, vec![lane(981)]);
        assert_eq!(outcome.partition.sparse, vec![lane(982)]);
        assert_eq!(agg.registry().get(&lane(982)).unwrap().metrics.shipment_count, 0);
        assert_eq!(outcome.forecast.get(&lane(982)), outcome.forecast.get(&lane(981)));
        assert!(outcome.unforecast.is_empty());
    }

    #[test]
    fn test_invalid_window_fails_run() {
        let mut agg = ShipmentAggregator::new();
        agg.add(make_obs("UPS", "WH1", 981, 1, 1.0));
        let config = ResolvedConfig {
            window_days: -1,
            ..make_config(1)
        };
        assert!(ForecastPipeline::new(config).run(&mut agg).is_err());
    }
}
