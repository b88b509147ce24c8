//! Forecast report output

use crate::config::ResolvedConfig;
use crate::loader::LoadSummary;
use crate::pipeline::ForecastOutcome;
use crate::{days_to_hours, Distribution, Result};
use fulfillment_nodes::{
    DistanceZone, NodeKey, NodeMetrics, NodeProfile, ShipmentAggregator, ShipmentType,
};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

/// How a node's distribution was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastSource {
    Observed,
    Extrapolated,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantilePoint {
    pub level: f64,
    pub pad_days: f64,
    pub pad_hours: f64,
}

impl QuantilePoint {
    fn from_distribution(dist: &Distribution) -> Vec<Self> {
        dist.iter()
            .map(|(level, days)| Self {
                level,
                pad_days: days,
                pad_hours: days_to_hours(days),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub node: String,
    pub key: NodeKey,
    pub primary_gl: String,
    pub distance_zone: DistanceZone,
    pub shipment_type: Option<ShipmentType>,
    pub is_sparse: bool,
    pub source: ForecastSource,
    pub shipment_share_pct: f64,
    pub metrics: NodeMetrics,
    pub forecast: Vec<QuantilePoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub total_nodes: usize,
    pub dense_nodes: usize,
    pub sparse_nodes: usize,
    pub observed_forecasts: usize,
    pub extrapolated_forecasts: usize,
    pub unforecast_nodes: usize,
    pub shipments_loaded: usize,
    pub shipments_skipped: usize,
    pub config: ResolvedConfig,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastReport {
    pub nodes: Vec<NodeReport>,
    pub metadata: ReportMetadata,
}

/// One flat row of the per-node metrics table
#[derive(Debug, Serialize)]
struct MetricsRow<'a> {
    node: &'a str,
    kind: &'static str,
    primary_gl: &'a str,
    distance_zone: DistanceZone,
    is_sparse: bool,
    source: ForecastSource,
    shipment_count: usize,
    shipment_share_pct: f64,
    recent_shipment_count: usize,
    recent_unpadded_dea: Option<f64>,
    recent_dea: Option<f64>,
    recent_unpadded_c2p_days: Option<f64>,
    recent_c2p_days: Option<f64>,
    recent_c2d_days: Option<f64>,
    forecast_levels: usize,
}

impl ForecastReport {
    pub fn build(
        aggregator: &ShipmentAggregator,
        outcome: &ForecastOutcome,
        config: &ResolvedConfig,
        summary: &LoadSummary,
    ) -> Self {
        let shares = aggregator.shipment_shares();
        let registry = aggregator.registry();

        let nodes: Vec<NodeReport> = aggregator
            .forecastable_nodes()
            .filter_map(|key| registry.get(key).map(|node| (key, node)))
            .map(|(key, node)| {
                let dist = outcome.forecast.get(key);
                let source = match (dist, node.is_sparse) {
                    (None, _) => ForecastSource::None,
                    (Some(_), false) => ForecastSource::Observed,
                    (Some(_), true) => ForecastSource::Extrapolated,
                };
                let shipment_type = match &node.profile {
                    NodeProfile::Lane(lane) => Some(lane.shipment_type),
                    NodeProfile::Warehouse(_) => None,
                };
                NodeReport {
                    node: key.to_string(),
                    key: key.clone(),
                    primary_gl: node.primary_gl().to_string(),
                    distance_zone: node.distance_zone(),
                    shipment_type,
                    is_sparse: node.is_sparse,
                    source,
                    shipment_share_pct: shares.get(key).copied().unwrap_or(0.0),
                    metrics: node.metrics.clone(),
                    forecast: dist.map(QuantilePoint::from_distribution).unwrap_or_default(),
                }
            })
            .collect();

        let metadata = ReportMetadata {
            total_nodes: nodes.len(),
            dense_nodes: outcome.partition.dense.len(),
            sparse_nodes: outcome.partition.sparse.len(),
            observed_forecasts: outcome.dense_forecasts,
            extrapolated_forecasts: outcome.extrapolated_forecasts,
            unforecast_nodes: outcome.unforecast.len(),
            shipments_loaded: summary.loaded,
            shipments_skipped: summary.skipped,
            config: config.clone(),
            generated_at: chrono::Utc::now().to_rfc3339(),
        };

        Self { nodes, metadata }
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!("Writing forecast report to {:?}", path);
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Write the per-node metrics table as CSV
    pub fn write_metrics_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!("Writing node metrics to {:?}", path);
        let mut writer = csv::Writer::from_path(path)?;
        for node in &self.nodes {
            let m = &node.metrics;
            writer.serialize(MetricsRow {
                node: &node.node,
                kind: node.key.kind(),
                primary_gl: &node.primary_gl,
                distance_zone: node.distance_zone,
                is_sparse: node.is_sparse,
                source: node.source,
                shipment_count: m.shipment_count,
                shipment_share_pct: node.shipment_share_pct,
                recent_shipment_count: m.recent_shipment_count,
                recent_unpadded_dea: m.recent_unpadded_dea,
                recent_dea: m.recent_dea,
                recent_unpadded_c2p_days: m.recent_unpadded_c2p_days,
                recent_c2p_days: m.recent_c2p_days,
                recent_c2d_days: m.recent_c2d_days,
                forecast_levels: node.forecast.len(),
            })?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ForecastPipeline;
    use chrono::NaiveDate;
    use fulfillment_nodes::{ShipmentObservation, WarehouseId, Zip3};

    fn make_obs(carrier: &str, warehouse: &str, dest_zip3: u16, day: u32) -> ShipmentObservation {
        let method = if carrier == "SWA" { "SWA" } else { "UPS_GROUND" };
        ShipmentObservation {
            vendor_id: "V1".to_string(),
            primary_gl: "Tires".to_string(),
            warehouse: WarehouseId::new(warehouse),
            origin_zip3: Zip3::new(100).unwrap(),
            dest_zip3: Zip3::new(dest_zip3).unwrap(),
            carrier_code: carrier.to_string(),
            ship_method: method.to_string(),
            shipment_type: ShipmentType::from_ship_method(method),
            distance_zone: DistanceZone::Short,
            order_date: NaiveDate::from_ymd_opt(2024, 3, day).and_then(|d| d.and_hms_opt(8, 0, 0)),
            unpadded_committed_days: 2.0,
            padded_committed_days: 3.0,
            actual_days: 2.5,
        }
    }

    fn make_report() -> ForecastReport {
        let mut agg = ShipmentAggregator::new();
        for day in 1..=4 {
            agg.add(make_obs("UPS", "WH1", 981, day));
        }
        agg.add(make_obs("UPS", "WH1", 982, 3));
        agg.add(make_obs("SWA", "WH2", 100, 3));

        let config = ResolvedConfig {
            sparsity_threshold: 2,
            quantile_levels: vec![50.0],
            lambda_decay: 0.1,
            anchor_date: NaiveDate::from_ymd_opt(2024, 3, 29).unwrap(),
            window_days: 28,
        };
        let outcome = ForecastPipeline::new(config.clone()).run(&mut agg).unwrap();
        let summary = LoadSummary {
            loaded: 6,
            skipped: 1,
            undated: 0,
        };
        ForecastReport::build(&agg, &outcome, &config, &summary)
    }

    #[test]
    fn test_report_marks_forecast_sources() {
        let report = make_report();
        let sources: Vec<(&str, ForecastSource)> = report
            .nodes
            .iter()
            .map(|n| (n.node.as_str(), n.source))
            .collect();

        assert_eq!(
            sources,
            vec![
                ("WH1_981_UPS_GROUND", ForecastSource::Observed),
                ("WH1_982_UPS_GROUND", ForecastSource::Extrapolated),
                ("WH2", ForecastSource::None),
            ]
        );
        assert_eq!(report.nodes[0].forecast[0].pad_hours, 12.0);
        assert_eq!(report.nodes[2].shipment_type, None);
        assert_eq!(report.metadata.shipments_skipped, 1);
        assert_eq!(report.metadata.unforecast_nodes, 1);
    }

    #[test]
    fn test_report_extrapolated_points_are_rounded() {
        let report = make_report();
        let points = &report.nodes[1].forecast;
        assert_eq!(points.len(), 1);
        // 0.5 days rounds half to even
        assert_eq!(points[0].pad_days, 0.0);
    }

    #[test]
    fn test_write_report_files() {
        let report = make_report();
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("forecast.json");
        report.write_json(&json_path).unwrap();
        let value: serde_json::Value =
            serde_json::from_reader(File::open(&json_path).unwrap()).unwrap();
        assert_eq!(value["nodes"].as_array().unwrap().len(), 3);
        assert_eq!(value["nodes"][0]["key"]["kind"], "lane");
        assert_eq!(value["metadata"]["config"]["window_days"], 28);

        let csv_path = dir.path().join("metrics.csv");
        report.write_metrics_csv(&csv_path).unwrap();
        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "node");
        assert_eq!(reader.records().count(), 3);
    }
}
