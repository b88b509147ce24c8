//! Shipment loading from JSON and CSV files

use crate::{ForecastError, Result};
use fulfillment_nodes::geo::{distance_from_number, parse_distance_text};
use fulfillment_nodes::{
    DateParser, DistanceZone, NodeError, ShipmentAggregator, ShipmentObservation, ShipmentType,
    WarehouseId, Zip3,
};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Primary GL used when a record carries none
pub const UNKNOWN_GL: &str = "Unknown";

/// Field that may arrive as a JSON number or as text
///
/// CSV input always yields `Text`; only JSON produces `Number`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    /// Text form; whole numbers print without a fraction
    pub fn to_text(&self) -> String {
        match self {
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.trim().to_string(),
        }
    }

    pub fn to_number(&self) -> Option<f64> {
        let number = match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
        };
        number.filter(|n| n.is_finite())
    }

    fn to_miles(&self) -> Option<i64> {
        match self {
            Self::Number(n) => distance_from_number(*n),
            Self::Text(s) => parse_distance_text(s),
        }
    }
}

/// Raw shipment record as it appears in input files
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShipmentRecord {
    pub vendor_id: Option<RawValue>,
    pub vendor_primary_gl_description: Option<String>,
    pub warehouse_id: Option<RawValue>,
    pub origin_zip5: Option<RawValue>,
    pub destination_zip5: Option<RawValue>,
    pub carrier: Option<String>,
    #[serde(alias = "ship_method_1")]
    pub ship_method: Option<String>,
    pub order_datetime: Option<String>,
    pub of_datetime: Option<String>,
    /// Padded committed days
    pub c2p_days: Option<RawValue>,
    pub c2p_days_unpadded: Option<RawValue>,
    pub c2d_days: Option<RawValue>,
    pub distance_mi: Option<RawValue>,
}

/// CSV row read verbatim; every cell stays text so `0042` keeps its zeros
#[derive(Debug, Deserialize)]
struct CsvRecord {
    vendor_id: Option<String>,
    vendor_primary_gl_description: Option<String>,
    warehouse_id: Option<String>,
    origin_zip5: Option<String>,
    destination_zip5: Option<String>,
    carrier: Option<String>,
    #[serde(alias = "ship_method_1")]
    ship_method: Option<String>,
    order_datetime: Option<String>,
    of_datetime: Option<String>,
    c2p_days: Option<String>,
    c2p_days_unpadded: Option<String>,
    c2d_days: Option<String>,
    distance_mi: Option<String>,
}

impl From<CsvRecord> for ShipmentRecord {
    fn from(row: CsvRecord) -> Self {
        let text = |v: Option<String>| v.map(RawValue::Text);
        Self {
            vendor_id: text(row.vendor_id),
            vendor_primary_gl_description: row.vendor_primary_gl_description,
            warehouse_id: text(row.warehouse_id),
            origin_zip5: text(row.origin_zip5),
            destination_zip5: text(row.destination_zip5),
            carrier: row.carrier,
            ship_method: row.ship_method,
            order_datetime: row.order_datetime,
            of_datetime: row.of_datetime,
            c2p_days: text(row.c2p_days),
            c2p_days_unpadded: text(row.c2p_days_unpadded),
            c2d_days: text(row.c2d_days),
            distance_mi: text(row.distance_mi),
        }
    }
}

/// Why a record was left out of the run
#[derive(Error, Debug, PartialEq)]
pub enum RecordError {
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error(transparent)]
    Zip(#[from] NodeError),
    #[error("missing order or ship timestamp")]
    MissingTimestamp,
    #[error("non-numeric {0}")]
    NotNumeric(&'static str),
}

fn required_text(value: &Option<RawValue>, field: &'static str) -> std::result::Result<String, RecordError> {
    value
        .as_ref()
        .map(RawValue::to_text)
        .filter(|s| !s.is_empty())
        .ok_or(RecordError::MissingField(field))
}

fn required_days(value: &Option<RawValue>, field: &'static str) -> std::result::Result<f64, RecordError> {
    value
        .as_ref()
        .ok_or(RecordError::MissingField(field))?
        .to_number()
        .ok_or(RecordError::NotNumeric(field))
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl ShipmentRecord {
    /// Validate the record and build an observation
    ///
    /// The observation date is the ship timestamp when it parses, else the
    /// order timestamp; both must be present even if neither parses.
    pub fn to_observation(&self, parser: &mut DateParser) -> std::result::Result<ShipmentObservation, RecordError> {
        let vendor_id = required_text(&self.vendor_id, "vendor_id")?;
        let warehouse = WarehouseId::new(required_text(&self.warehouse_id, "warehouse_id")?);
        let origin_zip3 = Zip3::from_zip5(&required_text(&self.origin_zip5, "origin_zip5")?)?;
        let dest_zip3 = Zip3::from_zip5(&required_text(&self.destination_zip5, "destination_zip5")?)?;

        let (Some(ordered), Some(shipped)) = (non_blank(&self.order_datetime), non_blank(&self.of_datetime)) else {
            return Err(RecordError::MissingTimestamp);
        };
        let order_date = parser.parse(shipped).or_else(|| parser.parse(ordered));

        let padded_committed_days = required_days(&self.c2p_days, "c2p_days")?;
        let unpadded_committed_days = required_days(&self.c2p_days_unpadded, "c2p_days_unpadded")?;
        let actual_days = required_days(&self.c2d_days, "c2d_days")?;

        let ship_method = non_blank(&self.ship_method).unwrap_or_default().to_string();
        let primary_gl = non_blank(&self.vendor_primary_gl_description)
            .unwrap_or(UNKNOWN_GL)
            .to_string();

        Ok(ShipmentObservation {
            vendor_id,
            primary_gl,
            warehouse,
            origin_zip3,
            dest_zip3,
            carrier_code: non_blank(&self.carrier).unwrap_or_default().to_ascii_uppercase(),
            shipment_type: ShipmentType::from_ship_method(&ship_method),
            ship_method,
            distance_zone: DistanceZone::from_miles(self.distance_mi.as_ref().and_then(RawValue::to_miles)),
            order_date,
            unpadded_committed_days,
            padded_committed_days,
            actual_days,
        })
    }
}

/// Counts from one loading run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    pub skipped: usize,
    /// Valid records excluded for having no parsable date
    pub undated: usize,
}

/// Parse records from JSON: an array, or an object with a `shipments` array
pub fn parse_json_records(reader: impl Read) -> Result<Vec<ShipmentRecord>> {
    let raw: serde_json::Value = serde_json::from_reader(reader)?;
    let records = if let Some(shipments) = raw.get("shipments") {
        serde_json::from_value(shipments.clone())?
    } else if raw.is_array() {
        serde_json::from_value(raw)?
    } else {
        return Err(ForecastError::InvalidConfig(
            "shipment JSON must be an array or contain a \"shipments\" array".to_string(),
        ));
    };
    Ok(records)
}

/// Parse records from CSV with a header row; rows that fail to decode are skipped
pub fn parse_csv_records(reader: impl Read) -> Result<(Vec<ShipmentRecord>, usize)> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    // header problems are fatal, bad rows are not
    csv_reader.headers()?;

    let mut records = Vec::new();
    let mut malformed = 0;
    for (row, result) in csv_reader.deserialize::<CsvRecord>().enumerate() {
        match result {
            Ok(record) => records.push(record.into()),
            Err(e) => {
                debug!("Skipping CSV row {}: {}", row + 1, e);
                malformed += 1;
            }
        }
    }
    Ok((records, malformed))
}

/// Read raw records from a `.json` or `.csv` file
pub fn read_records(path: impl AsRef<Path>) -> Result<(Vec<ShipmentRecord>, usize)> {
    let path = path.as_ref();
    info!("Loading shipments from {:?}", path);

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let reader = || -> Result<BufReader<File>> { Ok(BufReader::new(File::open(path)?)) };

    match extension.as_deref() {
        Some("json") => Ok((parse_json_records(reader()?)?, 0)),
        Some("csv") => parse_csv_records(reader()?),
        _ => Err(ForecastError::UnsupportedInput(path.to_path_buf())),
    }
}

/// Validate records and route them into a fresh aggregator
pub fn aggregate_records(
    records: &[ShipmentRecord],
    parser: &mut DateParser,
) -> (ShipmentAggregator, LoadSummary) {
    let mut aggregator = ShipmentAggregator::new();
    let mut summary = LoadSummary::default();

    for (i, record) in records.iter().enumerate() {
        match record.to_observation(parser) {
            Ok(observation) if observation.order_date.is_none() => {
                debug!("Excluding record {}: no parsable timestamp", i);
                summary.undated += 1;
            }
            Ok(observation) => {
                aggregator.add(observation);
                summary.loaded += 1;
            }
            Err(e) => {
                debug!("Skipping record {}: {}", i, e);
                summary.skipped += 1;
            }
        }
    }

    if summary.skipped > 0 {
        warn!("Skipped {} invalid shipment records", summary.skipped);
    }
    if summary.undated > 0 {
        warn!(
            "Excluded {} shipments with no parsable timestamp",
            summary.undated
        );
    }
    info!(
        "Loaded {} shipments ({} skipped, {} distinct timestamps)",
        summary.loaded,
        summary.skipped,
        parser.cached_len()
    );
    (aggregator, summary)
}

/// Load a shipment file straight into an aggregator
pub fn load_shipments(
    path: impl AsRef<Path>,
    parser: &mut DateParser,
) -> Result<(ShipmentAggregator, LoadSummary)> {
    let (records, malformed) = read_records(path)?;
    let (aggregator, mut summary) = aggregate_records(&records, parser);
    summary.skipped += malformed;
    Ok((aggregator, summary))
}
