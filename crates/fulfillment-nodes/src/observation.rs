//! Shipment observations and timestamp parsing

use crate::carrier::{ShipmentType, ShippingCarrier};
use crate::geo::{DistanceZone, Zip3};
use crate::node::{LaneKey, LaneProfile, NodeProfile, WarehouseId, WarehouseProfile};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::HashMap;

/// Date-time layouts accepted for order and ship timestamps, tried in order
///
/// Two-digit-year layouts come before four-digit ones: `%Y` would read `24`
/// as the year 24, while `%y` cannot consume a four-digit year.
pub const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%y %H:%M:%S",
    "%m/%d/%y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Date-only layouts, read as midnight
pub const DATE_FORMATS: [&str; 1] = ["%Y-%m-%d"];

/// Timestamp parser with a memo of every string it has seen
///
/// Owned by one loading run; inputs repeat the same timestamps heavily.
#[derive(Debug, Default)]
pub struct DateParser {
    cache: HashMap<String, Option<NaiveDateTime>>,
}

impl DateParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a timestamp, `None` when it is empty or matches no known layout
    pub fn parse(&mut self, raw: &str) -> Option<NaiveDateTime> {
        let text = raw.trim();
        if text.is_empty() {
            return None;
        }
        if let Some(cached) = self.cache.get(text) {
            return *cached;
        }
        let parsed = parse_uncached(text);
        self.cache.insert(text.to_string(), parsed);
        parsed
    }

    pub fn parse_date(&mut self, raw: &str) -> Option<NaiveDate> {
        self.parse(raw).map(|dt| dt.date())
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

fn parse_uncached(text: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// One shipment as seen by the aggregator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShipmentObservation {
    pub vendor_id: String,
    pub primary_gl: String,
    pub warehouse: WarehouseId,
    pub origin_zip3: Zip3,
    pub dest_zip3: Zip3,
    pub carrier_code: String,
    pub ship_method: String,
    pub shipment_type: ShipmentType,
    pub distance_zone: DistanceZone,
    /// Ship timestamp, or the order timestamp when no ship timestamp parsed
    pub order_date: Option<NaiveDateTime>,
    pub unpadded_committed_days: f64,
    pub padded_committed_days: f64,
    pub actual_days: f64,
}

impl ShipmentObservation {
    /// Actual transit days minus the unpadded promise (negative = promise was loose)
    pub fn unpadded_gap(&self) -> f64 {
        self.actual_days - self.unpadded_committed_days
    }

    pub fn carrier(&self) -> Option<ShippingCarrier> {
        self.carrier_code.parse().ok()
    }

    pub fn unpadded_on_time(&self) -> bool {
        self.unpadded_committed_days >= self.actual_days
    }

    pub fn padded_on_time(&self) -> bool {
        self.padded_committed_days >= self.actual_days
    }

    pub fn lane_key(&self) -> LaneKey {
        LaneKey::new(self.warehouse.clone(), self.dest_zip3, self.ship_method.clone())
    }

    pub fn lane_profile(&self, primary_gl: &str) -> NodeProfile {
        NodeProfile::Lane(LaneProfile {
            key: self.lane_key(),
            primary_gl: primary_gl.to_string(),
            distance_zone: self.distance_zone,
            shipment_type: self.shipment_type,
        })
    }

    pub fn warehouse_profile(&self, primary_gl: &str) -> NodeProfile {
        NodeProfile::Warehouse(WarehouseProfile {
            id: self.warehouse.clone(),
            origin_zip3: self.origin_zip3,
            primary_gl: primary_gl.to_string(),
            distance_zone: self.distance_zone,
        })
    }
}
