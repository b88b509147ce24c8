//! Shipping node identity and per-node metrics

use crate::carrier::ShipmentType;
use crate::geo::{DistanceZone, Zip3};
use serde::Serialize;
use std::fmt;

/// Origin warehouse identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct WarehouseId(String);

impl WarehouseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WarehouseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Natural key of a lane: origin warehouse → destination zip3 → ship method
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LaneKey {
    pub origin: WarehouseId,
    pub dest_zip3: Zip3,
    pub ship_method: String,
}

impl LaneKey {
    pub fn new(origin: WarehouseId, dest_zip3: Zip3, ship_method: impl Into<String>) -> Self {
        Self {
            origin,
            dest_zip3,
            ship_method: ship_method.into().trim().to_string(),
        }
    }
}

impl fmt::Display for LaneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.origin, self.dest_zip3, self.ship_method)
    }
}

/// Identity of a forecastable node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum NodeKey {
    Lane(LaneKey),
    Warehouse(WarehouseId),
}

impl NodeKey {
    pub fn is_lane(&self) -> bool {
        matches!(self, Self::Lane(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Lane(_) => "lane",
            Self::Warehouse(_) => "warehouse",
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lane(lane) => lane.fmt(f),
            Self::Warehouse(id) => id.fmt(f),
        }
    }
}

/// Attributes of a third-party lane, fixed by the first observation seen
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaneProfile {
    pub key: LaneKey,
    pub primary_gl: String,
    pub distance_zone: DistanceZone,
    pub shipment_type: ShipmentType,
}

impl LaneProfile {
    /// Attribute signature shared by lanes that see the same match set
    pub fn signature(&self) -> String {
        format!("{}_{}_{}", self.key.origin, self.primary_gl, self.distance_zone)
    }
}

/// Attributes of a first-party warehouse node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarehouseProfile {
    pub id: WarehouseId,
    pub origin_zip3: Zip3,
    pub primary_gl: String,
    pub distance_zone: DistanceZone,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeProfile {
    Lane(LaneProfile),
    Warehouse(WarehouseProfile),
}

/// Aggregate metrics derived from a node's observations
///
/// Recent values stay `None` until a recent-window pass finds data for the node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeMetrics {
    pub shipment_count: usize,
    pub recent_shipment_count: usize,
    pub recent_unpadded_dea: Option<f64>,
    pub recent_dea: Option<f64>,
    pub recent_unpadded_c2p_days: Option<f64>,
    pub recent_c2p_days: Option<f64>,
    pub recent_c2d_days: Option<f64>,
}

impl NodeMetrics {
    /// Drop everything derived from the recent window
    pub fn clear_recent(&mut self) {
        self.recent_shipment_count = 0;
        self.recent_unpadded_dea = None;
        self.recent_dea = None;
        self.recent_unpadded_c2p_days = None;
        self.recent_c2p_days = None;
        self.recent_c2d_days = None;
    }
}

/// A shipping node with its identity, attributes and derived metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShippingNode {
    pub profile: NodeProfile,
    pub metrics: NodeMetrics,
    pub is_sparse: bool,
}

impl ShippingNode {
    pub fn new(profile: NodeProfile) -> Self {
        Self {
            profile,
            metrics: NodeMetrics::default(),
            is_sparse: false,
        }
    }

    pub fn key(&self) -> NodeKey {
        match &self.profile {
            NodeProfile::Lane(lane) => NodeKey::Lane(lane.key.clone()),
            NodeProfile::Warehouse(wh) => NodeKey::Warehouse(wh.id.clone()),
        }
    }

    pub fn primary_gl(&self) -> &str {
        match &self.profile {
            NodeProfile::Lane(lane) => &lane.primary_gl,
            NodeProfile::Warehouse(wh) => &wh.primary_gl,
        }
    }

    pub fn distance_zone(&self) -> DistanceZone {
        match &self.profile {
            NodeProfile::Lane(lane) => lane.distance_zone,
            NodeProfile::Warehouse(wh) => wh.distance_zone,
        }
    }

    pub fn as_lane(&self) -> Option<&LaneProfile> {
        match &self.profile {
            NodeProfile::Lane(lane) => Some(lane),
            NodeProfile::Warehouse(_) => None,
        }
    }
}
