//! Fulfillment Nodes Library
//!
//! Identity and bookkeeping for the shipping nodes that promise padding is
//! forecast for:
//!
//! - **Lanes**: origin warehouse → destination zip3 → ship method, served by
//!   third-party carriers
//! - **Warehouse nodes**: a single origin warehouse, served by the
//!   first-party carrier
//!
//! Shipment observations are routed into carrier groups by the
//! [`ShipmentAggregator`], which also derives recent-window delivery accuracy
//! and transit metrics per node and splits nodes into sparse and dense sets.

use thiserror::Error;

pub mod aggregator;
pub mod carrier;
pub mod geo;
pub mod node;
pub mod observation;
pub mod registry;

pub use aggregator::{CarrierGroup, ShipmentAggregator, SparsityPartition, DEFAULT_WINDOW_DAYS};
pub use carrier::{ShipmentType, ShippingCarrier};
pub use geo::{DistanceZone, Zip3};
pub use node::{
    LaneKey, LaneProfile, NodeKey, NodeMetrics, NodeProfile, ShippingNode, WarehouseId,
    WarehouseProfile,
};
pub use observation::{DateParser, ShipmentObservation};
pub use registry::{NodeRegistry, Vendor};

#[derive(Error, Debug, PartialEq)]
pub enum NodeError {
    #[error("Invalid zip code format: {0:?}")]
    InvalidZip(String),
    #[error("Unknown carrier code: {0}")]
    UnknownCarrier(String),
    #[error("Invalid recent window: {0} days")]
    InvalidWindow(i64),
}

pub type Result<T> = std::result::Result<T, NodeError>;
