//! Deduplicating registry of vendors and shipping nodes

use crate::node::{LaneKey, LaneProfile, NodeKey, NodeProfile, ShippingNode, WarehouseId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Vendor owning one or more warehouses
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vendor {
    pub vendor_id: String,
    pub primary_gl: String,
    pub warehouses: BTreeSet<WarehouseId>,
}

/// Registry of every vendor and shipping node seen in one run
///
/// The first sighting of a vendor or node fixes its attributes; later
/// sightings resolve to the same entry.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    vendors: BTreeMap<String, Vendor>,
    nodes: BTreeMap<NodeKey, ShippingNode>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a vendor, creating it on first sight
    pub fn vendor(&mut self, vendor_id: &str, primary_gl: &str) -> &mut Vendor {
        self.vendors
            .entry(vendor_id.to_string())
            .or_insert_with(|| {
                debug!("Registered vendor {} ({})", vendor_id, primary_gl);
                Vendor {
                    vendor_id: vendor_id.to_string(),
                    primary_gl: primary_gl.to_string(),
                    warehouses: BTreeSet::new(),
                }
            })
    }

    pub fn find_vendor(&self, vendor_id: &str) -> Option<&Vendor> {
        self.vendors.get(vendor_id)
    }

    pub fn vendors(&self) -> impl Iterator<Item = &Vendor> {
        self.vendors.values()
    }

    /// Fetch a node by the key of `profile`, inserting it on first sight
    pub fn get_or_insert(&mut self, profile: NodeProfile) -> &mut ShippingNode {
        let node = ShippingNode::new(profile);
        self.nodes.entry(node.key()).or_insert(node)
    }

    pub fn get(&self, key: &NodeKey) -> Option<&ShippingNode> {
        self.nodes.get(key)
    }

    pub fn get_mut(&mut self, key: &NodeKey) -> Option<&mut ShippingNode> {
        self.nodes.get_mut(key)
    }

    pub fn lane(&self, key: &LaneKey) -> Option<&LaneProfile> {
        self.nodes
            .get(&NodeKey::Lane(key.clone()))
            .and_then(ShippingNode::as_lane)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeKey, &ShippingNode)> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
