//! Similarity extrapolation for sparse lanes
//!
//! A sparse lane borrows the forecasts of the dense lanes that score highest
//! against it:
//!
//! | Attribute | Same origin | Different origin |
//! |-----------|-------------|------------------|
//! | origin | 45 | 0 |
//! | primary GL | +25 | +50 only when GL and zone both match |
//! | distance zone | +25 | (see above) |
//! | zip3 proximity | `max(0, 5 − Δzip3)` | `max(0, 5 − Δzip3)` |

use crate::{Distribution, Forecast};
use fulfillment_nodes::{LaneKey, LaneProfile, NodeKey, NodeRegistry, ShipmentType};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub const ORIGIN_WEIGHT: u32 = 45;
pub const PRIMARY_GL_WEIGHT: u32 = 25;
pub const DISTANCE_ZONE_WEIGHT: u32 = 25;
pub const ZIP_PROXIMITY_WEIGHT: u32 = 5;

/// Similarity of a dense lane to a sparse one, in `[0, 100]`
pub fn similarity_score(sparse: &LaneProfile, dense: &LaneProfile) -> u32 {
    let same_gl = sparse.primary_gl == dense.primary_gl;
    let same_zone = sparse.distance_zone == dense.distance_zone;

    let mut score = if sparse.key.origin == dense.key.origin {
        ORIGIN_WEIGHT
            + if same_gl { PRIMARY_GL_WEIGHT } else { 0 }
            + if same_zone { DISTANCE_ZONE_WEIGHT } else { 0 }
    } else if same_gl && same_zone {
        PRIMARY_GL_WEIGHT + DISTANCE_ZONE_WEIGHT
    } else {
        0
    };

    let zip_diff = u32::from(sparse.key.dest_zip3.distance(&dense.key.dest_zip3));
    score += ZIP_PROXIMITY_WEIGHT.saturating_sub(zip_diff);
    score
}

/// A dense lane tied for the best score against some sparse lane
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredMatch {
    pub lane: LaneKey,
    pub score: u32,
}

/// Best-match sets keyed by shipment type and lane signature
///
/// Lanes with the same origin, primary GL and distance zone share an entry.
#[derive(Debug, Default)]
pub struct SimilarityCache {
    entries: HashMap<(ShipmentType, String), Vec<ScoredMatch>>,
    hits: usize,
    misses: usize,
}

impl SimilarityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached match set for a lane, counting the hit or miss
    pub fn lookup(&mut self, shipment_type: ShipmentType, signature: &str) -> Option<Vec<ScoredMatch>> {
        match self.entries.get(&(shipment_type, signature.to_string())) {
            Some(matches) => {
                self.hits += 1;
                Some(matches.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, shipment_type: ShipmentType, signature: impl Into<String>, matches: Vec<ScoredMatch>) {
        self.entries.insert((shipment_type, signature.into()), matches);
    }

    /// Drop every cached entry; counters are kept
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Phase two extrapolator over the finished phase one forecasts
#[derive(Debug)]
pub struct SimilarityExtrapolator<'a> {
    registry: &'a NodeRegistry,
    dense_lanes: Vec<&'a LaneProfile>,
    dense_forecast: &'a Forecast,
}

impl<'a> SimilarityExtrapolator<'a> {
    /// Candidates are the lanes among `dense`; warehouse nodes never match
    pub fn new(registry: &'a NodeRegistry, dense: &[NodeKey], dense_forecast: &'a Forecast) -> Self {
        let dense_lanes = dense
            .iter()
            .filter_map(|key| match key {
                NodeKey::Lane(lane) => registry.lane(lane),
                NodeKey::Warehouse(_) => None,
            })
            .collect();
        Self {
            registry,
            dense_lanes,
            dense_forecast,
        }
    }

    /// Dense lanes tied at the best score, nearest destination first
    ///
    /// Only lanes of the same third-party shipment type are candidates. An
    /// empty result is not cached.
    pub fn find_matches(&self, sparse: &LaneProfile, cache: &mut SimilarityCache) -> Vec<ScoredMatch> {
        let signature = sparse.signature();
        if let Some(hit) = cache.lookup(sparse.shipment_type, &signature) {
            return hit;
        }
        if !sparse.shipment_type.is_third_party() {
            debug!(
                "Lane {} has shipment type {}, not extrapolated",
                sparse.key, sparse.shipment_type
            );
            return Vec::new();
        }

        let scored: Vec<(&LaneProfile, u32)> = self
            .dense_lanes
            .iter()
            .filter(|dense| dense.shipment_type == sparse.shipment_type)
            .map(|dense| (*dense, similarity_score(sparse, dense)))
            .collect();
        let Some(best) = scored.iter().map(|(_, score)| *score).max() else {
            return Vec::new();
        };

        let mut best_matches: Vec<&LaneProfile> = scored
            .into_iter()
            .filter(|(_, score)| *score == best)
            .map(|(lane, _)| lane)
            .collect();
        best_matches.sort_by_key(|lane| sparse.key.dest_zip3.distance(&lane.key.dest_zip3));

        let matches: Vec<ScoredMatch> = best_matches
            .into_iter()
            .map(|lane| ScoredMatch {
                lane: lane.key.clone(),
                score: best,
            })
            .collect();
        cache.insert(sparse.shipment_type, signature, matches.clone());
        matches
    }

    /// Equal-weight blend of the matches' forecasts, rounded to whole days
    ///
    /// Matches without a forecast are left out. `None` when no match has one
    /// or the best score is zero.
    pub fn extrapolate(&self, sparse: &LaneProfile, matches: &[ScoredMatch]) -> Option<Distribution> {
        let best = matches.iter().map(|m| m.score).max().unwrap_or(0);
        if best == 0 {
            warn!("No similar lane scores above zero for sparse lane {}", sparse.key);
            return None;
        }

        let sources: Vec<&Distribution> = matches
            .iter()
            .filter(|m| m.score == best)
            .filter_map(|m| self.dense_forecast.get(&NodeKey::Lane(m.lane.clone())))
            .collect();
        if sources.is_empty() {
            warn!("Unable to extrapolate forecast for sparse lane {}", sparse.key);
            return None;
        }

        let best = f64::from(best);
        let weight = best / (best * sources.len() as f64);
        let mut blended = Distribution::new();
        for source in &sources {
            for (level, value) in source.iter() {
                let so_far = blended.get(level).unwrap_or(0.0);
                blended.insert(level, so_far + weight * value);
            }
        }

        let mut rounded = Distribution::from_points(blended.iter().map(|(level, value)| {
            // -0.0 and 0.0 are the same padding
            let days = value.round_ties_even();
            (level, if days == 0.0 { 0.0 } else { days })
        }));
        rounded.dedup_by_value();
        debug!(
            "Extrapolated {} from {} lanes at score {}",
            sparse.key,
            sources.len(),
            best
        );
        Some(rounded)
    }

    /// Extrapolate every sparse lane in order
    pub fn extrapolate_all(&self, sparse: &[NodeKey], cache: &mut SimilarityCache) -> Forecast {
        info!(
            "Extrapolating {} sparse nodes from {} dense lanes",
            sparse.len(),
            self.dense_lanes.len()
        );

        let mut forecast = Forecast::new();
        for key in sparse {
            let NodeKey::Lane(lane_key) = key else {
                debug!("Warehouse node {} is not extrapolated", key);
                continue;
            };
            let Some(lane) = self.registry.lane(lane_key) else {
                warn!("Sparse lane {} is not registered", lane_key);
                continue;
            };

            let matches = self.find_matches(lane, cache);
            if matches.is_empty() {
                warn!("No compatible dense lanes for sparse lane {}", lane_key);
                continue;
            }
            if let Some(dist) = self.extrapolate(lane, &matches) {
                forecast.insert(key.clone(), dist);
            }
        }

        info!(
            "Phase two produced {} forecasts (similarity cache: {} hits, {} misses)",
            forecast.len(),
            cache.hits(),
            cache.misses()
        );
        forecast
    }
}
