//! Distance zones and postal prefixes

use crate::{NodeError, Result};
use serde::{Serialize, Serializer};
use std::fmt;

/// Upper bound (exclusive, miles) of the short zone
pub const SHORT_ZONE_MAX_MI: i64 = 300;
/// Upper bound (exclusive, miles) of the medium zone
pub const MEDIUM_ZONE_MAX_MI: i64 = 1000;

/// Coarse bucket of the shipment distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceZone {
    Short,
    Medium,
    Long,
    Unknown,
}

impl DistanceZone {
    pub fn from_miles(miles: Option<i64>) -> Self {
        match miles {
            None => Self::Unknown,
            Some(mi) if mi < SHORT_ZONE_MAX_MI => Self::Short,
            Some(mi) if mi < MEDIUM_ZONE_MAX_MI => Self::Medium,
            Some(_) => Self::Long,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DistanceZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a textual distance in whole miles; anything else is unknown
pub fn parse_distance_text(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok()
}

/// Whole miles of a numeric distance, truncated toward zero
pub fn distance_from_number(miles: f64) -> Option<i64> {
    miles.is_finite().then(|| miles.trunc() as i64)
}

/// Normalize a zip code to five digits, left padded with zeros
pub fn to_zip5(raw: &str) -> Result<String> {
    let zip = raw.trim();
    if zip.is_empty() || zip.len() > 5 || !zip.chars().all(|c| c.is_ascii_digit()) {
        return Err(NodeError::InvalidZip(raw.to_string()));
    }
    Ok(format!("{:0>5}", zip))
}

/// Three-digit postal prefix, kept numeric for proximity comparisons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Zip3(u16);

impl Zip3 {
    pub fn new(prefix: u16) -> Result<Self> {
        if prefix > 999 {
            return Err(NodeError::InvalidZip(prefix.to_string()));
        }
        Ok(Self(prefix))
    }

    pub fn from_zip5(raw: &str) -> Result<Self> {
        let zip5 = to_zip5(raw)?;
        zip5[..3]
            .parse::<u16>()
            .map(Self)
            .map_err(|_| NodeError::InvalidZip(raw.to_string()))
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    /// Absolute numeric distance between two prefixes
    pub fn distance(&self, other: &Zip3) -> u16 {
        self.0.abs_diff(other.0)
    }
}

impl fmt::Display for Zip3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

impl Serialize for Zip3 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
