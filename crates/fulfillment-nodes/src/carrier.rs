//! Carriers and shipment types

use crate::{NodeError, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Carriers recognized by the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShippingCarrier {
    Swa,
    Amxl,
    Ups,
}

impl ShippingCarrier {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Swa => "SWA",
            Self::Amxl => "AMXL",
            Self::Ups => "UPS",
        }
    }
}

impl FromStr for ShippingCarrier {
    type Err = NodeError;

    fn from_str(code: &str) -> Result<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "SWA" => Ok(Self::Swa),
            "AMXL" => Ok(Self::Amxl),
            "UPS" => Ok(Self::Ups),
            _ => Err(NodeError::UnknownCarrier(code.to_string())),
        }
    }
}

impl fmt::Display for ShippingCarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Transport family of a shipment, derived from its ship method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ShipmentType {
    UpsAir,
    UpsGround,
    Swa,
    Other,
}

impl ShipmentType {
    const AIR_METHODS: [&'static str; 3] = ["UPS_NEXT_DAY", "UPS_2ND_DAY", "UPS_3_DAY"];

    /// Classify a ship method string (case-insensitive)
    pub fn from_ship_method(ship_method: &str) -> Self {
        let method = ship_method.trim().to_ascii_uppercase();
        if Self::AIR_METHODS.contains(&method.as_str()) {
            Self::UpsAir
        } else if method == "SWA" {
            Self::Swa
        } else if method == "UPS_GROUND" {
            Self::UpsGround
        } else {
            Self::Other
        }
    }

    /// Third-party transport families, the only ones lanes borrow forecasts across
    pub fn is_third_party(&self) -> bool {
        matches!(self, Self::UpsAir | Self::UpsGround)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpsAir => "UPS_AIR",
            Self::UpsGround => "UPS_GROUND",
            Self::Swa => "SWA",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for ShipmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shipment_type_from_ship_method() {
        assert_eq!(ShipmentType::from_ship_method("UPS_NEXT_DAY"), ShipmentType::UpsAir);
        assert_eq!(ShipmentType::from_ship_method("ups_2nd_day"), ShipmentType::UpsAir);
        assert_eq!(ShipmentType::from_ship_method("UPS_3_DAY"), ShipmentType::UpsAir);
        assert_eq!(ShipmentType::from_ship_method("UPS_GROUND"), ShipmentType::UpsGround);
        assert_eq!(ShipmentType::from_ship_method("swa"), ShipmentType::Swa);
        assert_eq!(ShipmentType::from_ship_method("FEDEX_HOME"), ShipmentType::Other);
        assert_eq!(ShipmentType::from_ship_method(""), ShipmentType::Other);
    }

    #[test]
    fn test_carrier_codes() {
        assert_eq!("ups".parse::<ShippingCarrier>(), Ok(ShippingCarrier::Ups));
        assert_eq!(" SWA ".parse::<ShippingCarrier>(), Ok(ShippingCarrier::Swa));
        assert_eq!(ShippingCarrier::Amxl.to_string(), "AMXL");
        assert!("DHL".parse::<ShippingCarrier>().is_err());
    }

    #[test]
    fn test_only_ups_families_are_third_party() {
        assert!(ShipmentType::UpsAir.is_third_party());
        assert!(ShipmentType::UpsGround.is_third_party());
        assert!(!ShipmentType::Swa.is_third_party());
        assert!(!ShipmentType::Other.is_third_party());
    }
}
