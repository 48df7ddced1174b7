//! Wholesale pricing tiers.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Pricing tier of a wholesale account; also the key of a product's tier price list.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricingTier {
    Standard,
    Retailer,
    Wholesaler,
    Premium,
}

impl PricingTier {
    pub const ALL: [PricingTier; 4] = [
        PricingTier::Standard,
        PricingTier::Retailer,
        PricingTier::Wholesaler,
        PricingTier::Premium,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PricingTier::Standard => "standard",
            PricingTier::Retailer => "retailer",
            PricingTier::Wholesaler => "wholesaler",
            PricingTier::Premium => "premium",
        }
    }
}

impl core::fmt::Display for PricingTier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PricingTier {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PricingTier::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("unknown pricing tier '{s}'")))
    }
}
