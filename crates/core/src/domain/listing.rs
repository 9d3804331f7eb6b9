use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListingId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    Sold,
    Withdrawn,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Sold => "sold",
            Self::Withdrawn => "withdrawn",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "sold" => Some(Self::Sold),
            "withdrawn" => Some(Self::Withdrawn),
            _ => None,
        }
    }
}

/// How much of the gap to asking a counter-offer tries to recover.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggressiveness {
    Passive,
    #[default]
    Balanced,
    Aggressive,
    VeryAggressive,
}

impl Aggressiveness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passive => "passive",
            Self::Balanced => "balanced",
            Self::Aggressive => "aggressive",
            Self::VeryAggressive => "very_aggressive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "passive" => Some(Self::Passive),
            "balanced" => Some(Self::Balanced),
            "aggressive" => Some(Self::Aggressive),
            "very_aggressive" => Some(Self::VeryAggressive),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub title: String,
    pub asking_price: Decimal,
    pub minimum_price: Option<Decimal>,
    pub aggressiveness: Aggressiveness,
    pub status: ListingStatus,
}

/// Price bounds the policy engine negotiates within. The floor is
/// confidential and must never reach buyer-facing text.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PriceFacts {
    pub asking: Decimal,
    pub minimum: Decimal,
    pub aggressiveness: Aggressiveness,
}

impl Listing {
    pub fn is_negotiable(&self) -> bool {
        self.status == ListingStatus::Active
    }

    /// Resolve the effective price bounds. An absent floor defaults to the
    /// configured ratio of asking (0.7 unless overridden).
    pub fn price_facts(&self, floor_ratio: Decimal) -> Result<PriceFacts, DomainError> {
        if self.asking_price <= Decimal::ZERO {
            return Err(DomainError::InvariantViolation(format!(
                "listing {} has non-positive asking price",
                self.id.0
            )));
        }

        let minimum = self.minimum_price.unwrap_or(self.asking_price * floor_ratio);
        if minimum > self.asking_price {
            return Err(DomainError::InvariantViolation(format!(
                "listing {} floor exceeds asking price",
                self.id.0
            )));
        }

        Ok(PriceFacts { asking: self.asking_price, minimum, aggressiveness: self.aggressiveness })
    }
}
