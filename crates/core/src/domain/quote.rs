use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::geo::Area;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Standard,
    Elite,
    Premier,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Standard, Tier::Elite, Tier::Premier];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Elite => "elite",
            Self::Premier => "premier",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Standard => "Standard",
            Self::Elite => "Elite",
            Self::Premier => "Premier",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(Self::Standard),
            "elite" => Some(Self::Elite),
            "premier" => Some(Self::Premier),
            _ => None,
        }
    }

    /// Multiplier applied to the summed base premium.
    pub fn multiplier(&self) -> Decimal {
        match self {
            Self::Standard => Decimal::ONE,
            Self::Elite => Decimal::new(18, 1),
            Self::Premier => Decimal::new(25, 1),
        }
    }

    pub fn coverage(&self) -> CoverageTable {
        match self {
            Self::Standard => CoverageTable {
                medical_expenses: Decimal::from(100_000),
                emergency_evacuation: Decimal::from(250_000),
                trip_cancellation: Decimal::from(2_500),
                baggage_loss: Decimal::from(1_000),
                travel_delay: Decimal::from(200),
                adventure_sports: false,
            },
            Self::Elite => CoverageTable {
                medical_expenses: Decimal::from(500_000),
                emergency_evacuation: Decimal::from(1_000_000),
                trip_cancellation: Decimal::from(7_500),
                baggage_loss: Decimal::from(3_000),
                travel_delay: Decimal::from(500),
                adventure_sports: true,
            },
            Self::Premier => CoverageTable {
                medical_expenses: Decimal::from(1_000_000),
                emergency_evacuation: Decimal::from(2_000_000),
                trip_cancellation: Decimal::from(15_000),
                baggage_loss: Decimal::from(5_000),
                travel_delay: Decimal::from(1_000),
                adventure_sports: true,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageTable {
    pub medical_expenses: Decimal,
    pub emergency_evacuation: Decimal,
    pub trip_cancellation: Decimal,
    pub baggage_loss: Decimal,
    pub travel_delay: Decimal,
    pub adventure_sports: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierQuote {
    pub price: Decimal,
    pub currency: String,
    pub coverage: CoverageTable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteSource {
    AreaTable,
    InsurerReference,
}

/// A priced snapshot of one trip. Never edited after creation; a changed trip
/// gets a new quote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub tiers: BTreeMap<Tier, TierQuote>,
    pub recommended_tier: Tier,
    pub purchase_reference_ids: Vec<String>,
    pub source: QuoteSource,
    pub area: Area,
    pub trip_days: i64,
    pub created_at: DateTime<Utc>,
}

impl Quote {
    pub fn tier(&self, tier: Tier) -> Option<&TierQuote> {
        self.tiers.get(&tier)
    }

    pub fn offers(&self, tier: Tier) -> bool {
        self.tiers.contains_key(&tier)
    }
}
