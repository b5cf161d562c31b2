use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const MIN_TRAVELER_AGE: f64 = 0.08;
pub const MAX_TRAVELER_AGE: f64 = 110.0;
pub const ADULT_AGE: f64 = 18.0;
pub const MAX_TRAVELERS: usize = 9;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Destination,
    DepartureDate,
    ReturnDate,
    TravelerAges,
    AdventureSports,
}

impl Slot {
    /// Slots that must be filled before the confirmation summary is shown,
    /// in the order they are asked.
    pub const REQUIRED: [Slot; 4] =
        [Slot::Destination, Slot::DepartureDate, Slot::ReturnDate, Slot::TravelerAges];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Destination => "destination",
            Self::DepartureDate => "departure_date",
            Self::ReturnDate => "return_date",
            Self::TravelerAges => "traveler_ages",
            Self::AdventureSports => "adventure_sports",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Question {
    Slot(Slot),
    Confirmation,
}

impl Question {
    pub fn slot(&self) -> Option<Slot> {
        match self {
            Self::Slot(slot) => Some(*slot),
            Self::Confirmation => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripSlots {
    pub destination: Option<String>,
    pub departure_date: Option<NaiveDate>,
    pub return_date: Option<NaiveDate>,
    pub departure_country_code: Option<String>,
    pub arrival_country_code: Option<String>,
}

impl TripSlots {
    pub fn is_empty(&self) -> bool {
        self.destination.is_none() && self.departure_date.is_none() && self.return_date.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Travelers {
    pub ages: Vec<f64>,
    pub adults_count: u32,
    pub children_count: u32,
}

impl Travelers {
    /// Replaces the ages and re-derives the adult/child split. A party with no
    /// adult has one child counted as the adult.
    pub fn set_ages(&mut self, ages: Vec<f64>) {
        let adults = ages.iter().filter(|age| **age >= ADULT_AGE).count() as u32;
        let children = ages.len() as u32 - adults;

        (self.adults_count, self.children_count) =
            if adults == 0 && children > 0 { (1, children - 1) } else { (adults, children) };
        self.ages = ages;
    }

    pub fn is_empty(&self) -> bool {
        self.ages.is_empty()
    }

    pub fn count(&self) -> usize {
        self.ages.len()
    }
}

pub fn is_valid_age(age: f64) -> bool {
    age.is_finite() && (MIN_TRAVELER_AGE..=MAX_TRAVELER_AGE).contains(&age)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub adventure_sports: Option<bool>,
    /// Activity keywords the traveler has mentioned, checked again whenever
    /// the destination changes.
    #[serde(default)]
    pub activities: Vec<String>,
}

impl Preferences {
    pub fn remember_activities<'a>(&mut self, keywords: impl IntoIterator<Item = &'a str>) {
        for keyword in keywords {
            if !self.activities.iter().any(|known| known == keyword) {
                self.activities.push(keyword.to_owned());
            }
        }
    }
}
