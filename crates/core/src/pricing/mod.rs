//! Deterministic three-tier trip pricing.
//!
//! Two variants share one output shape: the area-table variant prices from
//! the destination's base daily rate, and the reference variant anchors all
//! tiers on a live elite price supplied by the insurer.

pub mod reference;

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::dates::{trip_days_inclusive, MAX_TRIP_DAYS};
use crate::domain::quote::{Quote, QuoteId, QuoteSource, Tier, TierQuote};
use crate::domain::trip::{is_valid_age, MAX_TRAVELERS};
use crate::geo::{assign_area, AreaAssignment};

pub use reference::{price_from_reference, ReferencePrice};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricingRequest {
    pub destination: String,
    pub departure_date: NaiveDate,
    pub return_date: NaiveDate,
    pub ages: Vec<f64>,
    pub adventure_sports: bool,
    pub currency: String,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum PricingError {
    #[error("return {return_date} is not after departure {departure_date}")]
    InvalidDates { departure_date: NaiveDate, return_date: NaiveDate },
    #[error("trip of {days} days exceeds the {max} day limit")]
    TripTooLong { days: i64, max: i64 },
    #[error("{count} travelers is outside the supported range 1..={max}")]
    TravelerCount { count: usize, max: usize },
    #[error("traveler age {age} is outside the insurable range")]
    InvalidAge { age: f64 },
    #[error("reference price {0} must be positive")]
    InvalidReferencePrice(Decimal),
}

impl PricingError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidDates { .. } => "invalid_dates",
            Self::TripTooLong { .. } => "trip_too_long",
            Self::TravelerCount { .. } => "traveler_count",
            Self::InvalidAge { .. } => "invalid_age",
            Self::InvalidReferencePrice(_) => "invalid_reference_price",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTraceStep {
    pub stage: String,
    pub detail: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedQuote {
    pub quote: Quote,
    pub trace: Vec<PricingTraceStep>,
}

pub trait PricingEngine: Send + Sync {
    fn price(&self, request: &PricingRequest) -> Result<Quote, PricingError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AreaTablePricing;

impl PricingEngine for AreaTablePricing {
    fn price(&self, request: &PricingRequest) -> Result<Quote, PricingError> {
        price_with_trace(request).map(|priced| priced.quote)
    }
}

pub fn price(request: &PricingRequest) -> Result<Quote, PricingError> {
    AreaTablePricing.price(request)
}

/// Checks duration, then traveler count, then each age. Returns the
/// inclusive trip length on success.
pub fn validate(request: &PricingRequest) -> Result<i64, PricingError> {
    let days = trip_days_inclusive(request.departure_date, request.return_date);
    if request.return_date < request.departure_date {
        return Err(PricingError::InvalidDates {
            departure_date: request.departure_date,
            return_date: request.return_date,
        });
    }
    if days > MAX_TRIP_DAYS {
        return Err(PricingError::TripTooLong { days, max: MAX_TRIP_DAYS });
    }
    if request.ages.is_empty() || request.ages.len() > MAX_TRAVELERS {
        return Err(PricingError::TravelerCount { count: request.ages.len(), max: MAX_TRAVELERS });
    }
    if let Some(age) = request.ages.iter().copied().find(|age| !is_valid_age(*age)) {
        return Err(PricingError::InvalidAge { age });
    }
    Ok(days)
}

pub fn age_multiplier(age: f64) -> Decimal {
    if age < 18.0 {
        Decimal::new(7, 1)
    } else if age < 65.0 {
        Decimal::ONE
    } else if age < 70.0 {
        Decimal::new(13, 1)
    } else {
        Decimal::new(15, 1)
    }
}

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn price_with_trace(request: &PricingRequest) -> Result<PricedQuote, PricingError> {
    let days = validate(request)?;
    let assignment = assign_area(&request.destination);
    let mut trace = vec![PricingTraceStep {
        stage: "area".to_owned(),
        detail: format!("{} base daily rate", assignment.area.label()),
        amount: assignment.base_daily_rate,
    }];

    let total_base = request
        .ages
        .iter()
        .map(|age| {
            let amount =
                assignment.base_daily_rate * Decimal::from(days) * age_multiplier(*age);
            trace.push(PricingTraceStep {
                stage: "traveler".to_owned(),
                detail: format!("age {age} x {days} days"),
                amount,
            });
            amount
        })
        .sum::<Decimal>();
    trace.push(PricingTraceStep {
        stage: "total_base".to_owned(),
        detail: "sum(rate * days * age multiplier)".to_owned(),
        amount: total_base,
    });

    let prices = Tier::ALL
        .into_iter()
        .map(|tier| (tier, round_money(total_base * tier.multiplier())))
        .collect::<Vec<_>>();
    for (tier, amount) in &prices {
        trace.push(PricingTraceStep {
            stage: format!("tier.{}", tier.as_str()),
            detail: format!("total_base * {}", tier.multiplier()),
            amount: *amount,
        });
    }

    let quote = assemble_quote(
        prices,
        request,
        assignment,
        days,
        QuoteSource::AreaTable,
        Vec::new(),
    );
    Ok(PricedQuote { quote, trace })
}

/// Builds the final quote, dropping tiers without adventure cover when the
/// traveler asked for it.
pub(crate) fn assemble_quote(
    prices: Vec<(Tier, Decimal)>,
    request: &PricingRequest,
    assignment: AreaAssignment,
    trip_days: i64,
    source: QuoteSource,
    purchase_reference_ids: Vec<String>,
) -> Quote {
    let tiers = prices
        .into_iter()
        .filter(|(tier, _)| !request.adventure_sports || tier.coverage().adventure_sports)
        .map(|(tier, price)| {
            (
                tier,
                TierQuote { price, currency: request.currency.clone(), coverage: tier.coverage() },
            )
        })
        .collect::<BTreeMap<_, _>>();

    let preferred = if request.adventure_sports { Tier::Elite } else { Tier::Standard };
    let recommended_tier = if tiers.contains_key(&preferred) { preferred } else { Tier::Premier };

    Quote {
        id: QuoteId(format!("Q-{}", Uuid::new_v4())),
        tiers,
        recommended_tier,
        purchase_reference_ids,
        source,
        area: assignment.area,
        trip_days,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};
    use rust_decimal::Decimal;

    use super::{age_multiplier, price, price_with_trace, validate, PricingError, PricingRequest};
    use crate::domain::quote::{QuoteSource, Tier};

    fn request(destination: &str, days: i64, ages: Vec<f64>, adventure: bool) -> PricingRequest {
        let departure = NaiveDate::from_ymd_opt(2025, 12, 1).expect("date");
        PricingRequest {
            destination: destination.to_owned(),
            departure_date: departure,
            return_date: departure + Duration::days(days - 1),
            ages,
            adventure_sports: adventure,
            currency: "USD".to_owned(),
        }
    }

    #[test]
    fn prices_three_tiers_from_area_rate() {
        // Thailand 2.50/day, 10 days, one adult and one child.
        let quote = price(&request("Thailand", 10, vec![35.0, 8.0], false)).expect("priced");

        assert_eq!(quote.tier(Tier::Standard).map(|t| t.price), Some(Decimal::new(4250, 2)));
        assert_eq!(quote.tier(Tier::Elite).map(|t| t.price), Some(Decimal::new(7650, 2)));
        assert_eq!(quote.tier(Tier::Premier).map(|t| t.price), Some(Decimal::new(10625, 2)));
        assert_eq!(quote.recommended_tier, Tier::Standard);
        assert_eq!(quote.source, QuoteSource::AreaTable);
        assert_eq!(quote.trip_days, 10);
    }

    #[test]
    fn tiers_are_strictly_ordered_when_all_present() {
        for (destination, ages) in [
            ("Japan", vec![30.0]),
            ("Atlantis", vec![70.0, 66.0]),
            ("France", vec![0.08, 44.0, 12.5]),
        ] {
            let quote = price(&request(destination, 7, ages, false)).expect("priced");
            let standard = quote.tier(Tier::Standard).expect("standard").price;
            let elite = quote.tier(Tier::Elite).expect("elite").price;
            let premier = quote.tier(Tier::Premier).expect("premier").price;
            assert!(standard < elite && elite < premier, "{destination}");
        }
    }

    #[test]
    fn adventure_drops_standard_and_recommends_elite() {
        let quote = price(&request("New Zealand", 5, vec![29.0], true)).expect("priced");
        assert!(!quote.offers(Tier::Standard));
        assert!(quote.offers(Tier::Elite) && quote.offers(Tier::Premier));
        assert_eq!(quote.recommended_tier, Tier::Elite);
    }

    #[test]
    fn duration_boundary_is_182_inclusive_days() {
        assert_eq!(validate(&request("Japan", 182, vec![30.0], false)), Ok(182));
        assert!(matches!(
            validate(&request("Japan", 183, vec![30.0], false)),
            Err(PricingError::TripTooLong { days: 183, .. })
        ));
    }

    #[test]
    fn first_failure_wins_in_validation_order() {
        let too_long_and_bad_age = request("Japan", 200, vec![130.0], false);
        assert!(matches!(validate(&too_long_and_bad_age), Err(PricingError::TripTooLong { .. })));

        let crowd_and_bad_age = request("Japan", 5, vec![0.01; 10], false);
        assert!(matches!(
            validate(&crowd_and_bad_age),
            Err(PricingError::TravelerCount { count: 10, .. })
        ));

        let nobody = request("Japan", 5, Vec::new(), false);
        assert!(matches!(validate(&nobody), Err(PricingError::TravelerCount { count: 0, .. })));
    }

    #[test]
    fn age_boundaries_are_enforced() {
        assert!(validate(&request("Japan", 5, vec![0.08], false)).is_ok());
        assert_eq!(
            validate(&request("Japan", 5, vec![0.07], false)),
            Err(PricingError::InvalidAge { age: 0.07 })
        );
    }

    #[test]
    fn age_bands_map_to_multipliers() {
        assert_eq!(age_multiplier(17.9), Decimal::new(7, 1));
        assert_eq!(age_multiplier(18.0), Decimal::ONE);
        assert_eq!(age_multiplier(64.0), Decimal::ONE);
        assert_eq!(age_multiplier(65.0), Decimal::new(13, 1));
        assert_eq!(age_multiplier(69.5), Decimal::new(13, 1));
        assert_eq!(age_multiplier(70.0), Decimal::new(15, 1));
    }

    #[test]
    fn trace_records_each_stage() {
        // Not a known country, so the worldwide rate applies.
        let priced = price_with_trace(&request("Europe", 3, vec![40.0], false)).expect("priced");
        let stages = priced.trace.iter().map(|step| step.stage.as_str()).collect::<Vec<_>>();
        assert_eq!(
            stages,
            vec!["area", "traveler", "total_base", "tier.standard", "tier.elite", "tier.premier"]
        );
        assert_eq!(priced.trace[2].amount, Decimal::new(1800, 2));
    }
}
