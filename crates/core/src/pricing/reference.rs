use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::quote::{Quote, QuoteSource, Tier};
use crate::geo::assign_area;
use crate::pricing::{assemble_quote, round_money, validate, PricingError, PricingRequest};

/// A live elite-tier price from the insurer partner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencePrice {
    pub elite_price: Decimal,
    pub currency: String,
    pub reference_ids: Vec<String>,
}

/// Anchors the three tiers on the partner's elite price. The partner's
/// identifiers are kept on the quote for the later purchase call.
pub fn price_from_reference(
    request: &PricingRequest,
    reference: &ReferencePrice,
) -> Result<Quote, PricingError> {
    let days = validate(request)?;
    if reference.elite_price <= Decimal::ZERO {
        return Err(PricingError::InvalidReferencePrice(reference.elite_price));
    }

    let elite = round_money(reference.elite_price);
    let standard_divisor = Decimal::new(18, 1);
    let premier_factor = Decimal::new(139, 2);
    let prices = vec![
        (Tier::Standard, round_money(elite / standard_divisor)),
        (Tier::Elite, elite),
        (Tier::Premier, round_money(elite * premier_factor)),
    ];

    let request = PricingRequest { currency: reference.currency.clone(), ..request.clone() };
    Ok(assemble_quote(
        prices,
        &request,
        assign_area(&request.destination),
        days,
        QuoteSource::InsurerReference,
        reference.reference_ids.clone(),
    ))
}
