use chrono::NaiveDate;
use clap::Args;
use serde::Serialize;
use tripcover_core::domain::quote::Quote;
use tripcover_core::pricing::{self, PricingRequest, PricingTraceStep};

use crate::commands::{load_config, CommandFailure, CommandResult};

#[derive(Clone, Debug, Args)]
pub struct QuoteArgs {
    #[arg(long, help = "Destination country or city")]
    pub destination: String,
    #[arg(long, help = "Departure date (YYYY-MM-DD)")]
    pub depart: NaiveDate,
    #[arg(long = "return", help = "Return date (YYYY-MM-DD)")]
    pub return_date: NaiveDate,
    #[arg(long, value_delimiter = ',', required = true, help = "Traveler ages, comma separated")]
    pub ages: Vec<f64>,
    #[arg(long, help = "Cover adventure sports (drops the Standard tier)")]
    pub adventure: bool,
    #[arg(long, help = "Quote currency; defaults to pricing.currency from config")]
    pub currency: Option<String>,
    #[arg(long, help = "Include the pricing trace in the output")]
    pub explain: bool,
}

#[derive(Debug, Serialize)]
struct QuoteOutput {
    quote: Quote,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<Vec<PricingTraceStep>>,
}

pub fn run(args: &QuoteArgs) -> CommandResult {
    match price(args) {
        Ok(output) => CommandResult::payload("quote", &output),
        Err(failure) => CommandResult::failure("quote", failure),
    }
}

fn price(args: &QuoteArgs) -> Result<QuoteOutput, CommandFailure> {
    let currency = match &args.currency {
        Some(currency) => currency.trim().to_ascii_uppercase(),
        None => load_config()?.pricing.currency,
    };

    let request = PricingRequest {
        destination: args.destination.trim().to_owned(),
        departure_date: args.depart,
        return_date: args.return_date,
        ages: args.ages.clone(),
        adventure_sports: args.adventure,
        currency,
    };

    let priced = pricing::price_with_trace(&request)
        .map_err(|error| CommandFailure::new(error.code(), error.to_string(), 6))?;
    Ok(QuoteOutput { quote: priced.quote, trace: args.explain.then_some(priced.trace) })
}
