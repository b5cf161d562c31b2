//! Maps structured travel documents onto the trip slots.

use chrono::NaiveDate;
use tracing::debug;

use tripcover_core::dates::{correct_return, parse_date, validate_not_past};
use tripcover_core::domain::document::{DocumentExtraction, DocumentType};
use tripcover_core::domain::trip::{is_valid_age, Slot, MAX_TRAVELERS};
use tripcover_core::geo;
use tripcover_core::ConversationState;

const DESTINATION_FIELDS: &[&str] =
    &["destination", "arrival_country", "arrival_city", "country", "city"];
const ARRIVAL_CODE_FIELDS: &[&str] = &["arrival_country_code", "destination_country_code"];
const DEPARTURE_CODE_FIELDS: &[&str] = &["departure_country_code", "origin_country_code"];

fn departure_fields(document_type: DocumentType) -> &'static [&'static str] {
    match document_type {
        DocumentType::Flight => &["departure_date", "outbound_date", "flight_date"],
        DocumentType::Hotel => &["check_in", "check_in_date", "arrival_date"],
        DocumentType::Visa => &["entry_date", "valid_from", "arrival_date"],
        DocumentType::Itinerary => &["start_date", "departure_date"],
    }
}

fn return_fields(document_type: DocumentType) -> &'static [&'static str] {
    match document_type {
        DocumentType::Flight => &["return_date", "inbound_date"],
        DocumentType::Hotel => &["check_out", "check_out_date"],
        DocumentType::Visa => &["exit_date", "departure_date"],
        DocumentType::Itinerary => &["end_date", "return_date"],
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub filled: Vec<Slot>,
}

impl MergeReport {
    pub fn is_empty(&self) -> bool {
        self.filled.is_empty()
    }
}

/// Copies document values into slots that are still empty. Values the user
/// already gave are never replaced; unusable fields are skipped silently.
pub fn merge_into_empty_slots(
    state: &mut ConversationState,
    extraction: &DocumentExtraction,
    today: NaiveDate,
) -> MergeReport {
    let mut report = MergeReport::default();
    let kind = extraction.document_type;

    if state.trip.destination.is_none() {
        if let Some(raw) = extraction.field(DESTINATION_FIELDS) {
            let (name, code) = match geo::lookup(raw) {
                Some(profile) => (profile.name.to_owned(), Some(profile.country_code.to_owned())),
                None => (raw.to_owned(), None),
            };
            state.trip.destination = Some(name);
            if state.trip.arrival_country_code.is_none() {
                state.trip.arrival_country_code = code;
            }
            report.filled.push(Slot::Destination);
        }
    }
    if state.trip.arrival_country_code.is_none() {
        state.trip.arrival_country_code =
            extraction.field(ARRIVAL_CODE_FIELDS).map(str::to_ascii_uppercase);
    }
    if state.trip.departure_country_code.is_none() {
        state.trip.departure_country_code =
            extraction.field(DEPARTURE_CODE_FIELDS).map(str::to_ascii_uppercase);
    }

    if state.trip.departure_date.is_none() {
        let departure = extraction
            .field(departure_fields(kind))
            .and_then(|raw| parse_date(raw, today).ok())
            .filter(|parsed| validate_not_past(parsed.date, today).is_ok());
        if let Some(parsed) = departure {
            state.trip.departure_date = Some(parsed.date);
            report.filled.push(Slot::DepartureDate);
        }
    }

    if state.trip.return_date.is_none() {
        let return_date =
            extraction.field(return_fields(kind)).and_then(|raw| parse_date(raw, today).ok());
        if let Some(parsed) = return_date {
            let date = match state.trip.departure_date {
                Some(departure) => correct_return(departure, parsed.date).date,
                None => parsed.date,
            };
            state.trip.return_date = Some(date);
            report.filled.push(Slot::ReturnDate);
        }
    }

    if state.travelers.is_empty() {
        let ages = extraction.field(&["traveler_ages", "passenger_ages", "ages"]).and_then(parse_ages);
        if let Some(ages) = ages {
            state.travelers.set_ages(ages);
            report.filled.push(Slot::TravelerAges);
        }
    }

    for slot in &report.filled {
        state.dialogue.reset_failures(*slot);
    }
    debug!(
        event_name = "agent.document.merged",
        session_id = %state.session_id,
        document_type = kind.as_str(),
        filled = report.filled.len(),
        "document fields merged"
    );
    report
}

fn parse_ages(raw: &str) -> Option<Vec<f64>> {
    let ages = raw
        .split([',', ';', ' '])
        .filter(|part| !part.trim().is_empty())
        .map(|part| part.trim().parse::<f64>().ok())
        .collect::<Option<Vec<_>>>()?;

    let valid = !ages.is_empty()
        && ages.len() <= MAX_TRAVELERS
        && ages.iter().all(|age| is_valid_age(*age));
    valid.then_some(ages)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use tripcover_core::domain::document::{DocumentExtraction, DocumentType};
    use tripcover_core::domain::trip::Slot;
    use tripcover_core::ConversationState;

    use super::merge_into_empty_slots;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 1).expect("date")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    #[test]
    fn flight_fills_every_empty_slot() {
        let mut state = ConversationState::new("s-1");
        let flight = DocumentExtraction::new(DocumentType::Flight)
            .with_field("arrival_city", "Bangkok", 0.97)
            .with_field("departure_date", "2025-12-15", 0.95)
            .with_field("return_date", "2025-12-29", 0.91)
            .with_field("passenger_ages", "38, 36", 0.88);

        let report = merge_into_empty_slots(&mut state, &flight, today());

        assert_eq!(
            report.filled,
            vec![Slot::Destination, Slot::DepartureDate, Slot::ReturnDate, Slot::TravelerAges]
        );
        assert_eq!(state.trip.destination.as_deref(), Some("Thailand"));
        assert_eq!(state.trip.arrival_country_code.as_deref(), Some("TH"));
        assert_eq!(state.trip.return_date, Some(date(2025, 12, 29)));
        assert_eq!(state.travelers.adults_count, 2);
    }

    #[test]
    fn user_values_are_never_overwritten() {
        let mut state = ConversationState::new("s-1");
        state.trip.destination = Some("Japan".to_owned());
        state.trip.departure_date = Some(date(2025, 12, 20));

        let hotel = DocumentExtraction::new(DocumentType::Hotel)
            .with_field("city", "Paris", 0.9)
            .with_field("check_in", "2025-12-01", 0.9)
            .with_field("check_out", "2025-12-27", 0.9);
        let report = merge_into_empty_slots(&mut state, &hotel, today());

        assert_eq!(report.filled, vec![Slot::ReturnDate]);
        assert_eq!(state.trip.destination.as_deref(), Some("Japan"));
        assert_eq!(state.trip.departure_date, Some(date(2025, 12, 20)));
        assert_eq!(state.trip.return_date, Some(date(2025, 12, 27)));
    }

    #[test]
    fn unusable_fields_are_skipped_silently() {
        let mut state = ConversationState::new("s-1");
        let visa = DocumentExtraction::new(DocumentType::Visa)
            .with_field("entry_date", "2024-01-01", 0.9)
            .with_field("exit_date", "someday", 0.4)
            .with_field("ages", "34, 140", 0.9);

        let report = merge_into_empty_slots(&mut state, &visa, today());

        assert!(report.is_empty());
        assert!(state.trip.departure_date.is_none());
        assert!(state.travelers.is_empty());
    }

    #[test]
    fn document_return_before_departure_is_corrected() {
        let mut state = ConversationState::new("s-1");
        state.trip.departure_date = Some(date(2025, 12, 15));
        let itinerary = DocumentExtraction::new(DocumentType::Itinerary)
            .with_field("end_date", "2025-12-10", 0.9);

        merge_into_empty_slots(&mut state, &itinerary, today());
        assert_eq!(state.trip.return_date, Some(date(2025, 12, 16)));
    }
}
