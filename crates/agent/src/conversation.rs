use chrono::NaiveDate;
use thiserror::Error;
use tracing::debug;

use tripcover_core::dates::{
    correct_return, find_dates, format_display, is_month_name, parse_date, parse_range,
    trip_days_inclusive, validate_not_past, validate_return, MAX_TRIP_DAYS,
};
use tripcover_core::domain::trip::{is_valid_age, Slot, MAX_TRAVELERS};
use tripcover_core::errors::DomainError;
use tripcover_core::flows::{ClassifiedIntent, EscalationReason, Intent};
use tripcover_core::geo;
use tripcover_core::ConversationState;

use crate::documents::merge_into_empty_slots;
use crate::guardrails::{
    evaluate_activities, mentioned_activities, mentions_adventure, GuardrailDecision,
};
use crate::llm::ExtractedTrip;
use crate::runtime::NodeOutcome;

pub const CONFIRMATION_QUESTION: &str = "Is everything correct? (yes/no)";

const GREETING: &str = "Hi there! I can put together a travel insurance quote for you in a \
                        couple of minutes. Tell me where you're headed whenever you're ready.";
const CORRECTION_INVITE: &str = "No problem. Tell me what needs changing, for example \
                                 \"return on 22 Dec\" or \"ages 40 and 38\".";
const MODIFY_INVITE: &str = "Your quote is unchanged. If you'd like to adjust the trip, tell me \
                             the new destination, dates, traveler ages or activities.";

/// Consecutive unusable answers to one question before a human takes over.
const MAX_SLOT_FAILURES: u32 = 4;

const YES_WORDS: &[&str] = &[
    "yes", "y", "yeah", "yep", "yup", "sure", "correct", "right", "ok", "okay", "confirm",
    "confirmed", "absolutely", "definitely", "affirmative", "good",
];
const NO_WORDS: &[&str] = &["no", "n", "nope", "nah", "incorrect", "wrong", "none", "never"];
const RETURN_WORDS: &[&str] = &["return", "returning", "back", "home", "until", "till"];
const AGE_PREFIXES: &[&str] = &["age", "aged", "ages"];
const AGE_SUFFIXES: &[&str] = &["years", "year", "yrs", "yo", "y.o"];
const MONTH_SUFFIXES: &[&str] = &["month", "months", "mo", "mos"];

#[derive(Debug, Error)]
pub enum SlotError {
    #[error("slot update left the conversation inconsistent: {0}")]
    Invariant(#[from] DomainError),
}

/// Everything the collector reads besides the conversation itself.
#[derive(Clone, Copy, Debug)]
pub struct SlotInput<'a> {
    pub text: &'a str,
    pub intent: Intent,
    pub extracted: Option<&'a ExtractedTrip>,
    pub today: NaiveDate,
}

#[derive(Debug, Default)]
struct SlotChanges {
    answered: Vec<Slot>,
    notes: Vec<String>,
}

impl SlotChanges {
    fn any(&self) -> bool {
        !self.answered.is_empty()
    }

    fn answer(&mut self, slot: Slot) {
        if !self.answered.contains(&slot) {
            self.answered.push(slot);
        }
    }
}

/// Fills trip slots from free text and drives the confirmation handshake.
#[derive(Clone, Debug)]
pub struct SlotCollector {
    default_departure_country: String,
}

impl Default for SlotCollector {
    fn default() -> Self {
        Self::new("SG")
    }
}

impl SlotCollector {
    pub fn new(default_departure_country: impl Into<String>) -> Self {
        Self { default_departure_country: default_departure_country.into() }
    }

    /// Handles one user utterance. Returns `Continue` only once the trip is
    /// confirmed and ready to price.
    pub fn collect(
        &self,
        state: &mut ConversationState,
        input: &SlotInput<'_>,
    ) -> Result<NodeOutcome, SlotError> {
        let outcome = self.step(state, input);
        state.validate()?;
        Ok(outcome)
    }

    fn step(&self, state: &mut ConversationState, input: &SlotInput<'_>) -> NodeOutcome {
        let tokens = tokenize(&normalize_text(input.text));

        if let Some(document) = state.pending_document.take() {
            let report = merge_into_empty_slots(state, &document, input.today);
            state.documents.push(document);
            state.flags.document_merged = false;

            let mut changes = SlotChanges::default();
            if report.is_empty() {
                changes.notes.push("I couldn't find any new trip details in that document.".to_owned());
            } else {
                let filled = report.filled.iter().map(|slot| describe_slot(*slot)).collect::<Vec<_>>();
                changes.notes.push(format!("Thanks! I picked up your {} from the document.", filled.join(", ")));
                if state.flags.pricing_complete || state.dialogue.confirmation_received {
                    state.supersede_quote();
                }
            }
            if state.flags.pricing_complete {
                return reply(state, changes.notes, MODIFY_INVITE);
            }
            return self.advance(state, changes.notes);
        }

        let fresh = state.trip.is_empty()
            && state.travelers.is_empty()
            && !state.dialogue.has_pending_question();
        if input.intent == Intent::Greeting && fresh {
            state.push_assistant(GREETING);
            return NodeOutcome::Reply;
        }

        if state.dialogue.awaiting_confirmation {
            return self.handle_confirmation(state, input, &tokens);
        }

        let pending = state.dialogue.pending_slot();
        let changes = self.apply_updates(state, input, &tokens);

        if !changes.any() {
            if let Some(slot) = pending {
                let failures = state.dialogue.record_failure(slot);
                debug!(
                    event_name = "agent.slots.unanswered",
                    session_id = %state.session_id,
                    slot = slot.as_str(),
                    failures,
                    "pending question not answered"
                );
                if failures >= MAX_SLOT_FAILURES {
                    return NodeOutcome::Escalate {
                        reason: EscalationReason::RepeatedFailure,
                        message: None,
                    };
                }
                return reply(state, changes.notes, rephrase_prompt(slot));
            }
        }

        if state.flags.pricing_complete {
            return reply(state, changes.notes, MODIFY_INVITE);
        }
        self.advance(state, changes.notes)
    }

    fn handle_confirmation(
        &self,
        state: &mut ConversationState,
        input: &SlotInput<'_>,
        tokens: &[String],
    ) -> NodeOutcome {
        match yes_no(tokens) {
            Some(true) => {
                state.dialogue.clear_question();
                state.dialogue.confirmation_received = true;
                self.finalize(state);
                self.advance(state, Vec::new())
            }
            Some(false) => {
                state.dialogue.clear_question();
                state.dialogue.confirmation_received = false;
                let changes = self.apply_updates(state, input, tokens);
                if changes.any() {
                    return self.advance(state, changes.notes);
                }
                state.push_assistant(CORRECTION_INVITE);
                NodeOutcome::Reply
            }
            None => {
                let changes = self.apply_updates(state, input, tokens);
                if changes.any() {
                    state.dialogue.clear_question();
                    return self.advance(state, changes.notes);
                }
                state.push_assistant(CONFIRMATION_QUESTION);
                NodeOutcome::Reply
            }
        }
    }

    /// Asks for whatever the trip still needs, or hands over to pricing.
    fn advance(&self, state: &mut ConversationState, notes: Vec<String>) -> NodeOutcome {
        if let Some(next) = state.missing_required_slots().first().copied() {
            state.dialogue.ask(next);
            let prompt = if state.dialogue.failures(next) > 0 {
                rephrase_prompt(next)
            } else {
                first_prompt(next)
            };
            return reply(state, notes, prompt);
        }

        if !state.dialogue.confirmation_received {
            state.dialogue.ask_confirmation();
            let summary = format!("{}\n{CONFIRMATION_QUESTION}", trip_summary(state));
            return reply(state, notes, &summary);
        }

        if state.preferences.adventure_sports.is_none() {
            state.dialogue.ask(Slot::AdventureSports);
            return reply(state, notes, first_prompt(Slot::AdventureSports));
        }

        state.dialogue.clear_question();
        state.flags.ready_for_pricing = true;
        for note in notes {
            queue_notice(state, note);
        }
        NodeOutcome::Continue
    }

    fn finalize(&self, state: &mut ConversationState) {
        let ages = state.travelers.ages.clone();
        state.travelers.set_ages(ages);
        if state.trip.departure_country_code.is_none() {
            state.trip.departure_country_code = Some(self.default_departure_country.clone());
        }
        if state.trip.arrival_country_code.is_none() {
            state.trip.arrival_country_code = state
                .trip
                .destination
                .as_deref()
                .and_then(geo::lookup)
                .map(|profile| profile.country_code.to_owned());
        }
    }

    fn apply_updates(
        &self,
        state: &mut ConversationState,
        input: &SlotInput<'_>,
        tokens: &[String],
    ) -> SlotChanges {
        let mut changes = SlotChanges::default();
        update_destination(state, input, tokens, &mut changes);
        update_dates(state, input, tokens, &mut changes);
        update_ages(state, input, &mut changes);
        update_adventure(state, input, tokens, &mut changes);

        for slot in &changes.answered {
            state.dialogue.reset_failures(*slot);
        }
        if changes.any() {
            debug!(
                event_name = "agent.slots.updated",
                session_id = %state.session_id,
                answered = ?changes.answered,
                "slots updated from utterance"
            );
        }
        changes
    }
}

fn update_destination(
    state: &mut ConversationState,
    input: &SlotInput<'_>,
    tokens: &[String],
    changes: &mut SlotChanges,
) {
    let pending = state.dialogue.pending_slot() == Some(Slot::Destination);
    let candidate = input
        .extracted
        .and_then(|extracted| extracted.destination.as_deref())
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(canonical_destination)
        .or_else(|| geo::scan_utterance(input.text).map(|profile| profile.name.to_owned()))
        .or_else(|| {
            (pending && looks_like_place(input.text, tokens))
                .then(|| canonical_destination(input.text.trim()))
        });

    let Some(name) = candidate else {
        return;
    };
    changes.answer(Slot::Destination);
    if state.trip.destination.as_deref() == Some(name.as_str()) {
        return;
    }

    state.trip.arrival_country_code =
        geo::lookup(&name).map(|profile| profile.country_code.to_owned());
    state.trip.destination = Some(name);
    mark_changed(state);
    if state.preferences.adventure_sports == Some(true) && deny_remembered_activities(state) {
        state.preferences.adventure_sports = Some(false);
    }
}

/// Runs the activity guardrail over every activity mentioned so far against
/// the current destination. Queues the notice and returns true on a denial.
fn deny_remembered_activities(state: &mut ConversationState) -> bool {
    let Some(profile) = state.trip.destination.as_deref().and_then(geo::lookup) else {
        return false;
    };
    let remembered = state.preferences.activities.join(" ");
    let GuardrailDecision::Deny { reason_code, user_message, .. } =
        evaluate_activities(profile, &remembered)
    else {
        return false;
    };
    debug!(
        event_name = "agent.slots.activity_denied",
        session_id = %state.session_id,
        reason_code,
        "impossible activity for destination"
    );
    queue_notice(state, user_message);
    state.preferences.activities.clear();
    true
}

fn update_dates(
    state: &mut ConversationState,
    input: &SlotInput<'_>,
    tokens: &[String],
    changes: &mut SlotChanges,
) {
    let today = input.today;
    let pending = state.dialogue.pending_slot();
    let (departure, return_date) = input
        .extracted
        .and_then(|extracted| validated_extractor_dates(extracted, today))
        .unwrap_or_else(|| raw_dates(input.text, tokens, today, pending, state));

    let departure_changed = match departure {
        Some(date) if validate_not_past(date, today).is_err() => {
            changes.notes.push(format!(
                "{} has already passed, so I can't use it as your departure date.",
                format_display(date)
            ));
            false
        }
        Some(date) => {
            changes.answer(Slot::DepartureDate);
            if state.trip.departure_date != Some(date) {
                state.trip.departure_date = Some(date);
                mark_changed(state);
                true
            } else {
                false
            }
        }
        None => false,
    };

    let candidate_return = match return_date {
        Some(date) => Some(date),
        None if departure_changed => state.trip.return_date,
        None => None,
    };
    let Some(candidate_return) = candidate_return else {
        return;
    };

    let Some(departure) = state.trip.departure_date else {
        if validate_not_past(candidate_return, today).is_ok() {
            changes.answer(Slot::ReturnDate);
            state.trip.return_date = Some(candidate_return);
        }
        return;
    };

    let correction = correct_return(departure, candidate_return);
    if correction.adjustment.is_some() {
        changes.notes.push(format!(
            "Your return date needs to be after departure, so I've set it to {}. Let me know if \
             that's not right.",
            format_display(correction.date)
        ));
    }
    if trip_days_inclusive(departure, correction.date) > MAX_TRIP_DAYS {
        changes.notes.push(format!(
            "I can only cover trips of up to {MAX_TRIP_DAYS} days, so I'll need an earlier return \
             date."
        ));
        if state.trip.return_date.is_some() {
            state.trip.return_date = None;
            mark_changed(state);
        }
        return;
    }

    changes.answer(Slot::ReturnDate);
    if state.trip.return_date != Some(correction.date) {
        state.trip.return_date = Some(correction.date);
        mark_changed(state);
    }
}

/// Extractor dates are only trusted when they parse, are not in the past and
/// keep the return after departure.
fn validated_extractor_dates(
    extracted: &ExtractedTrip,
    today: NaiveDate,
) -> Option<(Option<NaiveDate>, Option<NaiveDate>)> {
    if extracted.departure_date.is_none() && extracted.return_date.is_none() {
        return None;
    }

    let parse = |raw: &Option<String>| -> Result<Option<NaiveDate>, ()> {
        match raw.as_deref() {
            None => Ok(None),
            Some(raw) => parse_date(raw, today).map(|parsed| Some(parsed.date)).map_err(|_| ()),
        }
    };
    let departure = parse(&extracted.departure_date).ok()?;
    let return_date = parse(&extracted.return_date).ok()?;

    if let Some(date) = departure {
        validate_not_past(date, today).ok()?;
    }
    if let (Some(departure), Some(return_date)) = (departure, return_date) {
        validate_return(departure, return_date).ok()?;
    }
    Some((departure, return_date))
}

fn raw_dates(
    text: &str,
    tokens: &[String],
    today: NaiveDate,
    pending: Option<Slot>,
    state: &ConversationState,
) -> (Option<NaiveDate>, Option<NaiveDate>) {
    if let Some((start, end)) = parse_range(text, today) {
        return (Some(start.date), Some(end.date));
    }

    let found = find_dates(text, today);
    match found.as_slice() {
        [] => (None, None),
        [single] => {
            let mentions_return = tokens.iter().any(|token| RETURN_WORDS.contains(&token.as_str()));
            let as_return = match pending {
                Some(Slot::ReturnDate) => true,
                Some(Slot::DepartureDate) => false,
                _ if mentions_return => true,
                _ => state.trip.departure_date.is_some() && state.trip.return_date.is_none(),
            };
            if as_return {
                (None, Some(single.date))
            } else {
                (Some(single.date), None)
            }
        }
        [first, second, ..] => (Some(first.date), Some(second.date)),
    }
}

fn update_ages(state: &mut ConversationState, input: &SlotInput<'_>, changes: &mut SlotChanges) {
    let pending = state.dialogue.pending_slot() == Some(Slot::TravelerAges);
    let ages = input
        .extracted
        .and_then(|extracted| extracted.traveler_ages.clone())
        .filter(|ages| !ages.is_empty())
        .or_else(|| raw_ages(input.text, pending));

    let Some(ages) = ages else {
        return;
    };
    if ages.len() > MAX_TRAVELERS {
        changes.notes.push(format!(
            "One policy can cover up to {MAX_TRAVELERS} travelers, so please split larger groups."
        ));
        return;
    }
    if let Some(age) = ages.iter().copied().find(|age| !is_valid_age(*age)) {
        changes.notes.push(format!(
            "{age} isn't an age I can cover. Travelers need to be between 1 month and 110 years \
             old."
        ));
        return;
    }

    changes.answer(Slot::TravelerAges);
    if state.travelers.ages != ages {
        state.travelers.set_ages(ages);
        mark_changed(state);
    }
}

/// Reads ages from the raw utterance. While the ages question is pending
/// every number counts; otherwise only numbers next to an age word do.
/// Numbers that belong to a date ("15 dec", "dec 15 2025") never count.
fn raw_ages(text: &str, pending: bool) -> Option<Vec<f64>> {
    let lowered = text.to_ascii_lowercase();
    let words = lowered
        .split(|c: char| c == ',' || c == ';')
        .enumerate()
        .flat_map(|(clause, part)| {
            part.split(|c: char| c.is_whitespace() || c == '&')
                .map(|word| word.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '.'))
                .map(|word| word.trim_end_matches('.'))
                .filter(|word| !word.is_empty())
                .map(move |word| (clause, word))
        })
        .collect::<Vec<_>>();
    let month_beside = |index: usize, clause: usize| {
        [index.checked_sub(1), index.checked_add(1)]
            .into_iter()
            .flatten()
            .filter_map(|neighbour| words.get(neighbour))
            .any(|(other, word)| *other == clause && is_month_name(word))
    };

    let mut ages = Vec::new();
    let mut after_prefix = false;
    let mut after_date = false;
    for (index, &(clause, word)) in words.iter().enumerate() {
        if AGE_PREFIXES.contains(&word) {
            after_prefix = true;
            after_date = false;
            continue;
        }
        let Some(mut age) = parse_age_word(word) else {
            if !matches!(word, "and" | "plus") {
                after_prefix = false;
            }
            after_date = is_month_name(word);
            continue;
        };
        let is_year = after_date && word.len() == 4;
        after_date = month_beside(index, clause) || is_year;
        if after_date {
            continue;
        }

        let next = words.get(index + 1).map(|(_, next)| *next);
        if next.is_some_and(|next| MONTH_SUFFIXES.contains(&next)) {
            age /= 12.0;
        }
        let suffixed = next.is_some_and(|next| AGE_SUFFIXES.contains(&next))
            || word.ends_with("yo")
            || next.is_some_and(|next| MONTH_SUFFIXES.contains(&next));
        if pending || after_prefix || suffixed {
            ages.push(age);
        }
    }

    (!ages.is_empty()).then_some(ages)
}

fn parse_age_word(word: &str) -> Option<f64> {
    let digits = word.strip_suffix("yo").unwrap_or(word);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    digits.parse::<f64>().ok()
}

fn update_adventure(
    state: &mut ConversationState,
    input: &SlotInput<'_>,
    tokens: &[String],
    changes: &mut SlotChanges,
) {
    let pending = state.dialogue.pending_slot() == Some(Slot::AdventureSports);
    let mentioned = mentions_adventure(input.text);
    if !pending && !mentioned {
        return;
    }

    let raw = yes_no(tokens);
    let extracted = input.extracted.and_then(|extracted| extracted.adventure_sports);
    let value = match (raw, extracted) {
        (Some(raw), Some(extracted)) if raw != extracted => {
            debug!(
                event_name = "agent.slots.adventure_conflict",
                session_id = %state.session_id,
                raw,
                extracted,
                "raw yes/no overrides extractor"
            );
            Some(raw)
        }
        (Some(raw), _) => Some(raw),
        (None, Some(extracted)) => Some(extracted),
        (None, None) => mentioned.then_some(true),
    };
    let Some(mut value) = value else {
        return;
    };

    if value {
        let activities = mentioned_activities(input.text);
        state.preferences.remember_activities(activities.iter().map(|(keyword, _)| *keyword));
        if deny_remembered_activities(state) {
            value = false;
        }
    } else {
        state.preferences.activities.clear();
    }

    changes.answer(Slot::AdventureSports);
    if state.preferences.adventure_sports != Some(value) {
        state.preferences.adventure_sports = Some(value);
        if state.flags.pricing_complete || state.quote.is_some() {
            state.supersede_quote();
        }
    }
}

/// A changed slot invalidates the shown summary and any priced quote.
fn mark_changed(state: &mut ConversationState) {
    if state.flags.pricing_complete || state.quote.is_some() || state.dialogue.confirmation_received
    {
        state.supersede_quote();
    }
}

fn queue_notice(state: &mut ConversationState, notice: String) {
    state.pending_impossibility_notice = Some(match state.pending_impossibility_notice.take() {
        Some(existing) => format!("{existing} {notice}"),
        None => notice,
    });
}

fn reply(state: &mut ConversationState, notes: Vec<String>, prompt: &str) -> NodeOutcome {
    let text = if notes.is_empty() {
        prompt.to_owned()
    } else {
        format!("{}\n\n{prompt}", notes.join(" "))
    };
    state.push_assistant(text);
    NodeOutcome::Reply
}

fn canonical_destination(raw: &str) -> String {
    match geo::lookup(raw) {
        Some(profile) => profile.name.to_owned(),
        None => title_case(raw),
    }
}

fn looks_like_place(text: &str, tokens: &[String]) -> bool {
    !tokens.is_empty()
        && tokens.len() <= 4
        && !text.chars().any(|c| c.is_ascii_digit())
        && yes_no(tokens).is_none()
}

fn title_case(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_owned()
}

fn describe_slot(slot: Slot) -> &'static str {
    match slot {
        Slot::Destination => "destination",
        Slot::DepartureDate => "departure date",
        Slot::ReturnDate => "return date",
        Slot::TravelerAges => "traveler ages",
        Slot::AdventureSports => "activity plans",
    }
}

pub fn first_prompt(slot: Slot) -> &'static str {
    match slot {
        Slot::Destination => "Where are you travelling to?",
        Slot::DepartureDate => {
            "When do you leave? Any format works, like 15 Dec or 2025-12-15."
        }
        Slot::ReturnDate => "And when do you get back?",
        Slot::TravelerAges => {
            "How old is everyone travelling? Just list the ages, for example 34, 32, 6."
        }
        Slot::AdventureSports => {
            "Will you be doing any adventure sports on this trip, such as skiing or scuba \
             diving? (yes/no)"
        }
    }
}

pub fn rephrase_prompt(slot: Slot) -> &'static str {
    match slot {
        Slot::Destination => "Sorry, I didn't catch that. Which country or city are you visiting?",
        Slot::DepartureDate => "Could you give me your departure date again, e.g. 15 Dec 2025?",
        Slot::ReturnDate => "What date do you return home? For example 22 Dec 2025.",
        Slot::TravelerAges => "Please list each traveler's age as a number, separated by commas.",
        Slot::AdventureSports => "Just a yes or no: any adventure sports on this trip?",
    }
}

pub fn trip_summary(state: &ConversationState) -> String {
    let mut lines = vec!["Here's your trip so far:".to_owned()];
    if let Some(destination) = &state.trip.destination {
        lines.push(format!("- Destination: {destination}"));
    }
    if let Some(departure) = state.trip.departure_date {
        lines.push(format!("- Departure: {}", format_display(departure)));
    }
    if let Some(return_date) = state.trip.return_date {
        let days = state
            .trip
            .departure_date
            .map(|departure| format!(" ({} days)", trip_days_inclusive(departure, return_date)))
            .unwrap_or_default();
        lines.push(format!("- Return: {}{days}", format_display(return_date)));
    }
    if !state.travelers.is_empty() {
        let ages = state.travelers.ages.iter().map(|age| age.to_string()).collect::<Vec<_>>();
        lines.push(format!(
            "- Travelers: {} adult(s), {} child(ren), ages {}",
            state.travelers.adults_count,
            state.travelers.children_count,
            ages.join(", ")
        ));
    }
    if let Some(adventure) = state.preferences.adventure_sports {
        lines.push(format!("- Adventure sports: {}", if adventure { "yes" } else { "no" }));
    }
    lines.join("\n")
}

/// Reads a yes/no answer. Mixed signals count as neither.
pub(crate) fn yes_no(tokens: &[String]) -> Option<bool> {
    let yes = tokens.iter().any(|token| YES_WORDS.contains(&token.as_str()));
    let no = tokens.iter().any(|token| NO_WORDS.contains(&token.as_str()));
    match (yes, no) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        _ => None,
    }
}

pub(crate) fn normalize_text(text: &str) -> String {
    text.to_ascii_lowercase().replace(['\u{2019}', '\''], "")
}

pub(crate) fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_ascii_alphanumeric() || character == '.' {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized
        .split_whitespace()
        .map(|token| token.trim_matches('.'))
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Deterministic intent classification from keywords. Used offline and as
/// the fallback whenever the model-backed classifier fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordIntentClassifier;

const HANDOFF_PHRASES: &[&str] = &[
    "human", "real person", "live agent", "an agent", "speak to someone", "talk to someone",
    "representative", "customer service",
];
const PAYMENT_DONE_PHRASES: &[&str] = &[
    "paid", "ive paid", "i have paid", "payment done", "done paying", "payment complete",
    "payment completed", "payment went through", "finished paying", "payment status",
];
const PURCHASE_PHRASES: &[&str] = &[
    "buy", "purchase", "checkout", "pay", "proceed", "sign me up", "go with", "ill take",
    "take the", "get the", "retry payment", "try again", "new link",
];
const COVERAGE_WORDS: &[&str] = &[
    "cover", "covered", "covers", "coverage", "include", "included", "includes", "deductible",
    "excess", "limit", "limits", "benefits",
];
const QUESTION_OPENERS: &[&str] =
    &["what", "does", "do", "is", "are", "how", "which", "will", "whats"];
const MODIFY_WORDS: &[&str] =
    &["change", "modify", "update", "actually", "instead", "correction", "amend"];
const GREETING_WORDS: &[&str] =
    &["hi", "hello", "hey", "hiya", "morning", "afternoon", "evening", "greetings", "yo"];
const TRIP_WORDS: &[&str] = &[
    "trip", "travel", "travelling", "traveling", "going", "visit", "visiting", "holiday",
    "vacation", "insurance", "quote", "flying", "fly", "heading",
];

impl KeywordIntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify_text(&self, text: &str) -> ClassifiedIntent {
        let normalized = normalize_text(text);
        let tokens = tokenize(&normalized);
        let padded = format!(" {} ", tokens.join(" "));
        let has = |words: &[&str]| tokens.iter().any(|token| words.contains(&token.as_str()));
        let phrase = |phrases: &[&str]| {
            phrases.iter().any(|candidate| padded.contains(&format!(" {candidate} ")))
        };

        let is_question = text.contains('?')
            || tokens.first().is_some_and(|first| QUESTION_OPENERS.contains(&first.as_str()));
        let names_tier = has(&["standard", "elite", "premier"]);

        let (intent, confidence) = if phrase(HANDOFF_PHRASES) {
            (Intent::Handoff, 0.9)
        } else if has(&["claim", "claims"]) {
            (Intent::Claims, 0.85)
        } else if has(&["upload", "uploaded", "attach", "attached", "attachment", "attaching"]) {
            (Intent::DocumentUpload, 0.85)
        } else if has(&["cancel"]) {
            (Intent::Cancel, 0.8)
        } else if phrase(PAYMENT_DONE_PHRASES) {
            (Intent::PaymentStatus, 0.85)
        } else if is_question && has(COVERAGE_WORDS) && geo::scan_utterance(text).is_none() {
            (Intent::PolicyQuestion, 0.75)
        } else if phrase(PURCHASE_PHRASES) {
            (Intent::Purchase, 0.85)
        } else if has(MODIFY_WORDS) {
            (Intent::ModifyTrip, 0.8)
        } else if names_tier && !is_question {
            (Intent::Purchase, 0.6)
        } else if tokens.len() <= 4 && has(GREETING_WORDS) {
            (Intent::Greeting, 0.8)
        } else if let Some(answer) = yes_no(&tokens) {
            (if answer { Intent::Confirm } else { Intent::Deny }, 0.8)
        } else if geo::scan_utterance(text).is_some()
            || has(TRIP_WORDS)
            || mentions_adventure(text)
            || text.chars().any(|c| c.is_ascii_digit())
        {
            (Intent::ProvideTripInfo, 0.7)
        } else {
            return ClassifiedIntent::unknown();
        };

        ClassifiedIntent::new(intent, confidence)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use tripcover_core::domain::document::{DocumentExtraction, DocumentType};
    use tripcover_core::domain::trip::{Question, Slot};
    use tripcover_core::flows::Intent;
    use tripcover_core::ConversationState;

    use super::{
        raw_ages, tokenize, yes_no, KeywordIntentClassifier, SlotCollector, SlotInput,
        CONFIRMATION_QUESTION,
    };
    use crate::llm::ExtractedTrip;
    use crate::runtime::NodeOutcome;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 1).expect("date")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    fn say(
        collector: &SlotCollector,
        state: &mut ConversationState,
        text: &str,
        intent: Intent,
    ) -> NodeOutcome {
        state.push_user(text);
        collector
            .collect(state, &SlotInput { text, intent, extracted: None, today: today() })
            .expect("collect")
    }

    fn last_reply(state: &ConversationState) -> &str {
        state.last_assistant_text().expect("assistant reply")
    }

    #[test]
    fn greeting_on_fresh_session_is_not_a_question() {
        let collector = SlotCollector::default();
        let mut state = ConversationState::new("s-1");

        assert_eq!(say(&collector, &mut state, "hello", Intent::Greeting), NodeOutcome::Reply);
        assert!(state.dialogue.current_question.is_none());
        assert!(!last_reply(&state).ends_with('?'));
    }

    #[test]
    fn collects_slots_then_shows_summary() {
        let collector = SlotCollector::default();
        let mut state = ConversationState::new("s-1");

        say(&collector, &mut state, "Going to Phuket 15 dec to 22 dec", Intent::ProvideTripInfo);
        assert_eq!(state.trip.destination.as_deref(), Some("Thailand"));
        assert_eq!(state.trip.departure_date, Some(date(2025, 12, 15)));
        assert_eq!(state.trip.return_date, Some(date(2025, 12, 22)));
        assert_eq!(state.dialogue.pending_slot(), Some(Slot::TravelerAges));

        say(&collector, &mut state, "35, 33 and 4", Intent::ProvideTripInfo);
        assert_eq!(state.travelers.ages, vec![35.0, 33.0, 4.0]);
        assert_eq!((state.travelers.adults_count, state.travelers.children_count), (2, 1));
        assert!(state.dialogue.awaiting_confirmation);
        assert_eq!(state.dialogue.current_question, Some(Question::Confirmation));
        assert!(last_reply(&state).ends_with(CONFIRMATION_QUESTION));
        assert!(state.preferences.adventure_sports.is_none());
    }

    #[test]
    fn return_before_departure_is_corrected_not_accepted() {
        let collector = SlotCollector::default();
        let mut state = ConversationState::new("s-1");

        say(&collector, &mut state, "Thailand from 2025-12-15 to 2025-12-10", Intent::ProvideTripInfo);

        let departure = state.trip.departure_date.expect("departure");
        let return_date = state.trip.return_date.expect("return");
        assert_eq!(departure, date(2025, 12, 15));
        assert!(return_date > departure);
        assert_ne!(return_date, date(2025, 12, 10));
        assert!(last_reply(&state).contains("after departure"));
    }

    #[test]
    fn children_only_party_has_one_adult() {
        let collector = SlotCollector::default();
        let mut state = ConversationState::new("s-1");
        state.dialogue.ask(Slot::TravelerAges);

        say(&collector, &mut state, "8 and 5", Intent::ProvideTripInfo);
        assert_eq!(state.travelers.adults_count, 1);
        assert_eq!(state.travelers.children_count, 1);
    }

    #[test]
    fn age_bounds_are_enforced() {
        let collector = SlotCollector::default();
        let mut state = ConversationState::new("s-1");
        state.dialogue.ask(Slot::TravelerAges);

        say(&collector, &mut state, "0.07", Intent::ProvideTripInfo);
        assert!(state.travelers.is_empty());
        say(&collector, &mut state, "0.08", Intent::ProvideTripInfo);
        assert_eq!(state.travelers.ages, vec![0.08]);
    }

    #[test]
    fn unanswered_question_switches_to_rephrase() {
        let collector = SlotCollector::default();
        let mut state = ConversationState::new("s-1");
        state.trip.destination = Some("Japan".to_owned());
        state.dialogue.ask(Slot::DepartureDate);
        state.push_assistant("When do you leave?");

        say(&collector, &mut state, "soonish", Intent::Unknown);
        assert_eq!(state.dialogue.failures(Slot::DepartureDate), 1);
        assert!(last_reply(&state).starts_with("Could you give me your departure date again"));

        say(&collector, &mut state, "15 dec", Intent::ProvideTripInfo);
        assert_eq!(state.dialogue.failures(Slot::DepartureDate), 0);
    }

    #[test]
    fn day_and_year_numbers_are_not_read_as_ages() {
        assert_eq!(raw_ages("35, 33 - leaving 15 dec", true), Some(vec![35.0, 33.0]));
        assert_eq!(raw_ages("we fly dec 15 2025, ages 40 and 38", false), Some(vec![40.0, 38.0]));
        assert_eq!(raw_ages("15 dec, 8 and 5", true), Some(vec![8.0, 5.0]));
        assert_eq!(raw_ages("back on 22 december", true), None);
        assert_eq!(raw_ages("6 months and 30", true), Some(vec![0.5, 30.0]));
    }

    #[test]
    fn ages_answer_with_departure_date_keeps_only_ages() {
        let collector = SlotCollector::default();
        let mut state = ConversationState::new("s-ages");
        state.trip.destination = Some("Thailand".to_owned());
        state.trip.departure_date = Some(date(2025, 12, 15));
        state.trip.return_date = Some(date(2025, 12, 22));
        state.dialogue.ask(Slot::TravelerAges);

        say(&collector, &mut state, "35, 33 - leaving 15 dec", Intent::ProvideTripInfo);

        assert_eq!(state.travelers.ages, vec![35.0, 33.0]);
    }

    #[test]
    fn ambiguous_confirmation_re_asks_verbatim() {
        let collector = SlotCollector::default();
        let mut state = confirmed_ready_state();
        state.dialogue.confirmation_received = false;
        state.dialogue.ask_confirmation();

        say(&collector, &mut state, "hmm let me think", Intent::Unknown);
        assert_eq!(last_reply(&state), CONFIRMATION_QUESTION);
        assert!(state.dialogue.awaiting_confirmation);
    }

    #[test]
    fn confirmation_yes_asks_adventure_then_no_invites_corrections() {
        let collector = SlotCollector::default();
        let mut state = confirmed_ready_state();
        state.preferences.adventure_sports = None;
        state.dialogue.confirmation_received = false;
        state.dialogue.ask_confirmation();

        say(&collector, &mut state, "yes", Intent::Confirm);
        assert!(state.dialogue.confirmation_received);
        assert_eq!(state.dialogue.pending_slot(), Some(Slot::AdventureSports));
        assert_eq!(state.trip.departure_country_code.as_deref(), Some("SG"));

        let mut denied = confirmed_ready_state();
        denied.dialogue.confirmation_received = false;
        denied.dialogue.ask_confirmation();
        say(&collector, &mut denied, "no", Intent::Deny);
        assert!(denied.dialogue.current_question.is_none());
        assert!(!denied.dialogue.awaiting_confirmation);
        assert!(last_reply(&denied).starts_with("No problem"));
    }

    #[test]
    fn scuba_in_nepal_is_forced_off_with_notice() {
        let collector = SlotCollector::default();
        let mut state = confirmed_ready_state();
        state.trip.destination = Some("Nepal".to_owned());
        state.preferences.adventure_sports = None;
        state.dialogue.ask(Slot::AdventureSports);

        let outcome = say(&collector, &mut state, "scuba diving", Intent::Unknown);

        assert_eq!(outcome, NodeOutcome::Continue);
        assert_eq!(state.preferences.adventure_sports, Some(false));
        assert!(state
            .pending_impossibility_notice
            .as_deref()
            .is_some_and(|notice| notice.contains("Nepal")));
        assert!(state.flags.ready_for_pricing);
    }

    #[test]
    fn moving_a_diving_trip_to_nepal_turns_adventure_off() {
        let collector = SlotCollector::default();
        let mut state = confirmed_ready_state();
        state.preferences.adventure_sports = None;
        state.dialogue.ask(Slot::AdventureSports);
        say(&collector, &mut state, "yes, scuba diving", Intent::Unknown);
        assert_eq!(state.preferences.adventure_sports, Some(true));
        assert!(state.preferences.activities.iter().any(|activity| activity == "scuba"));
        assert!(state.pending_impossibility_notice.is_none());

        say(&collector, &mut state, "actually make it Nepal", Intent::Unknown);

        assert_eq!(state.trip.destination.as_deref(), Some("Nepal"));
        assert_eq!(state.preferences.adventure_sports, Some(false));
        assert!(state
            .pending_impossibility_notice
            .as_deref()
            .is_some_and(|notice| notice.contains("Nepal")));
    }

    #[test]
    fn declining_adventure_forgets_earlier_activities() {
        let collector = SlotCollector::default();
        let mut state = confirmed_ready_state();
        state.preferences.adventure_sports = None;
        state.dialogue.ask(Slot::AdventureSports);
        say(&collector, &mut state, "yes, scuba diving", Intent::Unknown);
        state.dialogue.ask(Slot::AdventureSports);

        say(&collector, &mut state, "no", Intent::Unknown);

        assert_eq!(state.preferences.adventure_sports, Some(false));
        assert!(state.preferences.activities.is_empty());
    }

    #[test]
    fn raw_yes_no_wins_over_extractor() {
        let collector = SlotCollector::default();
        let mut state = confirmed_ready_state();
        state.preferences.adventure_sports = None;
        state.dialogue.ask(Slot::AdventureSports);
        let extracted = ExtractedTrip { adventure_sports: Some(true), ..ExtractedTrip::default() };

        state.push_user("no, nothing like that");
        collector
            .collect(
                &mut state,
                &SlotInput {
                    text: "no, nothing like that",
                    intent: Intent::Deny,
                    extracted: Some(&extracted),
                    today: today(),
                },
            )
            .expect("collect");
        assert_eq!(state.preferences.adventure_sports, Some(false));
    }

    #[test]
    fn invalid_extractor_dates_fall_back_to_raw_text() {
        let collector = SlotCollector::default();
        let mut state = ConversationState::new("s-1");
        let extracted = ExtractedTrip {
            departure_date: Some("2024-01-10".to_owned()),
            ..ExtractedTrip::default()
        };

        state.push_user("Japan on 10 jan");
        collector
            .collect(
                &mut state,
                &SlotInput {
                    text: "Japan on 10 jan",
                    intent: Intent::ProvideTripInfo,
                    extracted: Some(&extracted),
                    today: today(),
                },
            )
            .expect("collect");
        assert_eq!(state.trip.departure_date, Some(date(2026, 1, 10)));
    }

    #[test]
    fn change_after_pricing_supersedes_quote() {
        let collector = SlotCollector::default();
        let mut state = priced_state();

        say(&collector, &mut state, "actually make it Japan", Intent::ModifyTrip);
        assert!(state.quote.is_none());
        assert!(!state.flags.pricing_complete);
        assert_eq!(state.trip.destination.as_deref(), Some("Japan"));
        assert!(state.dialogue.awaiting_confirmation);

        let mut unchanged = priced_state();
        say(&collector, &mut unchanged, "thailand", Intent::ProvideTripInfo);
        assert!(unchanged.quote.is_some());
        assert!(last_reply(&unchanged).starts_with("Your quote is unchanged"));
    }

    #[test]
    fn document_merge_keeps_confirmed_values() {
        let collector = SlotCollector::default();
        let mut state = ConversationState::new("s-1");
        state.trip.destination = Some("Japan".to_owned());
        state.pending_document = Some(
            DocumentExtraction::new(DocumentType::Flight)
                .with_field("destination", "France", 0.9)
                .with_field("departure_date", "2025-12-20", 0.9),
        );
        state.flags.document_merged = true;

        say(&collector, &mut state, "here's my ticket", Intent::DocumentUpload);
        assert_eq!(state.trip.destination.as_deref(), Some("Japan"));
        assert_eq!(state.trip.departure_date, Some(date(2025, 12, 20)));
        assert!(!state.flags.document_merged);
        assert_eq!(state.documents.len(), 1);
        assert_eq!(state.dialogue.pending_slot(), Some(Slot::ReturnDate));
    }

    #[test]
    fn keyword_classifier_covers_common_phrasings() {
        let classifier = KeywordIntentClassifier::new();
        let cases = [
            ("hi", Intent::Greeting),
            ("I'd like to speak to someone", Intent::Handoff),
            ("how do I make a claim", Intent::Claims),
            ("I've attached my booking", Intent::DocumentUpload),
            ("cancel that", Intent::Cancel),
            ("I've paid", Intent::PaymentStatus),
            ("does elite cover scuba?", Intent::PolicyQuestion),
            ("I'll take the elite plan", Intent::Purchase),
            ("buy", Intent::Purchase),
            ("actually change the return date", Intent::ModifyTrip),
            ("yes", Intent::Confirm),
            ("nope", Intent::Deny),
            ("two weeks in Bali", Intent::ProvideTripInfo),
            ("hmm", Intent::Unknown),
        ];

        for (text, expected) in cases {
            assert_eq!(classifier.classify_text(text).intent, expected, "text: {text}");
        }
        assert_eq!(classifier.classify_text("hmm").confidence, 0.0);
    }

    #[test]
    fn yes_no_reads_mixed_signals_as_ambiguous() {
        assert_eq!(yes_no(&tokenize("yes please")), Some(true));
        assert_eq!(yes_no(&tokenize("no.")), Some(false));
        assert_eq!(yes_no(&tokenize("yes and no")), None);
    }

    fn confirmed_ready_state() -> ConversationState {
        let mut state = ConversationState::new("s-1");
        state.trip.destination = Some("Thailand".to_owned());
        state.trip.departure_date = Some(date(2025, 12, 15));
        state.trip.return_date = Some(date(2025, 12, 22));
        state.travelers.set_ages(vec![35.0]);
        state.preferences.adventure_sports = Some(false);
        state.dialogue.confirmation_received = true;
        state
    }

    fn priced_state() -> ConversationState {
        let mut state = confirmed_ready_state();
        let request = tripcover_core::pricing::PricingRequest {
            destination: "Thailand".to_owned(),
            departure_date: date(2025, 12, 15),
            return_date: date(2025, 12, 22),
            ages: vec![35.0],
            adventure_sports: false,
            currency: "USD".to_owned(),
        };
        state.quote = Some(tripcover_core::pricing::price(&request).expect("priced"));
        state.area = Some(tripcover_core::geo::assign_area("Thailand"));
        state.flags.ready_for_pricing = true;
        state.flags.pricing_complete = true;
        state
    }
}
