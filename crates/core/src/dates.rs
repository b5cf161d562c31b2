//! Flexible trip-date parsing.
//!
//! Accepts ISO dates, day-first numeric dates and month-name dates with or
//! without a year. Missing years are inferred against `today`: the current
//! year is used unless that lands in the past, in which case the next year is.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest insurable trip, counted inclusively.
pub const MAX_TRIP_DAYS: i64 = 182;

const RANGE_SEPARATORS: &[&str] = &["to", "-", "–", "until", "till", "through", "thru"];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DateError {
    #[error("could not recognise a date in `{0}`")]
    Unrecognized(String),
    #[error("{date} is before {today}")]
    InPast { date: NaiveDate, today: NaiveDate },
    #[error("return {return_date} is not after departure {departure}")]
    ReturnNotAfterDeparture { departure: NaiveDate, return_date: NaiveDate },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParsedDate {
    pub date: NaiveDate,
    pub year_inferred: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnAdjustment {
    YearRolled,
    MinimalOffset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReturnCorrection {
    pub date: NaiveDate,
    pub adjustment: Option<ReturnAdjustment>,
}

pub fn parse_date(input: &str, today: NaiveDate) -> Result<ParsedDate, DateError> {
    let tokens = tokenize(input);
    match scan_date_at(&tokens, 0, today) {
        Some((parsed, consumed)) if consumed == tokens.len() => Ok(parsed),
        _ => Err(DateError::Unrecognized(input.trim().to_string())),
    }
}

/// Every date expression found in free text, in order of appearance.
pub fn find_dates(text: &str, today: NaiveDate) -> Vec<ParsedDate> {
    let tokens = tokenize(text);
    scan_all(&tokens, today)
}

/// Parses "<date> to <date>" style ranges. A bare day on the left borrows the
/// month and year of the right-hand date ("15 to 20 december").
pub fn parse_range(text: &str, today: NaiveDate) -> Option<(ParsedDate, ParsedDate)> {
    let tokens = tokenize(text);
    tokens
        .iter()
        .enumerate()
        .filter(|(_, token)| RANGE_SEPARATORS.contains(&token.as_str()))
        .find_map(|(separator, _)| {
            range_around(&tokens[..separator], &tokens[separator + 1..], today)
        })
}

fn range_around(
    left: &[String],
    right: &[String],
    today: NaiveDate,
) -> Option<(ParsedDate, ParsedDate)> {
    let end = scan_all(right, today).into_iter().next()?;
    let start = match scan_all(left, today).into_iter().last() {
        Some(start) => start,
        None => {
            let day = left.last()?.parse::<u32>().ok()?;
            let date = NaiveDate::from_ymd_opt(end.date.year(), end.date.month(), day)?;
            ParsedDate { date, year_inferred: end.year_inferred }
        }
    };

    Some((start, roll_inferred_end(start, end)))
}

pub fn validate_not_past(date: NaiveDate, today: NaiveDate) -> Result<(), DateError> {
    if date < today {
        return Err(DateError::InPast { date, today });
    }
    Ok(())
}

pub fn validate_return(departure: NaiveDate, return_date: NaiveDate) -> Result<(), DateError> {
    if return_date <= departure {
        return Err(DateError::ReturnNotAfterDeparture { departure, return_date });
    }
    Ok(())
}

/// Forces `return_date` strictly after `departure`. A one-year roll is used
/// when it keeps the trip insurable, otherwise the return moves to the day
/// after departure.
pub fn correct_return(departure: NaiveDate, return_date: NaiveDate) -> ReturnCorrection {
    if return_date > departure {
        return ReturnCorrection { date: return_date, adjustment: None };
    }

    let rolled = return_date.with_year(return_date.year() + 1);
    if let Some(rolled) = rolled {
        if rolled > departure && trip_days_inclusive(departure, rolled) <= MAX_TRIP_DAYS {
            return ReturnCorrection { date: rolled, adjustment: Some(ReturnAdjustment::YearRolled) };
        }
    }

    ReturnCorrection {
        date: departure + Duration::days(1),
        adjustment: Some(ReturnAdjustment::MinimalOffset),
    }
}

pub fn trip_days_inclusive(departure: NaiveDate, return_date: NaiveDate) -> i64 {
    (return_date - departure).num_days() + 1
}

pub fn format_display(date: NaiveDate) -> String {
    date.format("%d %b %Y").to_string()
}

fn roll_inferred_end(start: ParsedDate, end: ParsedDate) -> ParsedDate {
    if end.year_inferred && end.date <= start.date {
        if let Some(rolled) = end.date.with_year(end.date.year() + 1) {
            return ParsedDate { date: rolled, year_inferred: true };
        }
    }
    end
}

fn scan_all(tokens: &[String], today: NaiveDate) -> Vec<ParsedDate> {
    let mut found = Vec::new();
    let mut index = 0;
    while index < tokens.len() {
        match scan_date_at(tokens, index, today) {
            Some((parsed, consumed)) => {
                found.push(parsed);
                index += consumed;
            }
            None => index += 1,
        }
    }
    found
}

fn scan_date_at(tokens: &[String], index: usize, today: NaiveDate) -> Option<(ParsedDate, usize)> {
    let first = tokens.get(index)?;

    if let Some(parsed) = parse_numeric(first, today) {
        return Some((parsed, 1));
    }

    let second = tokens.get(index + 1);
    let third = tokens.get(index + 2);

    // "15 dec [2025]"
    if let (Ok(day), Some(month)) = (first.parse::<u32>(), second.and_then(|t| month_number(t))) {
        let year = third.and_then(|t| parse_year(t));
        let consumed = if year.is_some() { 3 } else { 2 };
        return build(year, month, day, today).map(|parsed| (parsed, consumed));
    }

    // "dec 15 [2025]"
    if let (Some(month), Some(Ok(day))) = (month_number(first), second.map(|t| t.parse::<u32>())) {
        let year = third.and_then(|t| parse_year(t));
        let consumed = if year.is_some() { 3 } else { 2 };
        return build(year, month, day, today).map(|parsed| (parsed, consumed));
    }

    None
}

fn parse_numeric(token: &str, today: NaiveDate) -> Option<ParsedDate> {
    let separator = ['-', '/', '.'].into_iter().find(|sep| token.contains(*sep))?;
    let parts = token.split(separator).collect::<Vec<_>>();
    if parts.iter().any(|part| part.is_empty() || !part.chars().all(|c| c.is_ascii_digit())) {
        return None;
    }

    let numbers = parts.iter().filter_map(|part| part.parse::<u32>().ok()).collect::<Vec<_>>();
    match (parts.as_slice(), numbers.as_slice()) {
        ([y, _, _], [year, month, day]) if y.len() == 4 => {
            build(Some(*year as i32), *month, *day, today)
        }
        ([_, _, y], [a, b, year]) if y.len() == 4 => {
            let (day, month) = day_month_order(*a, *b);
            build(Some(*year as i32), month, day, today)
        }
        ([_, _], [a, b]) if separator == '/' => {
            let (day, month) = day_month_order(*a, *b);
            build(None, month, day, today)
        }
        _ => None,
    }
}

fn day_month_order(first: u32, second: u32) -> (u32, u32) {
    if second > 12 && first <= 12 {
        (second, first)
    } else {
        (first, second)
    }
}

fn build(year: Option<i32>, month: u32, day: u32, today: NaiveDate) -> Option<ParsedDate> {
    match year {
        Some(year) => {
            NaiveDate::from_ymd_opt(year, month, day).map(|date| ParsedDate { date, year_inferred: false })
        }
        None => {
            let this_year = NaiveDate::from_ymd_opt(today.year(), month, day);
            match this_year {
                Some(date) if date >= today => Some(ParsedDate { date, year_inferred: true }),
                _ => NaiveDate::from_ymd_opt(today.year() + 1, month, day)
                    .map(|date| ParsedDate { date, year_inferred: true }),
            }
        }
    }
}

fn parse_year(token: &str) -> Option<i32> {
    if token.len() == 4 && token.chars().all(|c| c.is_ascii_digit()) {
        token.parse().ok()
    } else {
        None
    }
}

/// True for month names and their short forms, lowercase only.
pub fn is_month_name(token: &str) -> bool {
    month_number(token).is_some()
}

fn month_number(token: &str) -> Option<u32> {
    let month = match token {
        "jan" | "january" => 1,
        "feb" | "february" => 2,
        "mar" | "march" => 3,
        "apr" | "april" => 4,
        "may" => 5,
        "jun" | "june" => 6,
        "jul" | "july" => 7,
        "aug" | "august" => 8,
        "sep" | "sept" | "september" => 9,
        "oct" | "october" => 10,
        "nov" | "november" => 11,
        "dec" | "december" => 12,
        _ => return None,
    };
    Some(month)
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_ascii_lowercase()
        .replace(',', " ")
        .split_whitespace()
        .map(|raw| raw.trim_matches(|c: char| matches!(c, '.' | '!' | '?' | ';' | ':' | '(' | ')')))
        .filter(|token| !token.is_empty())
        .map(strip_ordinal)
        .collect()
}

fn strip_ordinal(token: &str) -> String {
    for suffix in ["st", "nd", "rd", "th"] {
        if let Some(prefix) = token.strip_suffix(suffix) {
            if !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_digit()) {
                return prefix.to_string();
            }
        }
    }
    token.to_string()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{
        correct_return, find_dates, is_month_name, parse_date, parse_range, trip_days_inclusive,
        validate_not_past, DateError, ReturnAdjustment, MAX_TRIP_DAYS,
    };

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn today() -> NaiveDate {
        ymd(2025, 10, 1)
    }

    #[test]
    fn parses_supported_formats() {
        let cases = [
            ("2025-12-15", ymd(2025, 12, 15)),
            ("2025/12/15", ymd(2025, 12, 15)),
            ("15/12/2025", ymd(2025, 12, 15)),
            ("12/15/2025", ymd(2025, 12, 15)),
            ("15 Dec 2025", ymd(2025, 12, 15)),
            ("15th December", ymd(2025, 12, 15)),
            ("December 15, 2025", ymd(2025, 12, 15)),
            ("dec 15", ymd(2025, 12, 15)),
        ];

        for (input, expected) in cases {
            let parsed = parse_date(input, today()).expect(input);
            assert_eq!(parsed.date, expected, "input: {input}");
        }
    }

    #[test]
    fn missing_year_rolls_forward_when_already_past() {
        let parsed = parse_date("3 March", today()).expect("parse");
        assert_eq!(parsed.date, ymd(2026, 3, 3));
        assert!(parsed.year_inferred);
    }

    #[test]
    fn rejects_noise() {
        assert!(matches!(parse_date("next week sometime", today()), Err(DateError::Unrecognized(_))));
        assert!(parse_date("31/02/2025", today()).is_err());
    }

    #[test]
    fn finds_dates_inside_sentences() {
        let dates = find_dates("We fly out on Dec 20th and come back 2026-01-04.", today());
        let dates = dates.into_iter().map(|parsed| parsed.date).collect::<Vec<_>>();
        assert_eq!(dates, vec![ymd(2025, 12, 20), ymd(2026, 1, 4)]);
    }

    #[test]
    fn range_with_separator_tokens() {
        for text in ["15 dec 2025 to 22 dec 2025", "2025-12-15 - 2025-12-22", "dec 15 until dec 22"] {
            let (start, end) = parse_range(text, today()).expect(text);
            assert_eq!(start.date, ymd(2025, 12, 15), "input: {text}");
            assert_eq!(end.date, ymd(2025, 12, 22), "input: {text}");
        }
    }

    #[test]
    fn range_borrows_month_and_rolls_year_end() {
        let (start, end) = parse_range("15 to 20 december", today()).expect("range");
        assert_eq!(start.date, ymd(2025, 12, 15));
        assert_eq!(end.date, ymd(2025, 12, 20));

        let (start, end) = parse_range("dec 28 to jan 5", today()).expect("range");
        assert_eq!(start.date, ymd(2025, 12, 28));
        assert_eq!(end.date, ymd(2026, 1, 5));
    }

    #[test]
    fn range_skips_separator_words_without_dates() {
        let (start, end) =
            parse_range("flying to tokyo from dec 1 to dec 9", today()).expect("range");
        assert_eq!(start.date, ymd(2025, 12, 1));
        assert_eq!(end.date, ymd(2025, 12, 9));
    }

    #[test]
    fn decimal_numbers_are_not_dates() {
        assert!(find_dates("ages 1.5 and 30", today()).is_empty());
    }

    #[test]
    fn past_dates_are_flagged() {
        assert!(validate_not_past(ymd(2025, 9, 30), today()).is_err());
        assert!(validate_not_past(today(), today()).is_ok());
    }

    #[test]
    fn return_before_departure_gets_minimal_offset_when_roll_too_long() {
        let correction = correct_return(ymd(2025, 12, 15), ymd(2025, 12, 10));
        assert_eq!(correction.date, ymd(2025, 12, 16));
        assert_eq!(correction.adjustment, Some(ReturnAdjustment::MinimalOffset));
    }

    #[test]
    fn same_day_return_moves_forward() {
        let correction = correct_return(ymd(2025, 12, 15), ymd(2025, 12, 15));
        assert!(correction.date > ymd(2025, 12, 15));
    }

    #[test]
    fn year_roll_used_when_trip_stays_insurable() {
        let correction = correct_return(ymd(2025, 12, 28), ymd(2025, 1, 5));
        assert_eq!(correction.date, ymd(2026, 1, 5));
        assert_eq!(correction.adjustment, Some(ReturnAdjustment::YearRolled));
    }

    #[test]
    fn inclusive_duration_counts_both_ends() {
        let departure = ymd(2026, 1, 1);
        assert_eq!(trip_days_inclusive(departure, departure), 1);
        assert_eq!(trip_days_inclusive(departure, ymd(2026, 7, 1)), MAX_TRIP_DAYS);
    }

    #[test]
    fn month_names_include_short_forms() {
        assert!(is_month_name("dec"));
        assert!(is_month_name("sept"));
        assert!(is_month_name("january"));
        assert!(!is_month_name("decade"));
        assert!(!is_month_name("Dec"));
    }
}
