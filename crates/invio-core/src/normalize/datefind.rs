//! Fuzzy date-phrase detection.
//!
//! Scans free text for date-like substrings and resolves them to calendar
//! dates. Ambiguous numeric day/month pairs are resolved month-first, falling
//! back to day-first only when month-first is not a valid calendar date.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

const MONTHS: &str = "January|Jan|February|Feb|March|Mar|April|Apr|May|June|Jun|July|Jul|August|Aug|September|Sept|Sep|October|Oct|November|Nov|December|Dec";

lazy_static! {
    static ref NUMERIC_TRIPLE: Regex =
        Regex::new(r"\b(\d{1,2})[./\-](\d{1,2})[./\-](\d{2,4})\b").unwrap();

    static ref YEAR_FIRST: Regex =
        Regex::new(r"\b(\d{4})[./\-](\d{1,2})[./\-](\d{1,2})\b").unwrap();

    static ref DAY_MONTH_YEAR: Regex = Regex::new(&format!(
        r"(?i)\b(\d{{1,2}})[\s\-]+({MONTHS})\.?[\s\-,]+(\d{{4}})\b"
    ))
    .unwrap();

    static ref MONTH_DAY_YEAR: Regex = Regex::new(&format!(
        r"(?i)\b({MONTHS})\.?\s+(\d{{1,2}}),?\s+(\d{{4}})\b"
    ))
    .unwrap();
}

/// Find all date candidates in the text, in order of appearance.
pub fn find_dates(text: &str) -> Vec<NaiveDate> {
    let mut candidates: Vec<(usize, NaiveDate)> = Vec::new();

    for caps in NUMERIC_TRIPLE.captures_iter(text) {
        let a: u32 = caps[1].parse().unwrap_or(0);
        let b: u32 = caps[2].parse().unwrap_or(0);
        let year = parse_year(&caps[3]);

        // Month-first, then day-first.
        let date = NaiveDate::from_ymd_opt(year, a, b)
            .or_else(|| NaiveDate::from_ymd_opt(year, b, a));
        if let Some(date) = date {
            candidates.push((caps.get(0).unwrap().start(), date));
        }
    }

    for caps in YEAR_FIRST.captures_iter(text) {
        let year: i32 = caps[1].parse().unwrap_or(0);
        let month: u32 = caps[2].parse().unwrap_or(0);
        let day: u32 = caps[3].parse().unwrap_or(0);

        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            candidates.push((caps.get(0).unwrap().start(), date));
        }
    }

    for caps in DAY_MONTH_YEAR.captures_iter(text) {
        let day: u32 = caps[1].parse().unwrap_or(0);
        let month = month_to_number(&caps[2]);
        let year: i32 = caps[3].parse().unwrap_or(0);

        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            candidates.push((caps.get(0).unwrap().start(), date));
        }
    }

    for caps in MONTH_DAY_YEAR.captures_iter(text) {
        let month = month_to_number(&caps[1]);
        let day: u32 = caps[2].parse().unwrap_or(0);
        let year: i32 = caps[3].parse().unwrap_or(0);

        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            candidates.push((caps.get(0).unwrap().start(), date));
        }
    }

    candidates.sort_by_key(|(start, _)| *start);
    candidates.dedup();
    candidates.into_iter().map(|(_, date)| date).collect()
}

/// First date candidate in the text, if any.
pub fn first_date(text: &str) -> Option<NaiveDate> {
    find_dates(text).into_iter().next()
}

fn parse_year(s: &str) -> i32 {
    let year: i32 = s.parse().unwrap_or(0);
    if year < 100 {
        // Two-digit year: 00-50 are 2000s, 51-99 are 1900s.
        if year <= 50 { 2000 + year } else { 1900 + year }
    } else {
        year
    }
}

fn month_to_number(month: &str) -> u32 {
    match month.to_lowercase().as_str() {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sept" | "sep" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_numeric_month_first() {
        assert_eq!(first_date("03/12/2024"), Some(date(2024, 3, 12)));
    }

    #[test]
    fn test_numeric_day_first_fallback() {
        // 15 cannot be a month, so the day-first reading wins.
        assert_eq!(first_date("15-03-2024"), Some(date(2024, 3, 15)));
    }

    #[test]
    fn test_year_first() {
        assert_eq!(first_date("2024-03-15"), Some(date(2024, 3, 15)));
    }

    #[test]
    fn test_textual_day_month_year() {
        assert_eq!(first_date("15 March 2024"), Some(date(2024, 3, 15)));
        assert_eq!(first_date("3-Jan-2023"), Some(date(2023, 1, 3)));
    }

    #[test]
    fn test_textual_month_day_year() {
        assert_eq!(first_date("March 15, 2024"), Some(date(2024, 3, 15)));
    }

    #[test]
    fn test_two_digit_year() {
        assert_eq!(first_date("15.01.24"), Some(date(2024, 1, 15)));
        assert_eq!(first_date("15.01.99"), Some(date(1999, 1, 15)));
    }

    #[test]
    fn test_first_candidate_by_position() {
        let dates = find_dates("issued 01/02/2024, due 15 March 2024");
        assert_eq!(dates[0], date(2024, 1, 2));
        assert_eq!(dates[1], date(2024, 3, 15));
    }

    #[test]
    fn test_no_date() {
        assert_eq!(first_date("no dates in here"), None);
    }
}
