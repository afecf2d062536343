//! Rule-based entity tagging over recognized region text.
//!
//! A lightweight stand-in for a full NER model: date, monetary-amount and
//! bare-cardinal spans are found with pattern tables. Overlapping spans are
//! resolved first-match-wins, with the more specific kind preferred at equal
//! positions (date over money over cardinal).

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

const MONTHS: &str = "January|Jan|February|Feb|March|Mar|April|Apr|May|June|Jun|July|Jul|August|Aug|September|Sept|Sep|October|Oct|November|Nov|December|Dec";

lazy_static! {
    static ref DATE_SPAN: Regex = Regex::new(&format!(
        r"(?ix)
        \b\d{{1,2}}[./\-]\d{{1,2}}[./\-]\d{{2,4}}\b        # 15/03/2024, 3-1-24
        | \b\d{{4}}[./\-]\d{{1,2}}[./\-]\d{{1,2}}\b        # 2024-03-15
        | \b\d{{1,2}}[\s\-]+(?:{MONTHS})\.?[\s\-,]+\d{{4}}\b  # 15 March 2024
        | \b(?:{MONTHS})\.?\s+\d{{1,2}},?\s+\d{{4}}\b      # March 15, 2024
        | \b(?:{MONTHS})\.?\s+\d{{4}}\b                    # March 2024
        "
    ))
    .unwrap();

    static ref MONEY_SPAN: Regex = Regex::new(
        r"(?ix)
        (?:[$€£¥]|USD|EUR|GBP|PLN)\s?\d[\d,]*(?:\.\d+)?
        | \d[\d,]*(?:\.\d+)?\s?(?:[$€£¥]|USD|EUR|GBP|PLN|dollars?|euros?)
        "
    )
    .unwrap();

    static ref CARDINAL_SPAN: Regex = Regex::new(r"\d[\d,]*(?:\.\d+)?").unwrap();
}

/// Kind of a tagged entity span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Date,
    Money,
    Cardinal,
}

impl EntityKind {
    fn rank(&self) -> u8 {
        match self {
            EntityKind::Date => 0,
            EntityKind::Money => 1,
            EntityKind::Cardinal => 2,
        }
    }
}

/// One tagged span.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub kind: EntityKind,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Tag all entity spans in the text, in order of appearance.
pub fn tag(text: &str) -> Vec<Entity> {
    let mut spans: Vec<Entity> = Vec::new();

    for m in DATE_SPAN.find_iter(text) {
        spans.push(Entity {
            kind: EntityKind::Date,
            text: m.as_str().to_string(),
            start: m.start(),
            end: m.end(),
        });
    }

    for m in MONEY_SPAN.find_iter(text) {
        // A money span must carry a parseable numeric value.
        if parse_numeric(m.as_str()).is_none() {
            continue;
        }
        spans.push(Entity {
            kind: EntityKind::Money,
            text: m.as_str().to_string(),
            start: m.start(),
            end: m.end(),
        });
    }

    for m in CARDINAL_SPAN.find_iter(text) {
        spans.push(Entity {
            kind: EntityKind::Cardinal,
            text: m.as_str().to_string(),
            start: m.start(),
            end: m.end(),
        });
    }

    // Earliest span wins; at equal start the more specific kind, then the
    // longer span. Later spans overlapping a kept one are dropped.
    spans.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then(a.kind.rank().cmp(&b.kind.rank()))
            .then(b.end.cmp(&a.end))
    });

    let mut tagged: Vec<Entity> = Vec::new();
    for span in spans {
        if tagged.last().is_none_or(|kept| span.start >= kept.end) {
            tagged.push(span);
        }
    }

    tagged
}

/// First entity of one of the wanted kinds, if any.
pub fn first_of(text: &str, kinds: &[EntityKind]) -> Option<Entity> {
    tag(text).into_iter().find(|e| kinds.contains(&e.kind))
}

fn parse_numeric(span: &str) -> Option<Decimal> {
    let digits: String = span
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    Decimal::from_str(&digits).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_money_span() {
        let entity = first_of("Total due: $1,234.56 by card", &[EntityKind::Money]).unwrap();
        assert_eq!(entity.text, "$1,234.56");
    }

    #[test]
    fn test_trailing_currency() {
        let entity = first_of("Betrag 42.50 EUR", &[EntityKind::Money]).unwrap();
        assert_eq!(entity.text, "42.50 EUR");
    }

    #[test]
    fn test_cardinal_span() {
        let entity =
            first_of("amount 1200", &[EntityKind::Money, EntityKind::Cardinal]).unwrap();
        assert_eq!(entity.kind, EntityKind::Cardinal);
        assert_eq!(entity.text, "1200");
    }

    #[test]
    fn test_date_beats_cardinal_on_overlap() {
        let tagged = tag("paid 15/03/2024");
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].kind, EntityKind::Date);
        assert_eq!(tagged[0].text, "15/03/2024");
    }

    #[test]
    fn test_month_year_span() {
        let entity = first_of("due in March 2024", &[EntityKind::Date]).unwrap();
        assert_eq!(entity.text, "March 2024");
    }

    #[test]
    fn test_order_of_appearance() {
        let tagged = tag("invoice 77 of 12 May 2023");
        assert_eq!(tagged[0].kind, EntityKind::Cardinal);
        assert_eq!(tagged[1].kind, EntityKind::Date);
    }

    #[test]
    fn test_no_entities() {
        assert!(tag("nothing to see").is_empty());
    }
}
