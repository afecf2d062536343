//! Field-specific text normalization.
//!
//! Raw recognition output is noisy; each field kind gets its own cleanup
//! strategy. Dates are layered: a cheap fuzzy date-phrase scan first, entity
//! tagging as the semantic fallback when formatting defeats phrase parsing.

pub mod datefind;
pub mod entities;

use lazy_static::lazy_static;
use regex::Regex;

use crate::fields::FieldLabel;
use entities::EntityKind;

lazy_static! {
    // Single-letter-colon prefixes ("a: ", "e: ") are a common recognition
    // artifact on cropped regions.
    static ref PREFIX_ARTIFACT: Regex = Regex::new(r"(?i)[a-z]:\s").unwrap();

    static ref DIGIT_RUN: Regex = Regex::new(r"\d+").unwrap();
}

/// Normalizes raw recognized text into a final field value.
#[derive(Debug, Default)]
pub struct TextNormalizer;

impl TextNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Produce the cleaned value for a field, or `None` when the text holds
    /// nothing usable. Blank recognition output is never postprocessed.
    pub fn normalize(&self, raw: &str, label: FieldLabel) -> Option<String> {
        let stripped = raw.trim();
        if stripped.is_empty() {
            return None;
        }

        match label {
            FieldLabel::Merchant => Some(stripped.to_string()),
            FieldLabel::Date => self.find_date(stripped),
            FieldLabel::Amount => self.find_amount(stripped),
        }
    }

    /// Two-tier date resolution.
    ///
    /// Tier 1: fuzzy date-phrase scan over artifact-stripped text. The first
    /// candidate is formatted `%Y-%m-%d` and its day is checked against the
    /// first digit run of the original text (a day-of-month clue); on
    /// mismatch the candidate is re-emitted day/month swapped, which handles
    /// day-first inputs read month-first. Tier 2: first DATE entity span.
    fn find_date(&self, text: &str) -> Option<String> {
        let cleaned = PREFIX_ARTIFACT.replace_all(text, " ");

        if let Some(date) = datefind::first_date(&cleaned) {
            let day_clue = DIGIT_RUN
                .find(text)
                .and_then(|m| m.as_str().parse::<u32>().ok());

            let resolved = match day_clue {
                Some(clue) if clue != chrono::Datelike::day(&date) => {
                    date.format("%Y-%d-%m").to_string()
                }
                _ => date.format("%Y-%m-%d").to_string(),
            };
            return Some(resolved);
        }

        entities::first_of(text, &[EntityKind::Date]).map(|e| e.text)
    }

    fn find_amount(&self, text: &str) -> Option<String> {
        entities::first_of(text, &[EntityKind::Money, EntityKind::Cardinal]).map(|e| e.text)
    }
}
