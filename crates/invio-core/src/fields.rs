//! Semantic field labels and extracted field values.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Semantic label of a detected invoice region.
///
/// The detector emits class indices; everything downstream dispatches on this
/// closed enum instead.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum FieldLabel {
    Merchant,
    Date,
    Amount,
}

impl FieldLabel {
    /// All labels the pipeline knows about.
    pub const ALL: [FieldLabel; 3] = [FieldLabel::Merchant, FieldLabel::Date, FieldLabel::Amount];

    /// Map a detector class index to a label.
    ///
    /// Class indices follow the detection model's training order:
    /// 0 = date, 1 = amount, 2 = merchant. Unknown indices yield `None` and
    /// the detection is discarded.
    pub fn from_class_id(id: usize) -> Option<Self> {
        match id {
            0 => Some(FieldLabel::Date),
            1 => Some(FieldLabel::Amount),
            2 => Some(FieldLabel::Merchant),
            _ => None,
        }
    }

    /// Wire/display name of the label.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldLabel::Merchant => "merchant",
            FieldLabel::Date => "date",
            FieldLabel::Amount => "amount",
        }
    }

    /// Pixel margin added on every side of a detected box before cropping.
    ///
    /// Tight detector boxes clip glyph ascenders and descenders, which hurts
    /// recognition; the margin is tuned per label.
    pub fn crop_margin(&self) -> f32 {
        match self {
            FieldLabel::Merchant => 5.0,
            FieldLabel::Date => 4.0,
            FieldLabel::Amount => 6.0,
        }
    }
}

impl fmt::Display for FieldLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final value of one extracted field.
///
/// `value` is `None` when normalization could not resolve the field (e.g. no
/// date-like substring in the recognized text). Confidence is the detector's
/// region confidence rounded to two decimals; recognition does not produce a
/// calibrated confidence of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub value: Option<String>,
    pub confidence: f32,
}

/// Mapping of field label to extracted value, in deterministic label order.
pub type FieldMap = BTreeMap<FieldLabel, ExtractedField>;
