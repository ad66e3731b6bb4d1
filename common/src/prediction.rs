//! Per-class prediction and how it is displayed.
//!
use std::fmt;

use serde::{Deserialize, Serialize};

/// Probability of one class for one frame.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub class_name: String,
    pub probability: f32,
}

impl Prediction {
    pub fn new(class_name: impl Into<String>, probability: f32) -> Self {
        Self {
            class_name: class_name.into(),
            probability,
        }
    }
}

/// Renders as `<label>: <probability>`, the text of one label slot.
impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.class_name,
            format_probability(self.probability)
        )
    }
}

/// Format a probability with two decimals, rounding halves away from zero.
///
/// Rust's float formatting rounds exact ties to even (`0.125` -> `0.12`), so the value is
/// rounded to hundredths first.
pub fn format_probability(probability: f32) -> String {
    let hundredths = (f64::from(probability) * 100.0).round();
    format!("{:.2}", hundredths / 100.0)
}
