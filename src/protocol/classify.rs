//! Temperature classification for display

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest temperature shown as [`DisplayCategory::Mid`]
pub const MID_THRESHOLD: i64 = 10;
/// Lowest temperature shown as [`DisplayCategory::High`]
pub const HIGH_THRESHOLD: i64 = 30;

/// Display bucket for a received reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayCategory {
    Low,
    Mid,
    High,
}

impl DisplayCategory {
    pub fn label(&self) -> &'static str {
        match self {
            DisplayCategory::Low => "low",
            DisplayCategory::Mid => "mid",
            DisplayCategory::High => "high",
        }
    }
}

impl fmt::Display for DisplayCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Map a temperature to its display category
pub fn classify(temperature: i64) -> DisplayCategory {
    if temperature < MID_THRESHOLD {
        DisplayCategory::Low
    } else if temperature < HIGH_THRESHOLD {
        DisplayCategory::Mid
    } else {
        DisplayCategory::High
    }
}
