//! Core data model types for adaptest.
//!
//! Items, their calibrated IRT parameters, and the per-response records a
//! session accumulates. Everything here is plain data so it can cross a
//! storage or network boundary unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of item categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    PatternRecognition,
    SpatialReasoning,
    LogicalDeduction,
    NumericalReasoning,
    ShortTermMemory,
}

impl Category {
    /// Every category, in report order.
    pub const ALL: [Category; 5] = [
        Category::PatternRecognition,
        Category::SpatialReasoning,
        Category::LogicalDeduction,
        Category::NumericalReasoning,
        Category::ShortTermMemory,
    ];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::PatternRecognition => write!(f, "pattern-recognition"),
            Category::SpatialReasoning => write!(f, "spatial-reasoning"),
            Category::LogicalDeduction => write!(f, "logical-deduction"),
            Category::NumericalReasoning => write!(f, "numerical-reasoning"),
            Category::ShortTermMemory => write!(f, "short-term-memory"),
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "pattern-recognition" | "pattern" => Ok(Category::PatternRecognition),
            "spatial-reasoning" | "spatial" => Ok(Category::SpatialReasoning),
            "logical-deduction" | "logic" => Ok(Category::LogicalDeduction),
            "numerical-reasoning" | "numerical" => Ok(Category::NumericalReasoning),
            "short-term-memory" | "memory" => Ok(Category::ShortTermMemory),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// Three-parameter logistic item parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IrtParams {
    /// Discrimination, strictly positive.
    pub a: f64,
    /// Difficulty on the ability scale.
    pub b: f64,
    /// Pseudo-guessing lower asymptote in `[0, 1)`.
    #[serde(default = "default_guessing")]
    pub c: f64,
}

impl IrtParams {
    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }
}

fn default_guessing() -> f64 {
    0.25
}

/// Historical usage counts from the calibration store.
///
/// Only the selector's exposure tie-break reads these at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    #[serde(default)]
    pub times_administered: u64,
    #[serde(default)]
    pub times_correct: u64,
}

impl UsageStats {
    /// Historical proportion correct, if the item has ever been administered.
    pub fn p_value(&self) -> Option<f64> {
        if self.times_administered == 0 {
            None
        } else {
            Some(self.times_correct as f64 / self.times_administered as f64)
        }
    }
}

/// Localized presentation content. Opaque to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemContent {
    /// Locale the content was resolved to (may be the fallback locale).
    pub locale: String,
    pub prompt: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub explanation: String,
}

/// A calibrated item. Immutable once loaded into a bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Opaque identifier, unique within a bank.
    pub id: String,
    pub category: Category,
    /// Ordinal difficulty label 1-10. Informational only.
    pub difficulty: u8,
    pub params: IrtParams,
    /// Index into `content.options` of the keyed answer.
    pub correct_option: usize,
    /// Per-item time limit override in seconds.
    #[serde(default)]
    pub time_limit_secs: Option<u64>,
    #[serde(default)]
    pub usage: UsageStats,
    pub content: ItemContent,
}

/// What the test-taker did with the pending item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Answer {
    /// An option was chosen.
    Chosen { option: usize },
    /// No answer arrived before the item's time limit.
    TimedOut,
}

/// Snapshot of an item at the moment it was administered.
///
/// Carries everything scoring needs so a session never has to consult the
/// bank again once it has terminated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdministeredItem {
    pub item_id: String,
    pub category: Category,
    pub difficulty: u8,
    pub params: IrtParams,
    /// Ability estimate the selector used to pick this item.
    pub theta_at_selection: f64,
    /// Fisher information of the item at `theta_at_selection`.
    pub information: f64,
}

/// A recorded response, index-aligned with the administered items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub item_id: String,
    pub answer: Answer,
    pub correct: bool,
    pub latency_ms: u64,
    pub theta_at_selection: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_display_and_parse() {
        assert_eq!(Category::SpatialReasoning.to_string(), "spatial-reasoning");
        assert_eq!(
            "short_term_memory".parse::<Category>().unwrap(),
            Category::ShortTermMemory
        );
        assert_eq!("logic".parse::<Category>().unwrap(), Category::LogicalDeduction);
        assert!("verbal".parse::<Category>().is_err());
        for category in Category::ALL {
            assert_eq!(category.to_string().parse::<Category>().unwrap(), category);
        }
    }

    #[test]
    fn guessing_defaults_to_quarter() {
        let params: IrtParams = toml::from_str("a = 1.2\nb = -0.3").unwrap();
        assert_eq!(params.c, 0.25);
    }

    #[test]
    fn answer_serializes_tagged() {
        let json = serde_json::to_string(&Answer::Chosen { option: 2 }).unwrap();
        assert_eq!(json, r#"{"kind":"chosen","option":2}"#);
        let timed_out: Answer = serde_json::from_str(r#"{"kind":"timed_out"}"#).unwrap();
        assert_eq!(timed_out, Answer::TimedOut);
    }

    #[test]
    fn usage_p_value() {
        assert_eq!(UsageStats::default().p_value(), None);
        let usage = UsageStats {
            times_administered: 40,
            times_correct: 10,
        };
        assert_eq!(usage.p_value(), Some(0.25));
    }
}
