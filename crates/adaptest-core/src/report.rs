//! Assessment result types with JSON persistence and change detection.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EstimationMethod;
use crate::model::Category;
use crate::session::SessionStatus;

/// |RCI| above this is a reliable change at the 95% level.
pub const RELIABLE_CHANGE_CRITICAL: f64 = 1.96;

/// The frozen outcome of one terminal session.
///
/// Everything here is derived from the session's items and responses; no
/// wall-clock time is read, so finalizing the same session twice yields
/// identical values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub session_id: Uuid,
    pub bank_id: String,
    pub locale: String,
    pub status: SessionStatus,
    pub method: EstimationMethod,
    /// Final ability estimate.
    pub theta: f64,
    /// Final standard error of theta.
    pub se: f64,
    /// `100 + 15·theta`, clamped to the configured display range.
    pub iq: f64,
    pub iq_band: IqBand,
    /// Standard-normal percentile rank of theta, 0-100.
    pub percentile: f64,
    pub confidence_interval: ConfidenceInterval,
    /// One entry per category, including categories never administered.
    pub category_scores: BTreeMap<Category, CategoryScore>,
    pub reliability: Reliability,
    /// Per-response trace in administration order.
    pub progression: Vec<ProgressionPoint>,
    /// Test information of the answered items over the ability range.
    pub information_curve: Vec<InformationPoint>,
    pub items_answered: usize,
    pub total_correct: usize,
    pub mean_latency_ms: Option<f64>,
    pub elapsed_ms: u64,
}

/// IQ interval at the configured confidence level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub level: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Accuracy within one category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub administered: usize,
    pub correct: usize,
    /// Percent correct, or `None` when no item of the category was answered.
    pub accuracy: Option<f64>,
}

/// Reliability indices for a single adaptive administration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reliability {
    /// Split-half reliability from the agreement between the ability
    /// estimated on odd and on even responses, stepped up with
    /// Spearman-Brown. `None` with fewer than two responses.
    pub internal_consistency: Option<f64>,
    /// `1 - SE² / prior variance`, clamped to [0, 1].
    pub marginal: f64,
    /// Measurement precision, `1 / SE`.
    pub precision: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionPoint {
    /// 1-based position in the session.
    pub index: usize,
    pub item_id: String,
    pub category: Category,
    /// IRT difficulty `b` of the item.
    pub difficulty: f64,
    /// Theta the item was selected at.
    pub theta_before: f64,
    /// Theta after scoring this response.
    pub theta: f64,
    pub se: f64,
    /// Item information at the selection theta.
    pub information: f64,
    pub correct: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InformationPoint {
    pub theta: f64,
    pub information: f64,
}

/// Descriptive IQ classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IqBand {
    ExtremelyLow,
    Borderline,
    LowAverage,
    Average,
    HighAverage,
    Superior,
    VerySuperior,
}

impl IqBand {
    pub fn from_iq(iq: f64) -> Self {
        match iq {
            x if x < 70.0 => IqBand::ExtremelyLow,
            x if x < 80.0 => IqBand::Borderline,
            x if x < 90.0 => IqBand::LowAverage,
            x if x < 110.0 => IqBand::Average,
            x if x < 120.0 => IqBand::HighAverage,
            x if x < 130.0 => IqBand::Superior,
            _ => IqBand::VerySuperior,
        }
    }
}

impl fmt::Display for IqBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IqBand::ExtremelyLow => "extremely low",
            IqBand::Borderline => "borderline",
            IqBand::LowAverage => "low average",
            IqBand::Average => "average",
            IqBand::HighAverage => "high average",
            IqBand::Superior => "superior",
            IqBand::VerySuperior => "very superior",
        };
        f.write_str(s)
    }
}

impl AssessmentResult {
    /// Save the result as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize result")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write result to {}", path.display()))?;
        Ok(())
    }

    /// Load a result from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read result from {}", path.display()))?;
        let result: AssessmentResult =
            serde_json::from_str(&content).context("failed to parse result JSON")?;
        Ok(result)
    }

    /// Compare this result against an earlier one with the reliable change
    /// index `(θ₂ - θ₁) / √(SE₁² + SE₂²)`.
    pub fn compare(&self, baseline: &AssessmentResult) -> ChangeReport {
        let theta_delta = self.theta - baseline.theta;
        let pooled = (self.se.powi(2) + baseline.se.powi(2)).sqrt();
        let rci = if pooled > 0.0 { theta_delta / pooled } else { 0.0 };
        let direction = if rci > RELIABLE_CHANGE_CRITICAL {
            ChangeDirection::Improved
        } else if rci < -RELIABLE_CHANGE_CRITICAL {
            ChangeDirection::Declined
        } else {
            ChangeDirection::Unchanged
        };

        let category_changes = Category::ALL
            .iter()
            .map(|category| {
                let before = baseline
                    .category_scores
                    .get(category)
                    .and_then(|s| s.accuracy);
                let after = self.category_scores.get(category).and_then(|s| s.accuracy);
                CategoryChange {
                    category: *category,
                    baseline: before,
                    current: after,
                    delta: before.zip(after).map(|(b, a)| a - b),
                }
            })
            .collect();

        ChangeReport {
            baseline_session: baseline.session_id,
            current_session: self.session_id,
            baseline_theta: baseline.theta,
            current_theta: self.theta,
            theta_delta,
            iq_delta: self.iq - baseline.iq,
            reliable_change_index: rci,
            direction,
            category_changes,
        }
    }

    /// Format the result as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**IQ {:.0}** ({}), {:.0}% CI {:.0}-{:.0}, percentile {:.1}\n\n",
            self.iq,
            self.iq_band,
            self.confidence_interval.level * 100.0,
            self.confidence_interval.lower,
            self.confidence_interval.upper,
            self.percentile
        ));
        md.push_str(&format!(
            "theta {:.3}, SE {:.3}, {} of {} correct, status `{}`\n\n",
            self.theta, self.se, self.total_correct, self.items_answered, self.status
        ));

        md.push_str("### Categories\n\n");
        md.push_str("| Category | Answered | Correct | Accuracy |\n");
        md.push_str("|----------|----------|---------|----------|\n");
        for (category, score) in &self.category_scores {
            let accuracy = score
                .accuracy
                .map(|a| format!("{a:.1}%"))
                .unwrap_or_else(|| "n/a".into());
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                category, score.administered, score.correct, accuracy
            ));
        }
        md.push('\n');

        md.push_str("### Reliability\n\n");
        let consistency = self
            .reliability
            .internal_consistency
            .map(|r| format!("{r:.3}"))
            .unwrap_or_else(|| "n/a".into());
        md.push_str(&format!(
            "split-half {}, marginal {:.3}, precision {:.2}\n",
            consistency, self.reliability.marginal, self.reliability.precision
        ));

        if !self.progression.is_empty() {
            md.push_str("\n### Progression\n\n");
            md.push_str("| # | Item | b | Correct | Theta | SE |\n");
            md.push_str("|---|------|---|---------|-------|----|\n");
            for p in &self.progression {
                md.push_str(&format!(
                    "| {} | {} | {:.2} | {} | {:.3} | {:.3} |\n",
                    p.index,
                    p.item_id,
                    p.difficulty,
                    if p.correct { "yes" } else { "no" },
                    p.theta,
                    p.se
                ));
            }
        }

        md
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeDirection {
    Improved,
    Declined,
    Unchanged,
}

/// Result of comparing two assessments of the same person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub baseline_session: Uuid,
    pub current_session: Uuid,
    pub baseline_theta: f64,
    pub current_theta: f64,
    pub theta_delta: f64,
    pub iq_delta: f64,
    pub reliable_change_index: f64,
    pub direction: ChangeDirection,
    pub category_changes: Vec<CategoryChange>,
}

/// Accuracy change within one category. `delta` is `None` unless both
/// sessions answered items of the category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryChange {
    pub category: Category,
    pub baseline: Option<f64>,
    pub current: Option<f64>,
    pub delta: Option<f64>,
}

impl ChangeReport {
    /// Returns true if ability changed beyond measurement error.
    pub fn is_significant(&self) -> bool {
        self.direction != ChangeDirection::Unchanged
    }

    /// Format the change report as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Summary:** theta {:.3} -> {:.3} ({:+.3}), IQ {:+.1}, RCI {:.2} ({})\n\n",
            self.baseline_theta,
            self.current_theta,
            self.theta_delta,
            self.iq_delta,
            self.reliable_change_index,
            match self.direction {
                ChangeDirection::Improved => "reliable improvement",
                ChangeDirection::Declined => "reliable decline",
                ChangeDirection::Unchanged => "within measurement error",
            }
        ));

        md.push_str("| Category | Baseline | Current | Delta |\n");
        md.push_str("|----------|----------|---------|-------|\n");
        let pct = |v: Option<f64>| v.map(|x| format!("{x:.1}%")).unwrap_or_else(|| "n/a".into());
        for c in &self.category_changes {
            let delta = c
                .delta
                .map(|d| format!("{d:+.1}%"))
                .unwrap_or_else(|| "n/a".into());
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                c.category,
                pct(c.baseline),
                pct(c.current),
                delta
            ));
        }

        md
    }
}
