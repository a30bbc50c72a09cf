//! Assessment configuration.
//!
//! Loaded from TOML with serde defaults for every field, so an empty file
//! (or no file at all) yields a working configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::Category;

/// Top-level configuration handed to `AdaptiveEngine::new`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentConfig {
    #[serde(default)]
    pub termination: TerminationConfig,
    #[serde(default)]
    pub estimation: EstimationConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

/// Stop conditions. Set any limit to an unreachable bound to disable it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminationConfig {
    /// Responses required before the precision rule may fire.
    #[serde(default = "default_min_items")]
    pub min_items: usize,
    /// Hard cap on administered items.
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    /// Stop once SE(theta) is at or below this value.
    #[serde(default = "default_precision_threshold")]
    pub precision_threshold: f64,
    /// Global time limit for the whole session.
    #[serde(default = "default_time_limit")]
    pub time_limit_secs: u64,
    /// Per-item limit for items that carry no override.
    #[serde(default = "default_item_time_limit")]
    pub default_item_time_limit_secs: u64,
}

fn default_min_items() -> usize {
    5
}
fn default_max_items() -> usize {
    20
}
fn default_precision_threshold() -> f64 {
    0.3
}
fn default_time_limit() -> u64 {
    30 * 60
}
fn default_item_time_limit() -> u64 {
    90
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self {
            min_items: default_min_items(),
            max_items: default_max_items(),
            precision_threshold: default_precision_threshold(),
            time_limit_secs: default_time_limit(),
            default_item_time_limit_secs: default_item_time_limit(),
        }
    }
}

/// Ability estimation algorithm. One choice applies to a whole session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimationMethod {
    /// Expected a posteriori over a quadrature grid.
    #[default]
    Eap,
    /// Maximum likelihood with a bounded step fallback.
    Mle,
}

impl fmt::Display for EstimationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimationMethod::Eap => write!(f, "eap"),
            EstimationMethod::Mle => write!(f, "mle"),
        }
    }
}

impl FromStr for EstimationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "eap" => Ok(EstimationMethod::Eap),
            "mle" | "ml" => Ok(EstimationMethod::Mle),
            other => Err(format!("unknown estimation method: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationConfig {
    #[serde(default)]
    pub method: EstimationMethod,
    /// Mean of the normal ability prior; also the starting theta.
    #[serde(default)]
    pub prior_mean: f64,
    #[serde(default = "default_prior_sd")]
    pub prior_sd: f64,
    /// SE reported before any response has been scored. When unset, EAP
    /// starts from the prior SD and MLE, which has no prior, from the width
    /// of the ability range. See [`EstimationConfig::starting_se`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_se: Option<f64>,
    #[serde(default = "default_ability_min")]
    pub ability_min: f64,
    #[serde(default = "default_ability_max")]
    pub ability_max: f64,
    /// Fixed increment for the bounded step update.
    #[serde(default = "default_step_size")]
    pub step_size: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_tolerance")]
    pub convergence_tolerance: f64,
    #[serde(default = "default_quadrature_points")]
    pub quadrature_points: usize,
}

fn default_prior_sd() -> f64 {
    1.0
}
fn default_ability_min() -> f64 {
    -4.0
}
fn default_ability_max() -> f64 {
    4.0
}
fn default_step_size() -> f64 {
    0.7
}
fn default_max_iterations() -> usize {
    50
}
fn default_tolerance() -> f64 {
    1e-6
}
fn default_quadrature_points() -> usize {
    61
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            method: EstimationMethod::default(),
            prior_mean: 0.0,
            prior_sd: default_prior_sd(),
            initial_se: None,
            ability_min: default_ability_min(),
            ability_max: default_ability_max(),
            step_size: default_step_size(),
            max_iterations: default_max_iterations(),
            convergence_tolerance: default_tolerance(),
            quadrature_points: default_quadrature_points(),
        }
    }
}

impl EstimationConfig {
    /// Clamp an ability value into the configured range.
    pub fn clamp(&self, theta: f64) -> f64 {
        theta.clamp(self.ability_min, self.ability_max)
    }

    /// SE before any response, and the ceiling MLE reports thereafter.
    pub fn starting_se(&self) -> f64 {
        self.initial_se.unwrap_or(match self.method {
            EstimationMethod::Eap => self.prior_sd,
            EstimationMethod::Mle => self.ability_max - self.ability_min,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Target share of the item budget per category. Empty means equal
    /// shares across the categories present in the bank; categories not
    /// listed in a non-empty map are unconstrained.
    #[serde(default)]
    pub category_targets: BTreeMap<Category, f64>,
    /// Break information ties toward historically less-exposed items.
    #[serde(default = "default_true")]
    pub exposure_control: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            category_targets: BTreeMap::new(),
            exposure_control: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
    #[serde(default = "default_iq_min")]
    pub iq_min: f64,
    #[serde(default = "default_iq_max")]
    pub iq_max: f64,
}

fn default_confidence_level() -> f64 {
    0.95
}
fn default_iq_min() -> f64 {
    40.0
}
fn default_iq_max() -> f64 {
    200.0
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            confidence_level: default_confidence_level(),
            iq_min: default_iq_min(),
            iq_max: default_iq_max(),
        }
    }
}

impl AssessmentConfig {
    /// Check cross-field consistency. Called by `AdaptiveEngine::new`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.termination;
        if t.max_items == 0 {
            return Err(ConfigError::new("termination.max_items", "must be at least 1"));
        }
        if t.min_items > t.max_items {
            return Err(ConfigError::new(
                "termination.min_items",
                format!("{} exceeds max_items {}", t.min_items, t.max_items),
            ));
        }
        if t.precision_threshold.is_nan() || t.precision_threshold < 0.0 {
            return Err(ConfigError::new(
                "termination.precision_threshold",
                "must be a non-negative number",
            ));
        }
        if t.default_item_time_limit_secs == 0 {
            return Err(ConfigError::new(
                "termination.default_item_time_limit_secs",
                "must be at least 1 second",
            ));
        }

        let e = &self.estimation;
        if !(e.ability_min.is_finite() && e.ability_max.is_finite() && e.ability_min < e.ability_max)
        {
            return Err(ConfigError::new(
                "estimation.ability_min",
                format!("empty ability range [{}, {}]", e.ability_min, e.ability_max),
            ));
        }
        if !e.prior_mean.is_finite() {
            return Err(ConfigError::new("estimation.prior_mean", "must be finite"));
        }
        if !(e.prior_sd.is_finite() && e.prior_sd > 0.0) {
            return Err(ConfigError::new("estimation.prior_sd", "must be positive"));
        }
        if let Some(se) = e.initial_se {
            if !(se.is_finite() && se > 0.0) {
                return Err(ConfigError::new("estimation.initial_se", "must be positive"));
            }
        }
        if !(e.step_size.is_finite() && e.step_size > 0.0) {
            return Err(ConfigError::new("estimation.step_size", "must be positive"));
        }
        if e.max_iterations == 0 {
            return Err(ConfigError::new("estimation.max_iterations", "must be at least 1"));
        }
        if !(e.convergence_tolerance.is_finite() && e.convergence_tolerance > 0.0) {
            return Err(ConfigError::new(
                "estimation.convergence_tolerance",
                "must be positive",
            ));
        }
        if e.quadrature_points < 3 {
            return Err(ConfigError::new(
                "estimation.quadrature_points",
                "need at least 3 grid points",
            ));
        }

        for (category, share) in &self.selection.category_targets {
            if !(share.is_finite() && *share >= 0.0) {
                return Err(ConfigError::new(
                    "selection.category_targets",
                    format!("share for {category} must be a non-negative number"),
                ));
            }
        }

        let s = &self.scoring;
        if !(s.confidence_level > 0.0 && s.confidence_level < 1.0) {
            return Err(ConfigError::new(
                "scoring.confidence_level",
                "must lie strictly between 0 and 1",
            ));
        }
        if !(s.iq_min.is_finite() && s.iq_max.is_finite() && s.iq_min < s.iq_max) {
            return Err(ConfigError::new(
                "scoring.iq_min",
                format!("empty display range [{}, {}]", s.iq_min, s.iq_max),
            ));
        }

        Ok(())
    }
}

/// Load config from an explicit path, or search the well-known locations:
/// 1. `adaptest.toml` in the current directory
/// 2. `~/.config/adaptest/config.toml`
///
/// Environment variable overrides: `ADAPTEST_MAX_ITEMS`, `ADAPTEST_PRECISION`.
pub fn load_config_from(path: Option<&Path>) -> Result<AssessmentConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("adaptest.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config_str(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => AssessmentConfig::default(),
    };

    if let Ok(value) = std::env::var("ADAPTEST_MAX_ITEMS") {
        config.termination.max_items = value
            .trim()
            .parse()
            .with_context(|| format!("ADAPTEST_MAX_ITEMS is not a count: '{value}'"))?;
    }
    if let Ok(value) = std::env::var("ADAPTEST_PRECISION") {
        config.termination.precision_threshold = value
            .trim()
            .parse()
            .with_context(|| format!("ADAPTEST_PRECISION is not a number: '{value}'"))?;
    }

    config.validate()?;
    Ok(config)
}

/// Parse a TOML string into a config without validating it.
pub fn parse_config_str(content: &str) -> Result<AssessmentConfig> {
    Ok(toml::from_str(content)?)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("adaptest"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AssessmentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.termination.max_items, 20);
        assert_eq!(config.estimation.method, EstimationMethod::Eap);
        assert_eq!(config.scoring.confidence_level, 0.95);
    }

    #[test]
    fn parse_partial_config() {
        let config = parse_config_str(
            r#"
[termination]
max_items = 12
precision_threshold = 0.25

[estimation]
method = "mle"

[selection.category_targets]
pattern-recognition = 0.4
short-term-memory = 0.1
"#,
        )
        .unwrap();
        assert_eq!(config.termination.max_items, 12);
        assert_eq!(config.termination.min_items, 5);
        assert_eq!(config.estimation.method, EstimationMethod::Mle);
        assert_eq!(config.estimation.quadrature_points, 61);
        assert_eq!(
            config.selection.category_targets.get(&Category::PatternRecognition),
            Some(&0.4)
        );
        assert!(config.selection.exposure_control);
    }

    #[test]
    fn empty_config_parses_to_defaults() {
        assert_eq!(parse_config_str("").unwrap(), AssessmentConfig::default());
    }

    #[test]
    fn min_items_above_max_is_rejected() {
        let mut config = AssessmentConfig::default();
        config.termination.min_items = 30;
        let err = config.validate().unwrap_err();
        assert_eq!(err.field, "termination.min_items");
    }

    #[test]
    fn confidence_level_must_be_a_probability() {
        let mut config = AssessmentConfig::default();
        config.scoring.confidence_level = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn starting_se_depends_on_method() {
        let mut estimation = EstimationConfig::default();
        assert_eq!(estimation.starting_se(), 1.0);
        estimation.method = EstimationMethod::Mle;
        assert_eq!(estimation.starting_se(), 8.0);
        estimation.initial_se = Some(2.5);
        assert_eq!(estimation.starting_se(), 2.5);

        let mut config = AssessmentConfig::default();
        config.estimation.initial_se = Some(0.0);
        assert_eq!(config.validate().unwrap_err().field, "estimation.initial_se");
    }

    #[test]
    fn load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adaptest.toml");
        std::fs::write(&path, "[termination]\nmax_items = 8\nmin_items = 3\n").unwrap();
        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.termination.max_items, 8);
    }

    #[test]
    fn missing_explicit_path_fails() {
        assert!(load_config_from(Some(Path::new("no-such-adaptest.toml"))).is_err());
    }

    #[test]
    fn estimation_method_parse() {
        assert_eq!("EAP".parse::<EstimationMethod>().unwrap(), EstimationMethod::Eap);
        assert_eq!("ml".parse::<EstimationMethod>().unwrap(), EstimationMethod::Mle);
        assert!("wle".parse::<EstimationMethod>().is_err());
    }
}
