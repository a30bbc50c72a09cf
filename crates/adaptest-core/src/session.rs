//! Session state for one test attempt.
//!
//! A `Session` is a plain value. The engine never mutates one in place:
//! every transition takes the current session and returns the next one, and
//! the caller decides where the latest value lives.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AssessmentConfig;
use crate::estimator::{AbilityEstimate, Observation};
use crate::model::{AdministeredItem, Category, Response};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    CompletedByPrecision,
    CompletedByItemLimit,
    CompletedByTimeout,
    /// Forced stop: the selector had no eligible item left.
    CompletedBySelectionExhausted,
    Abandoned,
}

impl SessionStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::NotStarted | SessionStatus::InProgress)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::NotStarted => "not-started",
            SessionStatus::InProgress => "in-progress",
            SessionStatus::CompletedByPrecision => "completed-by-precision",
            SessionStatus::CompletedByItemLimit => "completed-by-item-limit",
            SessionStatus::CompletedByTimeout => "completed-by-timeout",
            SessionStatus::CompletedBySelectionExhausted => "completed-by-selection-exhausted",
            SessionStatus::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}

/// One test attempt.
///
/// Invariants: `responses.len() <= administered.len() <= responses.len() + 1`,
/// and `responses[i]` answers `administered[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    /// Identifier of the item bank the session draws from.
    pub bank_id: String,
    /// Content locale the bank was loaded with.
    pub locale: String,
    pub started_at: DateTime<Utc>,
    /// Configuration the session was started with.
    pub config: AssessmentConfig,
    pub status: SessionStatus,
    pub administered: Vec<AdministeredItem>,
    pub responses: Vec<Response>,
    /// Current theta and SE(theta).
    pub ability: AbilityEstimate,
    /// Sum of response latencies, plus any externally reported time.
    pub elapsed_ms: u64,
}

impl Session {
    /// A fresh, not-yet-started session.
    pub fn new(bank_id: &str, locale: &str, config: AssessmentConfig) -> Self {
        let ability = AbilityEstimate::initial(&config.estimation);
        Self {
            id: Uuid::new_v4(),
            bank_id: bank_id.to_string(),
            locale: locale.to_string(),
            started_at: Utc::now(),
            config,
            status: SessionStatus::NotStarted,
            administered: Vec::new(),
            responses: Vec::new(),
            ability,
            elapsed_ms: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The administered item still awaiting a response, if any.
    pub fn pending(&self) -> Option<&AdministeredItem> {
        if self.is_terminal() {
            return None;
        }
        self.administered.get(self.responses.len())
    }

    pub fn correct_count(&self) -> usize {
        self.responses.iter().filter(|r| r.correct).count()
    }

    /// Items administered per category, counting a pending item.
    pub fn category_counts(&self) -> BTreeMap<Category, usize> {
        let mut counts = BTreeMap::new();
        for item in &self.administered {
            *counts.entry(item.category).or_insert(0) += 1;
        }
        counts
    }

    /// Scored responses paired with the parameters of their items.
    pub fn observations(&self) -> Vec<Observation> {
        self.administered
            .iter()
            .zip(&self.responses)
            .map(|(item, response)| Observation {
                params: item.params,
                correct: response.correct,
            })
            .collect()
    }

    /// Save the session as JSON.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize session")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write session to {}", path.display()))?;
        Ok(())
    }

    /// Load a session from a JSON file. A session whose configuration
    /// snapshot fails validation is rejected.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read session from {}", path.display()))?;
        let session: Session =
            serde_json::from_str(&content).context("failed to parse session JSON")?;
        session
            .config
            .validate()
            .with_context(|| format!("rejected session {}", path.display()))?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Answer, IrtParams};

    fn administered(id: &str, category: Category) -> AdministeredItem {
        AdministeredItem {
            item_id: id.into(),
            category,
            difficulty: 5,
            params: IrtParams::new(1.0, 0.0, 0.25),
            theta_at_selection: 0.0,
            information: 0.1,
        }
    }

    fn response(id: &str, correct: bool) -> Response {
        Response {
            item_id: id.into(),
            answer: Answer::Chosen { option: 0 },
            correct,
            latency_ms: 1500,
            theta_at_selection: 0.0,
        }
    }

    #[test]
    fn new_session_starts_at_prior() {
        let session = Session::new("bank", "en", AssessmentConfig::default());
        assert_eq!(session.status, SessionStatus::NotStarted);
        assert_eq!(session.ability.theta, 0.0);
        assert_eq!(session.ability.se, 1.0);
        assert!(session.pending().is_none());
    }

    #[test]
    fn pending_is_the_unanswered_tail() {
        let mut session = Session::new("bank", "en", AssessmentConfig::default());
        session.status = SessionStatus::InProgress;
        session.administered.push(administered("a", Category::SpatialReasoning));
        assert_eq!(session.pending().unwrap().item_id, "a");

        session.responses.push(response("a", true));
        assert!(session.pending().is_none());

        session.administered.push(administered("b", Category::SpatialReasoning));
        assert_eq!(session.pending().unwrap().item_id, "b");
        assert_eq!(session.category_counts()[&Category::SpatialReasoning], 2);
        assert_eq!(session.observations().len(), 1);

        session.status = SessionStatus::Abandoned;
        assert!(session.pending().is_none());
    }

    #[test]
    fn terminal_states() {
        assert!(!SessionStatus::NotStarted.is_terminal());
        assert!(!SessionStatus::InProgress.is_terminal());
        assert!(SessionStatus::CompletedByPrecision.is_terminal());
        assert!(SessionStatus::CompletedBySelectionExhausted.is_terminal());
        assert!(SessionStatus::Abandoned.is_terminal());
    }

    #[test]
    fn status_serializes_kebab_case() {
        let json = serde_json::to_string(&SessionStatus::CompletedByTimeout).unwrap();
        assert_eq!(json, "\"completed-by-timeout\"");
        assert_eq!(
            SessionStatus::CompletedByTimeout.to_string(),
            "completed-by-timeout"
        );
    }

    #[test]
    fn json_roundtrip() {
        let mut session = Session::new("bank", "de", AssessmentConfig::default());
        session.status = SessionStatus::Abandoned;
        session.administered.push(administered("a", Category::ShortTermMemory));
        session.responses.push(response("a", false));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions/s.json");
        session.save_json(&path).unwrap();
        let loaded = Session::load_json(&path).unwrap();
        assert_eq!(loaded, session);
    }

    #[test]
    fn load_rejects_inconsistent_snapshot() {
        let mut session = Session::new("bank", "en", AssessmentConfig::default());
        session.status = SessionStatus::CompletedByItemLimit;
        session.config.estimation.ability_min = 4.0;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        session.save_json(&path).unwrap();
        let err = Session::load_json(&path).unwrap_err();
        assert!(format!("{err:#}").contains("estimation.ability_min"), "{err:#}");
    }
}
