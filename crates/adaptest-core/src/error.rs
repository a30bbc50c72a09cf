//! Engine error types.
//!
//! Item bank and configuration errors are domain errors raised at load time.
//! `SessionError` covers caller-contract violations in the integration layer
//! and is kept separate so callers can surface it loudly.

use thiserror::Error;

use crate::session::SessionStatus;

/// An item bank failed validation. Items are never silently clamped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ItemBankError {
    #[error("item bank '{0}' contains no items")]
    Empty(String),

    #[error("duplicate item ID: {0}")]
    DuplicateId(String),

    #[error("item {item_id}: discrimination must be positive and finite, got {a}")]
    InvalidDiscrimination { item_id: String, a: f64 },

    #[error("item {item_id}: difficulty must be finite, got {b}")]
    InvalidDifficulty { item_id: String, b: f64 },

    #[error("item {item_id}: guessing parameter must lie in [0, 1), got {c}")]
    InvalidGuessing { item_id: String, c: f64 },

    #[error("item {item_id}: correct option {index} out of range for {options} options")]
    InvalidCorrectOption {
        item_id: String,
        index: usize,
        options: usize,
    },

    #[error("item {item_id}: no content for locale '{locale}' or fallback '{fallback}'")]
    MissingContent {
        item_id: String,
        locale: String,
        fallback: String,
    },

    #[error("item {item_id}: times_correct ({correct}) exceeds times_administered ({administered})")]
    InconsistentUsage {
        item_id: String,
        correct: u64,
        administered: u64,
    },
}

/// An assessment configuration value is out of its valid range.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid config `{field}`: {message}")]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl ConfigError {
    pub(crate) fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// The caller drove a session in a way the state machine does not permit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("session already terminated ({status}); no further transitions allowed")]
    Terminal { status: SessionStatus },

    #[error("session has not been started")]
    NotStarted,

    #[error("session has no pending item awaiting a response")]
    NoPendingItem,

    #[error("pending item {0} is not in this engine's item bank")]
    UnknownItem(String),

    #[error("item {item_id}: option {option} out of range for {options} options")]
    InvalidOption {
        item_id: String,
        option: usize,
        options: usize,
    },

    #[error("session is still {status}; only terminal sessions can be finalized")]
    NotTerminal { status: SessionStatus },

    /// The configuration snapshot carried by the session is inconsistent.
    #[error("session snapshot has an {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// No eligible item is left to administer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("selection exhausted: no eligible items remain")]
pub struct SelectionExhausted;
