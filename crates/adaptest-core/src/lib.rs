//! adaptest-core: Computerized adaptive testing engine.
//!
//! Calibrated 3PL item banks, running ability estimation (EAP or MLE),
//! maximum-information item selection with category balancing, stop rules,
//! and scoring of a finished session into an IQ-scale report.
//!
//! Sessions are plain values: [`engine::AdaptiveEngine`] takes the current
//! [`session::Session`] and returns the next one, so the caller owns
//! persistence and any number of sessions can share one bank.

pub mod bank;
pub mod config;
pub mod engine;
pub mod error;
pub mod estimator;
pub mod irt;
pub mod model;
pub mod parser;
pub mod report;
pub mod scoring;
pub mod selector;
pub mod session;
pub mod statistics;
pub mod termination;
