//! Session state machine.
//!
//! `not-started -> in-progress -> {completed-by-*, abandoned}`. Every
//! transition takes the current `Session` by reference and returns the next
//! value; the engine itself holds only the shared, read-only item bank and
//! the configuration, so one engine can serve any number of sessions.

use std::collections::HashSet;
use std::sync::Arc;

use crate::bank::ItemBank;
use crate::config::AssessmentConfig;
use crate::error::{ConfigError, SessionError};
use crate::estimator::{estimator_for, AbilityEstimator};
use crate::model::{AdministeredItem, Answer, Item, Response};
use crate::report::AssessmentResult;
use crate::scoring;
use crate::selector::ItemSelector;
use crate::session::{Session, SessionStatus};
use crate::termination;

/// Drives sessions against one item bank.
pub struct AdaptiveEngine {
    bank: Arc<ItemBank>,
    config: AssessmentConfig,
}

impl AdaptiveEngine {
    /// Validate `config` and bind it to `bank`.
    pub fn new(bank: Arc<ItemBank>, config: AssessmentConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { bank, config })
    }

    pub fn bank(&self) -> &ItemBank {
        &self.bank
    }

    pub fn config(&self) -> &AssessmentConfig {
        &self.config
    }

    /// Start a new attempt: theta at the prior, first item selected at the
    /// prior ability.
    pub fn start_session(&self) -> Session {
        let mut next = Session::new(self.bank.id(), self.bank.locale(), self.config.clone());
        next.status = SessionStatus::InProgress;
        self.administer_next(&mut next);
        tracing::debug!(
            session = %next.id,
            bank = self.bank.id(),
            method = %next.config.estimation.method,
            "session started"
        );
        next
    }

    /// The item awaiting a response, or `None` once terminal.
    pub fn current_item(&self, session: &Session) -> Option<&Item> {
        session
            .pending()
            .and_then(|pending| self.bank.get(&pending.item_id))
    }

    /// Record the response to the pending item and advance exactly one step.
    ///
    /// A chosen answer that arrives after the item's time limit is scored
    /// as a timeout.
    pub fn submit_response(
        &self,
        session: &Session,
        answer: Answer,
        latency_ms: u64,
    ) -> Result<Session, SessionError> {
        match session.status {
            SessionStatus::NotStarted => return Err(SessionError::NotStarted),
            status if status.is_terminal() => return Err(SessionError::Terminal { status }),
            _ => {}
        }
        session.config.validate()?;
        let pending = session.pending().ok_or(SessionError::NoPendingItem)?;
        let item = self
            .bank
            .get(&pending.item_id)
            .ok_or_else(|| SessionError::UnknownItem(pending.item_id.clone()))?;

        if let Answer::Chosen { option } = answer {
            if option >= item.content.options.len() {
                return Err(SessionError::InvalidOption {
                    item_id: item.id.clone(),
                    option,
                    options: item.content.options.len(),
                });
            }
        }

        let limit_ms = termination::item_time_limit_ms(&session.config.termination, item.time_limit_secs);
        let answer = if latency_ms > limit_ms {
            tracing::debug!(item = %item.id, latency_ms, limit_ms, "late answer scored as timeout");
            Answer::TimedOut
        } else {
            answer
        };
        let correct = matches!(answer, Answer::Chosen { option } if option == item.correct_option);

        let mut next = session.clone();
        next.responses.push(Response {
            item_id: item.id.clone(),
            answer,
            correct,
            latency_ms,
            theta_at_selection: pending.theta_at_selection,
        });
        next.elapsed_ms = next.elapsed_ms.saturating_add(latency_ms);

        let estimator = self.estimator(&next);
        next.ability = estimator.update(next.ability, &next.observations());
        tracing::debug!(
            session = %next.id,
            estimator = estimator.name(),
            responses = next.responses.len(),
            correct,
            theta = next.ability.theta,
            se = next.ability.se,
            "ability updated"
        );

        match termination::evaluate(&next) {
            Some(status) => self.terminate(&mut next, status),
            None => self.administer_next(&mut next),
        }
        Ok(next)
    }

    /// Global time limit signalled by the caller. Forces termination.
    pub fn expire(&self, session: &Session) -> Result<Session, SessionError> {
        match session.status {
            SessionStatus::NotStarted => return Err(SessionError::NotStarted),
            status if status.is_terminal() => return Err(SessionError::Terminal { status }),
            _ => {}
        }
        let mut next = session.clone();
        let limit_ms = next.config.termination.time_limit_secs.saturating_mul(1000);
        next.elapsed_ms = next.elapsed_ms.max(limit_ms);
        self.terminate(&mut next, SessionStatus::CompletedByTimeout);
        Ok(next)
    }

    /// Cancel an in-progress session. Idempotent on an abandoned session;
    /// recorded responses are kept.
    pub fn abandon(&self, session: &Session) -> Result<Session, SessionError> {
        match session.status {
            SessionStatus::NotStarted => Err(SessionError::NotStarted),
            SessionStatus::Abandoned => Ok(session.clone()),
            status if status.is_terminal() => Err(SessionError::Terminal { status }),
            _ => {
                let mut next = session.clone();
                self.terminate(&mut next, SessionStatus::Abandoned);
                Ok(next)
            }
        }
    }

    /// Convert a terminal session into its result.
    pub fn finalize(&self, session: &Session) -> Result<AssessmentResult, SessionError> {
        scoring::finalize(session)
    }

    fn estimator(&self, session: &Session) -> Box<dyn AbilityEstimator> {
        estimator_for(&session.config.estimation)
    }

    fn administer_next(&self, session: &mut Session) {
        let theta = session.ability.theta;
        let next = {
            let config = &session.config;
            let selector = ItemSelector::new(
                &self.bank,
                &config.selection,
                &config.estimation,
                config.termination.max_items,
            );
            let administered: HashSet<&str> = session
                .administered
                .iter()
                .map(|a| a.item_id.as_str())
                .collect();
            selector
                .select(theta, &administered, &session.category_counts())
                .map(|selection| AdministeredItem {
                    item_id: selection.item.id.clone(),
                    category: selection.item.category,
                    difficulty: selection.item.difficulty,
                    params: selection.item.params,
                    theta_at_selection: theta,
                    information: selection.information,
                })
        };

        match next {
            Ok(item) => session.administered.push(item),
            Err(exhausted) => {
                tracing::debug!(session = %session.id, "{exhausted}");
                self.terminate(session, SessionStatus::CompletedBySelectionExhausted);
            }
        }
    }

    fn terminate(&self, session: &mut Session, status: SessionStatus) {
        // An unanswered item stays in `administered` without a response.
        session.status = status;
        tracing::debug!(
            session = %session.id,
            %status,
            items = session.responses.len(),
            theta = session.ability.theta,
            se = session.ability.se,
            "session terminated"
        );
    }
}
