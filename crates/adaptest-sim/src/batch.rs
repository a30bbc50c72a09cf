//! Drive sessions to completion and summarize estimation accuracy.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use adaptest_core::config::EstimationMethod;
use adaptest_core::engine::AdaptiveEngine;
use adaptest_core::session::Session;
use adaptest_core::statistics::{mean, root_mean_square};

use crate::respondent::{Respondent, SimulatedRespondent};

/// Run one session from start to a terminal state.
pub fn run_session(engine: &AdaptiveEngine, respondent: &mut dyn Respondent) -> Result<Session> {
    let mut session = engine.start_session();
    while !session.is_terminal() {
        let Some(item) = engine.current_item(&session) else {
            bail!("session {} is in progress with no pending item", session.id);
        };
        let (answer, latency_ms) = respondent.respond(item);
        session = engine.submit_response(&session, answer, latency_ms)?;
    }
    Ok(session)
}

/// Which abilities to simulate and how often.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationPlan {
    pub true_thetas: Vec<f64>,
    pub replications: usize,
    pub seed: u64,
}

impl Default for SimulationPlan {
    fn default() -> Self {
        Self {
            true_thetas: vec![-2.0, -1.0, 0.0, 1.0, 2.0],
            replications: 100,
            seed: 42,
        }
    }
}

/// Recovery statistics at one true ability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThetaSummary {
    pub true_theta: f64,
    pub replications: usize,
    pub mean_estimate: f64,
    pub bias: f64,
    pub rmse: f64,
    pub mean_items: f64,
    pub mean_se: f64,
    /// Sessions per terminal status.
    pub status_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub bank_id: String,
    pub method: EstimationMethod,
    pub seed: u64,
    pub summaries: Vec<ThetaSummary>,
}

impl SimulationReport {
    /// RMSE pooled over every simulated session.
    pub fn overall_rmse(&self) -> f64 {
        let (sq, n) = self.summaries.iter().fold((0.0, 0usize), |(sq, n), s| {
            (sq + s.rmse.powi(2) * s.replications as f64, n + s.replications)
        });
        if n == 0 {
            0.0
        } else {
            (sq / n as f64).sqrt()
        }
    }
}

/// Seed for one replication, distinct per (theta, replication) pair.
fn task_seed(seed: u64, theta_index: usize, replication: usize) -> u64 {
    seed.wrapping_add(theta_index as u64 * 10_000)
        .wrapping_add(replication as u64)
}

/// Simulate every (theta, replication) pair in `plan`.
pub fn simulate_batch(engine: &AdaptiveEngine, plan: &SimulationPlan) -> Result<SimulationReport> {
    simulate_batch_with(engine, plan, |_, _| Ok(()))
}

/// Like [`simulate_batch`], handing each finished session to `observer`
/// together with the true ability it was simulated at.
pub fn simulate_batch_with<F>(
    engine: &AdaptiveEngine,
    plan: &SimulationPlan,
    mut observer: F,
) -> Result<SimulationReport>
where
    F: FnMut(f64, &Session) -> Result<()>,
{
    if plan.replications == 0 {
        bail!("replications must be at least 1");
    }

    let mut summaries = Vec::with_capacity(plan.true_thetas.len());
    for (t, &true_theta) in plan.true_thetas.iter().enumerate() {
        let mut estimates = Vec::with_capacity(plan.replications);
        let mut errors = Vec::with_capacity(plan.replications);
        let mut items = Vec::with_capacity(plan.replications);
        let mut ses = Vec::with_capacity(plan.replications);
        let mut status_counts = BTreeMap::new();

        for rep in 0..plan.replications {
            let mut respondent = SimulatedRespondent::new(true_theta, task_seed(plan.seed, t, rep));
            let session = run_session(engine, &mut respondent)?;
            observer(true_theta, &session)?;

            estimates.push(session.ability.theta);
            errors.push(session.ability.theta - true_theta);
            items.push(session.responses.len() as f64);
            ses.push(session.ability.se);
            *status_counts.entry(session.status.to_string()).or_insert(0) += 1;
        }

        let mean_estimate = mean(&estimates).unwrap_or(f64::NAN);
        let summary = ThetaSummary {
            true_theta,
            replications: plan.replications,
            mean_estimate,
            bias: mean_estimate - true_theta,
            rmse: root_mean_square(&errors).unwrap_or(f64::NAN),
            mean_items: mean(&items).unwrap_or(0.0),
            mean_se: mean(&ses).unwrap_or(f64::NAN),
            status_counts,
        };
        tracing::info!(
            true_theta,
            bias = summary.bias,
            rmse = summary.rmse,
            mean_items = summary.mean_items,
            "simulated ability level"
        );
        summaries.push(summary);
    }

    Ok(SimulationReport {
        bank_id: engine.bank().id().to_string(),
        method: engine.config().estimation.method,
        seed: plan.seed,
        summaries,
    })
}
