//! Running ability estimation.
//!
//! Two estimators share one contract: given the previous estimate and the
//! full scored history (the newest response last), produce the next
//! estimate. Both are deterministic, so replaying a history reproduces
//! every intermediate estimate exactly.

use serde::{Deserialize, Serialize};

use crate::config::{EstimationConfig, EstimationMethod};
use crate::irt;
use crate::model::IrtParams;

/// SE is never reported below this value.
pub const MIN_STANDARD_ERROR: f64 = 1e-4;

/// Largest Newton step taken in a single iteration.
const MAX_NEWTON_STEP: f64 = 1.0;

/// Current ability estimate and its standard error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbilityEstimate {
    pub theta: f64,
    pub se: f64,
}

impl AbilityEstimate {
    /// The estimate a session starts from, before any response.
    pub fn initial(config: &EstimationConfig) -> Self {
        Self {
            theta: config.clamp(config.prior_mean),
            se: config.starting_se().max(MIN_STANDARD_ERROR),
        }
    }
}

/// A scored response against a calibrated item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub params: IrtParams,
    pub correct: bool,
}

/// Updates theta and SE after each response.
pub trait AbilityEstimator: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Re-estimate ability from the whole history. `observations` must be
    /// non-empty; the last entry is the response just recorded.
    fn update(&self, previous: AbilityEstimate, observations: &[Observation]) -> AbilityEstimate;
}

/// Build the estimator selected by the configuration.
pub fn estimator_for(config: &EstimationConfig) -> Box<dyn AbilityEstimator> {
    match config.method {
        EstimationMethod::Eap => Box::new(EapEstimator::new(config.clone())),
        EstimationMethod::Mle => Box::new(MleEstimator::new(config.clone())),
    }
}

/// Replay a history, returning the estimate after each response.
pub fn replay(config: &EstimationConfig, observations: &[Observation]) -> Vec<AbilityEstimate> {
    let estimator = estimator_for(config);
    let mut current = AbilityEstimate::initial(config);
    (1..=observations.len())
        .map(|n| {
            current = estimator.update(current, &observations[..n]);
            current
        })
        .collect()
}

/// Move theta a fixed increment toward the last response, within range.
fn bounded_step(config: &EstimationConfig, previous: AbilityEstimate, correct: bool) -> f64 {
    let delta = if correct {
        config.step_size
    } else {
        -config.step_size
    };
    config.clamp(previous.theta + delta)
}

/// A correct response never lowers theta; an incorrect one never raises it.
fn directional_guard(previous: f64, candidate: f64, correct: bool) -> f64 {
    if correct {
        candidate.max(previous)
    } else {
        candidate.min(previous)
    }
}

fn information_se(observations: &[Observation], theta: f64) -> Option<f64> {
    let info = irt::test_information(observations.iter().map(|o| &o.params), theta);
    let se = 1.0 / info.sqrt();
    se.is_finite().then(|| se.max(MIN_STANDARD_ERROR))
}

// ---------------------------------------------------------------------------
// Maximum likelihood
// ---------------------------------------------------------------------------

/// Maximum likelihood via Fisher scoring.
///
/// Until the history holds both a correct and an incorrect response the
/// likelihood is monotone and has no interior maximum; theta then moves by
/// a fixed step instead. Divergence or non-convergence falls back to the
/// same step. SE is `1/sqrt(sum I)`, never above the starting SE.
pub struct MleEstimator {
    config: EstimationConfig,
}

impl MleEstimator {
    pub fn new(config: EstimationConfig) -> Self {
        Self { config }
    }

    fn newton(&self, start: f64, observations: &[Observation]) -> Option<f64> {
        let mut theta = start;
        for iteration in 0..self.config.max_iterations {
            let (gradient, info) = observations.iter().fold((0.0, 0.0), |(g, i), o| {
                (
                    g + irt::score(&o.params, o.correct, theta),
                    i + irt::information(&o.params, theta),
                )
            });
            if !(info.is_finite() && info > f64::EPSILON) || !gradient.is_finite() {
                return None;
            }

            let step = (gradient / info).clamp(-MAX_NEWTON_STEP, MAX_NEWTON_STEP);
            theta = self.config.clamp(theta + step);
            if !theta.is_finite() {
                return None;
            }
            if step.abs() < self.config.convergence_tolerance {
                tracing::trace!(iteration, theta, "newton converged");
                return Some(theta);
            }
        }
        None
    }
}

impl AbilityEstimator for MleEstimator {
    fn name(&self) -> &'static str {
        "mle"
    }

    fn update(&self, previous: AbilityEstimate, observations: &[Observation]) -> AbilityEstimate {
        let Some(last) = observations.last() else {
            return previous;
        };

        let mixed = observations.iter().any(|o| o.correct)
            && observations.iter().any(|o| !o.correct);

        let candidate = if mixed {
            match self.newton(previous.theta, observations) {
                Some(theta) => theta,
                None => {
                    tracing::warn!(
                        responses = observations.len(),
                        "maximum likelihood did not converge; taking bounded step"
                    );
                    bounded_step(&self.config, previous, last.correct)
                }
            }
        } else {
            bounded_step(&self.config, previous, last.correct)
        };

        let theta = directional_guard(previous.theta, candidate, last.correct);
        let se = information_se(observations, theta)
            .unwrap_or(previous.se)
            .min(self.config.starting_se());
        AbilityEstimate { theta, se }
    }
}

// ---------------------------------------------------------------------------
// Expected a posteriori
// ---------------------------------------------------------------------------

/// Posterior mean and SD under a normal prior, integrated over an evenly
/// spaced grid spanning the ability range.
pub struct EapEstimator {
    config: EstimationConfig,
    nodes: Vec<f64>,
    log_prior: Vec<f64>,
}

impl EapEstimator {
    pub fn new(config: EstimationConfig) -> Self {
        let n = config.quadrature_points.max(3);
        let width = config.ability_max - config.ability_min;
        let nodes: Vec<f64> = (0..n)
            .map(|i| config.ability_min + width * i as f64 / (n - 1) as f64)
            .collect();
        let log_prior = nodes
            .iter()
            .map(|&t| {
                let z = (t - config.prior_mean) / config.prior_sd;
                -0.5 * z * z
            })
            .collect();
        Self {
            config,
            nodes,
            log_prior,
        }
    }

    /// Posterior mean and SD, or `None` if the posterior degenerated.
    fn posterior_moments(&self, observations: &[Observation]) -> Option<(f64, f64)> {
        let log_posterior: Vec<f64> = self
            .nodes
            .iter()
            .zip(&self.log_prior)
            .map(|(&theta, &prior)| {
                prior
                    + observations
                        .iter()
                        .map(|o| irt::log_likelihood(&o.params, o.correct, theta))
                        .sum::<f64>()
            })
            .collect();

        let max = log_posterior
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return None;
        }

        let weights: Vec<f64> = log_posterior.iter().map(|lp| (lp - max).exp()).collect();
        let total: f64 = weights.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return None;
        }

        let mean = self
            .nodes
            .iter()
            .zip(&weights)
            .map(|(t, w)| t * w)
            .sum::<f64>()
            / total;
        let variance = self
            .nodes
            .iter()
            .zip(&weights)
            .map(|(t, w)| (t - mean).powi(2) * w)
            .sum::<f64>()
            / total;

        (mean.is_finite() && variance.is_finite()).then(|| (mean, variance.max(0.0).sqrt()))
    }
}

impl AbilityEstimator for EapEstimator {
    fn name(&self) -> &'static str {
        "eap"
    }

    fn update(&self, previous: AbilityEstimate, observations: &[Observation]) -> AbilityEstimate {
        let Some(last) = observations.last() else {
            return previous;
        };

        match self.posterior_moments(observations) {
            Some((mean, sd)) => AbilityEstimate {
                theta: directional_guard(previous.theta, self.config.clamp(mean), last.correct),
                se: sd.max(MIN_STANDARD_ERROR),
            },
            None => {
                tracing::warn!(
                    responses = observations.len(),
                    "posterior degenerated; taking bounded step"
                );
                let theta = bounded_step(&self.config, previous, last.correct);
                AbilityEstimate {
                    theta,
                    se: information_se(observations, theta).unwrap_or(previous.se),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(b: f64, correct: bool) -> Observation {
        Observation {
            params: IrtParams::new(1.0, b, 0.25),
            correct,
        }
    }

    fn config(method: EstimationMethod) -> EstimationConfig {
        EstimationConfig {
            method,
            ..EstimationConfig::default()
        }
    }

    #[test]
    fn eap_all_correct_moves_up_and_tightens() {
        let cfg = config(EstimationMethod::Eap);
        let history: Vec<_> = [-1.0, -0.5, 0.0, 0.5, 1.0]
            .iter()
            .map(|&b| obs(b, true))
            .collect();
        let path = replay(&cfg, &history);
        let last = path.last().unwrap();
        assert!(last.theta > 0.5, "theta={}", last.theta);
        assert!(last.se < cfg.starting_se(), "se={}", last.se);
        assert!(path.windows(2).all(|w| w[1].theta >= w[0].theta));
    }

    #[test]
    fn mle_starts_wide_and_all_correct_still_tightens() {
        let cfg = config(EstimationMethod::Mle);
        let start = AbilityEstimate::initial(&cfg);
        assert_eq!(start.se, cfg.ability_max - cfg.ability_min);

        let history: Vec<_> = [-1.0, -0.5, 0.0, 0.5, 1.0]
            .iter()
            .map(|&b| obs(b, true))
            .collect();
        let path = replay(&cfg, &history);
        assert!(path.iter().all(|e| e.se < start.se));
        assert!(path.last().unwrap().theta > 0.0);
    }

    #[test]
    fn mle_se_never_exceeds_starting_se() {
        let mut cfg = config(EstimationMethod::Mle);
        cfg.initial_se = Some(1.5);
        // A far-off item carries almost no information at theta 0.7.
        let est = MleEstimator::new(cfg.clone());
        let one = est.update(AbilityEstimate::initial(&cfg), &[obs(-3.9, true)]);
        assert_eq!(one.se, 1.5);
    }

    #[test]
    fn eap_all_incorrect_moves_down() {
        let cfg = config(EstimationMethod::Eap);
        let history: Vec<_> = (0..4).map(|i| obs(i as f64 * 0.3, false)).collect();
        let last = *replay(&cfg, &history).last().unwrap();
        assert!(last.theta < 0.0);
        assert!(last.theta >= cfg.ability_min);
    }

    #[test]
    fn mle_steps_until_mixed_pattern() {
        let cfg = config(EstimationMethod::Mle);
        let est = MleEstimator::new(cfg.clone());
        let start = AbilityEstimate::initial(&cfg);

        let one = est.update(start, &[obs(0.0, true)]);
        assert!((one.theta - 0.7).abs() < 1e-12);

        let history: Vec<_> = (0..10).map(|_| obs(0.0, true)).collect();
        let capped = replay(&cfg, &history);
        assert_eq!(capped.last().unwrap().theta, cfg.ability_max);
    }

    #[test]
    fn mle_converges_on_mixed_pattern() {
        let cfg = config(EstimationMethod::Mle);
        let history = vec![
            obs(-1.0, true),
            obs(-0.5, true),
            obs(0.0, true),
            obs(0.5, false),
            obs(1.0, false),
            obs(0.25, true),
            obs(0.75, false),
        ];
        let path = replay(&cfg, &history);
        let last = path.last().unwrap();
        assert!(last.theta > -1.0 && last.theta < 1.5, "theta={}", last.theta);
        let info = irt::test_information(history.iter().map(|o| &o.params), last.theta);
        assert!((last.se - 1.0 / info.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn responses_never_move_theta_the_wrong_way() {
        for method in [EstimationMethod::Eap, EstimationMethod::Mle] {
            let cfg = config(method);
            let estimator = estimator_for(&cfg);
            let pattern = [true, false, false, true, true, false, true, false, true, true];
            let mut history = Vec::new();
            let mut current = AbilityEstimate::initial(&cfg);
            for (i, &correct) in pattern.iter().enumerate() {
                history.push(obs((i as f64 - 5.0) * 0.4, correct));
                let next = estimator.update(current, &history);
                if correct {
                    assert!(next.theta >= current.theta, "{method}: step {i}");
                } else {
                    assert!(next.theta <= current.theta, "{method}: step {i}");
                }
                current = next;
            }
        }
    }

    #[test]
    fn se_is_always_positive_and_finite() {
        for method in [EstimationMethod::Eap, EstimationMethod::Mle] {
            let cfg = config(method);
            let history: Vec<_> = (0..30).map(|i| obs(-3.0 + i as f64 * 0.2, i % 3 != 0)).collect();
            for est in replay(&cfg, &history) {
                assert!(est.se.is_finite() && est.se >= MIN_STANDARD_ERROR);
                assert!(est.theta.is_finite());
            }
        }
    }

    #[test]
    fn extreme_items_do_not_produce_nan() {
        let cfg = config(EstimationMethod::Mle);
        let history = vec![
            Observation {
                params: IrtParams::new(60.0, 3.9, 0.0),
                correct: true,
            },
            Observation {
                params: IrtParams::new(60.0, -3.9, 0.0),
                correct: false,
            },
        ];
        let last = *replay(&cfg, &history).last().unwrap();
        assert!(last.theta.is_finite() && last.se.is_finite());
        assert!((cfg.ability_min..=cfg.ability_max).contains(&last.theta));
    }

    #[test]
    fn empty_history_keeps_previous_estimate() {
        let cfg = config(EstimationMethod::Eap);
        let start = AbilityEstimate::initial(&cfg);
        assert_eq!(estimator_for(&cfg).update(start, &[]), start);
    }
}
