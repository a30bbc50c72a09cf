//! Terminal session to assessment result.
//!
//! `finalize` is a pure function of the session value. The ability path is
//! rebuilt by replaying the configured estimator over the recorded
//! responses, so every number in the result is reconstructible from the
//! session's item and response history alone.

use std::collections::BTreeMap;

use crate::config::{EstimationConfig, ScoringConfig};
use crate::error::SessionError;
use crate::estimator::{self, AbilityEstimate, Observation};
use crate::irt;
use crate::model::{Category, IrtParams};
use crate::report::{
    AssessmentResult, CategoryScore, ConfidenceInterval, InformationPoint, IqBand,
    ProgressionPoint, Reliability,
};
use crate::session::Session;
use crate::statistics::{self, normal_cdf, spearman_brown, z_for_confidence};

/// IQ scale mean and standard deviation.
pub const IQ_MEAN: f64 = 100.0;
pub const IQ_SD: f64 = 15.0;

/// Spacing of the reported test information curve.
const CURVE_STEP: f64 = 0.5;

/// Score a terminal session.
pub fn finalize(session: &Session) -> Result<AssessmentResult, SessionError> {
    if !session.is_terminal() {
        return Err(SessionError::NotTerminal {
            status: session.status,
        });
    }
    session.config.validate()?;

    let config = &session.config;
    let observations = session.observations();
    let path = estimator::replay(&config.estimation, &observations);
    let ability = path
        .last()
        .copied()
        .unwrap_or_else(|| AbilityEstimate::initial(&config.estimation));

    let (iq, confidence_interval) = iq_with_interval(ability, &config.scoring);
    let progression = session
        .administered
        .iter()
        .zip(&session.responses)
        .zip(&path)
        .enumerate()
        .map(|(i, ((item, response), estimate))| ProgressionPoint {
            index: i + 1,
            item_id: item.item_id.clone(),
            category: item.category,
            difficulty: item.params.b,
            theta_before: item.theta_at_selection,
            theta: estimate.theta,
            se: estimate.se,
            information: item.information,
            correct: response.correct,
        })
        .collect();

    let latencies: Vec<f64> = session
        .responses
        .iter()
        .map(|r| r.latency_ms as f64)
        .collect();

    tracing::debug!(session = %session.id, theta = ability.theta, se = ability.se, iq, "finalized");

    Ok(AssessmentResult {
        session_id: session.id,
        bank_id: session.bank_id.clone(),
        locale: session.locale.clone(),
        status: session.status,
        method: config.estimation.method,
        theta: ability.theta,
        se: ability.se,
        iq,
        iq_band: IqBand::from_iq(iq),
        percentile: normal_cdf(ability.theta) * 100.0,
        confidence_interval,
        category_scores: category_scores(session),
        reliability: reliability(&observations, ability, &config.estimation),
        progression,
        information_curve: information_curve(&observations, &config.estimation),
        items_answered: session.responses.len(),
        total_correct: session.correct_count(),
        mean_latency_ms: statistics::mean(&latencies),
        elapsed_ms: session.elapsed_ms,
    })
}

fn iq_with_interval(ability: AbilityEstimate, scoring: &ScoringConfig) -> (f64, ConfidenceInterval) {
    let clamp = |v: f64| v.clamp(scoring.iq_min, scoring.iq_max);
    let raw = IQ_MEAN + IQ_SD * ability.theta;
    let half_width = z_for_confidence(scoring.confidence_level) * IQ_SD * ability.se;
    (
        clamp(raw),
        ConfidenceInterval {
            level: scoring.confidence_level,
            lower: clamp(raw - half_width),
            upper: clamp(raw + half_width),
        },
    )
}

/// Accuracy per category over answered items. Every category appears; one
/// with nothing answered has no accuracy rather than zero.
fn category_scores(session: &Session) -> BTreeMap<Category, CategoryScore> {
    let mut scores: BTreeMap<Category, CategoryScore> = Category::ALL
        .iter()
        .map(|&c| {
            (
                c,
                CategoryScore {
                    administered: 0,
                    correct: 0,
                    accuracy: None,
                },
            )
        })
        .collect();

    for (item, response) in session.administered.iter().zip(&session.responses) {
        if let Some(score) = scores.get_mut(&item.category) {
            score.administered += 1;
            score.correct += usize::from(response.correct);
        }
    }
    for score in scores.values_mut() {
        if score.administered > 0 {
            score.accuracy = Some(100.0 * score.correct as f64 / score.administered as f64);
        }
    }
    scores
}

/// Split-half and marginal reliability.
///
/// The split-half value comes from the responses themselves. Odd and even
/// positions are scored separately with the session's estimator; for
/// parallel halves `(theta_odd - theta_even)^2 / 2` estimates the error
/// variance of one half, so `1 - that / prior_var` is the half-length
/// reliability, stepped up to full length with Spearman-Brown. Cronbach's
/// alpha is not reported: it needs many respondents on one fixed form, and
/// an adaptive session is a single respondent on its own form.
fn reliability(
    observations: &[Observation],
    ability: AbilityEstimate,
    estimation: &EstimationConfig,
) -> Reliability {
    let prior_var = estimation.prior_sd.powi(2);

    let internal_consistency = (observations.len() >= 2).then(|| {
        let half_theta = |parity: usize| {
            let half: Vec<Observation> = observations
                .iter()
                .enumerate()
                .filter(|(i, _)| i % 2 == parity)
                .map(|(_, o)| *o)
                .collect();
            estimator::replay(estimation, &half)
                .last()
                .map_or(estimation.prior_mean, |e| e.theta)
        };
        let half_error = (half_theta(0) - half_theta(1)).powi(2) / 2.0;
        spearman_brown((1.0 - half_error / prior_var).clamp(0.0, 1.0))
    });

    Reliability {
        internal_consistency,
        marginal: (1.0 - ability.se.powi(2) / prior_var).clamp(0.0, 1.0),
        precision: 1.0 / ability.se,
    }
}

fn information_curve(observations: &[Observation], estimation: &EstimationConfig) -> Vec<InformationPoint> {
    let params: Vec<IrtParams> = observations.iter().map(|o| o.params).collect();
    let steps = ((estimation.ability_max - estimation.ability_min) / CURVE_STEP).floor() as usize;
    (0..=steps)
        .map(|i| {
            let theta = estimation.ability_min + i as f64 * CURVE_STEP;
            InformationPoint {
                theta,
                information: irt::test_information(params.iter(), theta),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssessmentConfig;
    use crate::model::{AdministeredItem, Answer, Response};
    use crate::session::SessionStatus;

    fn session(pattern: &[(Category, f64, bool)]) -> Session {
        let config = AssessmentConfig::default();
        let mut s = Session::new("bank", "en", config.clone());
        s.status = SessionStatus::CompletedByItemLimit;
        let observations: Vec<Observation> = pattern
            .iter()
            .map(|&(_, b, correct)| Observation {
                params: IrtParams::new(1.2, b, 0.25),
                correct,
            })
            .collect();
        let path = estimator::replay(&config.estimation, &observations);
        let mut theta = 0.0;
        for (i, &(category, b, correct)) in pattern.iter().enumerate() {
            let params = IrtParams::new(1.2, b, 0.25);
            s.administered.push(AdministeredItem {
                item_id: format!("i{i}"),
                category,
                difficulty: 5,
                params,
                theta_at_selection: theta,
                information: irt::information(&params, theta),
            });
            s.responses.push(Response {
                item_id: format!("i{i}"),
                answer: Answer::Chosen {
                    option: if correct { 1 } else { 0 },
                },
                correct,
                latency_ms: 1000 * (i as u64 + 1),
                theta_at_selection: theta,
            });
            s.elapsed_ms += 1000 * (i as u64 + 1);
            theta = path[i].theta;
        }
        if let Some(last) = path.last() {
            s.ability = *last;
        }
        s
    }

    fn mixed() -> Session {
        session(&[
            (Category::PatternRecognition, 0.0, true),
            (Category::SpatialReasoning, 0.4, true),
            (Category::PatternRecognition, 0.8, false),
            (Category::LogicalDeduction, 0.5, true),
            (Category::SpatialReasoning, 0.7, false),
            (Category::PatternRecognition, 0.6, true),
        ])
    }

    #[test]
    fn rejects_in_progress_session() {
        let mut s = mixed();
        s.status = SessionStatus::InProgress;
        assert_eq!(
            finalize(&s).unwrap_err(),
            SessionError::NotTerminal {
                status: SessionStatus::InProgress
            }
        );
    }

    #[test]
    fn inconsistent_snapshot_is_an_error() {
        let mut s = mixed();
        s.config.scoring.iq_min = 200.0;
        s.config.scoring.iq_max = 40.0;
        let json = serde_json::to_string(&s).unwrap();
        let reloaded: Session = serde_json::from_str(&json).unwrap();

        match finalize(&reloaded).unwrap_err() {
            SessionError::InvalidConfig(e) => assert_eq!(e.field, "scoring.iq_min"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn finalize_is_idempotent() {
        let s = mixed();
        let first = finalize(&s).unwrap();
        let second = finalize(&s).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn final_estimate_matches_session() {
        let s = mixed();
        let result = finalize(&s).unwrap();
        assert_eq!(result.theta, s.ability.theta);
        assert_eq!(result.se, s.ability.se);
        assert!((result.iq - (100.0 + 15.0 * result.theta)).abs() < 1e-9);
        assert!((result.reliability.precision - 1.0 / result.se).abs() < 1e-12);
    }

    #[test]
    fn interval_brackets_iq() {
        let result = finalize(&mixed()).unwrap();
        let ci = result.confidence_interval;
        assert!(ci.lower < result.iq && result.iq < ci.upper);
        let expected = 1.959964 * 15.0 * result.se;
        assert!((ci.upper - result.iq - expected).abs() < 1e-3);
    }

    #[test]
    fn iq_is_clamped_to_display_range() {
        let mut s = mixed();
        s.config.scoring.iq_max = 101.0;
        let result = finalize(&s).unwrap();
        assert!(result.iq <= 101.0);
        assert!(result.confidence_interval.upper <= 101.0);
    }

    #[test]
    fn unanswered_categories_are_undefined() {
        let result = finalize(&mixed()).unwrap();
        let scores = &result.category_scores;
        assert_eq!(scores.len(), 5);
        assert_eq!(scores[&Category::NumericalReasoning].accuracy, None);
        assert_eq!(scores[&Category::ShortTermMemory].administered, 0);
        let pattern = scores[&Category::PatternRecognition];
        assert_eq!((pattern.administered, pattern.correct), (3, 2));
        assert!((pattern.accuracy.unwrap() - 66.666_666).abs() < 1e-4);
        assert_eq!(scores[&Category::LogicalDeduction].accuracy, Some(100.0));
    }

    #[test]
    fn progression_has_one_point_per_response() {
        let s = mixed();
        let result = finalize(&s).unwrap();
        assert_eq!(result.progression.len(), 6);
        assert_eq!(result.progression[0].index, 1);
        assert_eq!(result.progression[2].difficulty, 0.8);
        assert!(!result.progression[2].correct);
        assert_eq!(result.progression.last().unwrap().theta, result.theta);
        assert_eq!(result.total_correct, 4);
        assert_eq!(result.mean_latency_ms, Some(3500.0));
    }

    #[test]
    fn reliability_is_bounded() {
        let result = finalize(&mixed()).unwrap();
        let r = result.reliability;
        let split = r.internal_consistency.unwrap();
        assert!(split > 0.0 && split < 1.0);
        assert!((0.0..=1.0).contains(&r.marginal));
    }

    #[test]
    fn split_half_reads_the_response_pattern() {
        let category = Category::LogicalDeduction;
        // Same items and the same number correct, so the same final theta;
        // only the order of the responses differs.
        let scored = |pattern: [bool; 4]| {
            let items: Vec<_> = pattern.iter().map(|&correct| (category, 0.0, correct)).collect();
            finalize(&session(&items)).unwrap()
        };
        let agreeing = scored([true, true, false, false]);
        let split = scored([true, false, true, false]);
        assert!((agreeing.theta - split.theta).abs() < 1e-9);
        assert!((agreeing.reliability.marginal - split.reliability.marginal).abs() < 1e-9);

        let agreeing = agreeing.reliability.internal_consistency.unwrap();
        let split = split.reliability.internal_consistency.unwrap();
        assert!((agreeing - 1.0).abs() < 1e-12, "agreeing={agreeing}");
        assert!(split < 0.5, "split={split}");
    }

    #[test]
    fn empty_abandoned_session_scores_at_prior() {
        let mut s = session(&[]);
        s.status = SessionStatus::Abandoned;
        let result = finalize(&s).unwrap();
        assert_eq!(result.theta, 0.0);
        assert_eq!(result.se, 1.0);
        assert_eq!(result.iq, 100.0);
        assert!((result.percentile - 50.0).abs() < 1e-6);
        assert_eq!(result.reliability.internal_consistency, None);
        assert_eq!(result.reliability.marginal, 0.0);
        assert_eq!(result.mean_latency_ms, None);
        assert!(result.category_scores.values().all(|s| s.accuracy.is_none()));
    }

    #[test]
    fn information_curve_spans_ability_range() {
        let result = finalize(&mixed()).unwrap();
        let curve = &result.information_curve;
        assert_eq!(curve.len(), 17);
        assert_eq!(curve[0].theta, -4.0);
        assert_eq!(curve[16].theta, 4.0);
        let peak = curve
            .iter()
            .max_by(|a, b| a.information.total_cmp(&b.information))
            .unwrap();
        assert!(peak.theta > -0.5 && peak.theta < 1.5);
    }
}
