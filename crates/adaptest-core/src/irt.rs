//! Three-parameter logistic (3PL) response model.
//!
//! `P(correct | theta) = c + (1 - c) / (1 + exp(-a (theta - b)))`
//!
//! All functions are pure and total: the logistic is evaluated in the
//! branch that cannot overflow, and probabilities are clamped away from 0
//! and 1 before they are divided by or logged.

use crate::model::IrtParams;

/// Probabilities are kept inside `[PROBABILITY_FLOOR, 1 - PROBABILITY_FLOOR]`
/// wherever they appear in a denominator or a logarithm.
pub const PROBABILITY_FLOOR: f64 = 1e-10;

/// Numerically stable logistic function.
#[inline]
pub fn logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let exp_x = x.exp();
        exp_x / (1.0 + exp_x)
    }
}

#[inline]
fn clip(p: f64) -> f64 {
    p.clamp(PROBABILITY_FLOOR, 1.0 - PROBABILITY_FLOOR)
}

/// Probability of a correct response at ability `theta`.
#[inline]
pub fn probability(params: &IrtParams, theta: f64) -> f64 {
    let p_star = logistic(params.a * (theta - params.b));
    params.c + (1.0 - params.c) * p_star
}

/// Fisher information of the item at `theta`.
///
/// `I = a^2 (P - c)^2 (1 - P) / ((1 - c)^2 P)`
#[inline]
pub fn information(params: &IrtParams, theta: f64) -> f64 {
    let p = clip(probability(params, theta));
    let one_minus_c = 1.0 - params.c;
    let numerator = params.a * params.a * (p - params.c).powi(2) * (1.0 - p);
    (numerator / (one_minus_c * one_minus_c * p)).max(0.0)
}

/// Summed information of a set of items at `theta`.
pub fn test_information<'a, I>(params: I, theta: f64) -> f64
where
    I: IntoIterator<Item = &'a IrtParams>,
{
    params.into_iter().map(|p| information(p, theta)).sum()
}

/// Log-likelihood of one scored response.
#[inline]
pub fn log_likelihood(params: &IrtParams, correct: bool, theta: f64) -> f64 {
    let p = clip(probability(params, theta));
    if correct {
        p.ln()
    } else {
        (1.0 - p).ln()
    }
}

/// First derivative of the response log-likelihood with respect to theta.
///
/// `a (u - P)(P - c) / (P (1 - c))`
#[inline]
pub fn score(params: &IrtParams, correct: bool, theta: f64) -> f64 {
    let p = clip(probability(params, theta));
    let u = if correct { 1.0 } else { 0.0 };
    params.a * (u - p) * (p - params.c) / (p * (1.0 - params.c))
}

/// Ability at which the item's information peaks.
///
/// `b + ln((1 + sqrt(1 + 8c)) / 2) / a`; equal to `b` when `c = 0`.
pub fn peak_information_theta(params: &IrtParams) -> f64 {
    params.b + ((1.0 + (1.0 + 8.0 * params.c).sqrt()) / 2.0).ln() / params.a
}
