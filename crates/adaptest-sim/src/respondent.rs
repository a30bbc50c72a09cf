//! Test-takers that answer items the way a UI layer would report them.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use adaptest_core::irt;
use adaptest_core::model::{Answer, Item};

/// Answers the pending item, returning the answer and its latency.
pub trait Respondent {
    fn respond(&mut self, item: &Item) -> (Answer, u64);
}

/// Any option other than the keyed one, or a timeout for single-option items.
fn wrong_answer(item: &Item, pick: usize) -> Answer {
    let options = item.content.options.len();
    if options < 2 {
        return Answer::TimedOut;
    }
    let offset = 1 + pick % (options - 1);
    Answer::Chosen {
        option: (item.correct_option + offset) % options,
    }
}

/// Answers correctly with the 3PL probability at a fixed true ability.
pub struct SimulatedRespondent {
    true_theta: f64,
    rng: StdRng,
    latency_ms: (u64, u64),
}

impl SimulatedRespondent {
    pub fn new(true_theta: f64, seed: u64) -> Self {
        Self {
            true_theta,
            rng: StdRng::seed_from_u64(seed),
            latency_ms: (2_000, 20_000),
        }
    }

    /// Draw latencies uniformly from `[min, max]` milliseconds.
    pub fn with_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.latency_ms = (min_ms.min(max_ms), max_ms.max(min_ms));
        self
    }

    pub fn true_theta(&self) -> f64 {
        self.true_theta
    }
}

impl Respondent for SimulatedRespondent {
    fn respond(&mut self, item: &Item) -> (Answer, u64) {
        let p = irt::probability(&item.params, self.true_theta);
        let answer = if self.rng.random::<f64>() < p {
            Answer::Chosen {
                option: item.correct_option,
            }
        } else {
            let pick = self.rng.random_range(0..usize::MAX);
            wrong_answer(item, pick)
        };
        let (min, max) = self.latency_ms;
        (answer, self.rng.random_range(min..=max))
    }
}

/// Replays a fixed correct/incorrect pattern, then times out.
pub struct ScriptedRespondent {
    pattern: Vec<bool>,
    position: usize,
    latency_ms: u64,
}

impl ScriptedRespondent {
    pub fn new(pattern: impl Into<Vec<bool>>) -> Self {
        Self {
            pattern: pattern.into(),
            position: 0,
            latency_ms: 5_000,
        }
    }

    pub fn all_correct(n: usize) -> Self {
        Self::new(vec![true; n])
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

impl Respondent for ScriptedRespondent {
    fn respond(&mut self, item: &Item) -> (Answer, u64) {
        let next = self.pattern.get(self.position).copied();
        self.position += 1;
        let answer = match next {
            Some(true) => Answer::Chosen {
                option: item.correct_option,
            },
            Some(false) => wrong_answer(item, 0),
            None => Answer::TimedOut,
        };
        (answer, self.latency_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptest_core::model::{Category, IrtParams, ItemContent, UsageStats};

    fn item(b: f64) -> Item {
        Item {
            id: "x".into(),
            category: Category::NumericalReasoning,
            difficulty: 5,
            params: IrtParams::new(1.5, b, 0.25),
            correct_option: 2,
            time_limit_secs: None,
            usage: UsageStats::default(),
            content: ItemContent {
                locale: "en".into(),
                prompt: "2 + 2".into(),
                options: vec!["3".into(), "5".into(), "4".into(), "22".into()],
                explanation: String::new(),
            },
        }
    }

    #[test]
    fn wrong_answer_never_hits_key() {
        let it = item(0.0);
        for pick in 0..20 {
            match wrong_answer(&it, pick) {
                Answer::Chosen { option } => {
                    assert_ne!(option, 2);
                    assert!(option < 4);
                }
                Answer::TimedOut => panic!("four options should yield a choice"),
            }
        }
    }

    #[test]
    fn scripted_follows_pattern_then_times_out() {
        let it = item(0.0);
        let mut r = ScriptedRespondent::new(vec![true, false]).with_latency(1_200);
        assert_eq!(r.respond(&it), (Answer::Chosen { option: 2 }, 1_200));
        assert!(matches!(r.respond(&it).0, Answer::Chosen { option } if option != 2));
        assert_eq!(r.respond(&it).0, Answer::TimedOut);
    }

    #[test]
    fn simulated_is_reproducible_for_a_seed() {
        let it = item(0.5);
        let mut a = SimulatedRespondent::new(0.0, 7);
        let mut b = SimulatedRespondent::new(0.0, 7);
        for _ in 0..50 {
            assert_eq!(a.respond(&it), b.respond(&it));
        }
    }

    #[test]
    fn simulated_accuracy_tracks_model_probability() {
        let easy = item(-2.0);
        let hard = item(2.5);
        let mut r = SimulatedRespondent::new(0.0, 42).with_latency(100, 100);
        let rate = |r: &mut SimulatedRespondent, it: &Item| {
            (0..2_000)
                .filter(|_| r.respond(it).0 == Answer::Chosen { option: 2 })
                .count() as f64
                / 2_000.0
        };
        let easy_rate = rate(&mut r, &easy);
        let hard_rate = rate(&mut r, &hard);
        assert!((easy_rate - irt::probability(&easy.params, 0.0)).abs() < 0.05);
        assert!((hard_rate - irt::probability(&hard.params, 0.0)).abs() < 0.05);
        assert!(easy_rate > hard_rate);
    }
}
