use crate::domain::ports::OutcomeSimulator;
use rand::Rng;

/// Bernoulli draw using the thread-local RNG.
#[derive(Default, Clone, Copy)]
pub struct RandomOutcome;

impl OutcomeSimulator for RandomOutcome {
    fn succeeds(&self, probability: f64) -> bool {
        let p = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        rand::thread_rng().gen_bool(p)
    }
}

/// Always returns the same outcome.
#[derive(Clone, Copy)]
pub struct FixedOutcome(pub bool);

impl OutcomeSimulator for FixedOutcome {
    fn succeeds(&self, _probability: f64) -> bool {
        self.0
    }
}
