use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Epsilon-greedy mixing of the model's action with uniform noise.
///
/// Exploration decays linearly with the number of stored experiences and never drops
/// below `floor_epsilon`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpsilonGreedy {
    pub floor_epsilon: f64,
    pub noise_weight: f64,
    /// Experiences needed to decay from 1 to the floor
    pub decay_horizon: f64,
}

impl Default for EpsilonGreedy {
    fn default() -> Self {
        Self::live()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: f64,
    pub model_action: f64,
    pub epsilon: f64,
    /// The noise drawn when exploring
    pub noise: Option<f64>,
}

impl Decision {
    pub fn explored(&self) -> bool {
        self.noise.is_some()
    }
}

impl EpsilonGreedy {
    pub fn live() -> Self {
        Self {
            floor_epsilon: 0.2,
            noise_weight: 0.4,
            decay_horizon: 100.,
        }
    }

    pub fn simulation() -> Self {
        Self {
            floor_epsilon: 0.1,
            noise_weight: 0.3,
            decay_horizon: 100.,
        }
    }

    pub fn epsilon(&self, experiences: usize) -> f64 {
        let decayed = if self.decay_horizon > 0. {
            1. - experiences as f64 / self.decay_horizon
        } else {
            0.
        };
        decayed.max(self.floor_epsilon)
    }

    pub fn decide<R: Rng + ?Sized>(&self, model_action: f64, experiences: usize, rng: &mut R) -> Decision {
        let model_action = if model_action.is_finite() {
            model_action
        } else {
            warn!(model_action, "model produced a non-finite action, using 0");
            0.
        };

        let epsilon = self.epsilon(experiences);
        let (raw, noise) = if rng.gen::<f64>() < epsilon {
            let noise = rng.gen_range(-1.0..1.0);
            let blended = (1. - self.noise_weight) * model_action + self.noise_weight * noise;
            (blended, Some(noise))
        } else {
            (model_action, None)
        };

        let action = raw.clamp(-1., 1.);
        match noise {
            Some(noise) => debug!(epsilon, model_action, noise, action, "exploring"),
            None => debug!(epsilon, action, "model decision"),
        }

        Decision {
            action,
            model_action,
            epsilon,
            noise,
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::test_support::FixedRng;

    #[test]
    fn epsilon_decays_to_each_floor() {
        let live = EpsilonGreedy::live();
        let sim = EpsilonGreedy::simulation();

        assert_eq!(live.epsilon(0), 1.);
        assert!((live.epsilon(12) - 0.88).abs() < 1e-12);
        assert_eq!(live.epsilon(80), 0.2);
        assert_eq!(live.epsilon(500), 0.2);
        assert!((sim.epsilon(85) - 0.15).abs() < 1e-12);
        assert_eq!(sim.epsilon(95), 0.1);
    }

    #[test]
    fn high_draw_exploits_and_still_clips() {
        let policy = EpsilonGreedy::live();
        let mut rng = FixedRng(u64::MAX);

        let decision = policy.decide(0.6, 12, &mut rng);
        assert_eq!(decision.action, 0.6);
        assert!(!decision.explored());

        let decision = policy.decide(3.5, 12, &mut rng);
        assert_eq!(decision.action, 1.);
        assert_eq!(decision.model_action, 3.5);
    }

    #[test]
    fn low_draw_blends_with_noise() {
        let policy = EpsilonGreedy::live();
        let mut rng = FixedRng(0);

        let decision = policy.decide(0.5, 90, &mut rng);
        let noise = decision.noise.unwrap();

        assert!((-1.0..1.0).contains(&noise));
        assert!((decision.action - (0.6 * 0.5 + 0.4 * noise)).abs() < 1e-12);
    }

    #[test]
    fn actions_always_land_in_range() {
        let mut rng = StdRng::seed_from_u64(5);

        for policy in [EpsilonGreedy::live(), EpsilonGreedy::simulation()] {
            for i in 0..1_000 {
                let model_action = (i as f64 - 500.) / 100.;
                let decision = policy.decide(model_action, i % 120, &mut rng);
                assert!((-1.0..=1.0).contains(&decision.action));
            }
        }
    }

    #[test]
    fn non_finite_model_action_is_neutralized() {
        let decision = EpsilonGreedy::live().decide(f64::NAN, 200, &mut FixedRng(u64::MAX));
        assert_eq!(decision.action, 0.);
    }
}
