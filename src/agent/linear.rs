use std::path::Path;

use ndarray::{ArrayView1, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    config::ShapeConfig,
    error::{Result, TraderError},
    gym::{validate_shape, State},
    utils::{read_optional, write_bytes},
};

use super::{Evaluation, PolicyModel, TrainingBatch, TrainingSummary};

const GRADIENT_CLIP: f64 = 1.;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub actor: Vec<f64>,
    pub actor_bias: f64,
    pub critic: Vec<f64>,
    pub critic_bias: f64,
}

impl Weights {
    fn zeros(len: usize) -> Self {
        Self {
            actor: vec![0.; len],
            actor_bias: 0.,
            critic: vec![0.; len],
            critic_bias: 0.,
        }
    }
}

/// Linear actor (tanh head) and linear critic over pooled state features.
///
/// Pooled features: per-column mean and last value of the real stock rows, mean news
/// scores over filled slots, the filled fraction of news slots, the largest fundamental
/// and the three portfolio scalars.
#[derive(Clone, Debug)]
pub struct LinearPolicy {
    pub weights: Weights,
    shape: ShapeConfig,
}

impl LinearPolicy {
    pub fn new(shape: ShapeConfig) -> Self {
        Self {
            weights: Weights::zeros(Self::input_len(&shape)),
            shape,
        }
    }

    pub fn input_len(shape: &ShapeConfig) -> usize {
        2 * shape.stock_features + shape.news_features + 1 + 1 + 3
    }

    /// Weights from `path`, or fresh ones when the file is missing or sized for another shape.
    pub fn load_or_new(path: &Path, shape: ShapeConfig) -> Result<Self> {
        let Some(bytes) = read_optional(path)? else {
            info!(path = %path.display(), "no saved weights, starting fresh");
            return Ok(Self::new(shape));
        };

        let weights: Weights = postcard::from_bytes(&bytes).map_err(|err| TraderError::corrupt(path, err))?;
        let expected = Self::input_len(&shape);
        if weights.actor.len() != expected || weights.critic.len() != expected {
            warn!(
                stored = weights.actor.len(),
                expected,
                "saved weights do not match the state shape, starting fresh"
            );
            return Ok(Self::new(shape));
        }

        Ok(Self { weights, shape })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let encoded = postcard::to_allocvec(&self.weights).map_err(|err| TraderError::corrupt(path, err))?;
        write_bytes(path, &encoded)
    }

    fn pool(
        &self,
        stock: ArrayView2<f32>,
        stock_mask: ArrayView1<f32>,
        news: ArrayView3<f32>,
        news_mask: ArrayView2<f32>,
        fundamentals: ArrayView1<f32>,
        portfolio: [f32; 3],
    ) -> Vec<f64> {
        let features = self.shape.stock_features;
        let mut pooled = Vec::with_capacity(Self::input_len(&self.shape));

        let real: Vec<usize> = stock_mask
            .iter()
            .enumerate()
            .filter(|(_, m)| **m > 0.5)
            .map(|(i, _)| i)
            .collect();
        for column in 0..features {
            let mean = if real.is_empty() {
                0.
            } else {
                real.iter().map(|&row| stock[[row, column]] as f64).sum::<f64>() / real.len() as f64
            };
            pooled.push(mean);
        }
        for column in 0..features {
            pooled.push(real.last().map_or(0., |&row| stock[[row, column]] as f64));
        }

        let mut filled = 0usize;
        let mut sums = vec![0.; self.shape.news_features];
        for ((day, slot), mask) in news_mask.indexed_iter() {
            if *mask <= 0.5 {
                continue;
            }
            filled += 1;
            for (feature, sum) in sums.iter_mut().enumerate() {
                *sum += news[[day, slot, feature]] as f64;
            }
        }
        pooled.extend(sums.iter().map(|sum| if filled == 0 { 0. } else { sum / filled as f64 }));
        pooled.push(filled as f64 / news_mask.len().max(1) as f64);

        pooled.push(fundamentals.iter().copied().fold(0., f32::max) as f64);
        pooled.extend(portfolio.iter().map(|v| *v as f64));

        pooled
    }

    fn pool_state(&self, state: &State) -> Vec<f64> {
        self.pool(
            state.stock_history.view(),
            state.stock_mask.view(),
            state.news_articles.view(),
            state.news_mask.view(),
            state.fundamentals.view(),
            state.portfolio_features(),
        )
    }

    fn forward(&self, x: &[f64]) -> (f64, f64) {
        let actor = dot(&self.weights.actor, x) + self.weights.actor_bias;
        let critic = dot(&self.weights.critic, x) + self.weights.critic_bias;
        (actor.tanh(), critic)
    }
}

fn dot(weights: &[f64], x: &[f64]) -> f64 {
    weights.iter().zip(x).map(|(w, v)| w * v).sum()
}

impl PolicyModel for LinearPolicy {
    fn evaluate(&self, states: &[&State]) -> Result<Vec<Evaluation>> {
        states
            .iter()
            .map(|state| {
                if !validate_shape(state, &self.shape) {
                    return Err(TraderError::ModelEvaluation(format!(
                        "state shape {:?} does not match the model",
                        state.stock_history.dim()
                    )));
                }
                let (action, value) = self.forward(&self.pool_state(state));
                Ok(Evaluation { action, value })
            })
            .collect()
    }

    /// Full-batch gradient descent on mean squared error for both heads.
    fn update(&mut self, batch: &TrainingBatch) -> Result<TrainingSummary> {
        let size = batch.len();
        if size == 0 {
            return Err(TraderError::ModelTraining("empty batch".to_string()));
        }
        let (_, h, f) = batch.stock_history.dim();
        let (_, _, n, k) = batch.news_articles.dim();
        if (h, f, n, k)
            != (
                self.shape.history_days,
                self.shape.stock_features,
                self.shape.news_per_day,
                self.shape.news_features,
            )
        {
            return Err(TraderError::ModelTraining(format!(
                "batch shape ({h}, {f}, {n}, {k}) does not match the model"
            )));
        }

        let inputs: Vec<Vec<f64>> = (0..size)
            .map(|b| {
                let portfolio = batch.portfolio.row(b);
                self.pool(
                    batch.stock_history.index_axis(Axis(0), b),
                    batch.stock_mask.index_axis(Axis(0), b),
                    batch.news_articles.index_axis(Axis(0), b),
                    batch.news_mask.index_axis(Axis(0), b),
                    batch.fundamentals.row(b),
                    [portfolio[0], portfolio[1], portfolio[2]],
                )
            })
            .collect();

        let len = self.weights.actor.len();
        let rate = batch.learning_rate;
        let mut actor_loss = 0.;
        let mut critic_loss = 0.;

        for _ in 0..batch.epochs.max(1) {
            let mut actor_grad = vec![0.; len];
            let mut critic_grad = vec![0.; len];
            let mut actor_bias_grad = 0.;
            let mut critic_bias_grad = 0.;
            actor_loss = 0.;
            critic_loss = 0.;

            for (b, x) in inputs.iter().enumerate() {
                let (action, value) = self.forward(x);
                let action_error = action - batch.actions[b] as f64;
                let value_error = value - batch.targets[b] as f64;
                actor_loss += action_error.powi(2) / size as f64;
                critic_loss += value_error.powi(2) / size as f64;

                let d_actor = 2. * action_error * (1. - action * action) / size as f64;
                let d_critic = 2. * value_error / size as f64;
                for (i, v) in x.iter().enumerate() {
                    actor_grad[i] += d_actor * v;
                    critic_grad[i] += d_critic * v;
                }
                actor_bias_grad += d_actor;
                critic_bias_grad += d_critic;
            }

            let clip = |g: f64| g.clamp(-GRADIENT_CLIP, GRADIENT_CLIP);
            for (w, g) in self.weights.actor.iter_mut().zip(actor_grad.iter()) {
                *w -= rate * clip(*g);
            }
            for (w, g) in self.weights.critic.iter_mut().zip(critic_grad.iter()) {
                *w -= rate * clip(*g);
            }
            self.weights.actor_bias -= rate * clip(actor_bias_grad);
            self.weights.critic_bias -= rate * clip(critic_bias_grad);
        }

        if !actor_loss.is_finite() || !critic_loss.is_finite() {
            return Err(TraderError::ModelTraining("loss diverged".to_string()));
        }

        Ok(TrainingSummary {
            samples: size,
            epochs: batch.epochs,
            learning_rate: rate,
            actor_loss,
            critic_loss,
        })
    }
}
