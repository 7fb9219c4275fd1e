use ndarray::{stack, Array1, Array2, Array3, Array4, ArrayView1, ArrayView2, ArrayView3, Axis};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    config::TrainingConfig,
    error::{Result, TraderError},
    gym::{ExperienceReplayBuffer, State, Transition},
};

use super::PolicyModel;

/// Stacked states of a sampled batch with their action and value targets.
#[derive(Debug, Clone)]
pub struct TrainingBatch {
    /// (B, H, F)
    pub stock_history: Array3<f32>,
    /// (B, H)
    pub stock_mask: Array2<f32>,
    /// (B, H, N, 3)
    pub news_articles: Array4<f32>,
    /// (B, H, N)
    pub news_mask: Array3<f32>,
    /// (B, longest fundamentals vector), zero padded
    pub fundamentals: Array2<f32>,
    /// (B, 3) cash fraction, position fraction, price
    pub portfolio: Array2<f32>,
    pub actions: Array1<f32>,
    pub targets: Array1<f32>,
    pub epochs: usize,
    pub learning_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrainingSummary {
    pub samples: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub actor_loss: f64,
    pub critic_loss: f64,
}

impl TrainingBatch {
    pub fn from_states(
        states: &[&State],
        actions: &[f64],
        targets: &[f64],
        epochs: usize,
        learning_rate: f64,
    ) -> Result<Self> {
        if states.is_empty() || states.len() != actions.len() || states.len() != targets.len() {
            return Err(TraderError::ModelTraining(format!(
                "batch of {} states with {} actions and {} targets",
                states.len(),
                actions.len(),
                targets.len()
            )));
        }

        let stock: Vec<ArrayView2<f32>> = states.iter().map(|s| s.stock_history.view()).collect();
        let stock_mask: Vec<ArrayView1<f32>> = states.iter().map(|s| s.stock_mask.view()).collect();
        let news: Vec<ArrayView3<f32>> = states.iter().map(|s| s.news_articles.view()).collect();
        let news_mask: Vec<ArrayView2<f32>> = states.iter().map(|s| s.news_mask.view()).collect();

        let width = states.iter().map(|s| s.fundamentals.len()).max().unwrap_or(0);
        let mut fundamentals = Array2::<f32>::zeros((states.len(), width));
        let mut portfolio = Array2::<f32>::zeros((states.len(), 3));
        for (i, state) in states.iter().enumerate() {
            for (j, value) in state.fundamentals.iter().enumerate() {
                fundamentals[[i, j]] = *value;
            }
            for (j, value) in state.portfolio_features().iter().enumerate() {
                portfolio[[i, j]] = *value;
            }
        }

        Ok(Self {
            stock_history: stack(Axis(0), &stock)?,
            stock_mask: stack(Axis(0), &stock_mask)?,
            news_articles: stack(Axis(0), &news)?,
            news_mask: stack(Axis(0), &news_mask)?,
            fundamentals,
            portfolio,
            actions: actions.iter().map(|a| *a as f32).collect(),
            targets: targets.iter().map(|t| *t as f32).collect(),
            epochs,
            learning_rate,
        })
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Bootstrapped value targets, `reward + gamma * V(next) * (1 - done)`
pub fn value_targets<M: PolicyModel + ?Sized>(model: &M, transitions: &[Transition], gamma: f64) -> Result<Vec<f64>> {
    let next_states: Vec<&State> = transitions.iter().map(|t| &t.next_state).collect();
    let next = model.evaluate(&next_states)?;
    if next.len() != transitions.len() {
        return Err(TraderError::ModelEvaluation(format!(
            "expected {} evaluations, got {}",
            transitions.len(),
            next.len()
        )));
    }

    Ok(transitions
        .iter()
        .zip(next.iter())
        .map(|(transition, evaluation)| {
            let not_done = if transition.done { 0. } else { 1. };
            transition.reward + gamma * evaluation.value * not_done
        })
        .collect())
}

/// One training update from the replay buffer, or `None` when training is skipped.
///
/// Skips while the buffer is below `min_experiences`. Small buffers get boosted epochs and
/// learning rate for this update only. A sampled transition that fails the shape contract
/// means the stored data predates a config change, so the buffer is cleared instead.
pub fn train_from_buffer<M, R>(
    model: &mut M,
    buffer: &mut ExperienceReplayBuffer,
    config: &TrainingConfig,
    rng: &mut R,
) -> Result<Option<TrainingSummary>>
where
    M: PolicyModel + ?Sized,
    R: Rng + ?Sized,
{
    let size = buffer.len();
    if size < config.min_experiences {
        info!(
            size,
            needed = config.min_experiences - size,
            "not enough experiences for training"
        );
        return Ok(None);
    }

    let (epochs, learning_rate) = if size < config.boost_below {
        (
            config.epochs_per_day * config.boost_epoch_factor,
            config.learning_rate * config.boost_lr_factor,
        )
    } else {
        (config.epochs_per_day, config.learning_rate)
    };

    let sampled: Vec<Transition> = buffer
        .sample(config.batch_size, rng)
        .into_iter()
        .cloned()
        .collect();
    if sampled.is_empty() {
        return Ok(None);
    }

    let shape = *buffer.shape();
    if sampled.iter().any(|t| !t.fits(&shape)) {
        warn!("experience shapes don't match current config, clearing buffer");
        buffer.clear();
        return Ok(None);
    }

    let targets = value_targets(model, &sampled, config.gamma)?;
    let states: Vec<&State> = sampled.iter().map(|t| &t.state).collect();
    let actions: Vec<f64> = sampled.iter().map(|t| t.action).collect();
    let batch = TrainingBatch::from_states(&states, &actions, &targets, epochs, learning_rate)?;

    debug!(samples = batch.len(), epochs, learning_rate, "training on sampled batch");
    let summary = model.update(&batch)?;
    info!(
        samples = summary.samples,
        epochs = summary.epochs,
        actor_loss = summary.actor_loss,
        critic_loss = summary.critic_loss,
        "model updated"
    );

    Ok(Some(summary))
}
