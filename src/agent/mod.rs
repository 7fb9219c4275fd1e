use crate::{
    error::{Result, TraderError},
    gym::State,
};

pub mod linear;
pub mod policy;
pub mod train;

pub use linear::LinearPolicy;
pub use policy::{Decision, EpsilonGreedy};
pub use train::{train_from_buffer, TrainingBatch, TrainingSummary};

/// Model output for one state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Suggested action, nominally in [-1, 1]
    pub action: f64,
    /// Value estimate, only used to bootstrap training targets
    pub value: f64,
}

/// The learning component. Anything that can score states and fit a batch can drive the trader.
pub trait PolicyModel {
    fn evaluate(&self, states: &[&State]) -> Result<Vec<Evaluation>>;

    fn update(&mut self, batch: &TrainingBatch) -> Result<TrainingSummary>;

    fn evaluate_one(&self, state: &State) -> Result<Evaluation> {
        self.evaluate(&[state])?
            .into_iter()
            .next()
            .ok_or_else(|| TraderError::ModelEvaluation("model returned no evaluation".to_string()))
    }
}
