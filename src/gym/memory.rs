use std::{collections::VecDeque, path::Path};

use rand::{seq::index, Rng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    config::ShapeConfig,
    error::{Result, TraderError},
    utils::{read_optional, write_bytes},
};

use super::obs_state::{validate_shape, State};

/// One recorded decision. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: State,
    /// Final action in [-1, 1]
    pub action: f64,
    /// Percent reward
    pub reward: f64,
    pub next_state: State,
    pub done: bool,
}

impl Transition {
    pub fn fits(&self, shape: &ShapeConfig) -> bool {
        validate_shape(&self.state, shape) && validate_shape(&self.next_state, shape)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub kept: usize,
    pub dropped: usize,
}

/// Bounded FIFO of transitions. The oldest entry is evicted once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct ExperienceReplayBuffer {
    transitions: VecDeque<Transition>,
    capacity: usize,
    shape: ShapeConfig,
}

impl ExperienceReplayBuffer {
    pub fn new(capacity: usize, shape: ShapeConfig) -> Self {
        Self {
            transitions: VecDeque::with_capacity(capacity),
            capacity,
            shape,
        }
    }

    /// Stores the transition if both states fit the shape contract. Returns whether it was kept.
    pub fn add(&mut self, transition: Transition) -> bool {
        if !transition.fits(&self.shape) {
            warn!(
                stock_history = ?transition.state.stock_history.dim(),
                news_articles = ?transition.state.news_articles.dim(),
                "skipping experience with incompatible shapes"
            );
            return false;
        }
        if self.capacity == 0 {
            return false;
        }

        if self.transitions.len() >= self.capacity {
            self.transitions.pop_front();
        }
        self.transitions.push_back(transition);
        true
    }

    /// Uniform sample without replacement of `min(batch_size, len)` transitions.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Vec<&Transition> {
        let amount = batch_size.min(self.transitions.len());
        if amount == self.transitions.len() {
            return self.transitions.iter().collect();
        }

        index::sample(rng, self.transitions.len(), amount)
            .into_iter()
            .filter_map(|i| self.transitions.get(i))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn shape(&self) -> &ShapeConfig {
        &self.shape
    }

    pub fn clear(&mut self) {
        self.transitions.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }

    pub fn last(&self) -> Option<&Transition> {
        self.transitions.back()
    }

    /// Writes the whole ordered list, oldest first.
    pub fn save(&self, path: &Path) -> Result<()> {
        let encoded =
            postcard::to_allocvec(&self.transitions).map_err(|err| TraderError::corrupt(path, err))?;
        write_bytes(path, &encoded)?;

        debug!(count = self.transitions.len(), path = %path.display(), "saved replay buffer");
        Ok(())
    }

    /// Replaces the contents with what is stored at `path`.
    ///
    /// A missing file leaves the buffer empty. Transitions that no longer fit the current
    /// shape are dropped and counted. Only undecodable storage is an error.
    pub fn load(&mut self, path: &Path) -> Result<LoadReport> {
        self.transitions.clear();

        let Some(bytes) = read_optional(path)? else {
            info!(path = %path.display(), "no existing replay buffer");
            return Ok(LoadReport::default());
        };

        let stored: Vec<Transition> =
            postcard::from_bytes(&bytes).map_err(|err| TraderError::corrupt(path, err))?;

        let mut report = LoadReport::default();
        for transition in stored {
            if !transition.fits(&self.shape) {
                report.dropped += 1;
            } else if self.capacity > 0 {
                report.kept += 1;
                if self.transitions.len() >= self.capacity {
                    self.transitions.pop_front();
                }
                self.transitions.push_back(transition);
            }
        }
        // Anything past capacity was evicted oldest-first, like a live insert
        report.kept = report.kept.min(self.transitions.len());

        if report.dropped > 0 {
            warn!(
                kept = report.kept,
                dropped = report.dropped,
                "loaded replay buffer, skipped incompatible experiences"
            );
        } else {
            info!(kept = report.kept, "loaded replay buffer");
        }

        Ok(report)
    }

    #[cfg(test)]
    pub(crate) fn push_unchecked(&mut self, transition: Transition) {
        self.transitions.push_back(transition);
    }

    /// Builds a buffer from `path` in one step.
    pub fn open(path: &Path, capacity: usize, shape: ShapeConfig) -> Result<(Self, LoadReport)> {
        let mut buffer = Self::new(capacity, shape);
        let report = buffer.load(path)?;
        Ok((buffer, report))
    }
}
