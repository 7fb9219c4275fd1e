use std::cell::Cell;

use ndarray::{Array1, Array2, Array3};
use rand::RngCore;
use serde_json::{Map, Value};

use crate::{
    agent::{Evaluation, PolicyModel, TrainingBatch, TrainingSummary},
    config::ShapeConfig,
    data::{DailyBar, MarketData, NewsItem},
    error::{Result, TraderError},
    gym::{State, Transition},
};

/// Returns the same word forever. `u64::MAX` never explores, `0` always does.
pub struct FixedRng(pub u64);

impl RngCore for FixedRng {
    fn next_u32(&mut self) -> u32 {
        (self.0 >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.0
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for (i, byte) in dest.iter_mut().enumerate() {
            *byte = self.0.to_le_bytes()[i % 8];
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

pub fn small_shape() -> ShapeConfig {
    ShapeConfig {
        history_days: 6,
        stock_features: 4,
        news_per_day: 2,
        news_features: 3,
    }
}

pub fn state(shape: &ShapeConfig, marker: f32) -> State {
    let h = shape.history_days;
    State {
        stock_history: Array2::from_elem((h, shape.stock_features), marker),
        stock_mask: Array1::ones(h),
        fundamentals: Array1::from_vec(vec![marker, 0.]),
        news_articles: Array3::from_elem((h, shape.news_per_day, shape.news_features), marker / 2.),
        news_mask: Array2::ones((h, shape.news_per_day)),
        portfolio_cash: 0.5,
        portfolio_shares: 0.5,
        current_price: 1.,
    }
}

pub fn transition(shape: &ShapeConfig, marker: f32, done: bool) -> Transition {
    Transition {
        state: state(shape, marker),
        action: marker as f64 / 100.,
        reward: marker as f64,
        next_state: state(shape, marker + 0.5),
        done,
    }
}

/// `days` bars ending today. Opens rise by one dollar a day from 100; each close is open + 2.
pub fn rising_market(days: usize) -> MarketData {
    let bars = (0..days)
        .map(|i| {
            let open = 100. + i as f64;
            DailyBar {
                days_ago: (days - 1 - i) as i64,
                open,
                high: open + 3.,
                low: open - 1.,
                close: open + 2.,
                volume: 1_000. + (i % 7) as f64 * 100.,
            }
        })
        .collect();

    let mut fundamentals = Map::new();
    fundamentals.insert("Symbol".into(), Value::from("OCTO"));
    fundamentals.insert("EPS".into(), Value::from("1.25"));
    fundamentals.insert("PERatio".into(), Value::from(18.5));

    let news = vec![
        NewsItem {
            days_ago: 0,
            overall_sentiment_score: 0.3,
            ticker_relevance_score: 0.8,
            ticker_sentiment_score: 0.2,
        },
        NewsItem {
            days_ago: 1,
            overall_sentiment_score: -0.1,
            ticker_relevance_score: 0.5,
            ticker_sentiment_score: -0.2,
        },
    ];

    MarketData::new(bars, fundamentals, news)
}

/// Scripted model: fixed outputs, records every update and can be told to fail.
pub struct StubModel {
    pub action: f64,
    pub value: f64,
    pub fail_evaluate: bool,
    pub fail_update: bool,
    pub evaluations: Cell<usize>,
    pub updates: Vec<TrainingSummary>,
}

impl StubModel {
    pub fn constant(action: f64, value: f64) -> Self {
        Self {
            action,
            value,
            fail_evaluate: false,
            fail_update: false,
            evaluations: Cell::new(0),
            updates: Vec::new(),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_evaluate: true,
            ..Self::constant(0., 0.)
        }
    }
}

impl PolicyModel for StubModel {
    fn evaluate(&self, states: &[&State]) -> Result<Vec<Evaluation>> {
        if self.fail_evaluate {
            return Err(TraderError::ModelEvaluation("stub refused".to_string()));
        }
        self.evaluations.set(self.evaluations.get() + states.len());

        Ok(states
            .iter()
            .map(|_| Evaluation {
                action: self.action,
                value: self.value,
            })
            .collect())
    }

    fn update(&mut self, batch: &TrainingBatch) -> Result<TrainingSummary> {
        if self.fail_update {
            return Err(TraderError::ModelTraining("stub refused".to_string()));
        }

        let summary = TrainingSummary {
            samples: batch.len(),
            epochs: batch.epochs,
            learning_rate: batch.learning_rate,
            actor_loss: 0.,
            critic_loss: 0.,
        };
        self.updates.push(summary);
        Ok(summary)
    }
}
