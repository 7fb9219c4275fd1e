use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the decision engine
#[derive(Error, Debug)]
pub enum TraderError {
    #[error("Insufficient historical data: need at least {required} points, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Corrupt store at {}: {reason}", path.display())]
    CorruptStore { path: PathBuf, reason: String },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Model evaluation failed: {0}")]
    ModelEvaluation(String),

    #[error("Model training failed: {0}")]
    ModelTraining(String),

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    #[error("Shape error: {0}")]
    Shape(String),
}

impl TraderError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TraderError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        TraderError::CorruptStore {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<ndarray::ShapeError> for TraderError {
    fn from(err: ndarray::ShapeError) -> Self {
        TraderError::Shape(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TraderError>;
