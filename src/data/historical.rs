use std::path::Path;

use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    config::ShapeConfig,
    constants::files,
    error::{Result, TraderError},
    types::Data,
    utils::read_optional,
};

use super::indicators::feature_matrix;

/// Fundamentals keys that are labels, not numbers
const NON_NUMERIC_FUNDAMENTALS: [&str; 3] = ["Symbol", "Country", "Sector"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub days_ago: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub days_ago: i64,
    pub overall_sentiment_score: f32,
    pub ticker_relevance_score: f32,
    pub ticker_sentiment_score: f32,
}

impl NewsItem {
    pub fn scores(&self) -> [f32; 3] {
        [
            self.overall_sentiment_score,
            self.ticker_relevance_score,
            self.ticker_sentiment_score,
        ]
    }
}

/// Rows as the fetcher writes them: prices are often numeric strings
#[derive(Deserialize)]
struct RawBar {
    #[serde(default)]
    days_ago: Value,
    #[serde(default)]
    open: Value,
    #[serde(default)]
    high: Value,
    #[serde(default)]
    low: Value,
    #[serde(default)]
    close: Value,
    #[serde(default)]
    volume: Value,
}

#[derive(Deserialize)]
struct RawNews {
    #[serde(default)]
    days_ago: Value,
    #[serde(default)]
    overall_sentiment_score: Value,
    #[serde(default)]
    ticker_relevance_score: Value,
    #[serde(default)]
    ticker_sentiment_score: Value,
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        Value::Bool(flag) => Some(if *flag { 1. } else { 0. }),
        _ => None,
    }
}

fn days_ago(value: &Value) -> i64 {
    number(value).map(|days| days.round() as i64).unwrap_or(0)
}

/// Raw inputs for one cycle: daily bars, a flat fundamentals map and news items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketData {
    /// Oldest first
    pub bars: Vec<DailyBar>,
    pub fundamentals: Map<String, Value>,
    pub news: Vec<NewsItem>,
}

/// Market data cut to the state window, with features computed and prices kept alongside.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedHistory {
    /// (rows, 12), oldest first
    pub features: Array2<f32>,
    pub mask: Vec<f32>,
    pub fundamentals: Vec<f32>,
    pub news: Vec<NewsItem>,
    pub opens: Data,
    pub closes: Data,
}

impl PreparedHistory {
    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn latest_open(&self) -> Option<f64> {
        self.opens.last().copied()
    }

    pub fn latest_close(&self) -> Option<f64> {
        self.closes.last().copied()
    }

    pub fn tail(self, rows: usize) -> Self {
        let skip = self.len().saturating_sub(rows);
        Self {
            features: self.features.slice(s![skip.., ..]).to_owned(),
            mask: self.mask[skip..].to_vec(),
            fundamentals: self.fundamentals,
            news: self.news,
            opens: self.opens[skip..].to_vec(),
            closes: self.closes[skip..].to_vec(),
        }
    }
}

impl MarketData {
    pub fn new(bars: Vec<DailyBar>, fundamentals: Map<String, Value>, news: Vec<NewsItem>) -> Self {
        let mut data = Self {
            bars,
            fundamentals,
            news,
        };
        data.normalize_bars();
        data
    }

    /// Reads the three market files from `dir`. Only the stock history is required.
    pub fn load(dir: &Path) -> Result<Self> {
        let history_path = dir.join(files::STOCK_HISTORY_FILE);
        let bytes = read_optional(&history_path)?.ok_or_else(|| {
            TraderError::InvalidMarketData(format!("missing {}", history_path.display()))
        })?;
        let raw_bars: Vec<RawBar> = serde_json::from_slice(&bytes)?;
        let bars = raw_bars
            .iter()
            .map(|raw| DailyBar {
                days_ago: days_ago(&raw.days_ago),
                open: number(&raw.open).unwrap_or(f64::NAN),
                high: number(&raw.high).unwrap_or(f64::NAN),
                low: number(&raw.low).unwrap_or(f64::NAN),
                close: number(&raw.close).unwrap_or(f64::NAN),
                volume: number(&raw.volume).unwrap_or(f64::NAN),
            })
            .collect();

        let fundamentals = match read_json_optional(&dir.join(files::STOCK_FUNDAMENTALS_FILE))? {
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(TraderError::InvalidMarketData(
                    "fundamentals file is not an object".to_string(),
                ))
            }
            None => Map::new(),
        };

        let news = match read_json_optional(&dir.join(files::NEWS_DATA_FILE))? {
            Some(value) => {
                let raw: Vec<RawNews> = serde_json::from_value(value)?;
                raw.iter()
                    .map(|item| NewsItem {
                        days_ago: days_ago(&item.days_ago),
                        overall_sentiment_score: number(&item.overall_sentiment_score).unwrap_or(0.) as f32,
                        ticker_relevance_score: number(&item.ticker_relevance_score).unwrap_or(0.) as f32,
                        ticker_sentiment_score: number(&item.ticker_sentiment_score).unwrap_or(0.) as f32,
                    })
                    .collect()
            }
            None => Vec::new(),
        };

        let data = Self::new(bars, fundamentals, news);
        debug!(
            bars = data.bars.len(),
            fundamentals = data.fundamentals.len(),
            news = data.news.len(),
            dir = %dir.display(),
            "loaded market data"
        );
        Ok(data)
    }

    /// Oldest first, dropping rows without a usable open or close
    fn normalize_bars(&mut self) {
        let before = self.bars.len();
        self.bars
            .retain(|bar| bar.open.is_finite() && bar.close.is_finite());
        self.bars.sort_by(|a, b| b.days_ago.cmp(&a.days_ago));

        let dropped = before - self.bars.len();
        if dropped > 0 {
            warn!(dropped, "dropped bars without numeric open/close");
        }
    }

    pub fn ensure_sufficient(&self, min_points: usize) -> Result<()> {
        if self.bars.len() < min_points {
            return Err(TraderError::InsufficientData {
                required: min_points,
                available: self.bars.len(),
            });
        }
        Ok(())
    }

    /// Fundamentals as numbers in key order. Labels are skipped, unparsable values are 0.
    pub fn fundamental_features(&self) -> Vec<f32> {
        self.fundamentals
            .iter()
            .filter(|(key, _)| !NON_NUMERIC_FUNDAMENTALS.contains(&key.as_str()))
            .map(|(_, value)| number(value).filter(|v| v.is_finite()).unwrap_or(0.) as f32)
            .collect()
    }

    /// Features for every bar, oldest first. Indicators warm up over the whole history.
    pub fn prepare_full(&self) -> PreparedHistory {
        PreparedHistory {
            features: feature_matrix(&self.bars),
            mask: vec![1.; self.bars.len()],
            fundamentals: self.fundamental_features(),
            news: self.news.clone(),
            opens: self.bars.iter().map(|bar| bar.open).collect(),
            closes: self.bars.iter().map(|bar| bar.close).collect(),
        }
    }

    /// Keeps the most recent `history_days` bars of [`Self::prepare_full`].
    pub fn prepare(&self, shape: &ShapeConfig) -> PreparedHistory {
        // Indicators are computed before the cut, so the oldest kept rows carry warmed-up
        // SMA, RSI and volatility instead of values from a window-sized history.
        self.prepare_full().tail(shape.history_days)
    }
}

fn read_json_optional(path: &Path) -> Result<Option<Value>> {
    match read_optional(path)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => {
            warn!(path = %path.display(), "market file not found, using empty");
            Ok(None)
        }
    }
}
