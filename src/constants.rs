pub const TICKER: &str = "OCTO";

/// Fewer rows than this and the day's cycle is aborted.
pub const MIN_HISTORICAL_DATA_POINTS: usize = 50;

pub mod files {
    pub const DATA_PATH: &str = "data";
    pub const STOCK_HISTORY_FILE: &str = "stock_history.json";
    pub const STOCK_FUNDAMENTALS_FILE: &str = "stock_data_filtered.json";
    pub const NEWS_DATA_FILE: &str = "news_feed.json";

    pub const BUFFER_FILE: &str = "rl_experience_buffer.bin";
    pub const PORTFOLIO_FILE: &str = "stock.json";
    pub const SESSIONS_FILE: &str = "trading_sessions.json";
    pub const RESULTS_DIR: &str = "results";
    pub const SNAPSHOT_FILE: &str = "today.json";
    pub const WEIGHTS_PATH: &str = "weights/policy.bin";
}

pub mod shape {
    /// Days of stock history fed to the model, oldest first
    pub const HISTORY_DAYS: usize = 180;
    pub const NEWS_PER_DAY: usize = 5;

    pub const STOCK_FEATURES: [&str; 12] = [
        "open",
        "high",
        "low",
        "close",
        "volume",
        "price_change",
        "price_range",
        "volume_normalized",
        "sma_5",
        "sma_20",
        "rsi",
        "volatility",
    ];

    pub const NEWS_FEATURES: [&str; 3] = [
        "overall_sentiment_score",
        "ticker_relevance_score",
        "ticker_sentiment_score",
    ];
}

pub mod agent {
    pub const STARTING_CASH: f64 = 1_500.;
    pub const STARTING_SHARES: u64 = 0;
    pub const BUFFER_CAPACITY: usize = 50;

    /// Replay memory must hold at least this many transitions before training
    pub const MIN_EXPERIENCES: usize = 10;
    pub const BATCH_SIZE: usize = 16;
    pub const EPOCHS_PER_DAY: usize = 10;
    pub const LEARNING_RATE: f64 = 0.001;
    pub const GAMMA: f64 = 0.95;

    /// Small buffers train harder: more epochs and a larger step for that update
    pub const BOOST_BELOW: usize = 30;
    pub const BOOST_EPOCH_FACTOR: usize = 3;
    pub const BOOST_LR_FACTOR: f64 = 2.0;
}

pub mod portfolio {
    /// Stored values above these are treated as runaway state and replaced by defaults
    pub const MAX_PLAUSIBLE_CASH: f64 = 1_000_000.;
    pub const MAX_PLAUSIBLE_SHARES: u64 = 1_000;
}

pub mod indicators {
    pub const RSI_PERIOD: usize = 14;
    pub const SMA_SHORT_PERIOD: usize = 5;
    pub const SMA_LONG_PERIOD: usize = 20;
    pub const VOLATILITY_PERIOD: usize = 10;
    pub const RSI_NEUTRAL: f64 = 50.;
}

pub mod snapshot {
    /// Recent portfolio values kept in the decision snapshot, newest first
    pub const RECENT_VALUES: usize = 30;
}

pub mod api {
    pub const BIND_ADDRESS: &str = "0.0.0.0:5000";
    pub const RESULTS_ROUTE: &str = "/api/v1/results";
}
