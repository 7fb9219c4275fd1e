use ndarray::Array2;

use crate::{
    constants::indicators::{
        RSI_NEUTRAL, RSI_PERIOD, SMA_LONG_PERIOD, SMA_SHORT_PERIOD, VOLATILITY_PERIOD,
    },
    types::Data,
};

use super::historical::DailyBar;

/// Simple moving average over at most `window` trailing values, starting from the first value
pub fn sma(data: &[f64], window: usize) -> Data {
    let window = window.max(1);
    let mut sum = 0.;

    data.iter()
        .enumerate()
        .map(|(i, value)| {
            sum += value;
            if i >= window {
                sum -= data[i - window];
            }
            sum / (i + 1).min(window) as f64
        })
        .collect()
}

/// Get the relative strength index value for each data point.
///
/// Gains and losses are averaged with a trailing window of `period`. Undefined values
/// (no movement at all) are neutral, and a window with gains but no losses is 100.
pub fn rsi(closes: &[f64], period: usize) -> Data {
    let mut gains = Vec::with_capacity(closes.len());
    let mut losses = Vec::with_capacity(closes.len());

    for (i, close) in closes.iter().enumerate() {
        let diff = if i == 0 { 0. } else { close - closes[i - 1] };
        gains.push(diff.max(0.));
        losses.push((-diff).max(0.));
    }

    let avg_gain = sma(&gains, period);
    let avg_loss = sma(&losses, period);

    avg_gain
        .iter()
        .zip(avg_loss.iter())
        .map(|(gain, loss)| {
            if *loss == 0. {
                if *gain == 0. {
                    RSI_NEUTRAL
                } else {
                    100.
                }
            } else {
                let rs = gain / loss;
                100. - (100. / (1. + rs))
            }
        })
        .collect()
}

/// Trailing sample standard deviation. A single observation has no spread and maps to 0.
pub fn rolling_std(data: &[f64], window: usize) -> Data {
    let window = window.max(1);

    (0..data.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &data[start..=i];
            if slice.len() < 2 {
                return 0.;
            }

            let mean = slice.iter().sum::<f64>() / slice.len() as f64;
            let variance =
                slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (slice.len() - 1) as f64;
            variance.sqrt()
        })
        .collect()
}

/// Volume relative to the mean volume of the whole window
pub fn volume_normalized(volumes: &[f64]) -> Data {
    if volumes.is_empty() {
        return Vec::new();
    }

    let mean = volumes.iter().sum::<f64>() / volumes.len() as f64;
    if mean == 0. || !mean.is_finite() {
        return vec![0.; volumes.len()];
    }

    volumes.iter().map(|volume| volume / mean).collect()
}

/// The 12 stock features per bar, oldest first, in the order the state expects them:
/// open, high, low, close, volume, price_change, price_range, volume_normalized,
/// sma_5, sma_20, rsi, volatility
pub fn feature_matrix(bars: &[DailyBar]) -> Array2<f32> {
    let closes: Data = bars.iter().map(|bar| bar.close).collect();
    let volumes: Data = bars.iter().map(|bar| bar.volume).collect();

    let volume_norm = volume_normalized(&volumes);
    let sma_short = sma(&closes, SMA_SHORT_PERIOD);
    let sma_long = sma(&closes, SMA_LONG_PERIOD);
    let rsi_values = rsi(&closes, RSI_PERIOD);
    let volatility = rolling_std(&closes, VOLATILITY_PERIOD);

    let mut features = Array2::<f32>::zeros((bars.len(), 12));
    for (i, bar) in bars.iter().enumerate() {
        let row = [
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume,
            bar.close - bar.open,
            bar.high - bar.low,
            volume_norm[i],
            sma_short[i],
            sma_long[i],
            rsi_values[i],
            volatility[i],
        ];

        for (j, value) in row.iter().enumerate() {
            features[[i, j]] = if value.is_finite() { *value as f32 } else { 0. };
        }
    }

    features
}
