use ndarray::{s, Array1, Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::{config::ShapeConfig, data::historical::NewsItem};

/// Model-ready observation of one trading day. Every field except `fundamentals`
/// has a fixed shape given by [`ShapeConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// (H, F), oldest day first, zero rows on the left when history is short
    pub stock_history: Array2<f32>,
    /// (H), 1 for real days
    pub stock_mask: Array1<f32>,
    pub fundamentals: Array1<f32>,
    /// (H, N, 3), row d holds news from d days ago
    pub news_articles: Array3<f32>,
    /// (H, N)
    pub news_mask: Array2<f32>,
    pub portfolio_cash: f32,
    pub portfolio_shares: f32,
    pub current_price: f32,
}

impl State {
    /// Cash fraction, position fraction and normalized price, in the order the model reads them
    pub fn portfolio_features(&self) -> [f32; 3] {
        [self.portfolio_cash, self.portfolio_shares, self.current_price]
    }

    pub fn real_days(&self) -> usize {
        self.stock_mask.iter().filter(|m| **m > 0.5).count()
    }
}

/// The one validity check used both when adding new transitions and when loading old ones.
pub fn validate_shape(state: &State, shape: &ShapeConfig) -> bool {
    let h = shape.history_days;

    state.stock_history.dim() == (h, shape.stock_features)
        && state.stock_mask.len() == h
        && state.news_articles.dim() == (h, shape.news_per_day, shape.news_features)
        && state.news_mask.dim() == (h, shape.news_per_day)
}

pub struct StateBuilder {
    shape: ShapeConfig,
}

impl StateBuilder {
    pub fn new(shape: ShapeConfig) -> Self {
        Self { shape }
    }

    pub fn shape(&self) -> &ShapeConfig {
        &self.shape
    }

    /// Turns a raw snapshot into a [`State`].
    ///
    /// `history` rows are oldest first and `history_mask` runs parallel to them; a
    /// mask shorter than the window marks every row as real. Only the last H rows are
    /// kept. Extra feature columns are dropped and missing ones stay zero.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &self,
        history: ArrayView2<f32>,
        history_mask: &[f32],
        fundamentals: &[f32],
        news: &[NewsItem],
        cash: f64,
        shares: u64,
        price: f64,
    ) -> State {
        let (stock_history, stock_mask) = self.stock_window(history, history_mask);
        let (news_articles, news_mask) = self.news_tensor(news);

        let total = cash + shares as f64 * price;
        let denominator = total.max(1.);
        let (portfolio_cash, portfolio_shares) = if denominator.is_finite() {
            (
                finite_or_zero((cash / denominator) as f32),
                finite_or_zero((shares as f64 * price / denominator) as f32),
            )
        } else {
            (0., 0.)
        };

        State {
            stock_history,
            stock_mask,
            fundamentals: normalize_single_sample(fundamentals),
            news_articles,
            news_mask,
            portfolio_cash,
            portfolio_shares,
            current_price: 1.,
        }
    }

    fn stock_window(&self, history: ArrayView2<f32>, history_mask: &[f32]) -> (Array2<f32>, Array1<f32>) {
        let h = self.shape.history_days;
        let features = self.shape.stock_features;
        let rows = history.nrows();

        let mask: Vec<f32> = if history_mask.len() >= rows {
            history_mask[history_mask.len() - rows..]
                .iter()
                .map(|m| if *m > 0.5 { 1. } else { 0. })
                .collect()
        } else {
            vec![1.; rows]
        };

        let kept = rows.min(h);
        let skip = rows - kept;
        let width = history.ncols().min(features);

        let mut window = Array2::<f32>::zeros((kept, features));
        window
            .slice_mut(s![.., ..width])
            .assign(&history.slice(s![skip.., ..width]));
        window.mapv_inplace(finite_or_zero);
        let window_mask = &mask[skip..];

        min_max_real_rows(&mut window, window_mask);

        let pad = h - kept;
        let mut stock_history = Array2::<f32>::zeros((h, features));
        stock_history.slice_mut(s![pad.., ..]).assign(&window);

        let mut stock_mask = Array1::<f32>::zeros(h);
        stock_mask
            .slice_mut(s![pad..])
            .assign(&Array1::from_iter(window_mask.iter().copied()));

        (stock_history, stock_mask)
    }

    fn news_tensor(&self, news: &[NewsItem]) -> (Array3<f32>, Array2<f32>) {
        let ShapeConfig {
            history_days: h,
            news_per_day: n,
            news_features,
            ..
        } = self.shape;

        let mut articles = Array3::<f32>::zeros((h, n, news_features));
        let mut mask = Array2::<f32>::zeros((h, n));

        // Articles arrive most recent first, so the first N per day are kept
        for item in news {
            let Ok(days_ago) = usize::try_from(item.days_ago) else {
                continue;
            };
            if days_ago >= h {
                continue;
            }

            // Row d holds the articles from d days ago, today first
            let row = days_ago;
            let Some(slot) = mask.row(row).iter().position(|m| *m == 0.) else {
                continue;
            };

            for (feature, value) in item.scores().iter().take(news_features).enumerate() {
                articles[[row, slot, feature]] = finite_or_zero(*value);
            }
            mask[[row, slot]] = 1.;
        }

        (articles, mask)
    }
}

/// Column-wise min-max scaling to [0, 1], fitted on and applied to the real rows only.
/// Constant columns map to 0.
fn min_max_real_rows(window: &mut Array2<f32>, mask: &[f32]) {
    let real: Vec<usize> = mask
        .iter()
        .enumerate()
        .filter(|(_, m)| **m > 0.5)
        .map(|(i, _)| i)
        .collect();
    if real.is_empty() {
        return;
    }

    for mut column in window.axis_iter_mut(Axis(1)) {
        let (min, max) = real.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), &i| {
            (min.min(column[i]), max.max(column[i]))
        });
        let range = max - min;
        let scale = if range > 0. { range } else { 1. };

        for &i in real.iter() {
            column[i] = (column[i] - min) / scale;
        }
    }
}

/// Min-max fitted per feature on a single sample: every value collapses to 0.
fn normalize_single_sample(values: &[f32]) -> Array1<f32> {
    Array1::zeros(values.len())
}

fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        0.
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;

    use super::*;

    fn shape() -> ShapeConfig {
        ShapeConfig::default()
    }

    fn ramp(rows: usize, cols: usize) -> Array2<f32> {
        Array2::from_shape_fn((rows, cols), |(r, c)| (r * 10 + c) as f32)
    }

    fn news(days_ago: i64, score: f32) -> NewsItem {
        NewsItem {
            days_ago,
            overall_sentiment_score: score,
            ticker_relevance_score: score,
            ticker_sentiment_score: score,
        }
    }

    #[test]
    fn output_shape_is_fixed_for_any_window_length() {
        let builder = StateBuilder::new(shape());

        for rows in [1usize, 37, 179, 180, 181, 400] {
            let history = ramp(rows, 12);
            let state = builder.build(history.view(), &[], &[1., 2.], &[], 1_500., 0, 10.);

            assert_eq!(state.stock_history.dim(), (180, 12));
            assert_eq!(state.stock_mask.len(), 180);
            assert_eq!(state.news_articles.dim(), (180, 5, 3));
            assert_eq!(state.news_mask.dim(), (180, 5));
            assert_eq!(state.real_days(), rows.min(180));
            assert!(validate_shape(&state, &shape()));
        }
    }

    #[test]
    fn short_history_is_left_padded() {
        let builder = StateBuilder::new(shape());
        let history = ramp(3, 12);

        let state = builder.build(history.view(), &[], &[], &[], 100., 0, 1.);

        for row in 0..177 {
            assert_eq!(state.stock_mask[row], 0.);
            assert!(state.stock_history.row(row).iter().all(|v| *v == 0.));
        }
        assert_eq!(state.stock_mask.slice(s![177..]).to_vec(), vec![1., 1., 1.]);
        assert_eq!(state.stock_history[[177, 0]], 0.);
        assert_eq!(state.stock_history[[178, 0]], 0.5);
        assert_eq!(state.stock_history[[179, 0]], 1.);
    }

    #[test]
    fn long_history_keeps_most_recent_rows() {
        let builder = StateBuilder::new(shape());
        let history = ramp(200, 12);

        let state = builder.build(history.view(), &[], &[], &[], 100., 0, 1.);

        // row 20 is the oldest kept and maps to 0, row 199 to 1
        assert_eq!(state.stock_history[[0, 3]], 0.);
        assert_eq!(state.stock_history[[179, 3]], 1.);
    }

    #[test]
    fn masked_rows_do_not_influence_scaling() {
        let builder = StateBuilder::new(shape());
        let mut history = Array2::<f32>::zeros((4, 12));
        history[[0, 0]] = 1_000.;
        history[[1, 0]] = 2.;
        history[[2, 0]] = 4.;
        history[[3, 0]] = 6.;
        let mask = [0., 1., 1., 1.];

        let state = builder.build(history.view(), &mask, &[], &[], 100., 0, 1.);

        assert_eq!(state.stock_history[[176, 0]], 1_000.);
        assert_eq!(state.stock_history[[177, 0]], 0.);
        assert_eq!(state.stock_history[[178, 0]], 0.5);
        assert_eq!(state.stock_history[[179, 0]], 1.);
        assert_eq!(state.real_days(), 3);
    }

    #[test]
    fn fully_masked_window_is_left_raw() {
        let builder = StateBuilder::new(shape());
        let history = ramp(2, 12);

        let state = builder.build(history.view(), &[0., 0.], &[], &[], 100., 0, 1.);

        assert_eq!(state.stock_history[[179, 1]], 11.);
        assert_eq!(state.real_days(), 0);
    }

    #[test]
    fn narrow_history_fills_missing_columns_with_zero() {
        let builder = StateBuilder::new(shape());
        let history = ramp(5, 4);

        let state = builder.build(history.view(), &[], &[], &[], 100., 0, 1.);

        assert_eq!(state.stock_history.dim(), (180, 12));
        assert!(state.stock_history.column(11).iter().all(|v| *v == 0.));
    }

    #[test]
    fn fundamentals_collapse_to_zero() {
        let builder = StateBuilder::new(shape());
        let history = ramp(5, 12);

        let state = builder.build(history.view(), &[], &[3., 7e9, -2.], &[], 100., 0, 1.);

        assert_eq!(state.fundamentals.to_vec(), vec![0., 0., 0.]);
    }

    #[test]
    fn news_rows_are_indexed_by_days_ago_keeping_first_n() {
        let builder = StateBuilder::new(shape());
        let history = ramp(5, 12);
        let mut items: Vec<NewsItem> = (0..7).map(|i| news(0, i as f32)).collect();
        items.push(news(2, 0.5));
        items.push(news(180, 0.9));
        items.push(news(-1, 0.9));

        let state = builder.build(history.view(), &[], &[], &items, 100., 0, 1.);

        assert_eq!(state.news_mask.row(0).to_vec(), vec![1.; 5]);
        assert_eq!(state.news_articles[[0, 4, 0]], 4.);
        assert_eq!(state.news_mask[[2, 0]], 1.);
        assert_eq!(state.news_articles[[2, 0, 2]], 0.5);
        assert_eq!(state.news_mask.row(179).sum(), 0.);
        assert_eq!(state.news_mask.sum(), 6.);
    }

    #[test]
    fn portfolio_scalars_are_fractions_and_price_is_one() {
        let builder = StateBuilder::new(shape());
        let history = ramp(5, 12);

        let state = builder.build(history.view(), &[], &[], &[], 600., 9, 100.);
        assert!((state.portfolio_cash - 0.4).abs() < 1e-6);
        assert!((state.portfolio_shares - 0.6).abs() < 1e-6);
        assert_eq!(state.current_price, 1.);

        let broke = builder.build(history.view(), &[], &[], &[], 0.25, 0, 0.3);
        assert_eq!(broke.portfolio_cash, 0.25);
        assert_eq!(broke.current_price, 1.);
    }

    #[test]
    fn validate_shape_rejects_other_dimensions() {
        let builder = StateBuilder::new(shape());
        let state = builder.build(ramp(5, 12).view(), &[], &[], &[], 1., 0, 1.);

        let smaller = ShapeConfig {
            history_days: 90,
            ..shape()
        };
        assert!(!validate_shape(&state, &smaller));

        let mut broken = state.clone();
        broken.news_mask = Array2::zeros((180, 4));
        assert!(!validate_shape(&broken, &shape()));
    }
}
