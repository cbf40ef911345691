//! Per-symbol indicator state and the bar-processing step that advances it.

use crate::indicators::momentum::{coppock, macd, rsi};
use crate::indicators::structure::{history::CloseHistory, swing_low};
use crate::indicators::trend::{adx, ema};
use crate::indicators::volatility::atr;
use crate::indicators::volume::mfi;
use crate::models::{Bar, FeatureVector};

pub const SHORT_MA_WINDOW: usize = 50;
pub const LONG_MA_WINDOW: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorConfig {
    /// Period shared by ATR and the directional-movement averages.
    pub atr_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            atr_period: atr::DEFAULT_ATR_PERIOD,
        }
    }
}

/// The previous-step values every recurrence needs for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorState {
    atr: atr::AtrState,
    adx: adx::AdxState,
    macd: macd::MacdState,
    rsi: rsi::RsiState,
    ma_short: ema::Ema,
    ma_long: ema::Ema,
    mfi: mfi::MfiState,
    coppock: coppock::CoppockState,
    closes: CloseHistory,
    bars_seen: u64,
}

impl IndicatorState {
    pub fn new(config: &IndicatorConfig) -> Self {
        Self {
            atr: atr::AtrState::new(config.atr_period),
            adx: adx::AdxState::new(config.atr_period),
            macd: macd::MacdState::default(),
            rsi: rsi::RsiState::default(),
            ma_short: ema::Ema::with_window(SHORT_MA_WINDOW),
            ma_long: ema::Ema::with_window(LONG_MA_WINDOW),
            mfi: mfi::MfiState::default(),
            coppock: coppock::CoppockState::default(),
            closes: CloseHistory::default(),
            bars_seen: 0,
        }
    }

    pub fn bars_seen(&self) -> u64 {
        self.bars_seen
    }

    /// Runs every indicator over `bar` and merges their outputs.
    ///
    /// Must be called once per bar, in non-decreasing date order.
    pub fn apply(&mut self, bar: &Bar) -> FeatureVector {
        let (atr_state, atr_out) = atr::step(self.atr, bar);
        let (adx_state, adx_out) = adx::step(self.adx, bar, atr_out.atr);
        let (macd_state, macd_out) = macd::step(self.macd, bar.close);
        let (rsi_state, rsi_out) = rsi::step(self.rsi, bar.close);
        let (ma_short, moving_average_50) = ema::moving_average_step(self.ma_short, bar.close);
        let (ma_long, moving_average_200) = ema::moving_average_step(self.ma_long, bar.close);
        let (mfi_state, mfi_out) = mfi::step(self.mfi, bar);
        let swing_low = swing_low::step(&self.closes, bar.close);
        let (coppock_state, coppock_curve) = coppock::step(self.coppock, &self.closes, bar.close);

        self.atr = atr_state;
        self.adx = adx_state;
        self.macd = macd_state;
        self.rsi = rsi_state;
        self.ma_short = ma_short;
        self.ma_long = ma_long;
        self.mfi = mfi_state;
        self.coppock = coppock_state;
        self.closes = std::mem::take(&mut self.closes).push(bar.close);
        self.bars_seen += 1;

        FeatureVector {
            bar: bar.clone(),
            tr: atr_out.tr,
            atr: atr_out.atr,
            pdi: adx_out.pdi,
            ndi: adx_out.ndi,
            adx: adx_out.adx,
            macd: macd_out.macd,
            macd_signal: macd_out.signal,
            rsi: rsi_out.rsi,
            pct_change: rsi_out.pct_change,
            moving_average_50,
            moving_average_200,
            money_flow_index: mfi_out.mfi,
            mfi_delta: mfi_out.mfi_delta,
            swing_low,
            coppock_curve,
        }
    }
}

impl Default for IndicatorState {
    fn default() -> Self {
        Self::new(&IndicatorConfig::default())
    }
}

/// Pure form of [`IndicatorState::apply`]: consumes the state and returns its successor.
pub fn compute(state: IndicatorState, bar: &Bar) -> (IndicatorState, FeatureVector) {
    let mut next = state;
    let features = next.apply(bar);
    (next, features)
}

/// Replays a date-ordered series from a fresh state.
pub fn compute_series(config: &IndicatorConfig, bars: &[Bar]) -> Vec<FeatureVector> {
    let mut state = IndicatorState::new(config);
    bars.iter().map(|bar| state.apply(bar)).collect()
}
