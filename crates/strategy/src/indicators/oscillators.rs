//! Bounded and unbounded oscillators: CCI, Williams %R, Momentum, ROC and the
//! stochastic oscillator.

use common::{Candle, Result};

use super::ma::Sma;
use super::{Indicator, IndicatorValue, RingBuf};

// ─── CCI ──────────────────────────────────────────────────────────────────────

/// Commodity Channel Index over the typical price. Unbounded, usually ±100.
#[derive(Debug, Clone)]
pub struct Cci {
    period: usize,
    window: RingBuf,
    name: String,
}

impl Cci {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            window: RingBuf::new(period),
            name: format!("cci_{period}"),
        }
    }
}

impl Indicator for Cci {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        let tp = candle.typical_price();
        self.window.push(tp);
        let mean = self.window.mean();
        let mean_dev =
            self.window.iter().map(|v| (v - mean).abs()).sum::<f64>() / self.window.len() as f64;
        let cci = if mean_dev == 0.0 {
            0.0
        } else {
            (tp - mean) / (0.015 * mean_dev)
        };
        Ok(IndicatorValue::Scalar(cci))
    }

    fn is_formed(&self) -> bool {
        self.period > 0 && self.window.full()
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

// ─── Williams %R ──────────────────────────────────────────────────────────────

/// Williams %R in [−100, 0]. A window with no range reads −50.
#[derive(Debug, Clone)]
pub struct WilliamsR {
    period: usize,
    highs: RingBuf,
    lows: RingBuf,
    name: String,
}

impl WilliamsR {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            highs: RingBuf::new(period),
            lows: RingBuf::new(period),
            name: format!("williams_r_{period}"),
        }
    }
}

impl Indicator for WilliamsR {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        self.highs.push(candle.high);
        self.lows.push(candle.low);
        let hh = self.highs.max();
        let ll = self.lows.min();
        let value = if hh > ll {
            -100.0 * (hh - candle.close) / (hh - ll)
        } else {
            -50.0
        };
        Ok(IndicatorValue::Scalar(value))
    }

    fn is_formed(&self) -> bool {
        self.period > 0 && self.highs.full()
    }

    fn reset(&mut self) {
        self.highs.clear();
        self.lows.clear();
    }
}

// ─── Momentum / ROC ───────────────────────────────────────────────────────────

/// Close minus the close `period` candles ago. Formed after `period + 1` candles.
#[derive(Debug, Clone)]
pub struct Momentum {
    window: RingBuf,
    name: String,
}

impl Momentum {
    pub fn new(period: usize) -> Self {
        Self {
            window: RingBuf::new(period + 1),
            name: format!("momentum_{period}"),
        }
    }
}

impl Indicator for Momentum {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        self.window.push(candle.close);
        let base = self.window.oldest().unwrap_or(candle.close);
        Ok(IndicatorValue::Scalar(candle.close - base))
    }

    fn is_formed(&self) -> bool {
        self.window.capacity() > 1 && self.window.full()
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

/// Rate of change in percent: `100 · (close / close[t−period] − 1)`.
#[derive(Debug, Clone)]
pub struct Roc {
    window: RingBuf,
    name: String,
}

impl Roc {
    pub fn new(period: usize) -> Self {
        Self {
            window: RingBuf::new(period + 1),
            name: format!("roc_{period}"),
        }
    }
}

impl Indicator for Roc {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        self.window.push(candle.close);
        let base = self.window.oldest().unwrap_or(candle.close);
        let roc = if base == 0.0 {
            0.0
        } else {
            100.0 * (candle.close / base - 1.0)
        };
        Ok(IndicatorValue::Scalar(roc))
    }

    fn is_formed(&self) -> bool {
        self.window.capacity() > 1 && self.window.full()
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

// ─── Stochastic ───────────────────────────────────────────────────────────────

/// Stochastic oscillator {K, D} in [0, 100].
///
/// Raw %K over `k_period` is smoothed by an SMA of `slowing` (1 = fast
/// stochastic); %D is an SMA of `d_period` over %K.
#[derive(Debug, Clone)]
pub struct Stochastic {
    highs: RingBuf,
    lows: RingBuf,
    k_smooth: Sma,
    d: Sma,
    name: String,
}

impl Stochastic {
    pub fn new(k_period: usize, slowing: usize, d_period: usize) -> Self {
        Self {
            highs: RingBuf::new(k_period),
            lows: RingBuf::new(k_period),
            k_smooth: Sma::new(slowing.max(1)),
            d: Sma::new(d_period),
            name: format!("stochastic_{k_period}_{slowing}_{d_period}"),
        }
    }
}

impl Indicator for Stochastic {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        self.highs.push(candle.high);
        self.lows.push(candle.low);
        if !self.highs.full() {
            return Ok(IndicatorValue::Stochastic { k: 50.0, d: 50.0 });
        }
        let hh = self.highs.max();
        let ll = self.lows.min();
        let raw = if hh > ll {
            100.0 * (candle.close - ll) / (hh - ll)
        } else {
            50.0
        };
        let k = self.k_smooth.next(raw);
        let d = if self.k_smooth.is_full() {
            self.d.next(k)
        } else {
            self.d.value()
        };
        Ok(IndicatorValue::Stochastic { k, d })
    }

    fn is_formed(&self) -> bool {
        self.k_smooth.is_full() && self.d.is_full()
    }

    fn reset(&mut self) {
        self.highs.clear();
        self.lows.clear();
        self.k_smooth.clear();
        self.d.clear();
    }
}
