//! Online indicator calculators.
//!
//! Every indicator consumes finished candles one at a time and keeps only the
//! state it needs (a running accumulator or a fixed-size ring buffer). Output is
//! an [`IndicatorValue`]; it is meaningful only once `is_formed()` is true.
//!
//! Candles are validated by the [`IndicatorSet`](crate::IndicatorSet) before any
//! indicator sees them, so calculators may assume finite prices, `high >= low`
//! and non-negative volume.

pub mod channels;
pub mod ma;
pub mod macd;
pub mod oscillators;
pub mod rsi;
pub mod smoothed;
pub mod trend;
pub mod volatility;
pub mod volume;

use std::fmt;

use common::{Candle, Result};
use serde::{Deserialize, Serialize};

pub use channels::{Donchian, Highest, Keltner, Lowest};
pub use ma::{Ema, Hma, Sma, Vwma, Wma};
pub use macd::Macd;
pub use oscillators::{Cci, Momentum, Roc, Stochastic, WilliamsR};
pub use rsi::{LaguerreRsi, Rsi};
pub use smoothed::Smoothed;
pub use trend::{Adx, ParabolicSar, SuperTrend};
pub use volatility::{Atr, Bollinger, StdDev};
pub use volume::{AccumulationDistribution, Obv, Vwap};

/// A stateful online transformer from candles to values.
pub trait Indicator: Send + fmt::Debug {
    /// Display name including parameters, e.g. `ema_10`.
    fn name(&self) -> &str;

    /// Feed one finished candle and return the current output.
    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue>;

    /// True once enough candles have been seen for the output to be valid.
    fn is_formed(&self) -> bool;

    /// Return to the freshly constructed state.
    fn reset(&mut self);
}

impl<I: Indicator + ?Sized> Indicator for Box<I> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        (**self).update(candle)
    }

    fn is_formed(&self) -> bool {
        (**self).is_formed()
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Output of one indicator for one candle. Composite indicators carry named fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum IndicatorValue {
    Scalar(f64),
    Bands { upper: f64, middle: f64, lower: f64 },
    Adx { ma: f64, plus_di: f64, minus_di: f64 },
    Stochastic { k: f64, d: f64 },
    Macd { macd: f64, signal: f64, histogram: f64 },
    SuperTrend { value: f64, is_up_trend: bool },
}

/// Named component of an [`IndicatorValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Primary value: the scalar itself, the band middle, ADX, %K, the MACD line
    /// or the SuperTrend line.
    Value,
    Upper,
    Middle,
    Lower,
    PlusDi,
    MinusDi,
    K,
    D,
    Signal,
    Histogram,
}

impl IndicatorValue {
    pub fn field(&self, field: Field) -> Option<f64> {
        use IndicatorValue::*;
        match (*self, field) {
            (Scalar(v), Field::Value) => Some(v),
            (Bands { middle, .. }, Field::Value | Field::Middle) => Some(middle),
            (Bands { upper, .. }, Field::Upper) => Some(upper),
            (Bands { lower, .. }, Field::Lower) => Some(lower),
            (Adx { ma, .. }, Field::Value) => Some(ma),
            (Adx { plus_di, .. }, Field::PlusDi) => Some(plus_di),
            (Adx { minus_di, .. }, Field::MinusDi) => Some(minus_di),
            (Stochastic { k, .. }, Field::Value | Field::K) => Some(k),
            (Stochastic { d, .. }, Field::D) => Some(d),
            (Macd { macd, .. }, Field::Value) => Some(macd),
            (Macd { signal, .. }, Field::Signal) => Some(signal),
            (Macd { histogram, .. }, Field::Histogram) => Some(histogram),
            (SuperTrend { value, .. }, Field::Value) => Some(value),
            _ => None,
        }
    }

    pub fn scalar(&self) -> Option<f64> {
        self.field(Field::Value)
    }

    /// True when every numeric component is finite.
    pub fn is_finite(&self) -> bool {
        use IndicatorValue::*;
        match *self {
            Scalar(v) => v.is_finite(),
            Bands { upper, middle, lower } => {
                upper.is_finite() && middle.is_finite() && lower.is_finite()
            }
            Adx { ma, plus_di, minus_di } => {
                ma.is_finite() && plus_di.is_finite() && minus_di.is_finite()
            }
            Stochastic { k, d } => k.is_finite() && d.is_finite(),
            Macd { macd, signal, histogram } => {
                macd.is_finite() && signal.is_finite() && histogram.is_finite()
            }
            SuperTrend { value, .. } => value.is_finite(),
        }
    }
}

/// Ring buffer for rolling-window computations.
#[derive(Debug, Clone)]
pub struct RingBuf {
    buf: Vec<f64>,
    pos: usize,
    len: usize,
    cap: usize,
}

impl RingBuf {
    pub fn new(capacity: usize) -> Self {
        let cap = capacity.max(1);
        Self {
            buf: vec![0.0; cap],
            pos: 0,
            len: 0,
            cap,
        }
    }

    /// Push a value, returning the one it evicted when the buffer was full.
    pub fn push(&mut self, val: f64) -> Option<f64> {
        let evicted = if self.full() { Some(self.buf[self.pos]) } else { None };
        self.buf[self.pos] = val;
        self.pos = (self.pos + 1) % self.cap;
        if self.len < self.cap {
            self.len += 1;
        }
        evicted
    }

    pub fn full(&self) -> bool {
        self.len == self.cap
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn clear(&mut self) {
        self.pos = 0;
        self.len = 0;
    }

    /// Value `back` steps before the newest one (`0` = newest).
    pub fn get_back(&self, back: usize) -> Option<f64> {
        if back >= self.len {
            return None;
        }
        let idx = (self.pos + self.cap - 1 - back) % self.cap;
        Some(self.buf[idx])
    }

    pub fn oldest(&self) -> Option<f64> {
        self.len.checked_sub(1).and_then(|b| self.get_back(b))
    }

    /// Iterate over values in insertion order (oldest first).
    pub fn iter(&self) -> RingBufIter<'_> {
        RingBufIter {
            buf: &self.buf,
            start: if self.len < self.cap { 0 } else { self.pos },
            count: 0,
            total: self.len,
            cap: self.cap,
        }
    }

    pub fn mean(&self) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        self.iter().sum::<f64>() / self.len as f64
    }

    /// Population standard deviation (ddof=0).
    pub fn std_pop(&self) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        let mean = self.mean();
        let var = self.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / self.len as f64;
        var.sqrt()
    }

    pub fn min(&self) -> f64 {
        self.iter().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.iter().fold(f64::NEG_INFINITY, f64::max)
    }
}

pub struct RingBufIter<'a> {
    buf: &'a [f64],
    start: usize,
    count: usize,
    total: usize,
    cap: usize,
}

impl<'a> Iterator for RingBufIter<'a> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.count >= self.total {
            return None;
        }
        let idx = (self.start + self.count) % self.cap;
        self.count += 1;
        Some(self.buf[idx])
    }
}

/// Create synthetic candles from close prices for testing.
///
/// open = previous close (or close for the first candle),
/// high = max(open, close) + 1, low = min(open, close) - 1, volume = 1000.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                security: "TEST".to_string(),
                open_time: base + chrono::Duration::days(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
                state: common::CandleState::Finished,
            }
        })
        .collect()
}

#[cfg(test)]
pub fn make_ohlcv(data: &[(f64, f64, f64, f64, f64)]) -> Vec<Candle> {
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close, volume))| Candle {
            security: "TEST".to_string(),
            open_time: base + chrono::Duration::days(i as i64),
            open,
            high,
            low,
            close,
            volume,
            state: common::CandleState::Finished,
        })
        .collect()
}

/// Feed every candle and return the outputs.
#[cfg(test)]
pub fn run<I: Indicator>(ind: &mut I, candles: &[Candle]) -> Vec<IndicatorValue> {
    candles.iter().map(|c| ind.update(c).unwrap()).collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-9;
