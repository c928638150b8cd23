//! Moving averages: SMA, EMA, WMA, Hull MA and volume-weighted MA.
//!
//! Each type exposes `next(value)` for use on arbitrary series (composite
//! indicators feed them derived values) and implements [`Indicator`] on the
//! candle close. All are formed after `period` inputs.

use common::{Candle, Result};

use super::{Indicator, IndicatorValue, RingBuf};

// ─── SMA ──────────────────────────────────────────────────────────────────────

/// Simple moving average with a running sum (O(1) per update).
#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    window: RingBuf,
    sum: f64,
    name: String,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            window: RingBuf::new(period),
            sum: 0.0,
            name: format!("sma_{period}"),
        }
    }

    pub fn next(&mut self, value: f64) -> f64 {
        if let Some(evicted) = self.window.push(value) {
            self.sum -= evicted;
        }
        self.sum += value;
        self.value()
    }

    /// Mean of what has been seen so far (partial before formed).
    pub fn value(&self) -> f64 {
        if self.window.is_empty() {
            0.0
        } else {
            self.sum / self.window.len() as f64
        }
    }

    pub fn is_full(&self) -> bool {
        self.window.full()
    }

    pub fn clear(&mut self) {
        self.window.clear();
        self.sum = 0.0;
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        Ok(IndicatorValue::Scalar(self.next(candle.close)))
    }

    fn is_formed(&self) -> bool {
        self.is_full() && self.period > 0
    }

    fn reset(&mut self) {
        self.clear();
    }
}

// ─── EMA ──────────────────────────────────────────────────────────────────────

/// Exponential moving average.
///
/// Seed: SMA of the first `period` values. Afterwards
/// `EMA[t] = EMA[t-1] + alpha * (x[t] - EMA[t-1])`, alpha = 2/(period+1).
/// The incremental form keeps a constant series exactly constant.
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    alpha: f64,
    count: usize,
    seed_sum: f64,
    value: f64,
    name: String,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self::with_alpha(period, 2.0 / (period as f64 + 1.0), format!("ema_{period}"))
    }

    /// Wilder's smoothing (alpha = 1/period), used by RSI/ATR-style averages.
    pub fn wilder(period: usize) -> Self {
        Self::with_alpha(period, 1.0 / period.max(1) as f64, format!("rma_{period}"))
    }

    fn with_alpha(period: usize, alpha: f64, name: String) -> Self {
        Self {
            period,
            alpha,
            count: 0,
            seed_sum: 0.0,
            value: 0.0,
            name,
        }
    }

    pub fn next(&mut self, x: f64) -> f64 {
        self.count += 1;
        if self.count <= self.period {
            self.seed_sum += x;
            self.value = self.seed_sum / self.count as f64;
        } else {
            self.value += self.alpha * (x - self.value);
        }
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_warm(&self) -> bool {
        self.period > 0 && self.count >= self.period
    }

    pub fn clear(&mut self) {
        self.count = 0;
        self.seed_sum = 0.0;
        self.value = 0.0;
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        Ok(IndicatorValue::Scalar(self.next(candle.close)))
    }

    fn is_formed(&self) -> bool {
        self.is_warm()
    }

    fn reset(&mut self) {
        self.clear();
    }
}

// ─── WMA ──────────────────────────────────────────────────────────────────────

/// Linearly weighted moving average (newest weight = period). O(P) per update.
#[derive(Debug, Clone)]
pub struct Wma {
    period: usize,
    window: RingBuf,
    name: String,
}

impl Wma {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            window: RingBuf::new(period),
            name: format!("wma_{period}"),
        }
    }

    pub fn next(&mut self, x: f64) -> f64 {
        self.window.push(x);
        self.value()
    }

    pub fn value(&self) -> f64 {
        let mut num = 0.0;
        let mut den = 0.0;
        for (i, v) in self.window.iter().enumerate() {
            let w = (i + 1) as f64;
            num += w * v;
            den += w;
        }
        if den == 0.0 {
            0.0
        } else {
            num / den
        }
    }

    pub fn is_full(&self) -> bool {
        self.period > 0 && self.window.full()
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }
}

impl Indicator for Wma {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        Ok(IndicatorValue::Scalar(self.next(candle.close)))
    }

    fn is_formed(&self) -> bool {
        self.is_full()
    }

    fn reset(&mut self) {
        self.clear();
    }
}

// ─── Hull MA ──────────────────────────────────────────────────────────────────

/// Hull moving average: `WMA(2·WMA(n/2) − WMA(n), √n)`.
#[derive(Debug, Clone)]
pub struct Hma {
    half: Wma,
    full: Wma,
    smooth: Wma,
    name: String,
}

impl Hma {
    pub fn new(period: usize) -> Self {
        let half = (period / 2).max(1);
        let root = ((period as f64).sqrt().round() as usize).max(1);
        Self {
            half: Wma::new(half),
            full: Wma::new(period),
            smooth: Wma::new(root),
            name: format!("hma_{period}"),
        }
    }

    pub fn next(&mut self, x: f64) -> f64 {
        let h = self.half.next(x);
        let f = self.full.next(x);
        if self.full.is_full() {
            self.smooth.next(2.0 * h - f)
        } else {
            self.smooth.value()
        }
    }
}

impl Indicator for Hma {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        Ok(IndicatorValue::Scalar(self.next(candle.close)))
    }

    fn is_formed(&self) -> bool {
        self.smooth.is_full()
    }

    fn reset(&mut self) {
        self.half.clear();
        self.full.clear();
        self.smooth.clear();
    }
}

// ─── VWMA ─────────────────────────────────────────────────────────────────────

/// Volume-weighted moving average of close. Falls back to the plain mean when
/// the window has no volume.
#[derive(Debug, Clone)]
pub struct Vwma {
    period: usize,
    pv: RingBuf,
    vol: RingBuf,
    closes: Sma,
    sum_pv: f64,
    sum_vol: f64,
    name: String,
}

impl Vwma {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            pv: RingBuf::new(period),
            vol: RingBuf::new(period),
            closes: Sma::new(period),
            sum_pv: 0.0,
            sum_vol: 0.0,
            name: format!("vwma_{period}"),
        }
    }
}

impl Indicator for Vwma {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        if let Some(old) = self.pv.push(candle.close * candle.volume) {
            self.sum_pv -= old;
        }
        if let Some(old) = self.vol.push(candle.volume) {
            self.sum_vol -= old;
        }
        self.sum_pv += candle.close * candle.volume;
        self.sum_vol += candle.volume;
        let mean = self.closes.next(candle.close);

        let value = if self.sum_vol > 0.0 {
            self.sum_pv / self.sum_vol
        } else {
            mean
        };
        Ok(IndicatorValue::Scalar(value))
    }

    fn is_formed(&self) -> bool {
        self.period > 0 && self.vol.full()
    }

    fn reset(&mut self) {
        self.pv.clear();
        self.vol.clear();
        self.closes.clear();
        self.sum_pv = 0.0;
        self.sum_vol = 0.0;
    }
}
