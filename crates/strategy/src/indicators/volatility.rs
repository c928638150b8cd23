//! Volatility: ATR, rolling standard deviation and Bollinger Bands.

use common::{Candle, Result};

use super::ma::Ema;
use super::{Indicator, IndicatorValue, RingBuf};

/// True range of `candle` given the previous close.
pub fn true_range(candle: &Candle, prev_close: Option<f64>) -> f64 {
    let hl = candle.high - candle.low;
    match prev_close {
        Some(pc) => hl.max((candle.high - pc).abs()).max((candle.low - pc).abs()),
        None => hl,
    }
}

// ─── ATR ──────────────────────────────────────────────────────────────────────

/// Average True Range with Wilder smoothing. Formed after `period` candles.
#[derive(Debug, Clone)]
pub struct Atr {
    rma: Ema,
    prev_close: Option<f64>,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Self {
            rma: Ema::wilder(period),
            prev_close: None,
            name: format!("atr_{period}"),
        }
    }

    pub fn next(&mut self, candle: &Candle) -> f64 {
        let tr = true_range(candle, self.prev_close);
        self.prev_close = Some(candle.close);
        self.rma.next(tr)
    }

    pub fn value(&self) -> f64 {
        self.rma.value()
    }

    pub fn is_warm(&self) -> bool {
        self.rma.is_warm()
    }

    pub fn clear(&mut self) {
        self.rma.clear();
        self.prev_close = None;
    }
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        Ok(IndicatorValue::Scalar(self.next(candle)))
    }

    fn is_formed(&self) -> bool {
        self.is_warm()
    }

    fn reset(&mut self) {
        self.clear();
    }
}

// ─── StdDev ───────────────────────────────────────────────────────────────────

/// Population standard deviation of close over a rolling window.
#[derive(Debug, Clone)]
pub struct StdDev {
    period: usize,
    window: RingBuf,
    name: String,
}

impl StdDev {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            window: RingBuf::new(period),
            name: format!("stddev_{period}"),
        }
    }
}

impl Indicator for StdDev {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        self.window.push(candle.close);
        Ok(IndicatorValue::Scalar(self.window.std_pop()))
    }

    fn is_formed(&self) -> bool {
        self.period > 0 && self.window.full()
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

// ─── Bollinger ────────────────────────────────────────────────────────────────

/// Bollinger Bands: SMA(close) ± `width` · population stddev.
#[derive(Debug, Clone)]
pub struct Bollinger {
    period: usize,
    width: f64,
    window: RingBuf,
    name: String,
}

impl Bollinger {
    pub fn new(period: usize, width: f64) -> Self {
        Self {
            period,
            width,
            window: RingBuf::new(period),
            name: format!("bollinger_{period}_{width}"),
        }
    }
}

impl Indicator for Bollinger {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        self.window.push(candle.close);
        let middle = self.window.mean();
        let dev = self.width * self.window.std_pop();
        Ok(IndicatorValue::Bands {
            upper: middle + dev,
            middle,
            lower: middle - dev,
        })
    }

    fn is_formed(&self) -> bool {
        self.period > 0 && self.window.full()
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}
