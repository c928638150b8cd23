//! Price channels. Windows include the current candle; rules that need "break
//! of the prior channel" compare against the previous bar's value.

use common::{Candle, Result};

use super::ma::Ema;
use super::volatility::Atr;
use super::{Indicator, IndicatorValue, RingBuf};

/// Highest high over `period` candles.
#[derive(Debug, Clone)]
pub struct Highest {
    period: usize,
    window: RingBuf,
    name: String,
}

impl Highest {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            window: RingBuf::new(period),
            name: format!("highest_{period}"),
        }
    }
}

impl Indicator for Highest {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        self.window.push(candle.high);
        Ok(IndicatorValue::Scalar(self.window.max()))
    }

    fn is_formed(&self) -> bool {
        self.period > 0 && self.window.full()
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

/// Lowest low over `period` candles.
#[derive(Debug, Clone)]
pub struct Lowest {
    period: usize,
    window: RingBuf,
    name: String,
}

impl Lowest {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            window: RingBuf::new(period),
            name: format!("lowest_{period}"),
        }
    }
}

impl Indicator for Lowest {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        self.window.push(candle.low);
        Ok(IndicatorValue::Scalar(self.window.min()))
    }

    fn is_formed(&self) -> bool {
        self.period > 0 && self.window.full()
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

/// Donchian channel: highest high, lowest low and their midpoint.
#[derive(Debug, Clone)]
pub struct Donchian {
    highest: Highest,
    lowest: Lowest,
    name: String,
}

impl Donchian {
    pub fn new(period: usize) -> Self {
        Self {
            highest: Highest::new(period),
            lowest: Lowest::new(period),
            name: format!("donchian_{period}"),
        }
    }
}

impl Indicator for Donchian {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        let upper = self.highest.update(candle)?.scalar().unwrap_or(candle.high);
        let lower = self.lowest.update(candle)?.scalar().unwrap_or(candle.low);
        Ok(IndicatorValue::Bands {
            upper,
            middle: (upper + lower) / 2.0,
            lower,
        })
    }

    fn is_formed(&self) -> bool {
        self.highest.is_formed() && self.lowest.is_formed()
    }

    fn reset(&mut self) {
        self.highest.reset();
        self.lowest.reset();
    }
}

/// Keltner channel: EMA(close) ± `multiplier` · ATR.
#[derive(Debug, Clone)]
pub struct Keltner {
    ema: Ema,
    atr: Atr,
    multiplier: f64,
    name: String,
}

impl Keltner {
    pub fn new(ema_period: usize, atr_period: usize, multiplier: f64) -> Self {
        Self {
            ema: Ema::new(ema_period),
            atr: Atr::new(atr_period),
            multiplier,
            name: format!("keltner_{ema_period}_{atr_period}_{multiplier}"),
        }
    }
}

impl Indicator for Keltner {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        let middle = self.ema.next(candle.close);
        let atr = self.atr.next(candle);
        Ok(IndicatorValue::Bands {
            upper: middle + self.multiplier * atr,
            middle,
            lower: middle - self.multiplier * atr,
        })
    }

    fn is_formed(&self) -> bool {
        self.ema.is_warm() && self.atr.is_warm()
    }

    fn reset(&mut self) {
        self.ema.clear();
        self.atr.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, make_ohlcv, run, Field, DEFAULT_EPSILON};

    #[test]
    fn donchian_tracks_extremes() {
        let candles = make_ohlcv(&[
            (10.0, 12.0, 9.0, 11.0, 1.0),
            (11.0, 15.0, 10.0, 14.0, 1.0),
            (14.0, 14.5, 7.0, 8.0, 1.0),
            (8.0, 9.0, 8.0, 8.5, 1.0),
        ]);
        let mut dc = Donchian::new(3);
        let out = run(&mut dc, &candles);
        assert!(dc.is_formed());
        assert_eq!(out[2], IndicatorValue::Bands { upper: 15.0, middle: 11.0, lower: 7.0 });
        // first candle dropped out of the window
        assert_eq!(out[3].field(Field::Upper), Some(15.0));
        assert_eq!(out[3].field(Field::Lower), Some(7.0));
    }

    #[test]
    fn highest_lowest_formed_after_period() {
        let candles = make_candles(&[1.0, 2.0]);
        let mut hi = Highest::new(3);
        let mut lo = Lowest::new(2);
        run(&mut hi, &candles);
        run(&mut lo, &candles);
        assert!(!hi.is_formed());
        assert!(lo.is_formed());
    }

    #[test]
    fn keltner_on_flat_series() {
        // flat closes: EMA 100, ATR 2 (high-low)
        let candles = make_candles(&[100.0; 25]);
        let mut kc = Keltner::new(20, 10, 1.5);
        let out = run(&mut kc, &candles);
        assert!(kc.is_formed());
        assert_approx(out[24].field(Field::Upper).unwrap(), 103.0, DEFAULT_EPSILON);
        assert_approx(out[24].field(Field::Lower).unwrap(), 97.0, DEFAULT_EPSILON);
    }
}
