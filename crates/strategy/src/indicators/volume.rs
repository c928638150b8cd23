//! Volume-based indicators: OBV, Accumulation/Distribution and session VWAP.

use chrono::NaiveDate;
use common::{Candle, Result};

use super::{Indicator, IndicatorValue};

/// On-balance volume. Formed once a previous close exists.
#[derive(Debug, Clone, Default)]
pub struct Obv {
    prev_close: Option<f64>,
    total: f64,
    count: usize,
}

impl Obv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Indicator for Obv {
    fn name(&self) -> &str {
        "obv"
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        if let Some(prev) = self.prev_close {
            if candle.close > prev {
                self.total += candle.volume;
            } else if candle.close < prev {
                self.total -= candle.volume;
            }
        }
        self.prev_close = Some(candle.close);
        self.count += 1;
        Ok(IndicatorValue::Scalar(self.total))
    }

    fn is_formed(&self) -> bool {
        self.count >= 2
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Accumulation/Distribution line: cumulative money-flow volume.
#[derive(Debug, Clone, Default)]
pub struct AccumulationDistribution {
    total: f64,
    count: usize,
}

impl AccumulationDistribution {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Indicator for AccumulationDistribution {
    fn name(&self) -> &str {
        "accumulation_distribution"
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        let range = candle.range();
        if range > 0.0 {
            let mfm = ((candle.close - candle.low) - (candle.high - candle.close)) / range;
            self.total += mfm * candle.volume;
        }
        self.count += 1;
        Ok(IndicatorValue::Scalar(self.total))
    }

    fn is_formed(&self) -> bool {
        self.count >= 1
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Volume-weighted average typical price, re-anchored at each UTC day.
#[derive(Debug, Clone, Default)]
pub struct Vwap {
    session: Option<NaiveDate>,
    sum_pv: f64,
    sum_vol: f64,
}

impl Vwap {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Indicator for Vwap {
    fn name(&self) -> &str {
        "vwap"
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        let day = candle.open_time.date_naive();
        if self.session != Some(day) {
            self.session = Some(day);
            self.sum_pv = 0.0;
            self.sum_vol = 0.0;
        }
        let tp = candle.typical_price();
        self.sum_pv += tp * candle.volume;
        self.sum_vol += candle.volume;
        let value = if self.sum_vol > 0.0 {
            self.sum_pv / self.sum_vol
        } else {
            tp
        };
        Ok(IndicatorValue::Scalar(value))
    }

    fn is_formed(&self) -> bool {
        self.session.is_some()
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, make_ohlcv, run, DEFAULT_EPSILON};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn obv_accumulates_by_direction() {
        let candles = make_candles(&[10.0, 11.0, 10.5, 10.5, 12.0]);
        let mut obv = Obv::new();
        let out = run(&mut obv, &candles);
        let values: Vec<f64> = out.iter().map(|v| v.scalar().unwrap()).collect();
        assert_eq!(values, vec![0.0, 1000.0, 0.0, 0.0, 1000.0]);
        assert!(obv.is_formed());
    }

    #[test]
    fn accumulation_distribution_close_at_high() {
        let candles = make_ohlcv(&[
            (10.0, 12.0, 8.0, 12.0, 100.0),
            (12.0, 12.0, 8.0, 8.0, 50.0),
        ]);
        let mut ad = AccumulationDistribution::new();
        let out = run(&mut ad, &candles);
        assert_approx(out[0].scalar().unwrap(), 100.0, DEFAULT_EPSILON);
        assert_approx(out[1].scalar().unwrap(), 50.0, DEFAULT_EPSILON);
    }

    #[test]
    fn vwap_resets_each_day() {
        let base = Utc.with_ymd_and_hms(2024, 3, 4, 22, 0, 0).unwrap();
        let mut candles = make_ohlcv(&[
            (10.0, 10.0, 10.0, 10.0, 1.0),
            (20.0, 20.0, 20.0, 20.0, 1.0),
            (30.0, 30.0, 30.0, 30.0, 2.0),
        ]);
        for (i, c) in candles.iter_mut().enumerate() {
            c.open_time = base + Duration::hours(i as i64);
        }
        let mut vwap = Vwap::new();
        let out = run(&mut vwap, &candles);
        assert_approx(out[1].scalar().unwrap(), 15.0, DEFAULT_EPSILON);
        // 00:00 next day starts a new session
        assert_approx(out[2].scalar().unwrap(), 30.0, DEFAULT_EPSILON);
    }
}
