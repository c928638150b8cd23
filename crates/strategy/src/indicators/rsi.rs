use common::{Candle, Result};

use super::{Indicator, IndicatorValue};

/// RSI (Relative Strength Index) with Wilder smoothing.
///
/// The first average gain/loss is the simple mean of the first `period`
/// changes; afterwards `avg = (avg·(n−1) + x) / n`. Formed after `period + 1`
/// candles. Output is in [0, 100]; a window without losses reads 100, a window
/// without any movement reads 50.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    prev_close: Option<f64>,
    changes: usize,
    avg_gain: f64,
    avg_loss: f64,
    name: String,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_close: None,
            changes: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
            name: format!("rsi_{period}"),
        }
    }

    pub fn next(&mut self, close: f64) -> f64 {
        let Some(prev) = self.prev_close.replace(close) else {
            return 50.0;
        };
        let change = close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        let n = self.period.max(1) as f64;

        self.changes += 1;
        if self.changes <= self.period {
            // Simple mean over the seed window.
            let k = self.changes as f64;
            self.avg_gain += (gain - self.avg_gain) / k;
            self.avg_loss += (loss - self.avg_loss) / k;
        } else {
            self.avg_gain = (self.avg_gain * (n - 1.0) + gain) / n;
            self.avg_loss = (self.avg_loss * (n - 1.0) + loss) / n;
        }
        self.value()
    }

    pub fn value(&self) -> f64 {
        if self.avg_loss == 0.0 {
            return if self.avg_gain == 0.0 { 50.0 } else { 100.0 };
        }
        let rs = self.avg_gain / self.avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        Ok(IndicatorValue::Scalar(self.next(candle.close)))
    }

    fn is_formed(&self) -> bool {
        self.period > 0 && self.changes >= self.period
    }

    fn reset(&mut self) {
        self.prev_close = None;
        self.changes = 0;
        self.avg_gain = 0.0;
        self.avg_loss = 0.0;
    }
}

/// Ehlers' Laguerre RSI. Output in [0, 1]; `gamma` in [0, 1) sets the
/// smoothing (higher = smoother). Formed after four candles.
#[derive(Debug, Clone)]
pub struct LaguerreRsi {
    gamma: f64,
    l: Option<[f64; 4]>,
    count: usize,
    value: f64,
    name: String,
}

impl LaguerreRsi {
    pub fn new(gamma: f64) -> Self {
        Self {
            gamma,
            l: None,
            count: 0,
            value: 0.5,
            name: format!("laguerre_rsi_{gamma}"),
        }
    }
}

impl Indicator for LaguerreRsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        let g = self.gamma;
        let x = candle.close;
        let prev = self.l.unwrap_or([x; 4]);

        let l0 = (1.0 - g) * x + g * prev[0];
        let l1 = -g * l0 + prev[0] + g * prev[1];
        let l2 = -g * l1 + prev[1] + g * prev[2];
        let l3 = -g * l2 + prev[2] + g * prev[3];
        self.l = Some([l0, l1, l2, l3]);
        self.count += 1;

        let mut cu = 0.0;
        let mut cd = 0.0;
        for (a, b) in [(l0, l1), (l1, l2), (l2, l3)] {
            if a >= b {
                cu += a - b;
            } else {
                cd += b - a;
            }
        }
        self.value = if cu + cd == 0.0 { 0.5 } else { cu / (cu + cd) };
        Ok(IndicatorValue::Scalar(self.value))
    }

    fn is_formed(&self) -> bool {
        self.count >= 4
    }

    fn reset(&mut self) {
        self.l = None;
        self.count = 0;
        self.value = 0.5;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, run};
    use proptest::prelude::*;

    #[test]
    fn rsi_not_formed_until_period_plus_one() {
        let candles = make_candles(&[100.0; 15]);
        let mut rsi = Rsi::new(14);
        run(&mut rsi, &candles[..14]);
        assert!(!rsi.is_formed());
        rsi.update(&candles[14]).unwrap();
        assert!(rsi.is_formed());
    }

    #[test]
    fn rsi_all_gains_returns_100() {
        let candles = make_candles(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let mut rsi = Rsi::new(3);
        let out = run(&mut rsi, &candles);
        assert_approx(out[4].scalar().unwrap(), 100.0, 1e-6);
    }

    #[test]
    fn rsi_all_losses_returns_0() {
        let candles = make_candles(&[14.0, 13.0, 12.0, 11.0, 10.0]);
        let mut rsi = Rsi::new(3);
        let out = run(&mut rsi, &candles);
        assert_approx(out[4].scalar().unwrap(), 0.0, 1e-6);
    }

    #[test]
    fn rsi_flat_reads_50() {
        let candles = make_candles(&[10.0; 6]);
        let mut rsi = Rsi::new(3);
        let out = run(&mut rsi, &candles);
        assert_eq!(out[5].scalar(), Some(50.0));
    }

    #[test]
    fn rsi_wilder_smoothing_known_value() {
        // changes: +1, -1, +2, then -1 (period 2)
        // seed after 2 changes: gain 0.5, loss 0.5
        // third change +2: gain (0.5+2)/2 = 1.25, loss 0.25 -> rs 5 -> 83.333
        let candles = make_candles(&[10.0, 11.0, 10.0, 12.0]);
        let mut rsi = Rsi::new(2);
        let out = run(&mut rsi, &candles);
        assert_approx(out[3].scalar().unwrap(), 100.0 - 100.0 / 6.0, 1e-9);
    }

    #[test]
    fn laguerre_rsi_rises_in_uptrend() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let candles = make_candles(&closes);
        let mut lrsi = LaguerreRsi::new(0.5);
        let out = run(&mut lrsi, &candles);
        assert!(lrsi.is_formed());
        assert_approx(out[29].scalar().unwrap(), 1.0, 1e-9);
    }

    proptest! {
        #[test]
        fn rsi_stays_in_range(closes in prop::collection::vec(1.0f64..10_000.0, 2..80)) {
            let candles = make_candles(&closes);
            let mut rsi = Rsi::new(14);
            for v in run(&mut rsi, &candles) {
                let v = v.scalar().unwrap();
                prop_assert!((0.0..=100.0).contains(&v), "RSI out of range: {v}");
            }
        }

        #[test]
        fn laguerre_stays_in_unit_range(closes in prop::collection::vec(1.0f64..10_000.0, 1..80)) {
            let candles = make_candles(&closes);
            let mut lrsi = LaguerreRsi::new(0.7);
            for v in run(&mut lrsi, &candles) {
                let v = v.scalar().unwrap();
                prop_assert!((0.0..=1.0 + 1e-12).contains(&v));
            }
        }
    }
}
