use common::{Candle, Result};

use super::ma::Ema;
use super::{Indicator, IndicatorValue};

/// MACD: `EMA(fast) − EMA(slow)` with an EMA signal line over the MACD line.
///
/// The signal EMA is only fed once the slow EMA is warm, so the indicator is
/// formed after `slow + signal − 1` candles.
#[derive(Debug, Clone)]
pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
    name: String,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast: Ema::new(fast),
            slow: Ema::new(slow),
            signal: Ema::new(signal),
            name: format!("macd_{fast}_{slow}_{signal}"),
        }
    }

    /// Standard 12/26/9 configuration.
    pub fn standard() -> Self {
        Self::new(12, 26, 9)
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        let fast = self.fast.next(candle.close);
        let slow = self.slow.next(candle.close);
        let macd = fast - slow;
        let signal = if self.slow.is_warm() {
            self.signal.next(macd)
        } else {
            self.signal.value()
        };
        Ok(IndicatorValue::Macd {
            macd,
            signal,
            histogram: macd - signal,
        })
    }

    fn is_formed(&self) -> bool {
        self.fast.is_warm() && self.slow.is_warm() && self.signal.is_warm()
    }

    fn reset(&mut self) {
        self.fast.clear();
        self.slow.clear();
        self.signal.clear();
    }
}
