use common::{Candle, Result};

use super::ma::Sma;
use super::{Field, Indicator, IndicatorValue};

/// SMA of one field of another indicator, e.g. the 20-bar average of ATR(14).
///
/// The inner indicator is updated first; the average only starts collecting
/// once the inner indicator is formed.
#[derive(Debug)]
pub struct Smoothed {
    inner: Box<dyn Indicator>,
    field: Field,
    sma: Sma,
    name: String,
}

impl Smoothed {
    pub fn new(inner: impl Indicator + 'static, period: usize) -> Self {
        Self::of_field(inner, Field::Value, period)
    }

    pub fn of_field(inner: impl Indicator + 'static, field: Field, period: usize) -> Self {
        let name = format!("sma_{period}({})", inner.name());
        Self {
            inner: Box::new(inner),
            field,
            sma: Sma::new(period),
            name,
        }
    }
}

impl Indicator for Smoothed {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        let inner = self.inner.update(candle)?;
        let value = match inner.field(self.field) {
            Some(v) if self.inner.is_formed() => self.sma.next(v),
            _ => self.sma.value(),
        };
        Ok(IndicatorValue::Scalar(value))
    }

    fn is_formed(&self) -> bool {
        self.sma.is_full()
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.sma.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{make_candles, run, Atr, Bollinger};

    #[test]
    fn atr_average_on_flat_series() {
        let candles = make_candles(&[50.0; 10]);
        let mut s = Smoothed::new(Atr::new(3), 4);
        let out = run(&mut s, &candles);
        // ATR formed at candle 3, average needs 4 more values -> formed at 6
        assert!(s.is_formed());
        assert_eq!(out[9].scalar(), Some(2.0));
    }

    #[test]
    fn not_formed_until_inner_and_window_ready() {
        let candles = make_candles(&[50.0; 5]);
        let mut s = Smoothed::new(Atr::new(3), 4);
        run(&mut s, &candles);
        assert!(!s.is_formed());
    }

    #[test]
    fn smooths_a_named_field() {
        let candles = make_candles(&[10.0; 6]);
        let mut s = Smoothed::of_field(Bollinger::new(3, 2.0), Field::Upper, 2);
        let out = run(&mut s, &candles);
        assert_eq!(out[5].scalar(), Some(10.0));
        assert!(s.name().starts_with("sma_2(bollinger"));
    }
}
