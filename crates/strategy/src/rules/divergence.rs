use common::Signal;

use super::{Operand, Rule, RuleContext};

/// One-step divergence between price and an oscillator.
///
/// Price falling while the oscillator rises is bullish; price rising while it
/// falls is bearish. The first formed candle only seeds the previous pair.
#[derive(Debug, Clone)]
pub struct Divergence {
    price: Operand,
    osc: Operand,
    allow_short: bool,
    prev: Option<(f64, f64)>,
}

impl Divergence {
    pub fn new(price: Operand, osc: Operand) -> Self {
        Self {
            price,
            osc,
            allow_short: true,
            prev: None,
        }
    }

    pub fn long_only(mut self) -> Self {
        self.allow_short = false;
        self
    }
}

impl Rule for Divergence {
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Signal {
        let (Some((prev_price, prev_osc)), Some(price), Some(osc)) =
            (self.prev, self.price.current(ctx), self.osc.current(ctx))
        else {
            return Signal::Hold;
        };
        let dp = price - prev_price;
        let dosc = osc - prev_osc;

        if dp < 0.0 && dosc > 0.0 {
            Signal::EnterLong
        } else if dp > 0.0 && dosc < 0.0 {
            if self.allow_short {
                Signal::EnterShort
            } else if ctx.is_long() {
                Signal::ExitLong
            } else {
                Signal::Hold
            }
        } else {
            Signal::Hold
        }
    }

    fn commit(&mut self, ctx: &RuleContext<'_>) {
        if let (Some(p), Some(o)) = (self.price.current(ctx), self.osc.current(ctx)) {
            self.prev = Some((p, o));
        }
    }

    fn reset(&mut self) {
        self.prev = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator_set::{IndicatorHandle, IndicatorValues};
    use crate::indicators::IndicatorValue;
    use crate::rules::testing::{close, flat, long};
    use common::Position;

    fn step(rule: &mut Divergence, price: f64, osc: f64, pos: &Position) -> Signal {
        let candle = close(price);
        let values = IndicatorValues::from_slots(vec![Some(IndicatorValue::Scalar(osc))]);
        let ctx = RuleContext {
            candle: &candle,
            prev_candle: None,
            values: &values,
            prev_values: None,
            position: pos,
            bar_index: 0,
        };
        let signal = rule.evaluate(&ctx);
        rule.commit(&ctx);
        signal
    }

    fn rule() -> Divergence {
        Divergence::new(Operand::Close, Operand::series(IndicatorHandle::new(0)))
    }

    #[test]
    fn seeds_before_trading() {
        let mut r = rule();
        assert_eq!(step(&mut r, 100.0, 40.0, &flat()), Signal::Hold);
        assert_eq!(step(&mut r, 99.0, 42.0, &flat()), Signal::EnterLong);
    }

    #[test]
    fn bearish_divergence() {
        let mut r = rule();
        step(&mut r, 100.0, 60.0, &flat());
        assert_eq!(step(&mut r, 101.0, 58.0, &flat()), Signal::EnterShort);
        // agreement is not a signal
        assert_eq!(step(&mut r, 102.0, 59.0, &flat()), Signal::Hold);
    }

    #[test]
    fn long_only_exits_instead_of_shorting() {
        let mut r = rule().long_only();
        step(&mut r, 100.0, 60.0, &long(1));
        assert_eq!(step(&mut r, 101.0, 58.0, &long(1)), Signal::ExitLong);
    }

    #[test]
    fn evaluate_does_not_move_scratch() {
        let mut r = rule();
        step(&mut r, 100.0, 40.0, &flat());
        let candle = close(99.0);
        let values = IndicatorValues::from_slots(vec![Some(IndicatorValue::Scalar(42.0))]);
        let pos = flat();
        let ctx = RuleContext {
            candle: &candle,
            prev_candle: None,
            values: &values,
            prev_values: None,
            position: &pos,
            bar_index: 1,
        };
        assert_eq!(r.evaluate(&ctx), Signal::EnterLong);
        assert_eq!(r.evaluate(&ctx), Signal::EnterLong);
    }

    #[test]
    fn reset_requires_new_seed() {
        let mut r = rule();
        step(&mut r, 100.0, 40.0, &flat());
        r.reset();
        assert_eq!(step(&mut r, 99.0, 42.0, &flat()), Signal::Hold);
    }
}
