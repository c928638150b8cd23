//! Position-aware exits and slope turns.

use common::Signal;

use super::{Operand, Rule, RuleContext};
use crate::indicators::RingBuf;

/// Exit when the close is on the wrong side of a series: longs below it,
/// shorts above it.
#[derive(Debug, Clone)]
pub struct PriceExit {
    series: Operand,
}

impl PriceExit {
    pub fn new(series: Operand) -> Self {
        Self { series }
    }
}

impl Rule for PriceExit {
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Signal {
        let Some(level) = self.series.current(ctx) else {
            return Signal::Hold;
        };
        let close = ctx.candle.close;
        if ctx.is_long() && close < level {
            Signal::ExitLong
        } else if ctx.is_short() && close > level {
            Signal::ExitShort
        } else {
            Signal::Hold
        }
    }
}

/// Trade turns of a series: a local minimum (`v[t−2] > v[t−1] < v[t]`) enters
/// long, a local maximum enters short. Needs two seeded prior values.
#[derive(Debug, Clone)]
pub struct SlopeReversal {
    series: Operand,
    allow_short: bool,
    history: RingBuf,
}

impl SlopeReversal {
    pub fn new(series: Operand) -> Self {
        Self {
            series,
            allow_short: true,
            history: RingBuf::new(2),
        }
    }

    pub fn long_only(mut self) -> Self {
        self.allow_short = false;
        self
    }
}

impl Rule for SlopeReversal {
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Signal {
        let (Some(cur), Some(p1), Some(p2)) = (
            self.series.current(ctx),
            self.history.get_back(0),
            self.history.get_back(1),
        ) else {
            return Signal::Hold;
        };

        if p2 > p1 && cur > p1 {
            Signal::EnterLong
        } else if p2 < p1 && cur < p1 {
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
        if let Some(v) = self.series.current(ctx) {
            self.history.push(v);
        }
    }

    fn reset(&mut self) {
        self.history.clear();
    }
}
