//! Entry gates: a gate decides whether a proposed entry may pass. Exits are
//! never gated.

use std::fmt;

use common::{Direction, Signal};

use super::{Rule, RuleContext};
use crate::indicator_set::IndicatorHandle;
use crate::indicators::Field;

/// Admission test for entries in a given direction.
pub trait Gate: Send + fmt::Debug {
    fn allows(&self, ctx: &RuleContext<'_>, direction: Direction) -> bool;

    fn commit(&mut self, _ctx: &RuleContext<'_>) {}

    fn reset(&mut self) {}
}

impl<G: Gate + ?Sized> Gate for Box<G> {
    fn allows(&self, ctx: &RuleContext<'_>, direction: Direction) -> bool {
        (**self).allows(ctx, direction)
    }

    fn commit(&mut self, ctx: &RuleContext<'_>) {
        (**self).commit(ctx)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// A rule whose entries must pass a gate.
///
/// `EnterLong`, `EnterShort` and `Reverse` are checked against the gate in the
/// direction they would open; a blocked `Reverse` degrades to closing the
/// position. Exits and `ClosePosition` pass unchanged.
#[derive(Debug)]
pub struct Gated<R, G> {
    rule: R,
    gate: G,
}

impl<R: Rule, G: Gate> Gated<R, G> {
    pub fn new(rule: R, gate: G) -> Self {
        Self { rule, gate }
    }
}

impl<R: Rule, G: Gate> Rule for Gated<R, G> {
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Signal {
        let signal = self.rule.evaluate(ctx);
        match signal {
            Signal::EnterLong if !self.gate.allows(ctx, Direction::Long) => Signal::Hold,
            Signal::EnterShort if !self.gate.allows(ctx, Direction::Short) => Signal::Hold,
            Signal::Reverse => match ctx.direction() {
                Some(d) if !self.gate.allows(ctx, d.opposite()) => Signal::ClosePosition,
                _ => Signal::Reverse,
            },
            other => other,
        }
    }

    fn commit(&mut self, ctx: &RuleContext<'_>) {
        self.rule.commit(ctx);
        self.gate.commit(ctx);
    }

    fn reset(&mut self) {
        self.rule.reset();
        self.gate.reset();
    }
}

/// Which side of the average the current ATR must be on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolatilityMode {
    /// Enter only in quiet markets: `atr < avg × ratio`.
    Below,
    /// Enter only on expansion: `atr > avg × ratio`.
    Above,
}

/// Compare ATR against its own average. A missing reading closes the gate.
#[derive(Debug, Clone)]
pub struct VolatilityFilter {
    atr: IndicatorHandle,
    atr_avg: IndicatorHandle,
    ratio: f64,
    mode: VolatilityMode,
}

impl VolatilityFilter {
    pub fn new(atr: IndicatorHandle, atr_avg: IndicatorHandle, ratio: f64, mode: VolatilityMode) -> Self {
        Self {
            atr,
            atr_avg,
            ratio,
            mode,
        }
    }
}

impl Gate for VolatilityFilter {
    fn allows(&self, ctx: &RuleContext<'_>, _direction: Direction) -> bool {
        let (Some(atr), Some(avg)) = (ctx.values.scalar(self.atr), ctx.values.scalar(self.atr_avg))
        else {
            return false;
        };
        let limit = avg * self.ratio;
        match self.mode {
            VolatilityMode::Below => atr < limit,
            VolatilityMode::Above => atr > limit,
        }
    }
}

/// ADX above a threshold, with the directional indices agreeing with the
/// entry: `+DI > −DI` for longs, `−DI > +DI` for shorts.
#[derive(Debug, Clone)]
pub struct TrendStrengthFilter {
    adx: IndicatorHandle,
    threshold: f64,
}

impl TrendStrengthFilter {
    pub fn new(adx: IndicatorHandle, threshold: f64) -> Self {
        Self { adx, threshold }
    }
}

impl Gate for TrendStrengthFilter {
    fn allows(&self, ctx: &RuleContext<'_>, direction: Direction) -> bool {
        let v = ctx.values;
        let (Some(adx), Some(plus), Some(minus)) = (
            v.field(self.adx, Field::Value),
            v.field(self.adx, Field::PlusDi),
            v.field(self.adx, Field::MinusDi),
        ) else {
            return false;
        };
        if adx <= self.threshold {
            return false;
        }
        match direction {
            Direction::Long => plus > minus,
            Direction::Short => minus > plus,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator_set::IndicatorValues;
    use crate::indicators::IndicatorValue;
    use crate::rules::testing::{close, flat, long};
    use common::Position;

    /// Emits a fixed signal.
    #[derive(Debug)]
    struct Fixed(Signal);

    impl Rule for Fixed {
        fn evaluate(&self, _ctx: &RuleContext<'_>) -> Signal {
            self.0
        }
    }

    fn eval(rule: &dyn Rule, values: &IndicatorValues, pos: &Position) -> Signal {
        let candle = close(100.0);
        rule.evaluate(&RuleContext {
            candle: &candle,
            prev_candle: None,
            values,
            prev_values: None,
            position: pos,
            bar_index: 10,
        })
    }

    fn atr_values(atr: f64, avg: f64) -> IndicatorValues {
        IndicatorValues::from_slots(vec![
            Some(IndicatorValue::Scalar(atr)),
            Some(IndicatorValue::Scalar(avg)),
        ])
    }

    fn quiet() -> VolatilityFilter {
        VolatilityFilter::new(IndicatorHandle::new(0), IndicatorHandle::new(1), 1.0, VolatilityMode::Below)
    }

    #[test]
    fn volatility_gate_blocks_entries_only() {
        let gated = Gated::new(Fixed(Signal::EnterLong), quiet());
        assert_eq!(eval(&gated, &atr_values(1.0, 2.0), &flat()), Signal::EnterLong);
        assert_eq!(eval(&gated, &atr_values(2.0, 2.0), &flat()), Signal::Hold);

        let exit = Gated::new(Fixed(Signal::ExitLong), quiet());
        assert_eq!(eval(&exit, &atr_values(3.0, 2.0), &long(1)), Signal::ExitLong);
    }

    #[test]
    fn volatility_gate_closed_on_missing_average() {
        let gated = Gated::new(Fixed(Signal::EnterShort), quiet());
        let values = IndicatorValues::from_slots(vec![Some(IndicatorValue::Scalar(1.0)), None]);
        assert_eq!(eval(&gated, &values, &flat()), Signal::Hold);
    }

    #[test]
    fn expansion_mode() {
        let gated = Gated::new(
            Fixed(Signal::EnterLong),
            VolatilityFilter::new(IndicatorHandle::new(0), IndicatorHandle::new(1), 1.5, VolatilityMode::Above),
        );
        assert_eq!(eval(&gated, &atr_values(3.1, 2.0), &flat()), Signal::EnterLong);
        assert_eq!(eval(&gated, &atr_values(3.0, 2.0), &flat()), Signal::Hold);
    }

    #[test]
    fn trend_strength_needs_level_and_direction() {
        let adx = |ma, plus_di, minus_di| {
            IndicatorValues::from_slots(vec![Some(IndicatorValue::Adx { ma, plus_di, minus_di })])
        };
        let long_rule = Gated::new(Fixed(Signal::EnterLong), TrendStrengthFilter::new(IndicatorHandle::new(0), 25.0));
        assert_eq!(eval(&long_rule, &adx(30.0, 28.0, 12.0), &flat()), Signal::EnterLong);
        assert_eq!(eval(&long_rule, &adx(25.0, 28.0, 12.0), &flat()), Signal::Hold);
        assert_eq!(eval(&long_rule, &adx(30.0, 12.0, 28.0), &flat()), Signal::Hold);

        let short_rule = Gated::new(Fixed(Signal::EnterShort), TrendStrengthFilter::new(IndicatorHandle::new(0), 25.0));
        assert_eq!(eval(&short_rule, &adx(30.0, 12.0, 28.0), &flat()), Signal::EnterShort);
    }

    #[test]
    fn blocked_reverse_degrades_to_close() {
        let gated = Gated::new(Fixed(Signal::Reverse), quiet());
        assert_eq!(eval(&gated, &atr_values(5.0, 2.0), &long(1)), Signal::ClosePosition);
        assert_eq!(eval(&gated, &atr_values(1.0, 2.0), &long(1)), Signal::Reverse);
    }
}
