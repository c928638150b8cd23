use common::{Error, Result, Signal};

use super::{Operand, Rule, RuleContext};

/// How an oscillator reading triggers an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdMode {
    /// Enter while the reading is beyond the threshold (`< oversold`,
    /// `> overbought`).
    Level,
    /// Enter when the reading crosses back inside: previous `≤ oversold` and
    /// current `> oversold` for longs, mirrored for shorts.
    CrossBack,
}

/// Oversold / overbought thresholds on an oscillator.
///
/// Comparisons are strict; a reading exactly at a threshold is `Hold`. With
/// `exit_mid` set, longs exit once the reading rises above it and shorts once
/// it falls below.
#[derive(Debug, Clone)]
pub struct OscillatorThreshold {
    osc: Operand,
    oversold: f64,
    overbought: f64,
    exit_mid: Option<f64>,
    mode: ThresholdMode,
    allow_short: bool,
}

impl OscillatorThreshold {
    pub fn new(osc: Operand, oversold: f64, overbought: f64) -> Result<Self> {
        if oversold.is_nan() || overbought.is_nan() || oversold >= overbought {
            return Err(Error::invalid_config(format!(
                "oversold ({oversold}) must be below overbought ({overbought})"
            )));
        }
        Ok(Self {
            osc,
            oversold,
            overbought,
            exit_mid: None,
            mode: ThresholdMode::Level,
            allow_short: true,
        })
    }

    pub fn exit_mid(mut self, level: f64) -> Self {
        self.exit_mid = Some(level);
        self
    }

    pub fn mode(mut self, mode: ThresholdMode) -> Self {
        self.mode = mode;
        self
    }

    /// Overbought readings exit longs instead of opening shorts.
    pub fn long_only(mut self) -> Self {
        self.allow_short = false;
        self
    }

    fn zone(&self, ctx: &RuleContext<'_>, value: f64) -> Option<bool> {
        match self.mode {
            ThresholdMode::Level => {
                if value < self.oversold {
                    Some(true)
                } else if value > self.overbought {
                    Some(false)
                } else {
                    None
                }
            }
            ThresholdMode::CrossBack => {
                let prev = self.osc.previous(ctx)?;
                if prev <= self.oversold && value > self.oversold {
                    Some(true)
                } else if prev >= self.overbought && value < self.overbought {
                    Some(false)
                } else {
                    None
                }
            }
        }
    }
}

impl Rule for OscillatorThreshold {
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Signal {
        let Some(value) = self.osc.current(ctx) else {
            return Signal::Hold;
        };

        match self.zone(ctx, value) {
            Some(true) if !ctx.is_long() => return Signal::EnterLong,
            Some(false) if self.allow_short && !ctx.is_short() => return Signal::EnterShort,
            Some(false) if !self.allow_short && ctx.is_long() => return Signal::ExitLong,
            _ => {}
        }

        if let Some(mid) = self.exit_mid {
            if ctx.is_long() && value > mid {
                return Signal::ExitLong;
            }
            if ctx.is_short() && value < mid {
                return Signal::ExitShort;
            }
        }
        Signal::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator_set::{IndicatorHandle, IndicatorValues};
    use crate::indicators::IndicatorValue;
    use crate::rules::testing::{close, flat, long, short};
    use common::Position;

    fn v(x: f64) -> IndicatorValues {
        IndicatorValues::from_slots(vec![Some(IndicatorValue::Scalar(x))])
    }

    fn eval(rule: &OscillatorThreshold, prev: Option<f64>, cur: f64, pos: &Position) -> Signal {
        let candle = close(100.0);
        let prev = prev.map(v);
        let cur = v(cur);
        rule.evaluate(&RuleContext {
            candle: &candle,
            prev_candle: None,
            values: &cur,
            prev_values: prev.as_ref(),
            position: pos,
            bar_index: 3,
        })
    }

    fn rsi_rule() -> OscillatorThreshold {
        OscillatorThreshold::new(Operand::series(IndicatorHandle::new(0)), 30.0, 70.0).unwrap()
    }

    #[test]
    fn strict_thresholds() {
        let r = rsi_rule();
        assert_eq!(eval(&r, None, 29.9, &flat()), Signal::EnterLong);
        assert_eq!(eval(&r, None, 30.0, &flat()), Signal::Hold);
        assert_eq!(eval(&r, None, 70.0, &flat()), Signal::Hold);
        assert_eq!(eval(&r, None, 70.1, &flat()), Signal::EnterShort);
        assert_eq!(eval(&r, None, 70.1, &long(1)), Signal::EnterShort);
    }

    #[test]
    fn exit_at_mid() {
        let r = rsi_rule().exit_mid(50.0);
        assert_eq!(eval(&r, None, 55.0, &long(1)), Signal::ExitLong);
        assert_eq!(eval(&r, None, 50.0, &long(1)), Signal::Hold);
        assert_eq!(eval(&r, None, 45.0, &short(1)), Signal::ExitShort);
        assert_eq!(eval(&r, None, 55.0, &flat()), Signal::Hold);
    }

    #[test]
    fn long_only_exits_when_overbought() {
        let r = rsi_rule().long_only();
        assert_eq!(eval(&r, None, 75.0, &long(1)), Signal::ExitLong);
        assert_eq!(eval(&r, None, 75.0, &flat()), Signal::Hold);
    }

    #[test]
    fn cross_back_mode() {
        let r = OscillatorThreshold::new(Operand::series(IndicatorHandle::new(0)), -100.0, 100.0)
            .unwrap()
            .mode(ThresholdMode::CrossBack);
        assert_eq!(eval(&r, Some(-120.0), -90.0, &flat()), Signal::EnterLong);
        assert_eq!(eval(&r, Some(-120.0), -110.0, &flat()), Signal::Hold);
        assert_eq!(eval(&r, None, -90.0, &flat()), Signal::Hold);
        assert_eq!(eval(&r, Some(120.0), 90.0, &flat()), Signal::EnterShort);
    }

    #[test]
    fn oversold_above_overbought_is_invalid_config() {
        let err = OscillatorThreshold::new(Operand::Close, 80.0, 20.0).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(OscillatorThreshold::new(Operand::Close, 50.0, 50.0).is_err());
    }
}
