//! Channel breakout and mean-reversion rules.

use common::{Error, Result, Signal};

use super::{Operand, Rule, RuleContext};
use crate::indicator_set::IndicatorHandle;
use crate::indicators::Field;

/// Which bar's band a breakout is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandReference {
    /// Close crosses the band of the same bar: `close[t] > upper[t]` and
    /// `close[t−1] ≤ upper[t−1]`.
    Current,
    /// Close exceeds the previous bar's band (for channels that include the
    /// current bar, such as Donchian).
    Previous,
}

/// Enter on a close outside a channel.
#[derive(Debug, Clone)]
pub struct BandBreakout {
    channel: IndicatorHandle,
    reference: BandReference,
    allow_short: bool,
    exit_at_middle: bool,
}

impl BandBreakout {
    pub fn new(channel: IndicatorHandle, reference: BandReference) -> Self {
        Self {
            channel,
            reference,
            allow_short: true,
            exit_at_middle: false,
        }
    }

    /// A lower-band break exits a long instead of opening a short.
    pub fn long_only(mut self) -> Self {
        self.allow_short = false;
        self
    }

    /// Exit when the close crosses back through the middle line.
    pub fn exit_at_middle(mut self) -> Self {
        self.exit_at_middle = true;
        self
    }

    fn breakout(&self, ctx: &RuleContext<'_>) -> Option<bool> {
        let close = ctx.candle.close;
        let prev = ctx.prev_values?;
        let prev_upper = prev.field(self.channel, Field::Upper)?;
        let prev_lower = prev.field(self.channel, Field::Lower)?;
        match self.reference {
            BandReference::Current => {
                let upper = ctx.values.field(self.channel, Field::Upper)?;
                let lower = ctx.values.field(self.channel, Field::Lower)?;
                let prev_close = ctx.prev_candle?.close;
                if close > upper && prev_close <= prev_upper {
                    Some(true)
                } else if close < lower && prev_close >= prev_lower {
                    Some(false)
                } else {
                    None
                }
            }
            BandReference::Previous => {
                if close > prev_upper {
                    Some(true)
                } else if close < prev_lower {
                    Some(false)
                } else {
                    None
                }
            }
        }
    }
}

impl Rule for BandBreakout {
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Signal {
        match self.breakout(ctx) {
            Some(true) => return Signal::EnterLong,
            Some(false) if self.allow_short => return Signal::EnterShort,
            Some(false) => return Signal::ExitLong,
            None => {}
        }
        if self.exit_at_middle {
            if let Some(mid) = ctx.values.field(self.channel, Field::Middle) {
                let close = ctx.candle.close;
                if ctx.is_long() && close < mid {
                    return Signal::ExitLong;
                }
                if ctx.is_short() && close > mid {
                    return Signal::ExitShort;
                }
            }
        }
        Signal::Hold
    }
}

/// How far from the mean a close must be to count as stretched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReversionThreshold {
    /// Outside a band indicator (Bollinger, Keltner); the mean is its middle.
    Bands(IndicatorHandle),
    /// Relative distance from a mean series: `(mean − close) / mean > deviation`.
    Fraction { mean: Operand, deviation: f64 },
}

/// Fade stretches away from a mean; exit when price returns past the mean.
#[derive(Debug, Clone)]
pub struct BandReversion {
    threshold: ReversionThreshold,
    allow_short: bool,
}

impl BandReversion {
    pub fn new(threshold: ReversionThreshold) -> Result<Self> {
        if let ReversionThreshold::Fraction { deviation, .. } = threshold {
            if deviation.is_nan() || deviation <= 0.0 {
                return Err(Error::invalid_config(format!(
                    "reversion deviation must be positive, got {deviation}"
                )));
            }
        }
        Ok(Self {
            threshold,
            allow_short: true,
        })
    }

    pub fn long_only(mut self) -> Self {
        self.allow_short = false;
        self
    }

    /// `(stretched_low, stretched_high, mean)` for this candle.
    fn levels(&self, ctx: &RuleContext<'_>) -> Option<(bool, bool, f64)> {
        let close = ctx.candle.close;
        match self.threshold {
            ReversionThreshold::Bands(h) => {
                let upper = ctx.values.field(h, Field::Upper)?;
                let lower = ctx.values.field(h, Field::Lower)?;
                let mid = ctx.values.field(h, Field::Middle)?;
                Some((close < lower, close > upper, mid))
            }
            ReversionThreshold::Fraction { mean, deviation } => {
                let mean = mean.current(ctx)?;
                if mean == 0.0 {
                    return None;
                }
                Some((
                    (mean - close) / mean > deviation,
                    (close - mean) / mean > deviation,
                    mean,
                ))
            }
        }
    }
}

impl Rule for BandReversion {
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Signal {
        let Some((low, high, mean)) = self.levels(ctx) else {
            return Signal::Hold;
        };
        let close = ctx.candle.close;

        if ctx.is_long() && close > mean {
            return Signal::ExitLong;
        }
        if ctx.is_short() && close < mean {
            return Signal::ExitShort;
        }
        if low {
            Signal::EnterLong
        } else if high && self.allow_short {
            Signal::EnterShort
        } else {
            Signal::Hold
        }
    }
}
