//! Rule bundles: the per-strategy predicate turning indicator outputs into a
//! [`Signal`].
//!
//! A step is split in two. `evaluate` sees the current candle, the current and
//! previous indicator outputs and the position, and cannot touch scratch
//! state. `commit` runs afterwards with the same context and is the only place
//! scratch (previous values, candle windows) advances, so a predicate always
//! compares (t) with (t−1).

pub mod bands;
pub mod composite;
pub mod crossover;
pub mod divergence;
pub mod exits;
pub mod filters;
pub mod oscillator;
pub mod patterns;
pub mod seasonal;

use std::fmt;

use common::{Candle, Direction, Position, Signal};

use crate::indicator_set::{IndicatorHandle, IndicatorValues};
use crate::indicators::Field;

pub use bands::{BandBreakout, BandReference, BandReversion, ReversionThreshold};
pub use composite::{AnyOf, CompositeAnd};
pub use crossover::Crossover;
pub use divergence::Divergence;
pub use exits::{PriceExit, SlopeReversal};
pub use filters::{Gate, Gated, TrendStrengthFilter, VolatilityFilter, VolatilityMode};
pub use oscillator::{OscillatorThreshold, ThresholdMode};
pub use patterns::{CandlePattern, CandleWindow, PatternDetector};
pub use seasonal::{CalendarRule, SeasonalFilter, SeasonalSignal};

/// Everything a rule may look at for one finished candle.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub candle: &'a Candle,
    /// Previous finished candle, if any.
    pub prev_candle: Option<&'a Candle>,
    pub values: &'a IndicatorValues,
    /// Indicator outputs of the previous finished candle.
    pub prev_values: Option<&'a IndicatorValues>,
    pub position: &'a Position,
    pub bar_index: u64,
}

impl RuleContext<'_> {
    pub fn direction(&self) -> Option<Direction> {
        self.position.direction()
    }

    pub fn is_long(&self) -> bool {
        self.direction() == Some(Direction::Long)
    }

    pub fn is_short(&self) -> bool {
        self.direction() == Some(Direction::Short)
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_flat()
    }
}

/// A strategy's decision logic.
pub trait Rule: Send + fmt::Debug {
    /// Produce the signal for this candle. Must be a pure function of the
    /// context and the scratch state at entry to the step.
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Signal;

    /// Advance scratch state. Always called after `evaluate`.
    fn commit(&mut self, _ctx: &RuleContext<'_>) {}

    /// Drop scratch state.
    fn reset(&mut self) {}
}

impl<R: Rule + ?Sized> Rule for Box<R> {
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Signal {
        (**self).evaluate(ctx)
    }

    fn commit(&mut self, ctx: &RuleContext<'_>) {
        (**self).commit(ctx)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// One side of a comparison: an indicator field, the close or a constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Series { handle: IndicatorHandle, field: Field },
    Close,
    Level(f64),
}

impl Operand {
    pub fn series(handle: IndicatorHandle) -> Self {
        Operand::Series { handle, field: Field::Value }
    }

    pub fn field(handle: IndicatorHandle, field: Field) -> Self {
        Operand::Series { handle, field }
    }

    pub fn current(&self, ctx: &RuleContext<'_>) -> Option<f64> {
        match *self {
            Operand::Series { handle, field } => ctx.values.field(handle, field),
            Operand::Close => Some(ctx.candle.close),
            Operand::Level(v) => Some(v),
        }
    }

    pub fn previous(&self, ctx: &RuleContext<'_>) -> Option<f64> {
        match *self {
            Operand::Series { handle, field } => ctx.prev_values?.field(handle, field),
            Operand::Close => ctx.prev_candle.map(|c| c.close),
            Operand::Level(v) => Some(v),
        }
    }
}

/// Order side a signal would trade given the position, or `None` when it is a
/// no-op there (entering where already positioned, exiting where flat).
pub fn effective_side(signal: Signal, position: Option<Direction>) -> Option<Direction> {
    use Direction::*;
    match (signal, position) {
        (Signal::Hold, _) => None,
        (Signal::EnterLong, Some(Long)) | (Signal::EnterShort, Some(Short)) => None,
        (Signal::EnterLong, _) => Some(Long),
        (Signal::EnterShort, _) => Some(Short),
        (Signal::ExitLong, Some(Long)) => Some(Short),
        (Signal::ExitShort, Some(Short)) => Some(Long),
        (Signal::ExitLong | Signal::ExitShort, _) => None,
        (Signal::Reverse | Signal::ClosePosition, Some(d)) => Some(d.opposite()),
        (Signal::Reverse | Signal::ClosePosition, None) => None,
    }
}
