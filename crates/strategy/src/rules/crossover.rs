use common::Signal;

use super::{Operand, Rule, RuleContext};

/// `a` crossing `b`.
///
/// An upward cross is `a[t−1] ≤ b[t−1]` and `a[t] > b[t]`; a downward cross
/// mirrors it. Equal values at `t` never count as a cross.
#[derive(Debug, Clone)]
pub struct Crossover {
    a: Operand,
    b: Operand,
    on_up: Signal,
    on_down: Signal,
}

impl Crossover {
    /// Always-in-the-market crossover: long on up-cross, short on down-cross.
    pub fn new(a: Operand, b: Operand) -> Self {
        Self {
            a,
            b,
            on_up: Signal::EnterLong,
            on_down: Signal::EnterShort,
        }
    }

    /// Long on up-cross, flat on down-cross.
    pub fn long_only(a: Operand, b: Operand) -> Self {
        Self {
            on_down: Signal::ExitLong,
            ..Self::new(a, b)
        }
    }

    /// Custom signals for each direction.
    pub fn with_signals(a: Operand, b: Operand, on_up: Signal, on_down: Signal) -> Self {
        Self { a, b, on_up, on_down }
    }
}

/// Direction of a cross between two operand pairs, if any.
pub(crate) fn cross(prev_a: f64, prev_b: f64, a: f64, b: f64) -> Option<bool> {
    if prev_a <= prev_b && a > b {
        Some(true)
    } else if prev_a >= prev_b && a < b {
        Some(false)
    } else {
        None
    }
}

impl Rule for Crossover {
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Signal {
        let (Some(a), Some(b), Some(pa), Some(pb)) = (
            self.a.current(ctx),
            self.b.current(ctx),
            self.a.previous(ctx),
            self.b.previous(ctx),
        ) else {
            return Signal::Hold;
        };
        match cross(pa, pb, a, b) {
            Some(true) => self.on_up,
            Some(false) => self.on_down,
            None => Signal::Hold,
        }
    }
}
