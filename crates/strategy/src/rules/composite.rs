//! Rule combinators.

use common::Signal;

use super::{effective_side, Rule, RuleContext};

/// Every member must agree on the same non-hold signal; otherwise `Hold`.
#[derive(Debug, Default)]
pub struct CompositeAnd {
    rules: Vec<Box<dyn Rule>>,
}

impl CompositeAnd {
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    pub fn with(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }
}

impl Rule for CompositeAnd {
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Signal {
        let mut agreed: Option<Signal> = None;
        for rule in &self.rules {
            let signal = rule.evaluate(ctx);
            if signal.is_hold() {
                return Signal::Hold;
            }
            match agreed {
                None => agreed = Some(signal),
                Some(prev) if prev != signal => return Signal::Hold,
                Some(_) => {}
            }
        }
        agreed.unwrap_or(Signal::Hold)
    }

    fn commit(&mut self, ctx: &RuleContext<'_>) {
        for rule in &mut self.rules {
            rule.commit(ctx);
        }
    }

    fn reset(&mut self) {
        for rule in &mut self.rules {
            rule.reset();
        }
    }
}

/// First member with an effective signal wins, in registration order.
///
/// Signals that would do nothing against the current position (entering the
/// side already held, exiting a side not held) are skipped. If two members
/// would trade in opposite directions on the same candle the result is `Hold`.
#[derive(Debug, Default)]
pub struct AnyOf {
    rules: Vec<Box<dyn Rule>>,
}

impl AnyOf {
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    pub fn with(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }
}

impl Rule for AnyOf {
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Signal {
        let position = ctx.direction();
        let mut chosen: Option<(Signal, common::Direction)> = None;
        for rule in &self.rules {
            let signal = rule.evaluate(ctx);
            let Some(side) = effective_side(signal, position) else {
                continue;
            };
            match chosen {
                None => chosen = Some((signal, side)),
                Some((_, first)) if first != side => return Signal::Hold,
                Some(_) => {}
            }
        }
        chosen.map_or(Signal::Hold, |(signal, _)| signal)
    }

    fn commit(&mut self, ctx: &RuleContext<'_>) {
        for rule in &mut self.rules {
            rule.commit(ctx);
        }
    }

    fn reset(&mut self) {
        for rule in &mut self.rules {
            rule.reset();
        }
    }
}
