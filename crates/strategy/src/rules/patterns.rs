//! Candlestick pattern detection over a fixed window of prior candles.

use std::collections::VecDeque;

use common::{Candle, Direction, Signal};
use serde::{Deserialize, Serialize};

use super::{Rule, RuleContext};

/// Bounded window of the most recent finished candles (newest last).
#[derive(Debug, Clone)]
pub struct CandleWindow {
    cap: usize,
    buf: VecDeque<Candle>,
}

impl CandleWindow {
    pub fn new(capacity: usize) -> Self {
        let cap = capacity.max(1);
        Self {
            cap,
            buf: VecDeque::with_capacity(cap),
        }
    }

    pub fn push(&mut self, candle: Candle) {
        if self.buf.len() == self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(candle);
    }

    /// Candle `back` steps before the newest (`0` = newest).
    pub fn get_back(&self, back: usize) -> Option<&Candle> {
        let len = self.buf.len();
        if back >= len {
            None
        } else {
            self.buf.get(len - 1 - back)
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() == self.cap
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.buf.iter()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Shapes recognised by [`PatternDetector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandlePattern {
    Hammer,
    ShootingStar,
    OutsideBar,
    ThreeWhiteSoldiers,
    ThreeBlackCrows,
    Engulfing,
    Harami,
    AbandonedBaby,
    Tweezer,
    Spring,
    Upthrust,
    InsideBarBreakout,
}

// Body no larger than this fraction of the range is a doji.
const DOJI_BODY: f64 = 0.1;
// Relative tolerance for "equal" highs or lows.
const TWEEZER_TOLERANCE: f64 = 0.001;
// Prior candles used as the reference range for springs and upthrusts.
const SWING_LOOKBACK: usize = 5;

impl CandlePattern {
    /// Prior candles the pattern needs in addition to the current one.
    pub fn lookback(self) -> usize {
        match self {
            CandlePattern::Hammer | CandlePattern::ShootingStar => 1,
            CandlePattern::OutsideBar | CandlePattern::Engulfing => 1,
            CandlePattern::Harami | CandlePattern::Tweezer => 1,
            CandlePattern::ThreeWhiteSoldiers | CandlePattern::ThreeBlackCrows => 2,
            CandlePattern::AbandonedBaby | CandlePattern::InsideBarBreakout => 2,
            CandlePattern::Spring | CandlePattern::Upthrust => SWING_LOOKBACK,
        }
    }

    /// Direction implied by the pattern on `c` given prior candles, or `None`.
    pub fn detect(self, c: &Candle, prior: &CandleWindow) -> Option<Direction> {
        if prior.len() < self.lookback() {
            return None;
        }
        let p1 = prior.get_back(0)?;
        match self {
            CandlePattern::Hammer => {
                let body = c.body();
                let ok = c.range() > 0.0
                    && c.lower_shadow() >= 2.0 * body
                    && c.upper_shadow() <= body.max(c.range() * DOJI_BODY)
                    && c.low < p1.low;
                ok.then_some(Direction::Long)
            }
            CandlePattern::ShootingStar => {
                let body = c.body();
                let ok = c.range() > 0.0
                    && c.upper_shadow() >= 2.0 * body
                    && c.lower_shadow() <= body.max(c.range() * DOJI_BODY)
                    && c.high > p1.high;
                ok.then_some(Direction::Short)
            }
            CandlePattern::OutsideBar => {
                if c.high > p1.high && c.low < p1.low {
                    direction_of(c)
                } else {
                    None
                }
            }
            CandlePattern::ThreeWhiteSoldiers => {
                let p2 = prior.get_back(1)?;
                let ok = p2.is_bullish()
                    && p1.is_bullish()
                    && c.is_bullish()
                    && p1.close > p2.close
                    && c.close > p1.close;
                ok.then_some(Direction::Long)
            }
            CandlePattern::ThreeBlackCrows => {
                let p2 = prior.get_back(1)?;
                let ok = p2.is_bearish()
                    && p1.is_bearish()
                    && c.is_bearish()
                    && p1.close < p2.close
                    && c.close < p1.close;
                ok.then_some(Direction::Short)
            }
            CandlePattern::Engulfing => {
                let engulfs = c.body_bottom() <= p1.body_bottom()
                    && c.body_top() >= p1.body_top()
                    && c.body() > p1.body();
                if !engulfs {
                    None
                } else if p1.is_bearish() && c.is_bullish() {
                    Some(Direction::Long)
                } else if p1.is_bullish() && c.is_bearish() {
                    Some(Direction::Short)
                } else {
                    None
                }
            }
            CandlePattern::Harami => {
                let inside = c.body_top() < p1.body_top() && c.body_bottom() > p1.body_bottom();
                if !inside {
                    None
                } else if p1.is_bearish() && c.is_bullish() {
                    Some(Direction::Long)
                } else if p1.is_bullish() && c.is_bearish() {
                    Some(Direction::Short)
                } else {
                    None
                }
            }
            CandlePattern::AbandonedBaby => {
                let p2 = prior.get_back(1)?;
                let doji = p1.body() <= p1.range() * DOJI_BODY;
                if !doji {
                    None
                } else if p2.is_bearish() && c.is_bullish() && p1.high < p2.low && c.low > p1.high
                {
                    Some(Direction::Long)
                } else if p2.is_bullish() && c.is_bearish() && p1.low > p2.high && c.high < p1.low
                {
                    Some(Direction::Short)
                } else {
                    None
                }
            }
            CandlePattern::Tweezer => {
                let tol = c.close.abs() * TWEEZER_TOLERANCE;
                if p1.is_bearish() && c.is_bullish() && (c.low - p1.low).abs() <= tol {
                    Some(Direction::Long)
                } else if p1.is_bullish() && c.is_bearish() && (c.high - p1.high).abs() <= tol {
                    Some(Direction::Short)
                } else {
                    None
                }
            }
            CandlePattern::Spring => {
                let support = swing(prior).map(|(_, low)| low)?;
                (c.low < support && c.close > support).then_some(Direction::Long)
            }
            CandlePattern::Upthrust => {
                let resistance = swing(prior).map(|(high, _)| high)?;
                (c.high > resistance && c.close < resistance).then_some(Direction::Short)
            }
            CandlePattern::InsideBarBreakout => {
                let p2 = prior.get_back(1)?;
                let inside = p1.high < p2.high && p1.low > p2.low;
                if !inside {
                    None
                } else if c.close > p1.high {
                    Some(Direction::Long)
                } else if c.close < p1.low {
                    Some(Direction::Short)
                } else {
                    None
                }
            }
        }
    }
}

fn direction_of(c: &Candle) -> Option<Direction> {
    if c.is_bullish() {
        Some(Direction::Long)
    } else if c.is_bearish() {
        Some(Direction::Short)
    } else {
        None
    }
}

/// Highest high and lowest low of the last `SWING_LOOKBACK` prior candles.
fn swing(prior: &CandleWindow) -> Option<(f64, f64)> {
    let recent: Vec<&Candle> = (0..SWING_LOOKBACK).filter_map(|i| prior.get_back(i)).collect();
    if recent.len() < SWING_LOOKBACK {
        return None;
    }
    let high = recent.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let low = recent.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    Some((high, low))
}

/// Enter on a candle pattern. Prior candles live in a window sized to the
/// pattern; until it is filled the rule holds.
#[derive(Debug, Clone)]
pub struct PatternDetector {
    pattern: CandlePattern,
    window: CandleWindow,
    allow_short: bool,
}

impl PatternDetector {
    pub fn new(pattern: CandlePattern) -> Self {
        Self {
            pattern,
            window: CandleWindow::new(pattern.lookback()),
            allow_short: true,
        }
    }

    /// Bearish patterns exit longs instead of opening shorts.
    pub fn long_only(mut self) -> Self {
        self.allow_short = false;
        self
    }

    pub fn pattern(&self) -> CandlePattern {
        self.pattern
    }
}

impl Rule for PatternDetector {
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Signal {
        match self.pattern.detect(ctx.candle, &self.window) {
            Some(Direction::Long) => Signal::EnterLong,
            Some(Direction::Short) if self.allow_short => Signal::EnterShort,
            Some(Direction::Short) if ctx.is_long() => Signal::ExitLong,
            _ => Signal::Hold,
        }
    }

    fn commit(&mut self, ctx: &RuleContext<'_>) {
        self.window.push(ctx.candle.clone());
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator_set::IndicatorValues;
    use crate::rules::testing::{candle, flat};

    fn window(candles: &[Candle]) -> CandleWindow {
        let mut w = CandleWindow::new(candles.len().max(1));
        for c in candles {
            w.push(c.clone());
        }
        w
    }

    #[test]
    fn window_keeps_newest() {
        let mut w = CandleWindow::new(2);
        w.push(candle(1.0, 1.0, 1.0, 1.0));
        w.push(candle(2.0, 2.0, 2.0, 2.0));
        w.push(candle(3.0, 3.0, 3.0, 3.0));
        assert!(w.is_full());
        assert_eq!(w.get_back(0).unwrap().close, 3.0);
        assert_eq!(w.get_back(1).unwrap().close, 2.0);
        assert!(w.get_back(2).is_none());
    }

    #[test]
    fn hammer_after_lower_low() {
        let prior = window(&[candle(102.0, 103.0, 99.0, 100.0)]);
        // body 0.5, lower shadow 4, upper shadow 0.2
        let c = candle(98.5, 99.2, 94.5, 99.0);
        assert_eq!(CandlePattern::Hammer.detect(&c, &prior), Some(Direction::Long));
        assert_eq!(CandlePattern::ShootingStar.detect(&c, &prior), None);
    }

    #[test]
    fn three_white_soldiers_and_crows() {
        let prior = window(&[candle(100.0, 102.0, 99.5, 101.5), candle(101.5, 103.5, 101.0, 103.0)]);
        let c = candle(103.0, 105.5, 102.5, 105.0);
        assert_eq!(CandlePattern::ThreeWhiteSoldiers.detect(&c, &prior), Some(Direction::Long));
        assert_eq!(CandlePattern::ThreeBlackCrows.detect(&c, &prior), None);

        let prior = window(&[candle(105.0, 105.5, 103.0, 103.5), candle(103.5, 104.0, 101.5, 102.0)]);
        let c = candle(102.0, 102.5, 99.0, 99.5);
        assert_eq!(CandlePattern::ThreeBlackCrows.detect(&c, &prior), Some(Direction::Short));
    }

    #[test]
    fn engulfing_and_harami() {
        let prior = window(&[candle(101.0, 101.5, 99.5, 100.0)]);
        let big_up = candle(99.8, 102.0, 99.5, 101.5);
        assert_eq!(CandlePattern::Engulfing.detect(&big_up, &prior), Some(Direction::Long));

        let prior = window(&[candle(105.0, 105.5, 99.5, 100.0)]);
        let small_up = candle(101.0, 102.5, 100.5, 102.0);
        assert_eq!(CandlePattern::Harami.detect(&small_up, &prior), Some(Direction::Long));
    }

    #[test]
    fn abandoned_baby_bullish() {
        let prior = window(&[candle(110.0, 110.5, 104.0, 104.5), candle(102.0, 103.0, 101.0, 102.05)]);
        let c = candle(104.0, 107.0, 103.5, 106.5);
        assert_eq!(CandlePattern::AbandonedBaby.detect(&c, &prior), Some(Direction::Long));
    }

    #[test]
    fn tweezer_bottom() {
        let prior = window(&[candle(102.0, 102.5, 99.0, 99.5)]);
        let c = candle(99.6, 101.5, 99.0, 101.0);
        assert_eq!(CandlePattern::Tweezer.detect(&c, &prior), Some(Direction::Long));
    }

    #[test]
    fn spring_and_upthrust() {
        let base: Vec<Candle> = (0..5).map(|_| candle(100.0, 102.0, 98.0, 100.0)).collect();
        let prior = window(&base);
        let spring = candle(99.0, 100.0, 97.0, 99.5);
        assert_eq!(CandlePattern::Spring.detect(&spring, &prior), Some(Direction::Long));
        let upthrust = candle(101.0, 103.0, 100.0, 100.5);
        assert_eq!(CandlePattern::Upthrust.detect(&upthrust, &prior), Some(Direction::Short));
        // not enough history
        let short_prior = window(&base[..3]);
        assert_eq!(CandlePattern::Spring.detect(&spring, &short_prior), None);
    }

    #[test]
    fn inside_bar_breakout() {
        let prior = window(&[candle(100.0, 110.0, 90.0, 105.0), candle(104.0, 106.0, 95.0, 100.0)]);
        let c = candle(101.0, 108.0, 100.0, 107.0);
        assert_eq!(CandlePattern::InsideBarBreakout.detect(&c, &prior), Some(Direction::Long));
    }

    #[test]
    fn detector_holds_until_window_filled() {
        let mut det = PatternDetector::new(CandlePattern::ThreeWhiteSoldiers);
        let values = IndicatorValues::default();
        let pos = flat();
        let candles = [
            candle(100.0, 102.0, 99.5, 101.5),
            candle(101.5, 103.5, 101.0, 103.0),
            candle(103.0, 105.5, 102.5, 105.0),
        ];
        let mut out = Vec::new();
        for c in &candles {
            let ctx = RuleContext {
                candle: c,
                prev_candle: None,
                values: &values,
                prev_values: None,
                position: &pos,
                bar_index: 0,
            };
            out.push(det.evaluate(&ctx));
            det.commit(&ctx);
        }
        assert_eq!(out, vec![Signal::Hold, Signal::Hold, Signal::EnterLong]);

        det.reset();
        let ctx = RuleContext {
            candle: &candles[2],
            prev_candle: None,
            values: &values,
            prev_values: None,
            position: &pos,
            bar_index: 0,
        };
        assert_eq!(det.evaluate(&ctx), Signal::Hold);
    }
}
