//! Candlestick pattern bundles. Every pattern enters on detection and exits
//! when the close falls back through an SMA against the position.

use common::Result;

use super::{length, long_only, BundleDef};
use crate::indicator_set::IndicatorSet;
use crate::indicators::Sma;
use crate::params::ParameterSet;
use crate::rules::{AnyOf, CandlePattern, Operand, PatternDetector, PriceExit, Rule};

macro_rules! pattern_bundle {
    ($kind:literal, $pattern:expr, $desc:literal) => {
        BundleDef {
            kind: $kind,
            description: $desc,
            params: pattern_params,
            build: |p, s| pattern_rule($pattern, p, s),
        }
    };
}

pub(super) const BUNDLES: &[BundleDef] = &[
    pattern_bundle!("hammer", CandlePattern::Hammer, "Long lower shadow after a lower low"),
    pattern_bundle!("shooting_star", CandlePattern::ShootingStar, "Long upper shadow after a higher high"),
    pattern_bundle!("outside_bar", CandlePattern::OutsideBar, "Bar engulfing the previous range, traded in its direction"),
    pattern_bundle!("three_white_soldiers", CandlePattern::ThreeWhiteSoldiers, "Three rising bullish candles"),
    pattern_bundle!("three_black_crows", CandlePattern::ThreeBlackCrows, "Three falling bearish candles"),
    pattern_bundle!("engulfing", CandlePattern::Engulfing, "Body engulfing the previous opposite body"),
    pattern_bundle!("harami", CandlePattern::Harami, "Small opposite body inside the previous body"),
    pattern_bundle!("abandoned_baby", CandlePattern::AbandonedBaby, "Gapped doji between two opposite candles"),
    pattern_bundle!("tweezer", CandlePattern::Tweezer, "Matching lows or highs on a colour change"),
    pattern_bundle!("spring", CandlePattern::Spring, "False break below recent support"),
    pattern_bundle!("upthrust", CandlePattern::Upthrust, "False break above recent resistance"),
    pattern_bundle!("inside_bar_breakout", CandlePattern::InsideBarBreakout, "Close beyond an inside bar"),
];

fn pattern_params() -> ParameterSet {
    ParameterSet::new()
        .add(length("exit_period", 20, "Exit SMA length"))
        .add(long_only(false))
}

fn pattern_rule(pattern: CandlePattern, p: &ParameterSet, s: &mut IndicatorSet) -> Result<Box<dyn Rule>> {
    let exit = s.attach(Sma::new(p.get("exit_period")?))?;
    let detector = PatternDetector::new(pattern);
    let detector = if p.get("long_only")? { detector.long_only() } else { detector };
    Ok(Box::new(
        AnyOf::default()
            .with(detector)
            .with(PriceExit::new(Operand::series(exit))),
    ))
}
