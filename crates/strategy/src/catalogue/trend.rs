//! Trend-following bundles: moving-average crosses, MACD, channel breakouts,
//! stop-and-reverse systems.

use common::{Result, Signal};

use super::{crossover, length, level, long_only, multiplier, BundleDef};
use crate::indicator_set::IndicatorSet;
use crate::indicators::{
    AccumulationDistribution, Adx, Atr, Bollinger, Donchian, Ema, Field, Hma, Keltner, Macd, Momentum,
    Obv, ParabolicSar, Roc, Sma, Smoothed, SuperTrend, Vwap, Vwma, Wma,
};
use crate::params::{Parameter, ParameterSet};
use crate::rules::{
    AnyOf, BandBreakout, BandReference, Crossover, Gated, Operand, PriceExit, Rule, SlopeReversal,
    TrendStrengthFilter, VolatilityFilter, VolatilityMode,
};

pub(super) const BUNDLES: &[BundleDef] = &[
    BundleDef {
        kind: "sma_cross",
        description: "Fast SMA crossing the slow SMA",
        params: || ma_pair(10, 30),
        build: |p, s| ma_cross(p, s, |n| Box::new(Sma::new(n))),
    },
    BundleDef {
        kind: "ema_cross",
        description: "Fast EMA crossing the slow EMA",
        params: || ma_pair(10, 20),
        build: |p, s| ma_cross(p, s, |n| Box::new(Ema::new(n))),
    },
    BundleDef {
        kind: "wma_cross",
        description: "Fast WMA crossing the slow WMA",
        params: || ma_pair(10, 30),
        build: |p, s| ma_cross(p, s, |n| Box::new(Wma::new(n))),
    },
    BundleDef {
        kind: "hma_cross",
        description: "Fast Hull MA crossing the slow Hull MA",
        params: || ma_pair(9, 21),
        build: |p, s| ma_cross(p, s, |n| Box::new(Hma::new(n))),
    },
    BundleDef {
        kind: "price_sma_cross",
        description: "Close crossing a simple moving average",
        params: || single(50, "SMA length"),
        build: |p, s| {
            let ma = s.attach(Sma::new(p.get("period")?))?;
            close_cross(p, Operand::series(ma))
        },
    },
    BundleDef {
        kind: "price_ema_cross",
        description: "Close crossing an exponential moving average",
        params: || single(20, "EMA length"),
        build: |p, s| {
            let ma = s.attach(Ema::new(p.get("period")?))?;
            close_cross(p, Operand::series(ma))
        },
    },
    BundleDef {
        kind: "vwma_cross",
        description: "Close crossing the volume-weighted moving average",
        params: || single(20, "VWMA length"),
        build: |p, s| {
            let ma = s.attach(Vwma::new(p.get("period")?))?;
            close_cross(p, Operand::series(ma))
        },
    },
    BundleDef {
        kind: "vwap_cross",
        description: "Close crossing the session VWAP",
        params: || ParameterSet::new().add(long_only(false)),
        build: |p, s| {
            let vwap = s.attach(Vwap::new())?;
            close_cross(p, Operand::series(vwap))
        },
    },
    BundleDef {
        kind: "macd_signal_cross",
        description: "MACD line crossing its signal line",
        params: macd_params,
        build: |p, s| {
            let macd = s.attach(macd(p)?)?;
            Ok(Box::new(crossover(
                Operand::field(macd, Field::Value),
                Operand::field(macd, Field::Signal),
                p.get("long_only")?,
            )))
        },
    },
    BundleDef {
        kind: "macd_zero_cross",
        description: "MACD line crossing zero",
        params: macd_params,
        build: |p, s| {
            let macd = s.attach(macd(p)?)?;
            Ok(Box::new(crossover(
                Operand::field(macd, Field::Value),
                Operand::Level(0.0),
                p.get("long_only")?,
            )))
        },
    },
    BundleDef {
        kind: "macd_histogram_turn",
        description: "MACD histogram turning up or down",
        params: macd_params,
        build: |p, s| {
            let macd = s.attach(macd(p)?)?;
            let rule = SlopeReversal::new(Operand::field(macd, Field::Histogram));
            Ok(if p.get("long_only")? {
                Box::new(rule.long_only())
            } else {
                Box::new(rule)
            })
        },
    },
    BundleDef {
        kind: "supertrend",
        description: "Close crossing the SuperTrend line",
        params: || {
            ParameterSet::new()
                .add(length("period", 10, "ATR length"))
                .add(multiplier("multiplier", 3.0, "ATR multiplier"))
                .add(long_only(false))
        },
        build: |p, s| {
            let st = s.attach(SuperTrend::new(p.get("period")?, p.get("multiplier")?))?;
            close_cross(p, Operand::series(st))
        },
    },
    BundleDef {
        kind: "parabolic_sar",
        description: "Close crossing the Parabolic SAR",
        params: || {
            ParameterSet::new()
                .add(level("af_start", 0.02, "Acceleration start", "Indicators").positive())
                .add(level("af_step", 0.02, "Acceleration step", "Indicators").positive())
                .add(level("af_max", 0.2, "Acceleration max", "Indicators").positive())
                .add(long_only(false))
        },
        build: |p, s| {
            let sar = s.attach(ParabolicSar::new(
                p.get("af_start")?,
                p.get("af_step")?,
                p.get("af_max")?,
            ))?;
            close_cross(p, Operand::series(sar))
        },
    },
    BundleDef {
        kind: "donchian_breakout",
        description: "Close beyond the previous Donchian channel",
        params: || {
            single(20, "Channel length").add(
                Parameter::new("exit_at_middle", true).display(
                    "Exit at middle",
                    "Close the position when price crosses the channel middle",
                    "Trading",
                ),
            )
        },
        build: |p, s| {
            let ch = s.attach(Donchian::new(p.get("period")?))?;
            breakout(p, BandBreakout::new(ch, BandReference::Previous))
        },
    },
    BundleDef {
        kind: "keltner_breakout",
        description: "Close crossing outside the Keltner channel",
        params: || keltner_params().add(exit_flag()),
        build: |p, s| {
            let ch = s.attach(keltner(p)?)?;
            breakout(p, BandBreakout::new(ch, BandReference::Current))
        },
    },
    BundleDef {
        kind: "bollinger_breakout",
        description: "Close crossing outside the Bollinger bands",
        params: || bollinger_params().add(exit_flag()),
        build: |p, s| {
            let ch = s.attach(Bollinger::new(p.get("period")?, p.get("width")?))?;
            breakout(p, BandBreakout::new(ch, BandReference::Current))
        },
    },
    BundleDef {
        kind: "adx_di_cross",
        description: "+DI crossing −DI while ADX shows a trend",
        params: || adx_params(14, 25.0).add(long_only(false)),
        build: |p, s| {
            let adx = s.attach(Adx::new(p.get("adx_period")?))?;
            let cross = crossover(
                Operand::field(adx, Field::PlusDi),
                Operand::field(adx, Field::MinusDi),
                p.get("long_only")?,
            );
            Ok(Box::new(Gated::new(cross, TrendStrengthFilter::new(adx, p.get("adx_threshold")?))))
        },
    },
    BundleDef {
        kind: "ema_cross_adx",
        description: "EMA cross admitted only in a strong trend",
        params: || ma_pair(10, 30).extend(adx_params(14, 20.0)),
        build: |p, s| {
            let rule = ma_cross(p, s, |n| Box::new(Ema::new(n)))?;
            let adx = s.attach(Adx::new(p.get("adx_period")?))?;
            Ok(Box::new(Gated::new(rule, TrendStrengthFilter::new(adx, p.get("adx_threshold")?))))
        },
    },
    BundleDef {
        kind: "ema_cross_volatility",
        description: "EMA cross admitted only on expanding volatility",
        params: || {
            ma_pair(10, 30)
                .add(length("atr_period", 14, "ATR length"))
                .add(length("atr_avg_period", 20, "ATR average length"))
                .add(multiplier("ratio", 1.0, "ATR / average ratio"))
        },
        build: |p, s| {
            let rule = ma_cross(p, s, |n| Box::new(Ema::new(n)))?;
            let gate = atr_gate(p, s, VolatilityMode::Above)?;
            Ok(Box::new(Gated::new(rule, gate)))
        },
    },
    BundleDef {
        kind: "momentum_zero_cross",
        description: "Momentum crossing zero",
        params: || single(10, "Momentum length"),
        build: |p, s| {
            let m = s.attach(Momentum::new(p.get("period")?))?;
            Ok(Box::new(crossover(Operand::series(m), Operand::Level(0.0), p.get("long_only")?)))
        },
    },
    BundleDef {
        kind: "roc_zero_cross",
        description: "Rate of change crossing zero",
        params: || single(12, "ROC length"),
        build: |p, s| {
            let m = s.attach(Roc::new(p.get("period")?))?;
            Ok(Box::new(crossover(Operand::series(m), Operand::Level(0.0), p.get("long_only")?)))
        },
    },
    BundleDef {
        kind: "hma_slope",
        description: "Hull MA turning up or down",
        params: || single(20, "HMA length"),
        build: |p, s| {
            let ma = s.attach(Hma::new(p.get("period")?))?;
            slope(p, Operand::series(ma))
        },
    },
    BundleDef {
        kind: "ema_slope",
        description: "EMA turning up or down",
        params: || single(20, "EMA length"),
        build: |p, s| {
            let ma = s.attach(Ema::new(p.get("period")?))?;
            slope(p, Operand::series(ma))
        },
    },
    BundleDef {
        kind: "obv_trend",
        description: "On-balance volume crossing its moving average",
        params: || single(20, "OBV average length"),
        build: |p, s| {
            let obv = s.attach(Obv::new())?;
            let avg = s.attach(Smoothed::new(Obv::new(), p.get("period")?))?;
            Ok(Box::new(crossover(Operand::series(obv), Operand::series(avg), p.get("long_only")?)))
        },
    },
    BundleDef {
        kind: "ad_trend",
        description: "Accumulation/distribution crossing its moving average",
        params: || single(20, "A/D average length"),
        build: |p, s| {
            let ad = s.attach(AccumulationDistribution::new())?;
            let avg = s.attach(Smoothed::new(AccumulationDistribution::new(), p.get("period")?))?;
            Ok(Box::new(crossover(Operand::series(ad), Operand::series(avg), p.get("long_only")?)))
        },
    },
    BundleDef {
        kind: "ema_cross_sma_exit",
        description: "Long on a fast/slow EMA up-cross, exit below a slower SMA",
        params: || ma_pair(10, 20).add(length("exit_period", 50, "Exit SMA length")),
        build: |p, s| {
            let fast = s.attach(Ema::new(p.get("fast")?))?;
            let slow = s.attach(Ema::new(p.get("slow")?))?;
            let exit = s.attach(Sma::new(p.get("exit_period")?))?;
            Ok(Box::new(
                AnyOf::default()
                    .with(Crossover::with_signals(
                        Operand::series(fast),
                        Operand::series(slow),
                        Signal::EnterLong,
                        Signal::Hold,
                    ))
                    .with(PriceExit::new(Operand::series(exit))),
            ))
        },
    },
];

fn ma_pair(fast: usize, slow: usize) -> ParameterSet {
    ParameterSet::new()
        .add(length("fast", fast, "Fast length"))
        .add(length("slow", slow, "Slow length"))
        .add(long_only(false))
}

fn single(period: usize, display: &str) -> ParameterSet {
    ParameterSet::new().add(length("period", period, display)).add(long_only(false))
}

fn ma_cross(
    p: &ParameterSet,
    s: &mut IndicatorSet,
    make: fn(usize) -> Box<dyn crate::indicators::Indicator>,
) -> Result<Box<dyn Rule>> {
    let fast_len: usize = p.get("fast")?;
    let slow_len: usize = p.get("slow")?;
    if fast_len >= slow_len {
        return Err(common::Error::invalid_config(format!(
            "fast length ({fast_len}) must be below slow length ({slow_len})"
        )));
    }
    let fast = s.attach(make(fast_len))?;
    let slow = s.attach(make(slow_len))?;
    Ok(Box::new(crossover(Operand::series(fast), Operand::series(slow), p.get("long_only")?)))
}

fn close_cross(p: &ParameterSet, series: Operand) -> Result<Box<dyn Rule>> {
    Ok(Box::new(crossover(Operand::Close, series, p.get("long_only")?)))
}

fn slope(p: &ParameterSet, series: Operand) -> Result<Box<dyn Rule>> {
    let rule = SlopeReversal::new(series);
    Ok(if p.get("long_only")? {
        Box::new(rule.long_only())
    } else {
        Box::new(rule)
    })
}

pub(super) fn macd_params() -> ParameterSet {
    ParameterSet::new()
        .add(length("fast", 12, "Fast EMA"))
        .add(length("slow", 26, "Slow EMA"))
        .add(length("signal", 9, "Signal EMA"))
        .add(long_only(false))
}

pub(super) fn macd(p: &ParameterSet) -> Result<Macd> {
    Ok(Macd::new(p.get("fast")?, p.get("slow")?, p.get("signal")?))
}

pub(super) fn keltner_params() -> ParameterSet {
    ParameterSet::new()
        .add(length("ema_period", 20, "EMA length"))
        .add(length("atr_period", 10, "ATR length"))
        .add(multiplier("multiplier", 2.0, "ATR multiplier"))
        .add(long_only(false))
}

pub(super) fn keltner(p: &ParameterSet) -> Result<Keltner> {
    Ok(Keltner::new(p.get("ema_period")?, p.get("atr_period")?, p.get("multiplier")?))
}

pub(super) fn bollinger_params() -> ParameterSet {
    ParameterSet::new()
        .add(length("period", 20, "Bollinger length"))
        .add(multiplier("width", 2.0, "Standard deviations"))
        .add(long_only(false))
}

fn exit_flag() -> Parameter<bool> {
    Parameter::new("exit_at_middle", false).display(
        "Exit at middle",
        "Close the position when price crosses the middle line",
        "Trading",
    )
}

fn breakout(p: &ParameterSet, rule: BandBreakout) -> Result<Box<dyn Rule>> {
    let rule = if p.get("long_only")? { rule.long_only() } else { rule };
    let rule = if p.get("exit_at_middle")? { rule.exit_at_middle() } else { rule };
    Ok(Box::new(rule))
}

pub(super) fn adx_params(period: usize, threshold: f64) -> ParameterSet {
    ParameterSet::new()
        .add(length("adx_period", period, "ADX length"))
        .add(
            level("adx_threshold", threshold, "ADX threshold", "Filters")
                .range(0.0, 100.0)
                .optimize(10.0, 40.0, 5.0),
        )
}

/// Attach ATR and its SMA, returning a gate comparing the two.
pub(super) fn atr_gate(p: &ParameterSet, s: &mut IndicatorSet, mode: VolatilityMode) -> Result<VolatilityFilter> {
    let atr_period: usize = p.get("atr_period")?;
    let atr = s.attach(Atr::new(atr_period))?;
    let avg = s.attach(Smoothed::new(Atr::new(atr_period), p.get("atr_avg_period")?))?;
    Ok(VolatilityFilter::new(atr, avg, p.get("ratio")?, mode))
}
