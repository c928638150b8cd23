//! Oscillator bundles: threshold zones, cross-backs and divergences.

use common::Result;

use super::trend::{adx_params, atr_gate, macd, macd_params};
use super::{crossover, length, level, long_only, multiplier, BundleDef};
use crate::indicators::{Adx, Cci, Field, LaguerreRsi, Obv, Rsi, Stochastic, WilliamsR};
use crate::params::{ParamType, Parameter, ParameterSet};
use crate::rules::{
    Divergence, Gated, Operand, OscillatorThreshold, Rule, ThresholdMode, TrendStrengthFilter,
    VolatilityMode,
};

pub(super) const BUNDLES: &[BundleDef] = &[
    BundleDef {
        kind: "rsi_threshold",
        description: "Buy oversold RSI, sell overbought RSI",
        params: || zones(length("period", 14, "RSI length"), 30.0, 70.0),
        build: |p, s| {
            let rsi = s.attach(Rsi::new(p.get("period")?))?;
            threshold(p, Operand::series(rsi), ThresholdMode::Level, None)
        },
    },
    BundleDef {
        kind: "rsi_mid_exit",
        description: "Buy oversold RSI, exit once RSI recovers above the midline",
        params: || {
            zones(length("period", 14, "RSI length"), 30.0, 70.0)
                .add(level("exit_level", 50.0, "Exit level", "Trading").range(0.0, 100.0))
                .add(long_only(true))
        },
        build: |p, s| {
            let rsi = s.attach(Rsi::new(p.get("period")?))?;
            threshold(p, Operand::series(rsi), ThresholdMode::Level, Some(p.get("exit_level")?))
        },
    },
    BundleDef {
        kind: "rsi_cross_back",
        description: "Enter when RSI leaves the oversold or overbought zone",
        params: || zones(length("period", 14, "RSI length"), 30.0, 70.0),
        build: |p, s| {
            let rsi = s.attach(Rsi::new(p.get("period")?))?;
            threshold(p, Operand::series(rsi), ThresholdMode::CrossBack, None)
        },
    },
    BundleDef {
        kind: "laguerre_rsi",
        description: "Laguerre RSI leaving its extreme zones",
        params: || {
            zones(
                Parameter::new("gamma", 0.5)
                    .display("Gamma", "Laguerre damping factor", "Indicators")
                    .range(0.0, 0.99)
                    .optimize(0.2, 0.9, 0.1),
                0.2,
                0.8,
            )
        },
        build: |p, s| {
            let rsi = s.attach(LaguerreRsi::new(p.get("gamma")?))?;
            threshold(p, Operand::series(rsi), ThresholdMode::CrossBack, None)
        },
    },
    BundleDef {
        kind: "cci_threshold",
        description: "Buy CCI below −100, sell above +100",
        params: || zones(length("period", 20, "CCI length"), -100.0, 100.0),
        build: |p, s| {
            let cci = s.attach(Cci::new(p.get("period")?))?;
            threshold(p, Operand::series(cci), ThresholdMode::Level, None)
        },
    },
    BundleDef {
        kind: "cci_volatility",
        description: "CCI crossing back from its extremes while ATR is below its average",
        params: || {
            zones(length("period", 20, "CCI length"), -100.0, 100.0)
                .add(length("atr_period", 14, "ATR length"))
                .add(length("atr_avg_period", 20, "ATR average length"))
                .add(multiplier("ratio", 1.0, "ATR / average ratio"))
        },
        build: |p, s| {
            let cci = s.attach(Cci::new(p.get("period")?))?;
            let rule = threshold(p, Operand::series(cci), ThresholdMode::CrossBack, None)?;
            let gate = atr_gate(p, s, VolatilityMode::Below)?;
            Ok(Box::new(Gated::new(rule, gate)))
        },
    },
    BundleDef {
        kind: "williams_r",
        description: "Williams %R beyond −80 / −20",
        params: || zones(length("period", 14, "%R length"), -80.0, -20.0),
        build: |p, s| {
            let wr = s.attach(WilliamsR::new(p.get("period")?))?;
            threshold(p, Operand::series(wr), ThresholdMode::Level, None)
        },
    },
    BundleDef {
        kind: "stochastic_threshold",
        description: "Stochastic %K beyond 20 / 80",
        params: || stochastic_params().extend(zones(length("k_period", 14, "%K length"), 20.0, 80.0)),
        build: |p, s| {
            let st = s.attach(stochastic(p)?)?;
            threshold(p, Operand::field(st, Field::K), ThresholdMode::Level, None)
        },
    },
    BundleDef {
        kind: "stochastic_cross",
        description: "Stochastic %K crossing %D",
        params: || stochastic_params().add(long_only(false)),
        build: |p, s| {
            let st = s.attach(stochastic(p)?)?;
            Ok(Box::new(crossover(
                Operand::field(st, Field::K),
                Operand::field(st, Field::D),
                p.get("long_only")?,
            )))
        },
    },
    BundleDef {
        kind: "rsi_divergence",
        description: "Price and RSI moving in opposite directions",
        params: || ParameterSet::new().add(length("period", 14, "RSI length")).add(long_only(false)),
        build: |p, s| {
            let rsi = s.attach(Rsi::new(p.get("period")?))?;
            divergence(p, Operand::series(rsi))
        },
    },
    BundleDef {
        kind: "cci_divergence",
        description: "Price and CCI moving in opposite directions",
        params: || ParameterSet::new().add(length("period", 20, "CCI length")).add(long_only(false)),
        build: |p, s| {
            let cci = s.attach(Cci::new(p.get("period")?))?;
            divergence(p, Operand::series(cci))
        },
    },
    BundleDef {
        kind: "macd_divergence",
        description: "Price and MACD histogram moving in opposite directions",
        params: macd_params,
        build: |p, s| {
            let m = s.attach(macd(p)?)?;
            divergence(p, Operand::field(m, Field::Histogram))
        },
    },
    BundleDef {
        kind: "obv_divergence",
        description: "Price and on-balance volume moving in opposite directions",
        params: || ParameterSet::new().add(long_only(false)),
        build: |p, s| {
            let obv = s.attach(Obv::new())?;
            divergence(p, Operand::series(obv))
        },
    },
    BundleDef {
        kind: "rsi_trend_filter",
        description: "RSI cross-back entries admitted only in a directional trend",
        params: || zones(length("period", 14, "RSI length"), 40.0, 60.0).extend(adx_params(14, 20.0)),
        build: |p, s| {
            let rsi = s.attach(Rsi::new(p.get("period")?))?;
            let rule = threshold(p, Operand::series(rsi), ThresholdMode::CrossBack, None)?;
            let adx = s.attach(Adx::new(p.get("adx_period")?))?;
            Ok(Box::new(Gated::new(rule, TrendStrengthFilter::new(adx, p.get("adx_threshold")?))))
        },
    },
];

/// Indicator length parameter plus the two zone levels and the long-only flag.
fn zones<T: ParamType>(indicator: Parameter<T>, oversold: f64, overbought: f64) -> ParameterSet {
    ParameterSet::new()
        .add(indicator)
        .add(level("oversold", oversold, "Oversold level", "Trading"))
        .add(level("overbought", overbought, "Overbought level", "Trading"))
        .add(long_only(false))
}

fn threshold(
    p: &ParameterSet,
    osc: Operand,
    mode: ThresholdMode,
    exit_mid: Option<f64>,
) -> Result<Box<dyn Rule>> {
    let mut rule = OscillatorThreshold::new(osc, p.get("oversold")?, p.get("overbought")?)?.mode(mode);
    if let Some(mid) = exit_mid {
        rule = rule.exit_mid(mid);
    }
    if p.get("long_only")? {
        rule = rule.long_only();
    }
    Ok(Box::new(rule))
}

fn divergence(p: &ParameterSet, osc: Operand) -> Result<Box<dyn Rule>> {
    let rule = Divergence::new(Operand::Close, osc);
    Ok(if p.get("long_only")? {
        Box::new(rule.long_only())
    } else {
        Box::new(rule)
    })
}

fn stochastic_params() -> ParameterSet {
    ParameterSet::new()
        .add(length("k_period", 14, "%K length"))
        .add(length("slowing", 3, "%K slowing"))
        .add(length("d_period", 3, "%D length"))
}

fn stochastic(p: &ParameterSet) -> Result<Stochastic> {
    Ok(Stochastic::new(p.get("k_period")?, p.get("slowing")?, p.get("d_period")?))
}
