//! Mean-reversion bundles: fade stretches away from a mean, exit on return.

use common::Result;

use super::trend::{atr_gate, bollinger_params, keltner, keltner_params};
use super::{length, long_only, multiplier, BundleDef};
use crate::indicators::{Bollinger, Ema, Sma, Vwap};
use crate::params::{Parameter, ParameterSet};
use crate::rules::{BandReversion, Gated, Operand, ReversionThreshold, Rule, VolatilityMode};

pub(super) const BUNDLES: &[BundleDef] = &[
    BundleDef {
        kind: "bollinger_reversion",
        description: "Buy below the lower Bollinger band, sell above the upper, exit at the middle",
        params: bollinger_params,
        build: |p, s| {
            let bands = s.attach(Bollinger::new(p.get("period")?, p.get("width")?))?;
            reversion(p, ReversionThreshold::Bands(bands))
        },
    },
    BundleDef {
        kind: "keltner_reversion",
        description: "Fade closes outside the Keltner channel",
        params: keltner_params,
        build: |p, s| {
            let bands = s.attach(keltner(p)?)?;
            reversion(p, ReversionThreshold::Bands(bands))
        },
    },
    BundleDef {
        kind: "sma_deviation",
        description: "Fade closes a fixed fraction away from an SMA",
        params: || deviation_params(20, 0.02),
        build: |p, s| {
            let mean = s.attach(Sma::new(p.get("period")?))?;
            fraction(p, Operand::series(mean))
        },
    },
    BundleDef {
        kind: "ema_deviation",
        description: "Fade closes a fixed fraction away from an EMA",
        params: || deviation_params(20, 0.03),
        build: |p, s| {
            let mean = s.attach(Ema::new(p.get("period")?))?;
            fraction(p, Operand::series(mean))
        },
    },
    BundleDef {
        kind: "vwap_reversion",
        description: "Fade closes a fixed fraction away from the session VWAP",
        params: || {
            ParameterSet::new()
                .add(deviation(0.01))
                .add(long_only(false))
        },
        build: |p, s| {
            let mean = s.attach(Vwap::new())?;
            fraction(p, Operand::series(mean))
        },
    },
    BundleDef {
        kind: "bollinger_reversion_quiet",
        description: "Bollinger reversion admitted only while ATR is below its average",
        params: || {
            bollinger_params()
                .add(length("atr_period", 14, "ATR length"))
                .add(length("atr_avg_period", 20, "ATR average length"))
                .add(multiplier("ratio", 1.0, "ATR / average ratio"))
        },
        build: |p, s| {
            let bands = s.attach(Bollinger::new(p.get("period")?, p.get("width")?))?;
            let rule = reversion(p, ReversionThreshold::Bands(bands))?;
            let gate = atr_gate(p, s, VolatilityMode::Below)?;
            Ok(Box::new(Gated::new(rule, gate)))
        },
    },
];

fn deviation(value: f64) -> Parameter<f64> {
    Parameter::new("deviation", value)
        .display("Deviation", "Relative distance from the mean that counts as stretched", "Trading")
        .positive()
        .optimize(value / 2.0, value * 3.0, value / 2.0)
}

fn deviation_params(period: usize, dev: f64) -> ParameterSet {
    ParameterSet::new()
        .add(length("period", period, "Mean length"))
        .add(deviation(dev))
        .add(long_only(false))
}

fn reversion(p: &ParameterSet, threshold: ReversionThreshold) -> Result<Box<dyn Rule>> {
    let rule = BandReversion::new(threshold)?;
    Ok(if p.get("long_only")? {
        Box::new(rule.long_only())
    } else {
        Box::new(rule)
    })
}

fn fraction(p: &ParameterSet, mean: Operand) -> Result<Box<dyn Rule>> {
    reversion(
        p,
        ReversionThreshold::Fraction {
            mean,
            deviation: p.get("deviation")?,
        },
    )
}
