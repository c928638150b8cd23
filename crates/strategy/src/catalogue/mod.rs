//! Named rule bundles.
//!
//! Each entry pairs a parameter declaration with a builder that attaches the
//! bundle's indicators and assembles its rule from the combinators in
//! [`crate::rules`]. Entries are grouped by style; [`all`] lists them in a
//! stable order and [`find`] looks one up by kind.

mod oscillators;
mod patterns;
mod reversion;
mod seasonal;
mod trend;

use std::sync::Arc;

use common::{Error, Result};

use crate::indicator_set::IndicatorSet;
use crate::params::{Parameter, ParameterSet};
use crate::rules::{Crossover, Operand, Rule};
use crate::strategy::StrategyFactory;

pub type ParamsFn = fn() -> ParameterSet;
pub type BuildFn = fn(&ParameterSet, &mut IndicatorSet) -> Result<Box<dyn Rule>>;

/// One catalogue entry.
#[derive(Clone, Copy)]
pub struct BundleDef {
    pub kind: &'static str,
    pub description: &'static str,
    pub params: ParamsFn,
    pub build: BuildFn,
}

impl std::fmt::Debug for BundleDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleDef").field("kind", &self.kind).finish()
    }
}

impl StrategyFactory for BundleDef {
    fn kind(&self) -> &str {
        self.kind
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters(&self) -> ParameterSet {
        (self.params)()
    }

    fn build_rule(&self, params: &ParameterSet, indicators: &mut IndicatorSet) -> Result<Box<dyn Rule>> {
        (self.build)(params, indicators)
    }
}

/// Every bundle, grouped trend → reversion → oscillators → patterns → seasonal.
pub fn all() -> impl Iterator<Item = &'static BundleDef> {
    trend::BUNDLES
        .iter()
        .chain(reversion::BUNDLES)
        .chain(oscillators::BUNDLES)
        .chain(patterns::BUNDLES)
        .chain(seasonal::BUNDLES)
}

pub fn find(kind: &str) -> Option<&'static BundleDef> {
    all().find(|b| b.kind == kind)
}

/// Factory handle for `kind`, or `InvalidConfig` naming the unknown type.
pub fn factory(kind: &str) -> Result<Arc<dyn StrategyFactory>> {
    find(kind)
        .map(|b| Arc::new(*b) as Arc<dyn StrategyFactory>)
        .ok_or_else(|| Error::invalid_config(format!("unknown strategy type '{kind}'")))
}

// ─── Parameter helpers ────────────────────────────────────────────────────────

pub(crate) fn length(name: &str, value: usize, display: &str) -> Parameter<usize> {
    Parameter::new(name, value)
        .display(display, &format!("{display} in candles"), "Indicators")
        .positive()
        .optimize((value / 2).max(2) as f64, (value * 2) as f64, 1.0)
}

pub(crate) fn level(name: &str, value: f64, display: &str, group: &str) -> Parameter<f64> {
    Parameter::new(name, value).display(display, display, group)
}

pub(crate) fn multiplier(name: &str, value: f64, display: &str) -> Parameter<f64> {
    Parameter::new(name, value)
        .display(display, display, "Indicators")
        .positive()
        .optimize(value / 2.0, value * 2.0, value / 4.0)
}

pub(crate) fn long_only(default: bool) -> Parameter<bool> {
    Parameter::new("long_only", default).display(
        "Long only",
        "Exit instead of going short on bearish signals",
        "Trading",
    )
}

pub(crate) fn crossover(a: Operand, b: Operand, long_only: bool) -> Crossover {
    if long_only {
        Crossover::long_only(a, b)
    } else {
        Crossover::new(a, b)
    }
}
