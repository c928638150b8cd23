//! Indicators, rule bundles and the strategy catalogue.

pub mod catalogue;
pub mod config;
pub mod indicator_set;
pub mod indicators;
pub mod params;
pub mod registry;
pub mod rules;
pub mod strategy;

pub use config::{
    FactorConfig, PairsConfig, RebalanceFrequency, RebalancerConfig, StrategyConfig,
    StrategyFileConfig,
};
pub use indicator_set::{IndicatorHandle, IndicatorSet, IndicatorValues};
pub use indicators::{Field, Indicator, IndicatorValue};
pub use params::{ParamValue, Parameter, ParameterSet};
pub use registry::StrategyRegistry;
pub use rules::{Operand, Rule, RuleContext};
pub use strategy::{Strategy, StrategyBlueprint, StrategyFactory};
