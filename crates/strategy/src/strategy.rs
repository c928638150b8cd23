//! A configured strategy: indicator set + rule bundle + trading parameters.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use common::{Candle, Error, ProtectionConfig, Result, Signal, Timeframe};
use rust_decimal::Decimal;

use crate::indicator_set::{IndicatorSet, IndicatorValues};
use crate::params::{ParamType, ParameterSet};
use crate::rules::{Rule, RuleContext};

/// Produces the rule bundle of one strategy kind.
///
/// Every call to [`build_rule`](Self::build_rule) attaches fresh indicators to
/// the given set and returns a rule with empty scratch, so two builds from the
/// same parameters never share state.
pub trait StrategyFactory: Send + Sync {
    /// Stable identifier used in config files, e.g. `ema_cross`.
    fn kind(&self) -> &str;

    fn description(&self) -> &str;

    /// Declared parameters with their defaults.
    fn parameters(&self) -> ParameterSet;

    fn build_rule(&self, params: &ParameterSet, indicators: &mut IndicatorSet) -> Result<Box<dyn Rule>>;
}

/// Everything needed to create [`Strategy`] instances with identical settings.
#[derive(Clone)]
pub struct StrategyBlueprint {
    factory: Arc<dyn StrategyFactory>,
    name: String,
    security: String,
    timeframe: Timeframe,
    volume: Decimal,
    protection: ProtectionConfig,
    params: ParameterSet,
}

impl fmt::Debug for StrategyBlueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyBlueprint")
            .field("kind", &self.factory.kind())
            .field("name", &self.name)
            .field("security", &self.security)
            .field("timeframe", &self.timeframe)
            .field("volume", &self.volume)
            .field("protection", &self.protection)
            .field("params", &self.params)
            .finish()
    }
}

impl StrategyBlueprint {
    /// Blueprint with the factory's default parameters, volume 1 and no protection.
    pub fn new(factory: Arc<dyn StrategyFactory>, security: impl Into<String>) -> Self {
        let security = security.into();
        Self {
            name: format!("{}:{}", factory.kind(), security),
            params: factory.parameters(),
            factory,
            security,
            timeframe: Timeframe::default(),
            volume: Decimal::ONE,
            protection: ProtectionConfig::default(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn timeframe(mut self, timeframe: Timeframe) -> Self {
        self.timeframe = timeframe;
        self
    }

    pub fn volume(mut self, volume: Decimal) -> Self {
        self.volume = volume;
        self
    }

    pub fn protection(mut self, protection: ProtectionConfig) -> Self {
        self.protection = protection;
        self
    }

    /// Builder-style typed parameter override.
    pub fn param<T: ParamType>(mut self, name: &str, value: T) -> Result<Self> {
        self.params.set(name, value)?;
        Ok(self)
    }

    pub fn apply_overrides(&mut self, overrides: &HashMap<String, toml::Value>) -> Result<()> {
        self.params.apply_overrides(overrides)
    }

    pub fn kind(&self) -> &str {
        self.factory.kind()
    }

    pub fn strategy_name(&self) -> &str {
        &self.name
    }

    pub fn security(&self) -> &str {
        &self.security
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    /// Validate everything and build a fresh instance.
    pub fn build(&self) -> Result<Strategy> {
        if self.volume <= Decimal::ZERO {
            return Err(Error::invalid_config(format!(
                "{}: volume must be positive, got {}",
                self.name, self.volume
            )));
        }
        if self.security.trim().is_empty() {
            return Err(Error::invalid_config(format!("{}: security is empty", self.name)));
        }
        self.params.validate()?;
        let protection = self.protection.clone().normalized();
        protection.validate()?;

        let mut indicators = IndicatorSet::new();
        let rule = self.factory.build_rule(&self.params, &mut indicators)?;
        indicators.seal();

        Ok(Strategy {
            blueprint: StrategyBlueprint {
                protection,
                ..self.clone()
            },
            indicators,
            rule,
        })
    }
}

/// A ready-to-run strategy instance. Owns its indicators and rule scratch.
pub struct Strategy {
    blueprint: StrategyBlueprint,
    indicators: IndicatorSet,
    rule: Box<dyn Rule>,
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy")
            .field("blueprint", &self.blueprint)
            .field("indicators", &self.indicators)
            .field("rule", &self.rule)
            .finish()
    }
}

impl Strategy {
    pub fn name(&self) -> &str {
        &self.blueprint.name
    }

    pub fn kind(&self) -> &str {
        self.blueprint.kind()
    }

    pub fn security(&self) -> &str {
        &self.blueprint.security
    }

    pub fn timeframe(&self) -> Timeframe {
        self.blueprint.timeframe
    }

    pub fn volume(&self) -> Decimal {
        self.blueprint.volume
    }

    pub fn protection(&self) -> &ProtectionConfig {
        &self.blueprint.protection
    }

    pub fn params(&self) -> &ParameterSet {
        &self.blueprint.params
    }

    pub fn blueprint(&self) -> &StrategyBlueprint {
        &self.blueprint
    }

    /// A new instance with identical parameters and empty state.
    pub fn fresh(&self) -> Result<Strategy> {
        self.blueprint.build()
    }

    /// Update every indicator with a finished candle.
    pub fn feed(&mut self, candle: &Candle) -> Result<IndicatorValues> {
        self.indicators.feed(candle)
    }

    pub fn is_formed(&self) -> bool {
        self.indicators.is_all_formed()
    }

    pub fn evaluate(&self, ctx: &RuleContext<'_>) -> Signal {
        self.rule.evaluate(ctx)
    }

    pub fn commit(&mut self, ctx: &RuleContext<'_>) {
        self.rule.commit(ctx);
    }

    /// Drop indicator and rule state; parameters are kept.
    pub fn reset(&mut self) {
        self.indicators.reset();
        self.rule.reset();
    }

    pub fn indicator_names(&self) -> impl Iterator<Item = &str> {
        self.indicators.names()
    }
}
