use tracing::info;

use common::{Error, Result};

use crate::catalogue;
use crate::config::{StrategyConfig, StrategyFileConfig};
use crate::strategy::{Strategy, StrategyBlueprint};

/// Validated blueprints for every `[[strategy]]` table of a config file.
#[derive(Debug, Default)]
pub struct StrategyRegistry {
    blueprints: Vec<StrategyBlueprint>,
}

impl StrategyRegistry {
    /// Resolve every strategy type against the catalogue and apply its
    /// parameter overrides. Unknown types and bad parameters are `InvalidConfig`.
    pub fn from_config(file_cfg: &StrategyFileConfig) -> Result<Self> {
        let mut registry = Self::default();
        for cfg in &file_cfg.strategies {
            let blueprint = blueprint(cfg)?;
            // Build once so that configuration errors surface here, not at start.
            blueprint.build()?;
            registry.register(blueprint)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, blueprint: StrategyBlueprint) -> Result<()> {
        if self
            .blueprints
            .iter()
            .any(|b| b.strategy_name() == blueprint.strategy_name())
        {
            return Err(Error::invalid_config(format!(
                "duplicate strategy name '{}'",
                blueprint.strategy_name()
            )));
        }
        info!(
            name = %blueprint.strategy_name(),
            kind = %blueprint.kind(),
            security = %blueprint.security(),
            "Registered strategy"
        );
        self.blueprints.push(blueprint);
        Ok(())
    }

    /// Fresh instances of every registered strategy.
    pub fn build_all(&self) -> Result<Vec<Strategy>> {
        self.blueprints.iter().map(StrategyBlueprint::build).collect()
    }

    pub fn blueprints(&self) -> &[StrategyBlueprint] {
        &self.blueprints
    }

    pub fn len(&self) -> usize {
        self.blueprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blueprints.is_empty()
    }
}

fn blueprint(cfg: &StrategyConfig) -> Result<StrategyBlueprint> {
    let factory = catalogue::factory(&cfg.strategy_type)?;
    let mut bp = StrategyBlueprint::new(factory, cfg.security.clone())
        .name(cfg.name.clone())
        .timeframe(cfg.timeframe)
        .volume(cfg.volume)
        .protection(cfg.protection.clone());
    bp.apply_overrides(&cfg.params)
        .map_err(|e| Error::invalid_config(format!("{}: {e}", cfg.name)))?;
    Ok(bp)
}
