use std::collections::HashMap;

use common::{ProtectionConfig, Result, Timeframe};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-level strategy config file (TOML).
///
/// Example `config/strategies.toml`:
/// ```toml
/// [[strategy]]
/// type = "ema_cross"
/// name = "BTC EMA 10/20"
/// security = "BTCUSDT"
/// timeframe = "1h"
/// volume = 0.01
///
/// [strategy.params]
/// fast = 10
/// slow = 20
///
/// [strategy.protection]
/// stop_loss = { value = 2.0, kind = "percent" }
/// is_trailing = true
///
/// [[rebalancer]]
/// name = "momentum"
/// universe = ["AAA", "BBB", "CCC", "DDD"]
/// deciles = 2
/// factor = { kind = "momentum", lookback = 252, skip = 21 }
///
/// [[pairs]]
/// name = "ko-pep"
/// first = "KO"
/// second = "PEP"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    #[serde(rename = "strategy", default)]
    pub strategies: Vec<StrategyConfig>,
    #[serde(rename = "rebalancer", default)]
    pub rebalancers: Vec<RebalancerConfig>,
    #[serde(default)]
    pub pairs: Vec<PairsConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Catalogue kind, e.g. "ema_cross" or "bollinger_reversion".
    #[serde(rename = "type")]
    pub strategy_type: String,
    /// Human-readable name shown in logs.
    pub name: String,
    /// Security identifier, e.g. "BTCUSDT".
    pub security: String,
    #[serde(default)]
    pub timeframe: Timeframe,
    /// Base order volume.
    #[serde(default = "default_volume")]
    pub volume: Decimal,
    /// Overrides of the bundle's declared parameters.
    #[serde(default)]
    pub params: HashMap<String, toml::Value>,
    #[serde(default)]
    pub protection: ProtectionConfig,
}

fn default_volume() -> Decimal {
    Decimal::ONE
}

/// Calendar period that triggers a rebalance on its first candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RebalanceFrequency {
    #[default]
    Monthly,
    Quarterly,
    Yearly,
}

/// Cross-sectional score used to rank the universe.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FactorConfig {
    /// Return over `lookback` candles, excluding the most recent `skip`.
    Momentum { lookback: usize, #[serde(default)] skip: usize },
    /// Negative return over a short window.
    Reversal { lookback: usize },
    /// Negative standard deviation of one-candle returns.
    LowVolatility { lookback: usize },
    /// Scores supplied from outside (accruals, asset growth, ...).
    External { scores: HashMap<String, f64> },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RebalancerConfig {
    pub name: String,
    pub universe: Vec<String>,
    #[serde(default = "default_deciles")]
    pub deciles: usize,
    /// Gross exposure per side.
    #[serde(default = "default_leverage")]
    pub leverage: f64,
    /// Orders worth less than this in quote currency are skipped.
    #[serde(default)]
    pub min_trade_usd: f64,
    #[serde(default)]
    pub frequency: RebalanceFrequency,
    pub factor: FactorConfig,
    #[serde(default)]
    pub long_only: bool,
    /// Quantities are floored toward zero to a multiple of this.
    #[serde(default = "default_lot_step")]
    pub lot_step: Decimal,
    #[serde(default = "default_rebalance_timeframe")]
    pub timeframe: Timeframe,
}

fn default_deciles() -> usize {
    10
}

fn default_leverage() -> f64 {
    1.0
}

fn default_lot_step() -> Decimal {
    Decimal::ONE
}

fn default_rebalance_timeframe() -> Timeframe {
    Timeframe::days(1)
}

/// Two-leg spread trade on the z-score of the log price ratio.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PairsConfig {
    pub name: String,
    pub first: String,
    pub second: String,
    #[serde(default = "default_pairs_lookback")]
    pub lookback: usize,
    #[serde(default = "default_entry_z")]
    pub entry_z: f64,
    #[serde(default = "default_exit_z")]
    pub exit_z: f64,
    /// Quantity traded on each leg.
    #[serde(default = "default_volume")]
    pub quantity: Decimal,
    #[serde(default)]
    pub min_trade_usd: f64,
    #[serde(default = "default_rebalance_timeframe")]
    pub timeframe: Timeframe,
}

fn default_pairs_lookback() -> usize {
    20
}

fn default_entry_z() -> f64 {
    2.0
}

fn default_exit_z() -> f64 {
    0.5
}

impl StrategyFileConfig {
    /// Load from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Unit, UnitKind};

    const SAMPLE: &str = r#"
        [[strategy]]
        type = "ema_cross"
        name = "btc ema"
        security = "BTCUSDT"
        timeframe = "1h"
        volume = 0.5

        [strategy.params]
        fast = 8
        long_only = true

        [strategy.protection]
        stop_loss = { value = 2.0, kind = "percent" }
        take_profit = { value = 3.0, kind = "atr_multiple" }
        is_trailing = true

        [[strategy]]
        type = "rsi_threshold"
        name = "eth rsi"
        security = "ETHUSDT"

        [[rebalancer]]
        name = "mom"
        universe = ["A", "B", "C", "D"]
        deciles = 2
        frequency = "quarterly"
        factor = { kind = "momentum", lookback = 60, skip = 5 }

        [[pairs]]
        name = "ko-pep"
        first = "KO"
        second = "PEP"
        entry_z = 1.5
    "#;

    #[test]
    fn parses_strategies_and_rebalancers() {
        let cfg = StrategyFileConfig::parse(SAMPLE).unwrap();
        assert_eq!(cfg.strategies.len(), 2);

        let ema = &cfg.strategies[0];
        assert_eq!(ema.strategy_type, "ema_cross");
        assert_eq!(ema.timeframe, Timeframe::hours(1));
        assert_eq!(ema.volume, Decimal::new(5, 1));
        assert_eq!(ema.params["fast"].as_integer(), Some(8));
        assert_eq!(ema.protection.stop_loss, Some(Unit::percent(2.0)));
        assert_eq!(ema.protection.take_profit.map(|u| u.kind), Some(UnitKind::AtrMultiple));
        assert!(ema.protection.is_trailing);

        let rsi = &cfg.strategies[1];
        assert_eq!(rsi.volume, Decimal::ONE);
        assert!(rsi.params.is_empty());
        assert_eq!(rsi.protection, ProtectionConfig::default());

        let reb = &cfg.rebalancers[0];
        assert_eq!(reb.deciles, 2);
        assert_eq!(reb.frequency, RebalanceFrequency::Quarterly);
        assert_eq!(reb.factor, FactorConfig::Momentum { lookback: 60, skip: 5 });
        assert_eq!(reb.leverage, 1.0);
        assert_eq!(reb.timeframe, Timeframe::days(1));

        let pair = &cfg.pairs[0];
        assert_eq!((pair.first.as_str(), pair.second.as_str()), ("KO", "PEP"));
        assert_eq!(pair.lookback, 20);
        assert_eq!(pair.entry_z, 1.5);
        assert_eq!(pair.exit_z, 0.5);
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(StrategyFileConfig::parse("[[strategy]]\nname = 1").is_err());
        assert!(StrategyFileConfig::load("/nonexistent/strategies.toml").is_err());
    }
}
