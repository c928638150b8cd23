use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How a protection distance is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// Price points away from entry.
    Absolute,
    /// Percent of the entry price (2.0 = 2%).
    Percent,
    /// Multiple of the current ATR.
    AtrMultiple,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub value: f64,
    pub kind: UnitKind,
}

impl Unit {
    pub fn percent(value: f64) -> Self {
        Self { value, kind: UnitKind::Percent }
    }

    pub fn absolute(value: f64) -> Self {
        Self { value, kind: UnitKind::Absolute }
    }

    pub fn atr(multiple: f64) -> Self {
        Self { value: multiple, kind: UnitKind::AtrMultiple }
    }

    /// A zero distance means "disabled", same as an absent unit.
    pub fn is_enabled(&self) -> bool {
        self.value != 0.0
    }

    /// Distance in price terms from `reference`. `None` when the unit needs an
    /// ATR value that is not available yet.
    pub fn distance(&self, reference: f64, atr: Option<f64>) -> Option<f64> {
        match self.kind {
            UnitKind::Absolute => Some(self.value),
            UnitKind::Percent => Some(reference * self.value / 100.0),
            UnitKind::AtrMultiple => atr.map(|a| a * self.value),
        }
    }
}

/// Which exit wins when stop-loss and take-profit both trigger inside one candle.
/// The intra-bar order is unknown, so the default is the pessimistic one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    #[default]
    StopLossFirst,
    TakeProfitFirst,
}

/// Protection parameters set at strategy start and immutable while running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionConfig {
    pub take_profit: Option<Unit>,
    pub stop_loss: Option<Unit>,
    pub is_trailing: bool,
    pub use_market_orders: bool,
    pub close_after_bars: Option<u32>,
    pub tie_break: TieBreak,
    /// ATR period used for `AtrMultiple` units.
    pub atr_period: usize,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            take_profit: None,
            stop_loss: None,
            is_trailing: false,
            use_market_orders: true,
            close_after_bars: None,
            tie_break: TieBreak::default(),
            atr_period: 14,
        }
    }
}

impl ProtectionConfig {
    pub fn stop_loss(mut self, unit: Unit) -> Self {
        self.stop_loss = Some(unit);
        self
    }

    pub fn take_profit(mut self, unit: Unit) -> Self {
        self.take_profit = Some(unit);
        self
    }

    pub fn trailing(mut self, on: bool) -> Self {
        self.is_trailing = on;
        self
    }

    pub fn close_after_bars(mut self, bars: u32) -> Self {
        self.close_after_bars = Some(bars);
        self
    }

    /// Fold zero-valued units into `None`.
    pub fn normalized(mut self) -> Self {
        self.take_profit = self.take_profit.filter(Unit::is_enabled);
        self.stop_loss = self.stop_loss.filter(Unit::is_enabled);
        self.close_after_bars = self.close_after_bars.filter(|n| *n > 0);
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (name, unit) in [("take_profit", self.take_profit), ("stop_loss", self.stop_loss)] {
            if let Some(u) = unit {
                if !u.value.is_finite() || u.value < 0.0 {
                    return Err(Error::invalid_config(format!(
                        "{name} must be a non-negative number, got {}",
                        u.value
                    )));
                }
                if u.kind == UnitKind::Percent && u.value >= 100.0 && name == "stop_loss" {
                    return Err(Error::invalid_config(format!(
                        "stop_loss percent must be below 100, got {}",
                        u.value
                    )));
                }
            }
        }
        if self.uses_atr() && self.atr_period == 0 {
            return Err(Error::invalid_config("atr_period must be positive"));
        }
        Ok(())
    }

    pub fn uses_atr(&self) -> bool {
        [self.take_profit, self.stop_loss]
            .iter()
            .flatten()
            .any(|u| u.kind == UnitKind::AtrMultiple && u.is_enabled())
    }

    pub fn is_active(&self) -> bool {
        let cfg = self.clone().normalized();
        cfg.take_profit.is_some() || cfg.stop_loss.is_some() || cfg.close_after_bars.is_some()
    }
}
