use std::fmt;

use tracing::{debug, info};

use common::{
    Candle, Direction, OrderType, PositionChange, ProtectionConfig, TieBreak, Unit,
};

/// Why a protective exit fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    /// `close_after_bars` elapsed with the position in profit.
    TimeStop,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop-loss"),
            ExitReason::TakeProfit => write!(f, "take-profit"),
            ExitReason::TimeStop => write!(f, "time-stop"),
        }
    }
}

/// A protective exit decided on one finished candle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtectiveExit {
    pub reason: ExitReason,
    pub direction: Direction,
    /// Trigger level for stop/take-profit, the candle close for time stops.
    pub price: f64,
    pub order_type: OrderType,
}

/// Levels tracked while a position is open.
#[derive(Debug, Clone, PartialEq)]
struct Tracking {
    direction: Direction,
    entry_price: f64,
    entry_bar: u64,
    /// Most favourable price seen on candles already checked.
    peak: f64,
    /// Ratcheted trailing stop. Only used when `is_trailing`.
    trailing_stop: Option<f64>,
}

/// Stop-loss, take-profit and time-stop supervision of one strategy's position.
///
/// Flat → Open → Flat. Tracking starts on the fill that opens (or flips) the
/// position and ends only when a fill brings the net back to zero; partial
/// reductions keep the original entry.
#[derive(Debug, Clone)]
pub struct ProtectionPolicy {
    config: ProtectionConfig,
    tracking: Option<Tracking>,
}

impl ProtectionPolicy {
    pub fn new(config: ProtectionConfig) -> Self {
        Self {
            config: config.normalized(),
            tracking: None,
        }
    }

    pub fn config(&self) -> &ProtectionConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.config.is_active()
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.is_some()
    }

    pub fn entry_price(&self) -> Option<f64> {
        self.tracking.as_ref().map(|t| t.entry_price)
    }

    /// Feed the position change produced by a fill.
    pub fn on_position_change(&mut self, change: PositionChange, bar: u64, atr: Option<f64>) {
        match change {
            PositionChange::Opened { direction, price } | PositionChange::Flipped { direction, price } => {
                let mut tracking = Tracking {
                    direction,
                    entry_price: price,
                    entry_bar: bar,
                    peak: price,
                    trailing_stop: None,
                };
                if self.config.is_trailing {
                    tracking.trailing_stop =
                        self.config.stop_loss.and_then(|u| stop_from(u, direction, price, atr));
                }
                debug!(%direction, entry = price, bar, "Protection tracking started");
                self.tracking = Some(tracking);
            }
            PositionChange::Closed => {
                if self.tracking.take().is_some() {
                    debug!("Protection tracking cleared");
                }
            }
            PositionChange::Increased | PositionChange::Reduced => {}
        }
    }

    /// Current stop level, if a stop is configured and computable.
    pub fn stop_price(&self, atr: Option<f64>) -> Option<f64> {
        let t = self.tracking.as_ref()?;
        let unit = self.config.stop_loss?;
        if self.config.is_trailing {
            let fresh = stop_from(unit, t.direction, t.peak, atr);
            ratchet(t.direction, t.trailing_stop, fresh)
        } else {
            stop_from(unit, t.direction, t.entry_price, atr)
        }
    }

    /// Current take-profit level, if configured and computable.
    pub fn take_profit_price(&self, atr: Option<f64>) -> Option<f64> {
        let t = self.tracking.as_ref()?;
        let unit = self.config.take_profit?;
        let distance = unit.distance(t.entry_price, atr)?;
        Some(match t.direction {
            Direction::Long => t.entry_price + distance,
            Direction::Short => t.entry_price - distance,
        })
    }

    /// Check one finished candle against the tracked levels.
    ///
    /// Levels are evaluated against the peak seen *before* this candle, then the
    /// peak and trailing stop advance with it. `atr` is the current ATR reading
    /// for `AtrMultiple` units; without it those levels are skipped.
    pub fn check(&mut self, candle: &Candle, bar: u64, atr: Option<f64>) -> Option<ProtectiveExit> {
        let stop = self.stop_price(atr);
        let take = self.take_profit_price(atr);
        let t = self.tracking.as_mut()?;
        let direction = t.direction;

        let (stop_hit, take_hit) = match direction {
            Direction::Long => (
                stop.is_some_and(|s| candle.low <= s),
                take.is_some_and(|p| candle.high >= p),
            ),
            Direction::Short => (
                stop.is_some_and(|s| candle.high >= s),
                take.is_some_and(|p| candle.low <= p),
            ),
        };

        let hit = match (stop_hit, take_hit, self.config.tie_break) {
            (true, true, TieBreak::StopLossFirst) | (true, false, _) => {
                stop.map(|price| (ExitReason::StopLoss, price))
            }
            (true, true, TieBreak::TakeProfitFirst) | (false, true, _) => {
                take.map(|price| (ExitReason::TakeProfit, price))
            }
            (false, false, _) => None,
        };

        let exit = hit.or_else(|| {
            let bars = self.config.close_after_bars?;
            let held = bar.saturating_sub(t.entry_bar);
            let in_profit = match direction {
                Direction::Long => candle.close > t.entry_price,
                Direction::Short => candle.close < t.entry_price,
            };
            (held >= u64::from(bars) && in_profit).then_some((ExitReason::TimeStop, candle.close))
        });

        // Advance the peak and the trailing stop for the next candle.
        t.peak = match direction {
            Direction::Long => t.peak.max(candle.high),
            Direction::Short => t.peak.min(candle.low),
        };
        if self.config.is_trailing {
            let fresh = self
                .config
                .stop_loss
                .and_then(|u| stop_from(u, direction, t.peak, atr));
            t.trailing_stop = ratchet(direction, t.trailing_stop, fresh);
        }

        let (reason, price) = exit?;
        let order_type = if self.config.use_market_orders || reason == ExitReason::TimeStop {
            OrderType::Market
        } else {
            OrderType::Limit { price }
        };
        info!(
            security = %candle.security,
            %reason,
            %direction,
            price,
            entry = t.entry_price,
            "Protection triggered"
        );
        Some(ProtectiveExit {
            reason,
            direction,
            price,
            order_type,
        })
    }

    pub fn reset(&mut self) {
        self.tracking = None;
    }
}

fn stop_from(unit: Unit, direction: Direction, reference: f64, atr: Option<f64>) -> Option<f64> {
    let distance = unit.distance(reference, atr)?;
    Some(match direction {
        Direction::Long => reference - distance,
        Direction::Short => reference + distance,
    })
}

/// A trailing stop only moves in the position's favour.
fn ratchet(direction: Direction, current: Option<f64>, fresh: Option<f64>) -> Option<f64> {
    match (current, fresh) {
        (Some(c), Some(f)) => Some(match direction {
            Direction::Long => c.max(f),
            Direction::Short => c.min(f),
        }),
        (c, f) => c.or(f),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use common::{CandleState, Unit};

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            security: "TEST".into(),
            open_time: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume: 1000.0,
            state: CandleState::Finished,
        }
    }

    fn opened_long(cfg: ProtectionConfig, price: f64) -> ProtectionPolicy {
        let mut policy = ProtectionPolicy::new(cfg);
        policy.on_position_change(
            PositionChange::Opened { direction: Direction::Long, price },
            0,
            None,
        );
        policy
    }

    #[test]
    fn percent_stop_fires_on_low_touch() {
        let mut p = opened_long(ProtectionConfig::default().stop_loss(Unit::percent(2.0)), 100.0);
        assert_eq!(p.stop_price(None), Some(98.0));
        let exit = p.check(&bar(99.0, 100.5, 97.9, 98.0), 1, None).unwrap();
        assert_eq!(exit.reason, ExitReason::StopLoss);
        assert_eq!(exit.price, 98.0);
        assert_eq!(exit.order_type, OrderType::Market);
    }

    #[test]
    fn stop_boundary_is_inclusive() {
        let mut p = opened_long(ProtectionConfig::default().stop_loss(Unit::absolute(2.0)), 100.0);
        assert!(p.check(&bar(99.0, 99.5, 98.01, 99.0), 1, None).is_none());
        assert!(p.check(&bar(99.0, 99.5, 98.0, 99.0), 2, None).is_some());
    }

    #[test]
    fn short_take_profit_on_low() {
        let mut p = ProtectionPolicy::new(ProtectionConfig::default().take_profit(Unit::percent(5.0)));
        p.on_position_change(
            PositionChange::Opened { direction: Direction::Short, price: 100.0 },
            0,
            None,
        );
        assert!(p.check(&bar(99.0, 99.0, 96.0, 97.0), 1, None).is_none());
        let exit = p.check(&bar(96.0, 96.5, 94.9, 95.5), 2, None).unwrap();
        assert_eq!(exit.reason, ExitReason::TakeProfit);
        assert_eq!(exit.price, 95.0);
    }

    #[test]
    fn tie_goes_to_stop_unless_configured() {
        let cfg = ProtectionConfig::default()
            .stop_loss(Unit::absolute(1.0))
            .take_profit(Unit::absolute(1.0));
        let wide = bar(100.0, 101.5, 98.5, 100.0);

        let mut p = opened_long(cfg.clone(), 100.0);
        assert_eq!(p.check(&wide, 1, None).unwrap().reason, ExitReason::StopLoss);

        let mut p = opened_long(
            ProtectionConfig { tie_break: TieBreak::TakeProfitFirst, ..cfg },
            100.0,
        );
        assert_eq!(p.check(&wide, 1, None).unwrap().reason, ExitReason::TakeProfit);
    }

    #[test]
    fn trailing_stop_ratchets_and_never_regresses() {
        let mut p = opened_long(
            ProtectionConfig::default().stop_loss(Unit::absolute(2.0)).trailing(true),
            100.0,
        );
        assert_eq!(p.stop_price(None), Some(98.0));
        assert!(p.check(&bar(100.0, 105.0, 100.0, 104.0), 1, None).is_none());
        assert_eq!(p.stop_price(None), Some(103.0));
        // A pullback leaves the stop where it is.
        assert!(p.check(&bar(104.0, 104.0, 103.5, 103.6), 2, None).is_none());
        assert_eq!(p.stop_price(None), Some(103.0));
        let exit = p.check(&bar(103.6, 103.8, 102.0, 102.5), 3, None).unwrap();
        assert_eq!(exit.reason, ExitReason::StopLoss);
        assert_eq!(exit.price, 103.0);
    }

    #[test]
    fn stop_checked_against_previous_peak() {
        // The candle that makes the new high also touches the old stop.
        let mut p = opened_long(
            ProtectionConfig::default().stop_loss(Unit::absolute(2.0)).trailing(true),
            100.0,
        );
        let exit = p.check(&bar(100.0, 110.0, 97.0, 109.0), 1, None).unwrap();
        assert_eq!(exit.price, 98.0);
    }

    #[test]
    fn atr_units_wait_for_atr() {
        let mut p = opened_long(ProtectionConfig::default().stop_loss(Unit::atr(2.0)), 100.0);
        assert!(p.check(&bar(99.0, 99.0, 90.0, 95.0), 1, None).is_none());
        assert_eq!(p.stop_price(Some(1.5)), Some(97.0));
        assert!(p.check(&bar(99.0, 99.0, 96.9, 98.0), 2, Some(1.5)).is_some());
    }

    #[test]
    fn time_stop_only_in_profit() {
        let mut p = opened_long(ProtectionConfig::default().close_after_bars(3), 100.0);
        assert!(p.check(&bar(100.0, 102.0, 99.0, 101.0), 2, None).is_none());
        assert!(p.check(&bar(100.0, 100.0, 98.0, 99.0), 3, None).is_none());
        let exit = p.check(&bar(100.0, 102.0, 99.0, 101.0), 4, None).unwrap();
        assert_eq!(exit.reason, ExitReason::TimeStop);
        assert_eq!(exit.price, 101.0);
    }

    #[test]
    fn limit_exits_when_market_orders_disabled() {
        let cfg = ProtectionConfig {
            use_market_orders: false,
            ..ProtectionConfig::default().stop_loss(Unit::percent(2.0))
        };
        let mut p = opened_long(cfg, 100.0);
        let exit = p.check(&bar(99.0, 100.0, 97.0, 97.5), 1, None).unwrap();
        assert_eq!(exit.order_type, OrderType::Limit { price: 98.0 });
    }

    #[test]
    fn zero_units_disable_protection() {
        let cfg = ProtectionConfig::default()
            .stop_loss(Unit::percent(0.0))
            .take_profit(Unit::absolute(0.0));
        let mut p = opened_long(cfg, 100.0);
        assert!(!p.is_active());
        assert!(p.check(&bar(100.0, 1000.0, 1.0, 50.0), 1, None).is_none());
    }

    #[test]
    fn tracking_survives_reduction_and_clears_on_close() {
        let mut p = opened_long(ProtectionConfig::default().stop_loss(Unit::percent(2.0)), 100.0);
        p.on_position_change(PositionChange::Reduced, 3, None);
        assert_eq!(p.entry_price(), Some(100.0));
        p.on_position_change(PositionChange::Closed, 4, None);
        assert!(!p.is_tracking());
        assert!(p.check(&bar(50.0, 50.0, 40.0, 45.0), 5, None).is_none());
    }

    #[test]
    fn flip_restarts_tracking() {
        let mut p = opened_long(ProtectionConfig::default().stop_loss(Unit::absolute(1.0)), 100.0);
        p.on_position_change(
            PositionChange::Flipped { direction: Direction::Short, price: 95.0 },
            7,
            None,
        );
        assert_eq!(p.entry_price(), Some(95.0));
        assert_eq!(p.stop_price(None), Some(96.0));
    }
}
