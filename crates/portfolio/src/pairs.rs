use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use common::{Candle, Error, Fill, HostServices, Order, OrderRejection, Result, StrategyState};
use strategy::PairsConfig;

use crate::book::TargetBook;

/// Spread trade between two securities.
///
/// The log price ratio `ln(first / second)` is sampled whenever both legs have
/// a finished candle for the same open time. Once `lookback` samples exist the
/// z-score of the latest one drives the book: above `entry_z` short the first
/// leg and buy the second, below `-entry_z` the reverse, and inside `exit_z`
/// both legs go back to zero.
pub struct PairsTrading {
    config: PairsConfig,
    host: Arc<dyn HostServices>,
    book: TargetBook,
    ratios: VecDeque<f64>,
    first: Option<(DateTime<Utc>, f64)>,
    second: Option<(DateTime<Utc>, f64)>,
    last_z: Option<f64>,
    state: StrategyState,
}

impl std::fmt::Debug for PairsTrading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairsTrading")
            .field("name", &self.config.name)
            .field("last_z", &self.last_z)
            .field("state", &self.state)
            .finish()
    }
}

impl PairsTrading {
    pub fn new(config: PairsConfig, host: Arc<dyn HostServices>) -> Result<Self> {
        let fail = |msg: &str| Err(Error::invalid_config(format!("{}: {msg}", config.name)));
        if config.first == config.second {
            return fail("legs must be different securities");
        }
        if config.lookback < 2 {
            return fail("lookback must be at least 2");
        }
        if !(config.exit_z >= 0.0 && config.entry_z > config.exit_z) {
            return fail("entry_z must exceed exit_z, which must be non-negative");
        }
        if config.quantity <= Decimal::ZERO {
            return fail("quantity must be positive");
        }
        Ok(Self {
            book: TargetBook::new(config.min_trade_usd),
            ratios: VecDeque::with_capacity(config.lookback),
            config,
            host,
            first: None,
            second: None,
            last_z: None,
            state: StrategyState::Stopped,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> StrategyState {
        self.state
    }

    pub fn book(&self) -> &TargetBook {
        &self.book
    }

    pub fn last_z(&self) -> Option<f64> {
        self.last_z
    }

    fn legs(&self) -> [&str; 2] {
        [self.config.first.as_str(), self.config.second.as_str()]
    }

    pub fn start(&mut self) -> Result<()> {
        if self.state == StrategyState::Running {
            return Ok(());
        }
        for leg in self.legs() {
            self.host.subscribe_candles(leg, self.config.timeframe)?;
        }
        self.state = StrategyState::Running;
        info!(name = %self.config.name, "Pairs trading started");
        Ok(())
    }

    pub fn on_candle(&mut self, candle: &Candle) -> Result<()> {
        if self.state != StrategyState::Running || !candle.is_finished() {
            return Ok(());
        }
        let sample = Some((candle.open_time, candle.close));
        if candle.security == self.config.first {
            candle.validate()?;
            self.first = sample;
        } else if candle.security == self.config.second {
            candle.validate()?;
            self.second = sample;
        } else {
            return Ok(());
        }

        let (Some((t1, p1)), Some((t2, p2))) = (self.first, self.second) else {
            return Ok(());
        };
        if t1 != t2 || p1 <= 0.0 || p2 <= 0.0 {
            return Ok(());
        }
        self.first = None;
        self.second = None;

        if self.ratios.len() == self.config.lookback {
            self.ratios.pop_front();
        }
        self.ratios.push_back((p1 / p2).ln());
        let Some(z) = self.z_score() else {
            return Ok(());
        };
        self.last_z = Some(z);
        debug!(name = %self.config.name, z, "Spread z-score");

        let q = self.config.quantity;
        let held = self.book.projected(&self.config.first);
        let targets = if held.is_zero() {
            if z > self.config.entry_z {
                Some((-q, q))
            } else if z < -self.config.entry_z {
                Some((q, -q))
            } else {
                None
            }
        } else if z.abs() < self.config.exit_z {
            Some((Decimal::ZERO, Decimal::ZERO))
        } else {
            None
        };

        if let Some((first_target, second_target)) = targets {
            info!(name = %self.config.name, z, first = %first_target, second = %second_target, "Spread signal");
            let first = self.config.first.clone();
            let second = self.config.second.clone();
            if let Some(order) = self.book.move_to_target(&first, first_target, Some(p1)) {
                self.submit(order);
            }
            if let Some(order) = self.book.move_to_target(&second, second_target, Some(p2)) {
                self.submit(order);
            }
        }
        Ok(())
    }

    fn z_score(&self) -> Option<f64> {
        if self.ratios.len() < self.config.lookback {
            return None;
        }
        let n = self.ratios.len() as f64;
        let mean = self.ratios.iter().sum::<f64>() / n;
        let std = (self.ratios.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt();
        let last = *self.ratios.back()?;
        (std > 0.0).then(|| (last - mean) / std)
    }

    fn submit(&mut self, order: Order) {
        if let Err(e) = self.host.submit_order(&order) {
            warn!(name = %self.config.name, security = %order.security, error = %e, "Order submission failed");
            self.book.on_rejected(&order.id);
        }
    }

    pub fn owns(&self, order_id: &str) -> bool {
        self.book.owns(order_id)
    }

    pub fn on_fill(&mut self, fill: &Fill) {
        if self.book.on_fill(fill) {
            info!(
                name = %self.config.name,
                security = %fill.security,
                side = %fill.side,
                volume = %fill.volume,
                price = fill.price,
                "Pairs fill"
            );
        }
    }

    pub fn on_order_rejected(&mut self, rejection: &OrderRejection) {
        if self.book.on_rejected(&rejection.order_id) {
            warn!(name = %self.config.name, security = %rejection.security, reason = %rejection.reason, "Pairs order rejected");
        }
    }

    pub fn stop(&mut self) {
        if self.state == StrategyState::Stopped {
            return;
        }
        let working = self.book.working_ids();
        if let Err(e) = self.host.cancel_orders(&working) {
            warn!(name = %self.config.name, error = %e, "Cancel failed");
        }
        for leg in self.legs() {
            if let Err(e) = self.host.unsubscribe_candles(leg, self.config.timeframe) {
                warn!(security = %leg, error = %e, "Unsubscribe failed");
            }
        }
        self.state = StrategyState::Stopped;
        info!(name = %self.config.name, "Pairs trading stopped");
    }
}
