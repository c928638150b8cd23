use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use common::precision::{normalize_quantity, quantity_from_f64};
use common::{
    Candle, Error, Fill, HostServices, LogLevel, Order, OrderRejection, Result, StrategyState,
};
use strategy::{RebalanceFrequency, RebalancerConfig};

use crate::basket::{decile_weights, UniverseBasket};
use crate::book::TargetBook;
use crate::scores::{provider_for, ScoreProvider};

/// Decimal places kept when converting a target notional to a quantity,
/// before lot-step flooring.
const QUANTITY_SCALE: u32 = 8;

/// Periodic decile long/short rebalancer over a fixed universe.
///
/// Every finished universe candle updates the latest price and the score
/// provider. The first candle that falls into a new calendar period (month,
/// quarter or year) triggers a rebalance: rank, compute weights, move every
/// held or selected security to `weight × portfolio value / price`. Started
/// on the first day of a period, it rebalances as soon as the whole universe
/// has been priced; started later, it waits for the next period.
pub struct Rebalancer {
    config: RebalancerConfig,
    host: Arc<dyn HostServices>,
    basket: UniverseBasket,
    scores: Box<dyn ScoreProvider>,
    book: TargetBook,
    prices: HashMap<String, f64>,
    period: Option<(i32, u32)>,
    /// Started on the first day of a period: rebalance once every universe
    /// security has a price.
    pending_open: bool,
    state: StrategyState,
}

impl std::fmt::Debug for Rebalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rebalancer")
            .field("name", &self.config.name)
            .field("basket", &self.basket)
            .field("state", &self.state)
            .finish()
    }
}

impl Rebalancer {
    pub fn from_config(config: RebalancerConfig, host: Arc<dyn HostServices>) -> Result<Self> {
        let scores = provider_for(&config.factor);
        Self::with_scores(config, scores, host)
    }

    /// Build with a custom score provider; `config.factor` is ignored.
    pub fn with_scores(
        config: RebalancerConfig,
        scores: Box<dyn ScoreProvider>,
        host: Arc<dyn HostServices>,
    ) -> Result<Self> {
        validate(&config)?;
        Ok(Self {
            basket: UniverseBasket::new(config.universe.clone()),
            book: TargetBook::new(config.min_trade_usd),
            config,
            host,
            scores,
            prices: HashMap::new(),
            period: None,
            pending_open: false,
            state: StrategyState::Stopped,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> StrategyState {
        self.state
    }

    pub fn basket(&self) -> &UniverseBasket {
        &self.basket
    }

    pub fn book(&self) -> &TargetBook {
        &self.book
    }

    pub fn start(&mut self) -> Result<()> {
        if self.state == StrategyState::Running {
            return Ok(());
        }
        for security in &self.basket.securities {
            self.host.subscribe_candles(security, self.config.timeframe)?;
        }
        self.state = StrategyState::Running;
        info!(name = %self.config.name, universe = self.basket.securities.len(), "Rebalancer started");
        Ok(())
    }

    pub fn on_candle(&mut self, candle: &Candle) -> Result<()> {
        if self.state != StrategyState::Running
            || !candle.is_finished()
            || !self.basket.contains(&candle.security)
        {
            return Ok(());
        }
        candle.validate()?;
        self.prices.insert(candle.security.clone(), candle.close);
        self.scores.observe(candle);

        let key = period_key(candle.open_time, self.config.frequency);
        match self.period.replace(key) {
            Some(prev) if key > prev => {
                self.pending_open = false;
                self.rebalance(candle.open_time);
            }
            Some(prev) if key < prev => {
                // Out-of-order candle: keep the newer period.
                self.period = Some(prev);
            }
            Some(_) => {}
            None => self.pending_open = opens_period(candle.open_time, self.config.frequency),
        }
        if self.pending_open && self.basket.securities.iter().all(|s| self.prices.contains_key(s)) {
            self.pending_open = false;
            self.rebalance(candle.open_time);
        }
        Ok(())
    }

    /// Rank the universe and move holdings to the new targets.
    pub fn rebalance(&mut self, now: DateTime<Utc>) {
        let scores: Vec<(String, f64)> = self
            .basket
            .securities
            .iter()
            .filter_map(|s| self.scores.score(s).map(|v| (s.clone(), v)))
            .collect();

        let Some(weights) = decile_weights(
            &scores,
            self.config.deciles,
            self.config.leverage,
            self.config.long_only,
        ) else {
            let msg = format!(
                "only {} valid scores for {} deciles, keeping previous weights",
                scores.iter().filter(|(_, v)| v.is_finite()).count(),
                self.config.deciles
            );
            warn!(name = %self.config.name, "Rebalance aborted: {msg}");
            self.host.log(LogLevel::Warn, &self.config.name, &msg);
            return;
        };

        self.basket.target_weights = weights;
        self.basket.last_rebalance = Some(now);
        info!(
            name = %self.config.name,
            selected = self.basket.target_weights.len(),
            "Rebalancing"
        );

        let Some(value) = self.host.portfolio_value().filter(|v| v.is_finite()) else {
            warn!(name = %self.config.name, "Portfolio value unknown, no orders sent");
            return;
        };

        let mut securities: Vec<String> = self.basket.securities.clone();
        for (held, _) in self.book.held() {
            if !securities.iter().any(|s| s == held) {
                securities.push(held.to_string());
            }
        }

        for security in securities {
            let price = self.prices.get(&security).copied();
            let target = match price {
                Some(p) => target_quantity(self.basket.weight(&security), value, p, self.config.lot_step),
                None => Decimal::ZERO,
            };
            if let Some(order) = self.book.move_to_target(&security, target, price) {
                self.submit(order);
            }
        }
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
                holding = %self.book.quantity(&fill.security),
                "Rebalance fill"
            );
        }
    }

    pub fn on_order_rejected(&mut self, rejection: &OrderRejection) {
        if self.book.on_rejected(&rejection.order_id) {
            warn!(
                name = %self.config.name,
                security = %rejection.security,
                reason = %rejection.reason,
                "Rebalance order rejected"
            );
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
        for security in &self.basket.securities {
            if let Err(e) = self.host.unsubscribe_candles(security, self.config.timeframe) {
                warn!(security = %security, error = %e, "Unsubscribe failed");
            }
        }
        self.state = StrategyState::Stopped;
        info!(name = %self.config.name, "Rebalancer stopped");
    }

    /// Forget prices, scores, weights and holdings.
    pub fn reset(&mut self) {
        self.stop();
        self.scores.reset();
        self.book.clear();
        self.prices.clear();
        self.period = None;
        self.pending_open = false;
        self.basket.target_weights.clear();
        self.basket.last_rebalance = None;
    }
}

fn validate(cfg: &RebalancerConfig) -> Result<()> {
    let fail = |msg: String| Err(Error::invalid_config(format!("{}: {msg}", cfg.name)));
    if cfg.universe.is_empty() {
        return fail("universe is empty".into());
    }
    if cfg.deciles < 2 {
        return fail(format!("deciles must be at least 2, got {}", cfg.deciles));
    }
    if !cfg.leverage.is_finite() || cfg.leverage <= 0.0 {
        return fail(format!("leverage must be positive, got {}", cfg.leverage));
    }
    if !cfg.min_trade_usd.is_finite() || cfg.min_trade_usd < 0.0 {
        return fail(format!("min_trade_usd must be non-negative, got {}", cfg.min_trade_usd));
    }
    if cfg.lot_step <= Decimal::ZERO {
        return fail(format!("lot_step must be positive, got {}", cfg.lot_step));
    }
    let lookback = match &cfg.factor {
        strategy::FactorConfig::Momentum { lookback, .. }
        | strategy::FactorConfig::Reversal { lookback }
        | strategy::FactorConfig::LowVolatility { lookback } => Some(*lookback),
        strategy::FactorConfig::External { .. } => None,
    };
    if lookback == Some(0) {
        return fail("factor lookback must be positive".into());
    }
    Ok(())
}

/// `(year, bucket)` identifying the calendar period of `t`.
fn period_key(t: DateTime<Utc>, frequency: RebalanceFrequency) -> (i32, u32) {
    let bucket = match frequency {
        RebalanceFrequency::Monthly => t.month0(),
        RebalanceFrequency::Quarterly => t.month0() / 3,
        RebalanceFrequency::Yearly => 0,
    };
    (t.year(), bucket)
}

/// True when `t` falls on the first day of its period.
fn opens_period(t: DateTime<Utc>, frequency: RebalanceFrequency) -> bool {
    match frequency {
        RebalanceFrequency::Monthly => t.day() == 1,
        RebalanceFrequency::Quarterly => t.day() == 1 && t.month0() % 3 == 0,
        RebalanceFrequency::Yearly => t.ordinal() == 1,
    }
}

/// `weight × value / price`, floored toward zero to a multiple of `lot_step`.
fn target_quantity(weight: f64, value: f64, price: f64, lot_step: Decimal) -> Decimal {
    if weight == 0.0 || price <= 0.0 {
        return Decimal::ZERO;
    }
    quantity_from_f64(weight * value / price, QUANTITY_SCALE)
        .map(|q| normalize_quantity(q, lot_step))
        .unwrap_or_default()
}
