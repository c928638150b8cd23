use std::sync::Arc;

use tracing::{debug, error, info, warn};

use common::{
    Candle, Direction, Error, Fill, HostServices, LogLevel, Order, OrderRejection, Position,
    Result, Signal, StrategyState,
};
use risk::{PositionManager, ProtectionPolicy};
use strategy::indicators::{Atr, Indicator};
use strategy::{IndicatorValues, RuleContext, Strategy};

/// Drives one strategy instance: indicators, protection, rule, orders.
///
/// Per finished candle the order is fixed: indicators update, protection is
/// checked, the rule evaluates and commits, orders go out. A protective exit
/// goes out before any entry the rule asks for on the same candle.
pub struct StrategyRuntime {
    strategy: Strategy,
    host: Arc<dyn HostServices>,
    manager: PositionManager,
    protection: ProtectionPolicy,
    /// Present only when a protection unit is expressed in ATR multiples.
    atr: Option<Atr>,
    last_atr: Option<f64>,
    state: StrategyState,
    bar_index: u64,
    prev_candle: Option<Candle>,
    prev_values: Option<IndicatorValues>,
    last_error: Option<String>,
}

impl std::fmt::Debug for StrategyRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRuntime")
            .field("strategy", &self.strategy.name())
            .field("state", &self.state)
            .field("bar_index", &self.bar_index)
            .field("position", self.manager.position())
            .finish()
    }
}

impl StrategyRuntime {
    pub fn new(strategy: Strategy, host: Arc<dyn HostServices>) -> Self {
        let protection = ProtectionPolicy::new(strategy.protection().clone());
        let atr = protection
            .config()
            .uses_atr()
            .then(|| Atr::new(protection.config().atr_period));
        let manager = PositionManager::new(strategy.security(), strategy.volume());
        Self {
            strategy,
            host,
            manager,
            protection,
            atr,
            last_atr: None,
            state: StrategyState::Stopped,
            bar_index: 0,
            prev_candle: None,
            prev_values: None,
            last_error: None,
        }
    }

    pub fn name(&self) -> &str {
        self.strategy.name()
    }

    pub fn security(&self) -> &str {
        self.strategy.security()
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn state(&self) -> StrategyState {
        self.state
    }

    pub fn position(&self) -> &Position {
        self.manager.position()
    }

    pub fn manager(&self) -> &PositionManager {
        &self.manager
    }

    pub fn protection(&self) -> &ProtectionPolicy {
        &self.protection
    }

    /// Number of finished candles processed since start or reset.
    pub fn bar_index(&self) -> u64 {
        self.bar_index
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Subscribe to the candle stream and begin processing.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            StrategyState::Running => return Ok(()),
            StrategyState::Halted => return Err(Error::Halted(self.name().to_string())),
            StrategyState::Stopped => {}
        }
        self.host
            .subscribe_candles(self.strategy.security(), self.strategy.timeframe())?;
        self.state = StrategyState::Running;
        info!(
            name = %self.strategy.name(),
            kind = %self.strategy.kind(),
            security = %self.strategy.security(),
            timeframe = %self.strategy.timeframe(),
            "Strategy started"
        );
        Ok(())
    }

    /// Process one candle event. Active (unfinished) candles and candles of
    /// other securities are ignored. A fatal error halts the strategy and is
    /// returned.
    pub fn on_candle(&mut self, candle: &Candle) -> Result<()> {
        if self.state != StrategyState::Running || candle.security != self.strategy.security() {
            return Ok(());
        }
        if !candle.is_finished() {
            debug!(security = %candle.security, "Ignoring active candle update");
            return Ok(());
        }
        match self.step(candle) {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => {
                self.halt(&e);
                Err(e)
            }
            Err(e) => {
                warn!(name = %self.strategy.name(), error = %e, "Candle processing failed");
                Ok(())
            }
        }
    }

    fn step(&mut self, candle: &Candle) -> Result<()> {
        let bar = self.bar_index;
        let values = self.strategy.feed(candle)?;
        if let Some(atr) = self.atr.as_mut() {
            let value = atr.update(candle)?;
            self.last_atr = if atr.is_formed() { value.scalar() } else { None };
        }

        let protective = if self.manager.position().is_flat() {
            None
        } else {
            self.protection.check(candle, bar, self.last_atr)
        };
        self.manager.observe(candle);

        let ctx = RuleContext {
            candle,
            prev_candle: self.prev_candle.as_ref(),
            values: &values,
            prev_values: self.prev_values.as_ref(),
            position: self.manager.position(),
            bar_index: bar,
        };
        let signal = if self.strategy.is_formed() {
            self.strategy.evaluate(&ctx)
        } else {
            Signal::Hold
        };
        self.strategy.commit(&ctx);

        if let Some(exit) = protective {
            let held = self.manager.position().direction();
            let reason = exit.reason.to_string();
            if let Some(order) = self.manager.close(exit.order_type, &reason) {
                self.host.log(
                    LogLevel::Info,
                    self.strategy.name(),
                    &format!("{reason} at {:.4} on bar {bar}", exit.price),
                );
                self.submit(order);
            }
            // Entries against the stopped side still go out, sized from the
            // projected flat position. Same-side entries and exits are dropped.
            let entry = match (signal, held) {
                (Signal::Reverse, Some(d)) => Some(Signal::enter(d.opposite())),
                (Signal::EnterLong, Some(Direction::Short)) | (Signal::EnterShort, Some(Direction::Long)) => {
                    Some(signal)
                }
                _ => None,
            };
            match entry {
                Some(entry) => self.act(entry, candle, bar),
                None if !signal.is_hold() => {
                    debug!(name = %self.strategy.name(), %signal, "Signal discarded after protective exit");
                }
                None => {}
            }
        } else if !signal.is_hold() {
            self.act(signal, candle, bar);
        }

        self.prev_values = Some(values);
        self.prev_candle = Some(candle.clone());
        self.bar_index += 1;
        Ok(())
    }

    fn act(&mut self, signal: Signal, candle: &Candle, bar: u64) {
        info!(
            name = %self.strategy.name(),
            security = %candle.security,
            %signal,
            close = candle.close,
            bar,
            "Signal"
        );
        if let Some(order) = self.manager.handle(signal) {
            self.host.log(
                LogLevel::Info,
                self.strategy.name(),
                &format!("{signal}: {} {} @ {}", order.side, order.volume, candle.close),
            );
            self.submit(order);
        }
    }

    fn submit(&mut self, order: Order) {
        if let Err(e) = self.host.submit_order(&order) {
            warn!(
                name = %self.strategy.name(),
                order_id = %order.id,
                error = %e,
                "Order submission refused by host"
            );
            self.manager.on_rejected(&order.id, &e.to_string());
        }
    }

    pub fn owns(&self, order_id: &str) -> bool {
        self.manager.owns(order_id)
    }

    /// Apply a fill, update protection tracking and, once nothing is in
    /// flight, reconcile with the broker.
    /// Fills are applied in every state: the position is real even when stopped.
    pub fn on_fill(&mut self, fill: &Fill) {
        let bar = self.bar_index.saturating_sub(1);
        let Some(change) = self.manager.on_fill(fill, bar) else {
            return;
        };
        self.protection.on_position_change(change, bar, self.last_atr);
        self.host.log(
            LogLevel::Info,
            self.strategy.name(),
            &format!("filled {} {} @ {}", fill.side, fill.volume, fill.price),
        );

        // The broker view already includes fills still queued behind this one.
        if self.manager.has_in_flight() {
            return;
        }
        if let Some(broker_net) = self.host.broker_position(self.strategy.security()) {
            if let Some(change) = self.manager.reconcile(broker_net, fill.price, bar) {
                self.protection.on_position_change(change, bar, self.last_atr);
            }
        }
    }

    pub fn on_order_rejected(&mut self, rejection: &OrderRejection) {
        if self.manager.on_rejected(&rejection.order_id, &rejection.reason) {
            self.host.log(
                LogLevel::Warn,
                self.strategy.name(),
                &format!("order {} rejected: {}", rejection.order_id, rejection.reason),
            );
        }
    }

    /// Cancel working orders, drop the subscription and release indicator
    /// state. Idempotent. The position and in-flight book survive, since
    /// fills may still arrive.
    pub fn stop(&mut self) {
        if self.state == StrategyState::Stopped {
            return;
        }
        self.teardown();
        self.state = StrategyState::Stopped;
        info!(name = %self.strategy.name(), "Strategy stopped");
    }

    /// Back to the freshly built state: flat, no scratch, stopped.
    pub fn reset(&mut self) {
        self.stop();
        self.strategy.reset();
        self.manager.reset();
        self.protection.reset();
        if let Some(atr) = self.atr.as_mut() {
            atr.reset();
        }
        self.last_atr = None;
        self.bar_index = 0;
        self.prev_candle = None;
        self.prev_values = None;
        self.last_error = None;
        self.state = StrategyState::Stopped;
    }

    fn halt(&mut self, err: &Error) {
        error!(name = %self.strategy.name(), error = %err, "Strategy halted");
        self.host
            .log(LogLevel::Error, self.strategy.name(), &format!("halted: {err}"));
        self.teardown();
        self.last_error = Some(err.to_string());
        self.state = StrategyState::Halted;
    }

    fn teardown(&mut self) {
        let security = self.strategy.security().to_string();
        let working = self.manager.in_flight_ids();
        if let Err(e) = self.host.cancel_orders(&working) {
            warn!(security = %security, error = %e, "Cancel failed");
        }
        if let Err(e) = self
            .host
            .unsubscribe_candles(&security, self.strategy.timeframe())
        {
            warn!(security = %security, error = %e, "Unsubscribe failed");
        }
        self.strategy.reset();
        if let Some(atr) = self.atr.as_mut() {
            atr.reset();
        }
        self.last_atr = None;
        self.prev_candle = None;
        self.prev_values = None;
    }
}
