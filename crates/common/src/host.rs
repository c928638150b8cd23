use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::{Candle, Order, Result, Timeframe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Everything a strategy needs from the hosting platform.
///
/// `PaperHost` implements this for simulation; a live broker binding would
/// implement it against a real venue. Strategies and rebalancers depend only on
/// this trait, never on a concrete host.
///
/// Order submission is fire-and-forget: fills and rejections come back later as
/// `HostEvent`s on the session queue, never as return values.
pub trait HostServices: Send + Sync {
    /// Request the candle stream for `(security, timeframe)`.
    fn subscribe_candles(&self, security: &str, timeframe: Timeframe) -> Result<()>;

    /// Drop a previously requested candle stream.
    fn unsubscribe_candles(&self, security: &str, timeframe: Timeframe) -> Result<()>;

    /// Hand an order to the broker adapter. An `Err` means the host refused it
    /// synchronously; the order is then treated as rejected.
    fn submit_order(&self, order: &Order) -> Result<()>;

    /// Best-effort cancellation of the caller's working orders. Orders other
    /// participants placed in the same security are left alone.
    fn cancel_orders(&self, order_ids: &[String]) -> Result<()>;

    /// Host clock (the time of the latest event for simulated hosts).
    fn now(&self) -> DateTime<Utc>;

    /// Snapshot of total portfolio value in quote currency, if known.
    fn portfolio_value(&self) -> Option<f64>;

    /// Called by the session just before a finished candle is dispatched.
    /// Simulated hosts use it as their price clock.
    fn on_candle(&self, _candle: &Candle) {}

    /// Broker-reported net position, used for reconciliation after fills.
    fn broker_position(&self, _security: &str) -> Option<Decimal> {
        None
    }

    /// Informational records on signals and fills.
    fn log(&self, level: LogLevel, source: &str, message: &str) {
        match level {
            LogLevel::Info => info!(source = %source, "{message}"),
            LogLevel::Warn => warn!(source = %source, "{message}"),
            LogLevel::Error => error!(source = %source, "{message}"),
        }
    }
}
