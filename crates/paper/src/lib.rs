use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use common::{
    decimal_to_f64, Candle, Error, Fill, HostEvent, HostServices, Order, OrderRejection,
    OrderSide, OrderType, Result, Timeframe,
};

type RejectFn = dyn Fn(&Order) -> Option<String> + Send + Sync;

/// Simulated host for paper trading and replays.
///
/// Market orders fill at the latest close with configurable slippage. Limit
/// orders rest until a later candle trades through their price. Every fill or
/// rejection is pushed onto the session's event queue, never returned.
pub struct PaperHost {
    events: UnboundedSender<HostEvent>,
    /// Slippage in basis points applied to market fills.
    slippage_bps: f64,
    report_positions: bool,
    reject: Option<Box<RejectFn>>,
    book: Mutex<Book>,
}

#[derive(Debug, Default)]
struct Book {
    cash: f64,
    last_close: HashMap<String, f64>,
    positions: HashMap<String, Decimal>,
    working: Vec<Order>,
    subscriptions: HashSet<(String, Timeframe)>,
    clock: Option<DateTime<Utc>>,
}

impl PaperHost {
    pub fn new(events: UnboundedSender<HostEvent>, initial_cash: f64, slippage_bps: f64) -> Self {
        info!(cash = initial_cash, slippage_bps, "PaperHost initialized");
        Self {
            events,
            slippage_bps,
            report_positions: false,
            reject: None,
            book: Mutex::new(Book {
                cash: initial_cash,
                ..Book::default()
            }),
        }
    }

    /// Answer `broker_position` from the simulated book. Only meaningful when
    /// a single strategy trades each security.
    pub fn with_position_reports(mut self) -> Self {
        self.report_positions = true;
        self
    }

    /// Reject every order for which `rule` returns a reason.
    pub fn with_rejections(mut self, rule: impl Fn(&Order) -> Option<String> + Send + Sync + 'static) -> Self {
        self.reject = Some(Box::new(rule));
        self
    }

    pub fn cash(&self) -> f64 {
        self.book().cash
    }

    /// Simulated net quantity in `security`.
    pub fn position(&self, security: &str) -> Decimal {
        self.book().positions.get(security).copied().unwrap_or_default()
    }

    pub fn last_close(&self, security: &str) -> Option<f64> {
        self.book().last_close.get(security).copied()
    }

    pub fn working_orders(&self) -> usize {
        self.book().working.len()
    }

    pub fn is_subscribed(&self, security: &str) -> bool {
        self.book().subscriptions.iter().any(|(s, _)| s == security)
    }

    fn book(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: HostEvent) {
        if self.events.send(event).is_err() {
            debug!("Session queue closed, paper event dropped");
        }
    }

    fn reject_order(&self, order: &Order, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(order_id = %order.id, security = %order.security, reason = %reason, "Paper order rejected");
        self.emit(HostEvent::OrderRejected(OrderRejection {
            order_id: order.id.clone(),
            security: order.security.clone(),
            reason,
        }));
    }

    fn slipped(&self, side: OrderSide, price: f64) -> f64 {
        // Buys pay more, sells receive less
        match side {
            OrderSide::Buy => price * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => price * (1.0 - self.slippage_bps / 10_000.0),
        }
    }
}

impl Book {
    fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }

    fn apply(&mut self, order: &Order, price: f64) -> Fill {
        let signed = order.signed_volume();
        self.cash -= decimal_to_f64(signed) * price;
        *self.positions.entry(order.security.clone()).or_default() += signed;
        Fill {
            order_id: order.id.clone(),
            security: order.security.clone(),
            side: order.side,
            volume: order.volume,
            price,
            time: self.now(),
        }
    }
}

/// Price at which a resting limit fills on `candle`, if it trades through.
fn limit_fill(side: OrderSide, limit: f64, candle: &Candle) -> Option<f64> {
    match side {
        OrderSide::Buy if candle.low <= limit => Some(limit.min(candle.open)),
        OrderSide::Sell if candle.high >= limit => Some(limit.max(candle.open)),
        _ => None,
    }
}

impl HostServices for PaperHost {
    fn subscribe_candles(&self, security: &str, timeframe: Timeframe) -> Result<()> {
        self.book().subscriptions.insert((security.to_string(), timeframe));
        debug!(security, %timeframe, "Paper subscription added");
        Ok(())
    }

    fn unsubscribe_candles(&self, security: &str, timeframe: Timeframe) -> Result<()> {
        self.book().subscriptions.remove(&(security.to_string(), timeframe));
        Ok(())
    }

    fn submit_order(&self, order: &Order) -> Result<()> {
        if order.volume <= Decimal::ZERO {
            return Err(Error::OrderRejected {
                order_id: order.id.clone(),
                reason: format!("non-positive volume {}", order.volume),
            });
        }
        if let Some(reason) = self.reject.as_ref().and_then(|rule| rule(order)) {
            self.reject_order(order, reason);
            return Ok(());
        }

        let fill = {
            let mut book = self.book();
            let close = book.last_close.get(&order.security).copied();
            match (order.order_type, close) {
                (OrderType::Limit { .. }, _) => {
                    book.working.push(order.clone());
                    debug!(order_id = %order.id, security = %order.security, "Paper limit order resting");
                    None
                }
                (OrderType::Market, Some(close)) => {
                    let price = self.slipped(order.side, close);
                    Some(book.apply(order, price))
                }
                (OrderType::Market, None) => {
                    drop(book);
                    self.reject_order(
                        order,
                        format!("no price for '{}'; candles must flow before orders", order.security),
                    );
                    return Ok(());
                }
            }
        };

        if let Some(fill) = fill {
            debug!(
                security = %fill.security,
                side = %fill.side,
                volume = %fill.volume,
                price = fill.price,
                "Paper fill simulated"
            );
            self.emit(HostEvent::Fill(fill));
        }
        Ok(())
    }

    fn cancel_orders(&self, order_ids: &[String]) -> Result<()> {
        let cancelled: Vec<Order> = {
            let mut book = self.book();
            let (gone, keep): (Vec<Order>, Vec<Order>) = std::mem::take(&mut book.working)
                .into_iter()
                .partition(|o| order_ids.contains(&o.id));
            book.working = keep;
            gone
        };
        for order in &cancelled {
            self.reject_order(order, "cancelled");
        }
        Ok(())
    }

    fn now(&self) -> DateTime<Utc> {
        self.book().now()
    }

    fn portfolio_value(&self) -> Option<f64> {
        let book = self.book();
        let mut value = book.cash;
        for (security, qty) in &book.positions {
            if qty.is_zero() {
                continue;
            }
            value += decimal_to_f64(*qty) * book.last_close.get(security).copied()?;
        }
        Some(value)
    }

    fn on_candle(&self, candle: &Candle) {
        let fills = {
            let mut book = self.book();
            book.clock = Some(candle.open_time);
            book.last_close.insert(candle.security.clone(), candle.close);

            let mut fills = Vec::new();
            let mut resting = Vec::with_capacity(book.working.len());
            for order in std::mem::take(&mut book.working) {
                let price = match order.order_type {
                    OrderType::Limit { price } if order.security == candle.security => {
                        limit_fill(order.side, price, candle)
                    }
                    _ => None,
                };
                match price {
                    Some(p) => fills.push(book.apply(&order, p)),
                    None => resting.push(order),
                }
            }
            book.working = resting;
            fills
        };
        for fill in fills {
            debug!(order_id = %fill.order_id, price = fill.price, "Paper limit filled");
            self.emit(HostEvent::Fill(fill));
        }
    }

    fn broker_position(&self, security: &str) -> Option<Decimal> {
        self.report_positions.then(|| self.position(security))
    }
}
