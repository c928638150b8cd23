use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use common::{Candle, Fill, Order, OrderSide, OrderType, Position, PositionChange, Signal};

/// Part of an order not yet filled.
#[derive(Debug, Clone)]
struct InFlight {
    side: OrderSide,
    remaining: Decimal,
}

impl InFlight {
    fn signed(&self) -> Decimal {
        self.remaining * self.side.sign()
    }
}

/// Translates signals into market orders for one security and keeps the net
/// position in step with fills.
///
/// The position only moves on fills. Decisions are taken against the
/// *projected* net (filled net plus in-flight orders), so repeating a signal
/// while its order is still working does not send it twice.
#[derive(Debug, Clone)]
pub struct PositionManager {
    volume: Decimal,
    position: Position,
    in_flight: HashMap<String, InFlight>,
}

impl PositionManager {
    pub fn new(security: impl Into<String>, volume: Decimal) -> Self {
        Self {
            volume,
            position: Position::flat(security),
            in_flight: HashMap::new(),
        }
    }

    pub fn security(&self) -> &str {
        &self.position.security
    }

    pub fn volume(&self) -> Decimal {
        self.volume
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn net(&self) -> Decimal {
        self.position.net
    }

    pub fn projected_net(&self) -> Decimal {
        self.position.net + self.in_flight.values().map(InFlight::signed).sum::<Decimal>()
    }

    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Signed quantity the signal asks for, measured against the projected net.
    pub fn delta_for(&self, signal: Signal) -> Decimal {
        let net = self.projected_net();
        let zero = Decimal::ZERO;
        match signal {
            Signal::EnterLong if net <= zero => self.volume + net.abs(),
            Signal::EnterShort if net >= zero => -(self.volume + net.abs()),
            Signal::ExitLong if net > zero => -net,
            Signal::ExitShort if net < zero => -net,
            Signal::Reverse if net > zero => -(self.volume + net),
            Signal::Reverse if net < zero => self.volume - net,
            Signal::ClosePosition => -net,
            _ => zero,
        }
    }

    /// Order implementing `signal`, registered as in flight. `None` for no-ops.
    pub fn handle(&mut self, signal: Signal) -> Option<Order> {
        let delta = self.delta_for(signal);
        if delta.is_zero() {
            if !signal.is_hold() {
                debug!(security = %self.security(), %signal, "Signal is a no-op for the current position");
            }
            return None;
        }
        let order = Order::market(self.security(), OrderSide::for_delta(delta), delta.abs())
            .with_comment(signal.to_string());
        Some(self.track(order))
    }

    /// Close the projected position with a market or limit order.
    pub fn close(&mut self, order_type: OrderType, comment: &str) -> Option<Order> {
        let net = self.projected_net();
        if net.is_zero() {
            return None;
        }
        let side = OrderSide::for_delta(-net);
        let order = match order_type {
            OrderType::Market => Order::market(self.security(), side, net.abs()),
            OrderType::Limit { price } => Order::limit(self.security(), side, net.abs(), price),
        };
        Some(self.track(order.with_comment(comment)))
    }

    fn track(&mut self, order: Order) -> Order {
        info!(
            security = %order.security,
            side = %order.side,
            volume = %order.volume,
            order_type = ?order.order_type,
            "Order issued"
        );
        self.in_flight.insert(
            order.id.clone(),
            InFlight {
                side: order.side,
                remaining: order.volume,
            },
        );
        order
    }

    /// Apply an execution report. Fills for other securities are ignored;
    /// fills without a known order (manual trades) still move the position.
    pub fn on_fill(&mut self, fill: &Fill, bar: u64) -> Option<PositionChange> {
        if fill.security != self.position.security {
            return None;
        }
        if let Some(entry) = self.in_flight.get_mut(&fill.order_id) {
            entry.remaining -= fill.volume;
            if entry.remaining <= Decimal::ZERO {
                self.in_flight.remove(&fill.order_id);
            }
        } else {
            warn!(security = %fill.security, order_id = %fill.order_id, "Fill for an unknown order");
        }
        let change = self.position.apply_fill(fill.signed_volume(), fill.price, bar);
        info!(
            security = %fill.security,
            side = %fill.side,
            volume = %fill.volume,
            price = fill.price,
            net = %self.position.net,
            "Fill applied"
        );
        Some(change)
    }

    /// Drop a rejected order from the in-flight book. Returns whether it was ours.
    pub fn on_rejected(&mut self, order_id: &str, reason: &str) -> bool {
        match self.in_flight.remove(order_id) {
            Some(entry) => {
                warn!(
                    security = %self.security(),
                    order_id,
                    side = %entry.side,
                    volume = %entry.remaining,
                    reason,
                    "Order rejected"
                );
                true
            }
            None => false,
        }
    }

    /// Align the local net with the broker's. The difference is booked as a
    /// synthetic fill at `price`.
    pub fn reconcile(&mut self, broker_net: Decimal, price: f64, bar: u64) -> Option<PositionChange> {
        let diff = broker_net - self.position.net;
        if diff.is_zero() {
            return None;
        }
        warn!(
            security = %self.security(),
            local = %self.position.net,
            broker = %broker_net,
            "Reconciling position to broker"
        );
        Some(self.position.apply_fill(diff, price, bar))
    }

    /// Track the favourable excursion of the open position.
    pub fn observe(&mut self, candle: &Candle) {
        self.position.update_peak(candle);
    }

    pub fn owns(&self, order_id: &str) -> bool {
        self.in_flight.contains_key(order_id)
    }

    /// Ids of orders still waiting for fills.
    pub fn in_flight_ids(&self) -> Vec<String> {
        self.in_flight.keys().cloned().collect()
    }

    pub fn reset(&mut self) {
        let security = std::mem::take(&mut self.position.security);
        self.position = Position::flat(security);
        self.in_flight.clear();
    }
}
