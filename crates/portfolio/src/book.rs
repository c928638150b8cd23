use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use common::{decimal_to_f64, Fill, Order, OrderSide};

#[derive(Debug, Clone)]
struct Working {
    security: String,
    side: OrderSide,
    remaining: Decimal,
}

/// Explicit `security → quantity` map kept in step with fills, plus the
/// move-to-target primitive shared by the rebalancer and pairs trading.
#[derive(Debug, Clone, Default)]
pub struct TargetBook {
    holdings: HashMap<String, Decimal>,
    working: HashMap<String, Working>,
    min_trade_usd: f64,
}

impl TargetBook {
    pub fn new(min_trade_usd: f64) -> Self {
        Self {
            min_trade_usd,
            ..Self::default()
        }
    }

    /// Filled quantity.
    pub fn quantity(&self, security: &str) -> Decimal {
        self.holdings.get(security).copied().unwrap_or_default()
    }

    /// Filled quantity plus working orders.
    pub fn projected(&self, security: &str) -> Decimal {
        self.quantity(security)
            + self
                .working
                .values()
                .filter(|w| w.security == security)
                .map(|w| w.remaining * w.side.sign())
                .sum::<Decimal>()
    }

    /// Securities with a non-zero filled quantity.
    pub fn held(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.holdings
            .iter()
            .filter(|(_, q)| !q.is_zero())
            .map(|(s, q)| (s.as_str(), *q))
    }

    /// Market order moving `security` to `target`, or `None` when the move is
    /// zero, worth less than `min_trade_usd`, or no price is known.
    pub fn move_to_target(&mut self, security: &str, target: Decimal, price: Option<f64>) -> Option<Order> {
        let diff = target - self.projected(security);
        if diff.is_zero() {
            return None;
        }
        let Some(price) = price.filter(|p| p.is_finite() && *p > 0.0) else {
            warn!(security, target = %target, "No price for security, order suppressed");
            return None;
        };
        let notional = decimal_to_f64(diff.abs()) * price;
        if notional < self.min_trade_usd {
            debug!(security, notional, min = self.min_trade_usd, "Trade below minimum, skipped");
            return None;
        }
        let order = Order::market(security, OrderSide::for_delta(diff), diff.abs())
            .with_comment("move-to-target");
        info!(
            security,
            side = %order.side,
            volume = %order.volume,
            target = %target,
            "Moving to target"
        );
        self.working.insert(
            order.id.clone(),
            Working {
                security: security.to_string(),
                side: order.side,
                remaining: order.volume,
            },
        );
        Some(order)
    }

    pub fn owns(&self, order_id: &str) -> bool {
        self.working.contains_key(order_id)
    }

    /// Ids of orders still waiting for fills.
    pub fn working_ids(&self) -> Vec<String> {
        self.working.keys().cloned().collect()
    }

    /// Book a fill of one of our orders. Returns false for foreign fills.
    pub fn on_fill(&mut self, fill: &Fill) -> bool {
        let Some(working) = self.working.get_mut(&fill.order_id) else {
            return false;
        };
        working.remaining -= fill.volume;
        if working.remaining <= Decimal::ZERO {
            self.working.remove(&fill.order_id);
        }
        *self.holdings.entry(fill.security.clone()).or_default() += fill.signed_volume();
        true
    }

    pub fn on_rejected(&mut self, order_id: &str) -> bool {
        self.working.remove(order_id).is_some()
    }

    pub fn clear(&mut self) {
        self.holdings.clear();
        self.working.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fill(order: &Order, volume: Decimal) -> Fill {
        Fill {
            order_id: order.id.clone(),
            security: order.security.clone(),
            side: order.side,
            volume,
            price: 10.0,
            time: Utc::now(),
        }
    }

    #[test]
    fn moves_in_sign_of_difference() {
        let mut book = TargetBook::new(0.0);
        let buy = book.move_to_target("A", Decimal::from(5), Some(10.0)).unwrap();
        assert_eq!((buy.side, buy.volume), (OrderSide::Buy, Decimal::from(5)));
        assert!(book.on_fill(&fill(&buy, Decimal::from(5))));
        assert_eq!(book.quantity("A"), Decimal::from(5));

        let sell = book.move_to_target("A", Decimal::from(-2), Some(10.0)).unwrap();
        assert_eq!((sell.side, sell.volume), (OrderSide::Sell, Decimal::from(7)));
    }

    #[test]
    fn working_orders_count_toward_target() {
        let mut book = TargetBook::new(0.0);
        let order = book.move_to_target("A", Decimal::from(3), Some(10.0)).unwrap();
        assert!(book.move_to_target("A", Decimal::from(3), Some(10.0)).is_none());
        assert!(book.on_rejected(&order.id));
        assert!(book.move_to_target("A", Decimal::from(3), Some(10.0)).is_some());
    }

    #[test]
    fn small_trades_and_missing_prices_are_suppressed() {
        let mut book = TargetBook::new(100.0);
        assert!(book.move_to_target("A", Decimal::from(9), Some(10.0)).is_none());
        assert!(book.move_to_target("A", Decimal::from(10), Some(10.0)).is_some());
        assert!(book.move_to_target("B", Decimal::from(50), None).is_none());
    }

    #[test]
    fn foreign_fills_are_not_booked() {
        let mut book = TargetBook::new(0.0);
        let stranger = Order::market("A", OrderSide::Buy, Decimal::ONE);
        assert!(!book.on_fill(&fill(&stranger, Decimal::ONE)));
        assert!(book.quantity("A").is_zero());
    }
}
