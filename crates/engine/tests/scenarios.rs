use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use common::{
    Candle, CandleState, Fill, HostServices, LogLevel, Order, OrderRejection, OrderSide,
    OrderType, ProtectionConfig, Result, StrategyState, Timeframe, Unit,
};
use engine::StrategyRuntime;
use strategy::catalogue::factory;
use strategy::StrategyBlueprint;

#[derive(Default)]
struct RecordingHost {
    orders: Mutex<Vec<Order>>,
    logs: Mutex<Vec<(LogLevel, String)>>,
    subscriptions: Mutex<Vec<String>>,
    cancels: Mutex<Vec<Vec<String>>>,
}

impl RecordingHost {
    fn take_orders(&self) -> Vec<Order> {
        std::mem::take(&mut *self.orders.lock().unwrap())
    }

    fn logged(&self, needle: &str) -> bool {
        self.logs.lock().unwrap().iter().any(|(_, m)| m.contains(needle))
    }
}

impl HostServices for RecordingHost {
    fn subscribe_candles(&self, security: &str, _timeframe: Timeframe) -> Result<()> {
        self.subscriptions.lock().unwrap().push(security.to_string());
        Ok(())
    }

    fn unsubscribe_candles(&self, security: &str, _timeframe: Timeframe) -> Result<()> {
        self.subscriptions.lock().unwrap().retain(|s| s != security);
        Ok(())
    }

    fn submit_order(&self, order: &Order) -> Result<()> {
        self.orders.lock().unwrap().push(order.clone());
        Ok(())
    }

    fn cancel_orders(&self, order_ids: &[String]) -> Result<()> {
        self.cancels.lock().unwrap().push(order_ids.to_vec());
        Ok(())
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn portfolio_value(&self) -> Option<f64> {
        None
    }

    fn log(&self, level: LogLevel, _source: &str, message: &str) {
        self.logs.lock().unwrap().push((level, message.to_string()));
    }
}

const SECURITY: &str = "TEST";

fn at(bar: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(bar)
}

fn ohlc(bar: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
    Candle {
        security: SECURITY.into(),
        open_time: at(bar),
        open,
        high,
        low,
        close,
        volume: 1_000.0,
        state: CandleState::Finished,
    }
}

fn flat_close(bar: i64, close: f64) -> Candle {
    ohlc(bar, close, close, close, close)
}

/// Symmetric range around the close, so the typical price equals the close.
fn ranged(bar: i64, close: f64, half_range: f64) -> Candle {
    ohlc(bar, close, close + half_range, close - half_range, close)
}

struct Harness {
    host: Arc<RecordingHost>,
    runtime: StrategyRuntime,
    bar: i64,
}

impl Harness {
    fn new(blueprint: StrategyBlueprint) -> Self {
        let host = Arc::new(RecordingHost::default());
        let mut runtime = StrategyRuntime::new(blueprint.build().unwrap(), host.clone());
        runtime.start().unwrap();
        Self { host, runtime, bar: 0 }
    }

    fn kind(kind: &str) -> Self {
        Self::new(StrategyBlueprint::new(factory(kind).unwrap(), SECURITY).timeframe(Timeframe::days(1)))
    }

    fn feed(&mut self, candle: Candle) -> Vec<Order> {
        self.runtime.on_candle(&candle).unwrap();
        self.bar += 1;
        self.host.take_orders()
    }

    fn closes(&mut self, closes: &[f64]) -> Vec<Order> {
        let mut orders = Vec::new();
        for &c in closes {
            let bar = self.bar;
            orders.extend(self.feed(flat_close(bar, c)));
        }
        orders
    }

    fn fill(&mut self, order: &Order, price: f64) {
        self.runtime.on_fill(&Fill {
            order_id: order.id.clone(),
            security: order.security.clone(),
            side: order.side,
            volume: order.volume,
            price,
            time: at(self.bar),
        });
    }

    fn net(&self) -> Decimal {
        self.runtime.position().net
    }
}

#[test]
fn ema_cross_enters_then_flips() {
    let mut h = Harness::kind("ema_cross");

    assert!(h.closes(&[100.0; 30]).is_empty());

    let orders = h.closes(&[101.0, 102.0, 103.0, 104.0, 105.0]);
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].side, OrderSide::Buy);
    assert_eq!(orders[0].volume, Decimal::ONE);
    assert_eq!(orders[0].order_type, OrderType::Market);
    h.fill(&orders[0], 101.0);
    assert_eq!(h.net(), Decimal::ONE);

    // The fast average only drops under the slow one once the close reaches 98.
    let orders = h.closes(&[104.0, 103.0, 102.0, 101.0, 100.0, 99.0, 98.0]);
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].side, OrderSide::Sell);
    assert_eq!(orders[0].volume, Decimal::from(2));
    h.fill(&orders[0], 98.0);
    assert_eq!(h.net(), Decimal::from(-1));
}

#[test]
fn repeated_signal_before_fill_does_not_double_up() {
    let mut h = Harness::kind("ema_cross");
    h.closes(&[100.0; 30]);
    let orders = h.closes(&[101.0]);
    assert_eq!(orders.len(), 1);
    assert!(h.runtime.manager().has_in_flight());
    // Still unfilled: further rising candles produce no new cross and no order.
    assert!(h.closes(&[102.0, 103.0]).is_empty());
    assert_eq!(h.net(), Decimal::ZERO);
}

#[test]
fn bollinger_reversion_buys_the_stretch_and_exits_at_the_mean() {
    let mut h = Harness::kind("bollinger_reversion");

    let warmup: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 99.0 } else { 101.0 }).collect();
    assert!(h.closes(&warmup).is_empty());

    // Lower band is about 96.5 once 94 enters the window.
    let orders = h.closes(&[94.0]);
    assert_eq!(orders.len(), 1);
    assert_eq!((orders[0].side, orders[0].volume), (OrderSide::Buy, Decimal::ONE));
    h.fill(&orders[0], 94.0);

    // Mean is about 99.7.
    let orders = h.closes(&[100.5]);
    assert_eq!(orders.len(), 1);
    assert_eq!((orders[0].side, orders[0].volume), (OrderSide::Sell, Decimal::ONE));
    h.fill(&orders[0], 100.5);
    assert_eq!(h.net(), Decimal::ZERO);
}

#[test]
fn percent_stop_closes_the_long() {
    let blueprint = StrategyBlueprint::new(factory("ema_cross").unwrap(), SECURITY)
        .protection(ProtectionConfig::default().stop_loss(Unit::percent(2.0)));
    let mut h = Harness::new(blueprint);

    h.closes(&[100.0; 30]);
    let entry = h.closes(&[101.0]);
    assert_eq!(entry.len(), 1);
    h.fill(&entry[0], 100.0);
    assert!(h.runtime.protection().is_tracking());
    assert_eq!(h.runtime.protection().entry_price(), Some(100.0));

    // The rule also crosses down on this candle: the stop goes out first,
    // then the short entry sized from the flat projected position.
    let bar = h.bar;
    let orders = h.feed(ohlc(bar, 100.0, 100.5, 97.9, 98.0));
    assert_eq!(orders.len(), 2);
    let exit = &orders[0];
    assert_eq!((exit.side, exit.volume), (OrderSide::Sell, Decimal::ONE));
    assert_eq!(exit.order_type, OrderType::Market);
    assert_eq!(exit.comment.as_deref(), Some("stop-loss"));
    assert!(h.host.logged("stop-loss at 98.0000"));
    let short = &orders[1];
    assert_eq!((short.side, short.volume), (OrderSide::Sell, Decimal::ONE));
    assert_eq!(short.comment.as_deref(), Some("enter-short"));

    h.fill(exit, 98.0);
    assert!(h.runtime.position().is_flat());
    assert!(!h.runtime.protection().is_tracking());
    h.fill(short, 98.0);
    assert_eq!(h.net(), Decimal::from(-1));
    assert!(h.runtime.protection().is_tracking());
}

#[test]
fn stop_without_a_rule_signal_only_closes() {
    let blueprint = StrategyBlueprint::new(factory("ema_cross").unwrap(), SECURITY)
        .protection(ProtectionConfig::default().stop_loss(Unit::percent(2.0)));
    let mut h = Harness::new(blueprint);

    h.closes(&[100.0; 30]);
    let entry = h.closes(&[101.0, 102.0, 103.0]);
    assert_eq!(entry.len(), 1);
    h.fill(&entry[0], 103.0);

    // Wick through the stop, close back up: no cross, just the exit.
    let bar = h.bar;
    let orders = h.feed(ohlc(bar, 103.0, 103.5, 100.0, 103.0));
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].comment.as_deref(), Some("stop-loss"));
    h.fill(&orders[0], 100.94);
    assert!(h.runtime.position().is_flat());
}

#[test]
fn limit_exit_when_market_orders_are_off() {
    let protection = ProtectionConfig {
        use_market_orders: false,
        ..ProtectionConfig::default().take_profit(Unit::absolute(3.0))
    };
    let blueprint = StrategyBlueprint::new(factory("ema_cross").unwrap(), SECURITY).protection(protection);
    let mut h = Harness::new(blueprint);

    h.closes(&[100.0; 30]);
    let entry = h.closes(&[101.0]);
    h.fill(&entry[0], 101.0);

    let bar = h.bar;
    let orders = h.feed(ohlc(bar, 102.0, 104.5, 101.5, 104.0));
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].order_type, OrderType::Limit { price: 104.0 });
    assert_eq!(orders[0].comment.as_deref(), Some("take-profit"));

    // Stopping cancels exactly the resting exit, by id.
    h.runtime.stop();
    assert_eq!(*h.host.cancels.lock().unwrap(), vec![vec![orders[0].id.clone()]]);
}

#[test]
fn three_white_soldiers_then_exit_below_sma() {
    let mut h = Harness::kind("three_white_soldiers");

    assert!(h.closes(&[100.0; 20]).is_empty());

    let mut orders = Vec::new();
    for (open, close) in [(100.0, 101.0), (101.0, 102.0), (102.0, 103.0)] {
        let bar = h.bar;
        orders.push(h.feed(ohlc(bar, open, close + 0.2, open - 0.2, close)));
    }
    assert!(orders[0].is_empty());
    assert!(orders[1].is_empty());
    assert_eq!(orders[2].len(), 1);
    assert_eq!((orders[2][0].side, orders[2][0].volume), (OrderSide::Buy, Decimal::ONE));
    h.fill(&orders[2][0], 103.0);

    // SMA(20) is 100.25 after this candle.
    let bar = h.bar;
    let orders = h.feed(ohlc(bar, 103.0, 103.2, 98.5, 99.0));
    assert_eq!(orders.len(), 1);
    assert_eq!((orders[0].side, orders[0].volume), (OrderSide::Sell, Decimal::ONE));
}

fn cci_gate() -> Harness {
    let blueprint = StrategyBlueprint::new(factory("cci_volatility").unwrap(), SECURITY)
        .param("period", 5usize)
        .unwrap()
        .param("atr_period", 3usize)
        .unwrap()
        .param("atr_avg_period", 5usize)
        .unwrap();
    Harness::new(blueprint)
}

// Closes that push CCI(5) below -100 and back above it on the last candle.
const DIP: [f64; 4] = [99.0, 97.0, 95.0, 96.0];

#[test]
fn volatility_gate_blocks_entry_while_atr_is_elevated() {
    let mut h = cci_gate();
    for _ in 0..10 {
        let bar = h.bar;
        assert!(h.feed(ranged(bar, 100.0, 0.5)).is_empty());
    }
    for close in DIP {
        let bar = h.bar;
        assert!(h.feed(ranged(bar, close, 3.0)).is_empty());
    }
    assert!(h.runtime.position().is_flat());
}

#[test]
fn volatility_gate_admits_the_same_entry_once_atr_settles() {
    let mut h = cci_gate();
    for _ in 0..10 {
        let bar = h.bar;
        assert!(h.feed(ranged(bar, 100.0, 3.0)).is_empty());
    }
    let mut orders = Vec::new();
    for close in DIP {
        let bar = h.bar;
        orders.extend(h.feed(ranged(bar, close, 0.5)));
    }
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].side, OrderSide::Buy);
}

#[test]
fn active_candles_and_other_securities_are_ignored() {
    let mut h = Harness::kind("ema_cross");
    let mut active = flat_close(0, 100.0);
    active.state = CandleState::Active;
    h.runtime.on_candle(&active).unwrap();

    let mut other = flat_close(0, 100.0);
    other.security = "OTHER".into();
    h.runtime.on_candle(&other).unwrap();

    assert_eq!(h.runtime.bar_index(), 0);
}

#[test]
fn unformed_strategy_holds() {
    let mut h = Harness::kind("ema_cross");
    // Rising closes but the slow EMA needs 20 candles.
    let closes: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
    assert!(h.closes(&closes).is_empty());
    assert_eq!(h.runtime.bar_index(), 15);
}

#[test]
fn invalid_candle_halts_the_strategy() {
    let mut h = Harness::kind("ema_cross");
    h.closes(&[100.0; 5]);

    let broken = ohlc(5, 100.0, 99.0, 101.0, 100.0);
    assert!(h.runtime.on_candle(&broken).is_err());
    assert_eq!(h.runtime.state(), StrategyState::Halted);
    assert!(h.runtime.last_error().is_some());
    assert!(h.host.subscriptions.lock().unwrap().is_empty());
    assert!(h.runtime.start().is_err());

    // Halted strategies ignore further data.
    h.runtime.on_candle(&flat_close(6, 100.0)).unwrap();
    assert!(h.host.take_orders().is_empty());
}

#[test]
fn stop_is_idempotent_and_keeps_the_position() {
    let mut h = Harness::kind("ema_cross");
    h.closes(&[100.0; 30]);
    let entry = h.closes(&[101.0]);
    h.fill(&entry[0], 101.0);

    h.runtime.stop();
    h.runtime.stop();
    assert_eq!(h.runtime.state(), StrategyState::Stopped);
    // One cancel call, with nothing of ours left working.
    assert_eq!(*h.host.cancels.lock().unwrap(), vec![Vec::<String>::new()]);
    assert_eq!(h.net(), Decimal::ONE);

    // Stopped: candles are not processed.
    h.runtime.on_candle(&flat_close(40, 90.0)).unwrap();
    assert!(h.host.take_orders().is_empty());

    h.runtime.reset();
    assert!(h.runtime.position().is_flat());
    assert_eq!(h.runtime.bar_index(), 0);
}

#[test]
fn rejected_entry_can_be_retried() {
    let mut h = Harness::kind("ema_cross");
    h.closes(&[100.0; 30]);
    let entry = h.closes(&[101.0]);
    h.runtime.on_order_rejected(&OrderRejection {
        order_id: entry[0].id.clone(),
        security: SECURITY.into(),
        reason: "insufficient margin".into(),
    });
    assert!(!h.runtime.manager().has_in_flight());
    assert!(h.runtime.position().is_flat());
    assert!(h.host.logged("insufficient margin"));
}

type OrderShape = (OrderSide, Decimal, OrderType, Option<String>);

/// A few up and down swings, enough to cross and hit stops more than once.
fn swings() -> Vec<Candle> {
    (0..160)
        .map(|i| {
            let close = 100.0 + 6.0 * (i as f64 / 9.0).sin() + 2.0 * (i as f64 / 2.5).cos();
            ranged(i, close, 0.8)
        })
        .collect()
}

/// Feed every candle, filling each order at the close, and record what was sent.
fn trade(h: &mut Harness, candles: &[Candle]) -> Vec<OrderShape> {
    let mut sent = Vec::new();
    for candle in candles {
        for order in h.feed(candle.clone()) {
            h.fill(&order, candle.close);
            sent.push((order.side, order.volume, order.order_type, order.comment.clone()));
        }
    }
    sent
}

fn protected_cross() -> StrategyBlueprint {
    StrategyBlueprint::new(factory("ema_cross").unwrap(), SECURITY)
        .param("fast", 4usize)
        .unwrap()
        .param("slow", 12usize)
        .unwrap()
        .protection(
            ProtectionConfig::default()
                .stop_loss(Unit::percent(3.0))
                .take_profit(Unit::percent(4.0)),
        )
}

#[test]
fn identical_runtimes_send_identical_orders() {
    let candles = swings();
    let first = trade(&mut Harness::new(protected_cross()), &candles);
    let second = trade(&mut Harness::new(protected_cross()), &candles);
    assert!(first.len() > 2, "only {} orders", first.len());
    assert_eq!(first, second);
}

#[test]
fn replay_after_reset_matches_a_fresh_runtime() {
    let candles = swings();
    let mut h = Harness::new(protected_cross());
    let fresh = trade(&mut h, &candles);

    h.runtime.reset();
    h.runtime.start().unwrap();
    h.bar = 0;
    let replayed = trade(&mut h, &candles);
    assert_eq!(fresh, replayed);
}
