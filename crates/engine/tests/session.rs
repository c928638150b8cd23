use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use common::{Candle, CandleState, HostServices, ProtectionConfig, StrategyState, Timeframe, Unit};
use engine::{event_channel, Session, StrategyRuntime};
use paper::PaperHost;
use portfolio::Rebalancer;
use strategy::catalogue::factory;
use strategy::{FactorConfig, RebalanceFrequency, RebalancerConfig, StrategyBlueprint};

fn candle(security: &str, day: i64, close: f64) -> Candle {
    Candle {
        security: security.into(),
        open_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day),
        open: close,
        high: close,
        low: close,
        close,
        volume: 500.0,
        state: CandleState::Finished,
    }
}

#[tokio::test]
async fn crossover_round_trip_through_paper_host() {
    let (tx, rx) = event_channel();
    let host = Arc::new(PaperHost::new(tx, 100_000.0, 0.0));
    let (mut session, handle) = Session::new(host.clone(), rx);

    let blueprint = StrategyBlueprint::new(factory("ema_cross").unwrap(), "BTCUSDT")
        .name("cross")
        .timeframe(Timeframe::days(1));
    session.add(StrategyRuntime::new(blueprint.build().unwrap(), host.clone()));
    let task = tokio::spawn(session.run());

    let closes = [100.0; 30]
        .into_iter()
        .chain([101.0, 102.0, 103.0, 104.0, 105.0])
        .chain([104.0, 103.0, 102.0, 101.0, 100.0, 99.0, 98.0]);
    for (day, close) in closes.enumerate() {
        assert!(handle.candle(candle("BTCUSDT", day as i64, close)));
    }
    handle.stop();
    task.await.unwrap();

    let status = handle.status().await;
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].name, "cross");
    assert_eq!(status[0].kind, "ema_cross");
    assert_eq!(status[0].state, StrategyState::Stopped);
    assert_eq!(status[0].holdings, vec![("BTCUSDT".to_string(), Decimal::from(-1))]);
    assert_eq!(host.position("BTCUSDT"), Decimal::from(-1));
    // Bought at 101, sold 2 at 98.
    assert_eq!(host.cash(), 100_000.0 - 101.0 + 2.0 * 98.0);
    assert!(!host.is_subscribed("BTCUSDT"));
}

#[tokio::test]
async fn entry_fill_lands_before_the_next_candle_so_the_stop_fires() {
    let (tx, rx) = event_channel();
    let host = Arc::new(PaperHost::new(tx, 100_000.0, 0.0));
    let (mut session, handle) = Session::new(host.clone(), rx);

    let blueprint = StrategyBlueprint::new(factory("ema_cross").unwrap(), "BTCUSDT")
        .timeframe(Timeframe::days(1))
        .protection(ProtectionConfig::default().stop_loss(Unit::percent(2.0)));
    session.add(StrategyRuntime::new(blueprint.build().unwrap(), host.clone()));
    let task = tokio::spawn(session.run());

    // Everything is queued up front, before the session has run at all.
    for day in 0..30 {
        handle.candle(candle("BTCUSDT", day, 100.0));
    }
    handle.candle(candle("BTCUSDT", 30, 101.0));
    // Long from 101, stop at 98.98. The wick reaches 98, no cross on the close.
    let mut wick = candle("BTCUSDT", 31, 100.5);
    wick.open = 101.0;
    wick.high = 101.0;
    wick.low = 98.0;
    handle.candle(wick);
    handle.stop();
    task.await.unwrap();

    assert_eq!(host.position("BTCUSDT"), Decimal::ZERO);
    assert_eq!(host.cash(), 100_000.0 - 101.0 + 100.5);
    let status = handle.status().await;
    assert_eq!(status[0].holdings, vec![("BTCUSDT".to_string(), Decimal::ZERO)]);
}

#[tokio::test]
async fn rebalancer_and_strategy_share_one_session() {
    let universe: Vec<String> = ('A'..='J').map(String::from).collect();
    let scores: HashMap<String, f64> = universe
        .iter()
        .enumerate()
        .map(|(i, s)| (s.clone(), 9.0 - i as f64))
        .collect();

    let (tx, rx) = event_channel();
    let host = Arc::new(PaperHost::new(tx, 100_000.0, 0.0));
    let (mut session, handle) = Session::new(host.clone(), rx);

    let config = RebalancerConfig {
        name: "deciles".into(),
        universe: universe.clone(),
        deciles: 5,
        leverage: 1.0,
        min_trade_usd: 0.0,
        frequency: RebalanceFrequency::Monthly,
        factor: FactorConfig::External { scores },
        long_only: false,
        lot_step: Decimal::ONE,
        timeframe: Timeframe::days(1),
    };
    session.add(Rebalancer::from_config(config, host.clone()).unwrap());
    let blueprint = StrategyBlueprint::new(factory("ema_cross").unwrap(), "A").timeframe(Timeframe::days(1));
    session.add(StrategyRuntime::new(blueprint.build().unwrap(), host.clone()));
    assert_eq!(session.len(), 2);
    let task = tokio::spawn(session.run());

    // January 31st seeds the calendar, February 1st rebalances.
    for s in &universe {
        handle.candle(candle(s, 30, 100.0));
    }
    handle.candle(candle("A", 31, 100.0));
    handle.stop();
    task.await.unwrap();

    let status = handle.status().await;
    let rebalancer = status.iter().find(|s| s.kind == "rebalancer").unwrap();
    assert_eq!(
        rebalancer.holdings,
        vec![
            ("A".to_string(), Decimal::from(500)),
            ("B".to_string(), Decimal::from(500)),
            ("I".to_string(), Decimal::from(-500)),
            ("J".to_string(), Decimal::from(-500)),
        ]
    );
    // The crossover never formed and owns none of the fills.
    let cross = status.iter().find(|s| s.kind == "ema_cross").unwrap();
    assert_eq!(cross.holdings, vec![("A".to_string(), Decimal::ZERO)]);
    assert_eq!(host.portfolio_value(), Some(100_000.0));
}
