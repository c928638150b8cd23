use rust_decimal::Decimal;
use serde::Serialize;

use common::{Candle, Fill, OrderRejection, Result, StrategyState};
use portfolio::{PairsTrading, Rebalancer};

use crate::runtime::StrategyRuntime;

/// Anything a session feeds with host events.
pub trait Participant: Send {
    fn name(&self) -> &str;

    fn start(&mut self) -> Result<()>;

    fn on_candle(&mut self, candle: &Candle) -> Result<()>;

    /// True if `order_id` is one of this participant's working orders.
    fn owns(&self, order_id: &str) -> bool;

    fn on_fill(&mut self, fill: &Fill);

    fn on_order_rejected(&mut self, rejection: &OrderRejection);

    fn stop(&mut self);

    fn status(&self) -> ParticipantStatus;
}

/// Snapshot published by the session after every event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantStatus {
    pub name: String,
    pub kind: String,
    pub state: StrategyState,
    /// Filled quantity per security.
    pub holdings: Vec<(String, Decimal)>,
    pub last_error: Option<String>,
}

impl Participant for StrategyRuntime {
    fn name(&self) -> &str {
        StrategyRuntime::name(self)
    }

    fn start(&mut self) -> Result<()> {
        StrategyRuntime::start(self)
    }

    fn on_candle(&mut self, candle: &Candle) -> Result<()> {
        StrategyRuntime::on_candle(self, candle)
    }

    fn owns(&self, order_id: &str) -> bool {
        StrategyRuntime::owns(self, order_id)
    }

    fn on_fill(&mut self, fill: &Fill) {
        StrategyRuntime::on_fill(self, fill)
    }

    fn on_order_rejected(&mut self, rejection: &OrderRejection) {
        StrategyRuntime::on_order_rejected(self, rejection)
    }

    fn stop(&mut self) {
        StrategyRuntime::stop(self)
    }

    fn status(&self) -> ParticipantStatus {
        let position = self.position();
        ParticipantStatus {
            name: self.name().to_string(),
            kind: self.strategy().kind().to_string(),
            state: self.state(),
            holdings: vec![(position.security.clone(), position.net)],
            last_error: self.last_error().map(str::to_string),
        }
    }
}

impl Participant for Rebalancer {
    fn name(&self) -> &str {
        Rebalancer::name(self)
    }

    fn start(&mut self) -> Result<()> {
        Rebalancer::start(self)
    }

    fn on_candle(&mut self, candle: &Candle) -> Result<()> {
        Rebalancer::on_candle(self, candle)
    }

    fn owns(&self, order_id: &str) -> bool {
        Rebalancer::owns(self, order_id)
    }

    fn on_fill(&mut self, fill: &Fill) {
        Rebalancer::on_fill(self, fill)
    }

    fn on_order_rejected(&mut self, rejection: &OrderRejection) {
        Rebalancer::on_order_rejected(self, rejection)
    }

    fn stop(&mut self) {
        Rebalancer::stop(self)
    }

    fn status(&self) -> ParticipantStatus {
        ParticipantStatus {
            name: self.name().to_string(),
            kind: "rebalancer".to_string(),
            state: self.state(),
            holdings: sorted(self.book().held()),
            last_error: None,
        }
    }
}

impl Participant for PairsTrading {
    fn name(&self) -> &str {
        PairsTrading::name(self)
    }

    fn start(&mut self) -> Result<()> {
        PairsTrading::start(self)
    }

    fn on_candle(&mut self, candle: &Candle) -> Result<()> {
        PairsTrading::on_candle(self, candle)
    }

    fn owns(&self, order_id: &str) -> bool {
        PairsTrading::owns(self, order_id)
    }

    fn on_fill(&mut self, fill: &Fill) {
        PairsTrading::on_fill(self, fill)
    }

    fn on_order_rejected(&mut self, rejection: &OrderRejection) {
        PairsTrading::on_order_rejected(self, rejection)
    }

    fn stop(&mut self) {
        PairsTrading::stop(self)
    }

    fn status(&self) -> ParticipantStatus {
        ParticipantStatus {
            name: self.name().to_string(),
            kind: "pairs".to_string(),
            state: self.state(),
            holdings: sorted(self.book().held()),
            last_error: None,
        }
    }
}

fn sorted<'a>(held: impl Iterator<Item = (&'a str, Decimal)>) -> Vec<(String, Decimal)> {
    let mut v: Vec<(String, Decimal)> = held.map(|(s, q)| (s.to_string(), q)).collect();
    v.sort();
    v
}
