use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

use common::{Candle, Fill, HostEvent, HostServices, OrderRejection};

use crate::participant::{Participant, ParticipantStatus};

pub type EventSender = mpsc::UnboundedSender<HostEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<HostEvent>;

/// Queue for host-generated events (fills and rejections). The host pushes
/// into it from inside session callbacks, so it is unbounded.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Cloneable handle used to feed a running session and read its status.
#[derive(Clone)]
pub struct SessionHandle {
    feed_tx: EventSender,
    status: Arc<RwLock<Vec<ParticipantStatus>>>,
}

impl SessionHandle {
    /// Queue an event on the external feed. Returns false once the session
    /// has finished.
    pub fn send(&self, event: HostEvent) -> bool {
        self.feed_tx.send(event).is_ok()
    }

    pub fn candle(&self, candle: Candle) -> bool {
        self.send(HostEvent::Candle(candle))
    }

    pub fn stop(&self) -> bool {
        self.send(HostEvent::Stop)
    }

    /// Status of every participant after the last processed event.
    pub async fn status(&self) -> Vec<ParticipantStatus> {
        self.status.read().await.clone()
    }
}

/// Single consumer of the external feed and the host queue.
///
/// Every participant sees every candle in arrival order; fills and rejections
/// go to the participant that owns the order. The host queue is drained after
/// each participant handles a candle, so fills caused by a candle are applied
/// before the next participant or the next candle sees anything.
pub struct Session {
    host: Arc<dyn HostServices>,
    participants: Vec<Box<dyn Participant>>,
    feed_rx: EventReceiver,
    host_rx: EventReceiver,
    status: Arc<RwLock<Vec<ParticipantStatus>>>,
}

impl Session {
    /// `host_events` is the receiving end of the queue the host was built with.
    pub fn new(host: Arc<dyn HostServices>, host_events: EventReceiver) -> (Self, SessionHandle) {
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        let status = Arc::new(RwLock::new(Vec::new()));
        let handle = SessionHandle {
            feed_tx,
            status: status.clone(),
        };
        let session = Session {
            host,
            participants: Vec::new(),
            feed_rx,
            host_rx: host_events,
            status,
        };
        (session, handle)
    }

    pub fn add(&mut self, participant: impl Participant + 'static) {
        self.participants.push(Box::new(participant));
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Run until a `Stop` event arrives or every feed sender is dropped.
    /// Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!(participants = self.participants.len(), "Session starting");
        for p in &mut self.participants {
            if let Err(e) = p.start() {
                error!(name = %p.name(), error = %e, "Failed to start");
            }
        }
        self.drain_host();
        publish(&self.status, self.snapshot()).await;

        loop {
            let event = tokio::select! {
                biased;
                Some(event) = self.host_rx.recv() => event,
                event = self.feed_rx.recv() => match event {
                    Some(event) => event,
                    None => {
                        warn!("Event feed closed, session stopping");
                        break;
                    }
                },
            };
            if matches!(event, HostEvent::Stop) {
                info!("Stop requested");
                break;
            }
            self.dispatch(event);
            self.drain_host();
            publish(&self.status, self.snapshot()).await;
        }

        for p in &mut self.participants {
            p.stop();
        }
        // Cancellations may have queued final rejections.
        self.drain_host();
        publish(&self.status, self.snapshot()).await;
        info!("Session stopped");
    }

    fn dispatch(&mut self, event: HostEvent) {
        match event {
            HostEvent::Candle(candle) => self.on_candle(&candle),
            HostEvent::Fill(fill) => self.on_fill(&fill),
            HostEvent::OrderRejected(rejection) => self.on_rejected(&rejection),
            HostEvent::Stop => debug!("Stop on the host queue ignored"),
        }
    }

    fn on_candle(&mut self, candle: &Candle) {
        if candle.is_finished() {
            // Resting orders that trade through this candle fill first.
            self.host.on_candle(candle);
            self.drain_host();
        }
        for i in 0..self.participants.len() {
            let p = &mut self.participants[i];
            if let Err(e) = p.on_candle(candle) {
                error!(name = %p.name(), error = %e, "Candle rejected");
            }
            self.drain_host();
        }
    }

    fn on_fill(&mut self, fill: &Fill) {
        match self.participants.iter_mut().find(|p| p.owns(&fill.order_id)) {
            Some(p) => p.on_fill(fill),
            None => warn!(order_id = %fill.order_id, security = %fill.security, "Fill for unknown order"),
        }
    }

    fn on_rejected(&mut self, rejection: &OrderRejection) {
        match self.participants.iter_mut().find(|p| p.owns(&rejection.order_id)) {
            Some(p) => p.on_order_rejected(rejection),
            None => warn!(order_id = %rejection.order_id, "Rejection for unknown order"),
        }
    }

    /// Apply every fill and rejection the host has queued so far.
    fn drain_host(&mut self) {
        while let Ok(event) = self.host_rx.try_recv() {
            match event {
                HostEvent::Fill(fill) => self.on_fill(&fill),
                HostEvent::OrderRejected(rejection) => self.on_rejected(&rejection),
                HostEvent::Candle(_) | HostEvent::Stop => {
                    debug!("Candle or stop on the host queue ignored")
                }
            }
        }
    }

    fn snapshot(&self) -> Vec<ParticipantStatus> {
        self.participants.iter().map(|p| p.status()).collect()
    }
}

async fn publish(status: &RwLock<Vec<ParticipantStatus>>, snapshot: Vec<ParticipantStatus>) {
    *status.write().await = snapshot;
}
