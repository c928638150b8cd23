//! Strategy runtime and the event session that drives it.

pub mod participant;
pub mod runtime;
pub mod session;

pub use participant::{Participant, ParticipantStatus};
pub use runtime::StrategyRuntime;
pub use session::{event_channel, EventReceiver, EventSender, Session, SessionHandle};
