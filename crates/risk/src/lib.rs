//! Position bookkeeping and protective exits for a single strategy.

pub mod manager;
pub mod protection;

pub use manager::PositionManager;
pub use protection::{ExitReason, ProtectionPolicy, ProtectiveExit};
