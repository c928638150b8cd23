pub mod config;
pub mod error;
pub mod host;
pub mod precision;
pub mod protection;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use host::{HostServices, LogLevel};
pub use protection::{ProtectionConfig, TieBreak, Unit, UnitKind};
pub use types::*;
