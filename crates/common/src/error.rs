use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Inconsistent market data reached an indicator (NaN, negative volume, high < low).
    /// Fatal for the strategy that observed it.
    #[error("Invalid input to {source_name}: {reason}")]
    InvalidInput { source_name: String, reason: String },

    /// Parameter or configuration out of range. Raised at `start`.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Order rejected: {reason}")]
    OrderRejected { order_id: String, reason: String },

    #[error("Host error: {0}")]
    Host(String),

    #[error("Strategy '{0}' is halted")]
    Halted(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn invalid_input(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidInput {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }

    /// Fatal errors stop the strategy; everything else stays inside the pipeline.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::InvalidInput { .. } | Error::Halted(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
