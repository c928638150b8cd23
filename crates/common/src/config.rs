use crate::{Error, Result};

/// Process configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // Strategy config file path
    pub strategy_config_path: String,

    // Paper host
    pub paper_initial_cash: f64,
    pub paper_slippage_bps: f64,

    // Candle events source: a JSON-lines file, or "-" for stdin
    pub candle_input: String,
}

impl Config {
    /// Load configuration from environment variables.
    /// Loads `.env` if present. Every variable has a default; malformed values
    /// are reported as `InvalidConfig`.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        Ok(Config {
            strategy_config_path: optional_env("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategies.toml".to_string()),
            paper_initial_cash: parsed_env("PAPER_INITIAL_CASH", 100_000.0)?,
            paper_slippage_bps: parsed_env("PAPER_SLIPPAGE_BPS", 0.0)?,
            candle_input: optional_env("CANDLE_INPUT").unwrap_or_else(|| "-".to_string()),
        })
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parsed_env(key: &str, default: f64) -> Result<f64> {
    match optional_env(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<f64>().map_err(|_| {
            Error::invalid_config(format!("{key} must be a number, got '{raw}'"))
        }),
    }
}
