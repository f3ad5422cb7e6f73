//! Runtime settings, layered: built-in defaults, then an optional
//! `cryptopulse.toml`, then `CRYPTOPULSE_*` environment variables.
//! Secrets (database URL, bot token) come from the plain environment.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Watchlist in BASE/QUOTE form
    pub symbols: Vec<String>,
    /// "crossover" or "trend"
    pub strategy: String,
    pub scan_interval_secs: u64,
    pub track_interval_secs: u64,
    /// Poll cadence while nothing is open
    pub idle_interval_secs: u64,
    pub sweep_interval_secs: u64,
    /// Pause between per-symbol fetches during a scan
    pub symbol_delay_ms: u64,
    pub min_quote_volume: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            symbols: vec![
                "BTC/USDT".to_string(),
                "ETH/USDT".to_string(),
                "SOL/USDT".to_string(),
            ],
            strategy: "crossover".to_string(),
            scan_interval_secs: 300,
            track_interval_secs: 20,
            idle_interval_secs: 30,
            sweep_interval_secs: 3600,
            symbol_delay_ms: 200,
            min_quote_volume: 1_000_000.0,
        }
    }
}

impl Settings {
    pub fn load() -> crate::Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name("cryptopulse").required(false))
            .add_source(
                Environment::with_prefix("CRYPTOPULSE")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("symbols"),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn track_interval(&self) -> Duration {
        Duration::from_secs(self.track_interval_secs)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn symbol_delay(&self) -> Duration {
        Duration::from_millis(self.symbol_delay_ms)
    }
}
