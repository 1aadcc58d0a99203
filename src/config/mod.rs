// Configuration loading: defaults < TOML file < profile < environment
use crate::api::binance::{BINANCE_FUTURES_API_BASE, DEFAULT_RATE_LIMIT_RPM};
use crate::engine::EngineSettings;
use crate::execution::OrderPolicy;
use crate::models::BarInterval;
use crate::strategy::SignalConfig;
use crate::{BotError, Result};
use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/crossbot.toml";
pub const ENV_PREFIX: &str = "CROSSBOT";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BinanceConfig {
    pub base_url: String,
    pub requests_per_minute: u32,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: BINANCE_FUTURES_API_BASE.to_string(),
            requests_per_minute: DEFAULT_RATE_LIMIT_RPM,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

/// Complete bot configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BotConfig {
    pub instruments: Vec<String>,
    pub interval: BarInterval,
    pub lookback_bars: usize,
    pub poll_interval_secs: u64,
    pub backoff_secs: u64,
    pub flatten_threshold_secs: Option<u64>,
    pub signal: SignalConfig,
    pub order: OrderPolicy,
    pub binance: BinanceConfig,
    pub telegram: Option<TelegramConfig>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            instruments: Vec::new(),
            interval: BarInterval::default(),
            lookback_bars: 100,
            poll_interval_secs: 300,
            backoff_secs: 60,
            flatten_threshold_secs: None,
            signal: SignalConfig::default(),
            order: OrderPolicy::default(),
            binance: BinanceConfig::default(),
            telegram: None,
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("instruments")
}

impl BotConfig {
    /// Load and validate configuration
    ///
    /// `path` defaults to `config/crossbot.toml` (optional when defaulted,
    /// required when given). `profile` names a file under `profiles/` next
    /// to the base file. `CROSSBOT_*` variables override everything, with
    /// `__` separating nested keys (`CROSSBOT_SIGNAL__SHORT_PERIOD=5`).
    pub fn load(path: Option<&Path>, profile: Option<&str>) -> Result<Self> {
        Self::load_with_env(path, profile, environment())
    }

    fn load_with_env(path: Option<&Path>, profile: Option<&str>, env: Environment) -> Result<Self> {
        let base = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut builder = Config::builder().add_source(File::from(base.clone()).required(path.is_some()));

        if let Some(name) = profile {
            let profile_file = profile_path(&base, name);
            if !profile_file.exists() {
                return Err(BotError::InvalidConfig(format!(
                    "profile '{}' not found at {}",
                    name,
                    profile_file.display()
                )));
            }
            tracing::info!("Loading profile config: {}", profile_file.display());
            builder = builder.add_source(File::from(profile_file));
        }

        let config: BotConfig = builder
            .add_source(env)
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| BotError::InvalidConfig(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.instruments.is_empty() {
            return Err(BotError::InvalidConfig(
                "at least one instrument is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for instrument in &self.instruments {
            if instrument.trim().is_empty() {
                return Err(BotError::InvalidConfig("empty instrument symbol".to_string()));
            }
            if !seen.insert(instrument.as_str()) {
                return Err(BotError::InvalidConfig(format!(
                    "instrument {} listed twice",
                    instrument
                )));
            }
        }

        if self.poll_interval_secs == 0 || self.backoff_secs == 0 {
            return Err(BotError::InvalidConfig(
                "poll_interval_secs and backoff_secs must be positive".to_string(),
            ));
        }
        if self.binance.requests_per_minute == 0 {
            return Err(BotError::InvalidConfig(
                "binance.requests_per_minute must be positive".to_string(),
            ));
        }

        if let Some(threshold) = self.flatten_threshold_secs {
            let interval_secs = self.interval.duration().num_seconds() as u64;
            if threshold >= interval_secs {
                return Err(BotError::InvalidConfig(format!(
                    "flatten_threshold_secs ({}) must be shorter than the {} interval",
                    threshold, self.interval
                )));
            }
        }

        self.signal.validate()?;
        self.order.validate()?;
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            interval: self.interval,
            lookback_bars: self.lookback_bars,
            poll_interval_secs: self.poll_interval_secs,
            backoff_secs: self.backoff_secs,
            flatten_threshold_secs: self.flatten_threshold_secs,
        }
    }
}

/// `config/crossbot.toml` + `fast` -> `config/profiles/fast.toml`
fn profile_path(base: &Path, name: &str) -> PathBuf {
    base.parent()
        .unwrap_or_else(|| Path::new("."))
        .join("profiles")
        .join(format!("{}.toml", name))
}
