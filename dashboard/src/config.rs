use abstutil::Timer;
use anyhow::Result;
use serde::{Deserialize, Serialize};

use playback::PlaybackConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub history: HistoryConfig,
    pub transport: TransportConfig,
    pub playback: PlaybackConfig,
    /// How many recent records to replay per device
    pub history_count: usize,
}

/// Where position history is stored. Passed to the history client, never read globally.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub base_url: String,
    pub database: String,
    pub collection: String,
    pub api_key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            history: HistoryConfig::default(),
            transport: TransportConfig::default(),
            playback: PlaybackConfig::default(),
            history_count: 50,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.mongolab.com/api/1".to_string(),
            database: "locations".to_string(),
            collection: "locations".to_string(),
            api_key: String::new(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
        }
    }
}

impl DashboardConfig {
    /// Reads a JSON config file. Anything it leaves out keeps the default.
    pub fn load(path: Option<String>) -> Result<Self> {
        let config = match path {
            Some(path) => abstio::maybe_read_json::<Self>(path, &mut Timer::throwaway())?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let step = self.playback.step_percent;
        if step == 0 || step > 100 {
            bail!("playback.step_percent must be between 1 and 100, not {}", step);
        }
        if self.playback.tick_interval_ms == 0 {
            bail!("playback.tick_interval_ms must be positive");
        }
        let opacity = self.playback.disabled_opacity;
        if !(0.0..1.0).contains(&opacity) {
            bail!(
                "playback.disabled_opacity must be at least 0 and below 1, not {}",
                opacity
            );
        }
        if self.history_count == 0 {
            bail!("history_count must be positive");
        }
        Ok(())
    }
}
