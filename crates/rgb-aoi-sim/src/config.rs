//! Runner configuration: optional JSON file, then environment overrides.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use eyre::WrapErr;
use rgb_aoi::AoiConfig;
use serde::{Deserialize, Serialize};

/// Environment variable naming the JSON config file.
pub const CONFIG_ENV: &str = "AOI_SIM_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub target_tps: f32,
    pub entity_count: u64,
    /// Ticks to run; 0 runs until interrupted.
    pub ticks: u64,
    /// Side of the square the walkers roam in.
    pub world_size: f32,
    /// Every n-th entity watches its surroundings.
    pub watcher_every: u64,
    /// Ticks between progress reports.
    pub report_every: u64,
    pub aoi: AoiConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            target_tps: 20.0,
            entity_count: 256,
            ticks: 200,
            world_size: 512.0,
            watcher_every: 4,
            report_every: 20,
            aoi: AoiConfig::default(),
        }
    }
}

impl SimConfig {
    /// Load from `AOI_SIM_CONFIG` (if set) and apply environment overrides.
    pub fn load() -> eyre::Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config; missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).wrap_err_with(|| format!("parsing config {}", path.display()))
    }

    /// Apply `TARGET_TPS`, `ENTITY_COUNT`, `TICKS` and `WORLD_SIZE`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> eyre::Result<()> {
        override_with(&lookup, "TARGET_TPS", &mut self.target_tps)?;
        override_with(&lookup, "ENTITY_COUNT", &mut self.entity_count)?;
        override_with(&lookup, "TICKS", &mut self.ticks)?;
        override_with(&lookup, "WORLD_SIZE", &mut self.world_size)?;
        Ok(())
    }

    /// Wall-clock budget of one tick.
    pub fn tick_budget(&self) -> eyre::Result<Duration> {
        if !(self.target_tps.is_finite() && self.target_tps > 0.0) {
            eyre::bail!("target_tps must be positive, got {}", self.target_tps);
        }
        Duration::try_from_secs_f32(self.target_tps.recip())
            .wrap_err_with(|| format!("target_tps {} is too low", self.target_tps))
    }

    /// Reject settings the runner cannot work with.
    pub fn validate(&self) -> eyre::Result<()> {
        self.tick_budget()?;
        if !(self.world_size.is_finite() && self.world_size > 0.0) {
            eyre::bail!("world_size must be positive, got {}", self.world_size);
        }
        if self.watcher_every == 0 || self.report_every == 0 {
            eyre::bail!("watcher_every and report_every must be at least 1");
        }
        self.aoi.validate()?;
        Ok(())
    }
}

fn override_with<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) -> eyre::Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .wrap_err_with(|| format!("invalid {key}={raw:?}"))?;
    }
    Ok(())
}
