use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::retry::{ConstantDelay, DelayStrategy, ExponentialDelay, LinearDelay};

/// Shape of the wait between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayKind {
    /// Retry immediately.
    None,
    Constant,
    Linear,
    #[default]
    Exponential,
}

/// Backoff parameters (`[retry.delay]` section). Every field is written out so a
/// saved file reloads to the same policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    pub kind: DelayKind,
    /// Delay after the first failed attempt, in milliseconds.
    pub base_delay_ms: u64,
    /// Growth per attempt for `linear`.
    pub slope: f64,
    /// Multiplier per attempt for `exponential`.
    pub factor: f64,
    /// Upper bound on any single wait; 0 leaves it uncapped.
    pub max_delay_ms: u64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            kind: DelayKind::Exponential,
            base_delay_ms: 250,
            slope: 1.0,
            factor: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl DelayConfig {
    /// No backoff at all.
    pub fn disabled() -> Self {
        Self {
            kind: DelayKind::None,
            ..Self::default()
        }
    }

    /// The configured strategy; `None` for `kind = "none"`.
    pub fn strategy(&self) -> Option<Arc<dyn DelayStrategy>> {
        let base = Duration::from_millis(self.base_delay_ms);
        let max = (self.max_delay_ms > 0).then(|| Duration::from_millis(self.max_delay_ms));
        let strategy: Arc<dyn DelayStrategy> = match self.kind {
            DelayKind::None => return None,
            DelayKind::Constant => Arc::new(ConstantDelay::new(match max {
                Some(max) => base.min(max),
                None => base,
            })),
            DelayKind::Linear => {
                let d = LinearDelay::new(base).with_slope(self.slope);
                Arc::new(match max {
                    Some(max) => d.with_max_delay(max),
                    None => d,
                })
            }
            DelayKind::Exponential => {
                let d = ExponentialDelay::new(base).with_factor(self.factor);
                Arc::new(match max {
                    Some(max) => d.with_max_delay(max),
                    None => d,
                })
            }
        };
        Some(strategy)
    }
}

/// Retry policy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt. Zero or less means 1.
    pub retries: i32,
    /// Index given to the first attempt.
    pub start_count: u32,
    /// Wait between attempts; `kind = "none"` retries immediately.
    pub delay: DelayConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            start_count: 0,
            delay: DelayConfig::default(),
        }
    }
}

/// Substitute used by the CLI when the wrapped command keeps failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Shell command whose output replaces the failed command's.
    pub command: String,
}

/// Global configuration loaded from `~/.config/rebound/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReboundConfig {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub fallback: Option<FallbackConfig>,
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rebound")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ReboundConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = ReboundConfig::default();
        write_config(&path, &default_cfg)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

pub fn load_from_path(path: &Path) -> Result<ReboundConfig> {
    let data = fs::read_to_string(path)?;
    let cfg: ReboundConfig = toml::from_str(&data)?;
    Ok(cfg)
}

pub fn write_config(path: &Path, cfg: &ReboundConfig) -> Result<()> {
    let toml = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = ReboundConfig::default();
        assert_eq!(cfg.retry.retries, 3);
        assert_eq!(cfg.retry.start_count, 0);
        assert_eq!(cfg.retry.delay.kind, DelayKind::Exponential);
        assert!(cfg.fallback.is_none());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = ReboundConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ReboundConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            [retry]
            retries = 5
            start_count = 1

            [retry.delay]
            kind = "linear"
            base_delay_ms = 100
            slope = 2.0

            [fallback]
            command = "cat cached.json"
        "#;
        let cfg: ReboundConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.retry.retries, 5);
        assert_eq!(cfg.retry.start_count, 1);
        let delay = &cfg.retry.delay;
        assert_eq!(delay.kind, DelayKind::Linear);
        assert_eq!(delay.max_delay_ms, 30_000);
        let strategy = delay.strategy().unwrap();
        assert_eq!(strategy.delay(1), Duration::from_millis(400));
        assert_eq!(cfg.fallback.unwrap().command, "cat cached.json");
    }

    #[test]
    fn empty_file_uses_defaults() {
        let cfg: ReboundConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, ReboundConfig::default());
    }

    #[test]
    fn constant_delay_respects_cap() {
        let delay = DelayConfig {
            kind: DelayKind::Constant,
            base_delay_ms: 5_000,
            max_delay_ms: 1_000,
            ..DelayConfig::default()
        };
        assert_eq!(delay.strategy().unwrap().delay(3), Duration::from_secs(1));
    }

    #[test]
    fn zero_cap_leaves_delay_uncapped() {
        let delay = DelayConfig {
            base_delay_ms: 60_000,
            max_delay_ms: 0,
            ..DelayConfig::default()
        };
        assert_eq!(delay.strategy().unwrap().delay(2), Duration::from_secs(240));
    }

    #[test]
    fn load_from_path_reads_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = ReboundConfig::default();
        cfg.retry.retries = 9;
        cfg.retry.delay = DelayConfig::disabled();
        write_config(&path, &cfg).unwrap();
        let loaded = load_from_path(&path).unwrap();
        assert_eq!(loaded, cfg);
        assert!(loaded.retry.delay.strategy().is_none());
    }

    #[test]
    fn disabled_delay_is_written_out() {
        let mut cfg = ReboundConfig::default();
        cfg.retry.delay = DelayConfig::disabled();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        assert!(toml.contains("kind = \"none\""), "{}", toml);
        let parsed: ReboundConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.retry.delay.kind, DelayKind::None);
    }

    #[test]
    fn load_from_path_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "retry = [").unwrap();
        assert!(load_from_path(&path).is_err());
    }
}
