use std::{fs, path::{Path, PathBuf}, time::Duration};

use anyhow::Context;
use model::UserData;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RideConfig {
    pub tick_interval_ms: u64,
    pub average_speed_kmh: f64,
    pub history_dir: PathBuf,
    pub history_limit: usize,
    pub bind_addr: String,
    pub user: Option<UserData>,
}

impl Default for RideConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 250,
            average_speed_kmh: 20.0,
            history_dir: default_history_dir(),
            history_limit: iox::DEFAULT_HISTORY_LIMIT,
            bind_addr: ride_ingest_ftms::FtmsUdpConfig::default().bind_addr,
            user: None,
        }
    }
}

fn default_history_dir() -> PathBuf {
    dirs_next::data_dir()
        .map(|d| d.join("ride"))
        .unwrap_or_else(|| PathBuf::from(".ride"))
}

impl RideConfig {
    /// Defaults, overlaid with the JSON file at `path` when given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
        let cfg: Self = serde_json::from_str(&text).with_context(|| format!("parse config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(cfg)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::Sex;

    #[test]
    fn no_file_means_defaults() {
        let cfg = RideConfig::load(None).unwrap();
        assert_eq!(cfg, RideConfig::default());
        assert_eq!(cfg.tick_interval(), Duration::from_millis(250));
        assert_eq!(cfg.history_limit, 10);
        assert_eq!(cfg.bind_addr, "0.0.0.0:6182");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ride.json");
        fs::write(
            &path,
            r#"{ "tick_interval_ms": 100, "user": { "sex": "female", "age": 34, "height": 170, "weight": 62 } }"#,
        )
        .unwrap();

        let cfg = RideConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.tick_interval_ms, 100);
        assert_eq!(cfg.average_speed_kmh, 20.0);
        assert_eq!(cfg.user.as_ref().map(|u| u.sex), Some(Sex::Female));
    }

    #[test]
    fn bad_file_is_an_error() {
        assert!(RideConfig::load(Some(Path::new("/nonexistent/ride.json"))).is_err());
    }
}
