//! # Settings
//!
//! Layered configuration, lowest precedence first:
//! built-in defaults, `config/default.toml`, `config/local.toml`, then
//! `POTHOLE__SECTION__KEY` environment variables. A `.env` file is loaded into
//! the environment before anything else.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use services::EngineSettings;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub const ENV_PREFIX: &str = "POTHOLE";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: String,
    /// Upper bound for request bodies, base64 images included.
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".into(),
            max_body_bytes: 25 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://data/potholes.db".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    pub root_dir: PathBuf,
    /// Path the media directory is served under; also the prefix of stored
    /// image URLs.
    pub url_prefix: String,
    pub max_upload_bytes: usize,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("data/media"),
            url_prefix: "/media".into(),
            max_upload_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapperSettings {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for SnapperSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:5000".into(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    pub interval_secs: u64,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub json: bool,
    /// Used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            json: false,
            filter: "info,sqlx=warn".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapSettings {
    /// Users granted moderator rights at startup.
    pub moderators: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub media: MediaSettings,
    pub snapper: SnapperSettings,
    pub engine: EngineSettings,
    pub sweep: SweepSettings,
    pub log: LogSettings,
    pub bootstrap: BootstrapSettings,
}

impl Settings {
    /// Loads `.env`, then the layers under `./config` and the process
    /// environment.
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        Self::load_from(Path::new("config"), None)
    }

    /// Loads from `dir`. `env` replaces the process environment when given.
    pub fn load_from(dir: &Path, env: Option<HashMap<String, String>>) -> Result<Self, SettingsError> {
        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("bootstrap.moderators")
            .source(env);

        let settings: Settings = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::from(dir.join("default")).required(false))
            .add_source(File::from(dir.join("local")).required(false))
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let engine = &self.engine;
        if !(engine.distance_threshold_m.is_finite() && engine.distance_threshold_m > 0.0) {
            return Err(SettingsError::Invalid(
                "engine.distance_threshold_m must be positive".into(),
            ));
        }
        if engine.expiry_primary_days <= 0 || engine.expiry_refresh_days <= 0 {
            return Err(SettingsError::Invalid(
                "expiry TTLs must be positive".into(),
            ));
        }
        if !engine.bounding_box.is_well_formed() {
            return Err(SettingsError::Invalid(
                "engine.bounding_box must have min < max on both axes".into(),
            ));
        }
        if self.sweep.interval_secs == 0 {
            return Err(SettingsError::Invalid(
                "sweep.interval_secs must be greater than zero".into(),
            ));
        }
        if self.media.max_upload_bytes == 0 {
            return Err(SettingsError::Invalid(
                "media.max_upload_bytes must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::geo::BoundingBox;

    fn env(vars: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn defaults_apply_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(dir.path(), env(&[])).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.engine.distance_threshold_m, 15.0);
        assert_eq!(settings.engine.report_deletion_threshold, -5);
        assert_eq!(settings.engine.bounding_box, BoundingBox::TRINIDAD_AND_TOBAGO);
    }

    #[test]
    fn shipped_config_snaps_and_keeps_engine_defaults() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config");
        let settings = Settings::load_from(&dir, env(&[])).unwrap();
        assert!(settings.snapper.enabled);
        assert_eq!(settings.engine, EngineSettings::default());
        assert!(settings.bootstrap.moderators.is_empty());
    }

    #[test]
    fn files_and_environment_layer_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            "[engine]\ndistance_threshold_m = 20.0\nexpiry_refresh_days = 14\n[sweep]\ninterval_secs = 60\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("local.toml"),
            "[engine]\ndistance_threshold_m = 25.0\n",
        )
        .unwrap();

        let moderator = Uuid::now_v7();
        let moderators = moderator.to_string();
        let settings = Settings::load_from(
            dir.path(),
            env(&[
                ("POTHOLE__SNAPPER__ENABLED", "true"),
                ("POTHOLE__LOG__JSON", "true"),
                ("POTHOLE__BOOTSTRAP__MODERATORS", moderators.as_str()),
            ]),
        )
        .unwrap();

        assert_eq!(settings.engine.distance_threshold_m, 25.0);
        assert_eq!(settings.engine.expiry_refresh_days, 14);
        assert_eq!(settings.engine.expiry_primary_days, 60);
        assert_eq!(settings.sweep.interval_secs, 60);
        assert!(settings.snapper.enabled);
        assert!(settings.log.json);
        assert_eq!(settings.bootstrap.moderators, vec![moderator]);
    }

    #[test]
    fn rejects_invalid_tunables() {
        let dir = tempfile::tempdir().unwrap();
        for (key, value) in [
            ("POTHOLE__ENGINE__DISTANCE_THRESHOLD_M", "0"),
            ("POTHOLE__ENGINE__EXPIRY_PRIMARY_DAYS", "-1"),
            ("POTHOLE__SWEEP__INTERVAL_SECS", "0"),
            ("POTHOLE__ENGINE__BOUNDING_BOX__MIN_LATITUDE", "12.0"),
        ] {
            let result = Settings::load_from(dir.path(), env(&[(key, value)]));
            assert!(
                matches!(result, Err(SettingsError::Invalid(_))),
                "{key}={value} should be rejected"
            );
        }
    }
}
