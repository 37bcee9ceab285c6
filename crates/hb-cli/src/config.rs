//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use hb_core::AnalysisConfig;
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Device families whose log files are ingested; files for other
    /// types are skipped.
    pub device_types: Vec<String>,
    /// Analysis constants, overridable through the `[analysis]` table.
    pub analysis: AnalysisConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("device_types", &self.device_types)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("hb.db"),
            device_types: vec!["hset".to_string(), "hphire".to_string()],
            analysis: AnalysisConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    ///
    /// Layering: built-in defaults, then `config.toml` from the
    /// platform config dir, then the explicit file, then `HB_*`
    /// environment variables (`HB_ANALYSIS__GAP_THRESHOLD_SEC` style
    /// for nested keys).
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("HB_").split("__"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for hb.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("hb"))
}

/// Returns the platform-specific data directory for hb.
///
/// On Linux: `~/.local/share/hb`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("hb"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_data_dir_for_db() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("hb.db"));
    }

    #[test]
    fn default_analysis_constants_are_valid() {
        assert!(Config::default().analysis.validate().is_ok());
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hb.toml");
        std::fs::write(
            &path,
            r#"
            database_path = "/tmp/custom.db"

            [analysis]
            gap_threshold_sec = 30.0
            "#,
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/custom.db"));
        assert!((config.analysis.gap_threshold_sec - 30.0).abs() < f64::EPSILON);
        // Untouched keys keep their defaults.
        assert!((config.analysis.sample_interval_sec - 10.0).abs() < f64::EPSILON);
    }
}
