use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use shardlift_pipeline::{DEFAULT_CONCURRENCY, DEFAULT_DRY_RUN_LIMIT, PipelineConfig, Retention};
use shardlift_source::{DEFAULT_PATTERN, Destination};
use thiserror::Error;

pub const DEFAULT_LOG_FILE: &str = "migration.log";
pub const DEFAULT_STAGING_ROOT: &str = "temp_extraction_work";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("config file '{0}' does not exist")]
    MissingFile(PathBuf),
    #[error(transparent)]
    Figment(#[from] figment::Error),
    #[error("invalid setting '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Resolved settings: defaults, then the TOML file, then `SHARDLIFT_*`
/// environment variables, then command-line flags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub source_root: PathBuf,
    pub pattern: String,
    pub destination: Option<String>,
    pub staging_root: PathBuf,
    pub concurrency: usize,
    /// Unset means each command picks its own default.
    pub keep_archives: Option<bool>,
    pub dry_run: bool,
    pub dry_run_limit: usize,
    pub log_file: PathBuf,
    /// Base directory for hub downloads.
    pub output_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_root: PathBuf::from("."),
            pattern: DEFAULT_PATTERN.to_string(),
            destination: None,
            staging_root: PathBuf::from(DEFAULT_STAGING_ROOT),
            concurrency: DEFAULT_CONCURRENCY,
            keep_archives: None,
            dry_run: false,
            dry_run_limit: DEFAULT_DRY_RUN_LIMIT,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            output_dir: PathBuf::from("."),
        }
    }
}

/// Command-line values; `None` leaves the lower layers alone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_archives: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run_limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl Settings {
    pub fn load(config_file: Option<&Path>, overrides: &Overrides) -> Result<Self, SettingsError> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));

        if let Some(path) = config_file {
            if !path.is_file() {
                return Err(SettingsError::MissingFile(path.to_path_buf()));
            }
            figment = figment.merge(Toml::file(path));
        }

        let settings: Settings = figment
            .merge(Env::prefixed("SHARDLIFT_").ignore(&["config"]))
            .merge(Serialized::defaults(overrides))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.concurrency == 0 {
            return Err(SettingsError::Invalid {
                key: "concurrency",
                reason: "must be at least 1".into(),
            });
        }
        if self.dry_run_limit == 0 {
            return Err(SettingsError::Invalid {
                key: "dry_run_limit",
                reason: "must be at least 1".into(),
            });
        }
        if self.pattern.trim().is_empty() {
            return Err(SettingsError::Invalid {
                key: "pattern",
                reason: "must not be empty".into(),
            });
        }
        self.destination()?;
        Ok(())
    }

    pub fn destination(&self) -> Result<Option<Destination>, SettingsError> {
        self.destination
            .as_deref()
            .map(Destination::parse)
            .transpose()
            .map_err(|e| SettingsError::Invalid {
                key: "destination",
                reason: e.to_string(),
            })
    }

    /// Pipeline settings; `keep_by_default` applies when retention was not set.
    pub fn pipeline_config(&self, keep_by_default: bool) -> PipelineConfig {
        let retention = if self.keep_archives.unwrap_or(keep_by_default) {
            Retention::Keep
        } else {
            Retention::Delete
        };

        let config = PipelineConfig::new(&self.staging_root)
            .concurrency(self.concurrency)
            .retention(retention);
        if self.dry_run {
            config.dry_run(self.dry_run_limit)
        } else {
            config
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn defaults_without_file() {
        let settings = Settings::load(None, &Overrides::default()).unwrap();
        assert_eq!(settings.pattern, "**/*.tar");
        assert_eq!(settings.concurrency, 4);
        assert_eq!(settings.log_file, PathBuf::from("migration.log"));
        assert_eq!(settings.destination().unwrap(), None);
    }

    #[test]
    fn flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shardlift.toml");
        fs::write(
            &path,
            r#"
            source_root = "/mnt/emilia"
            destination = "gs://from-file"
            concurrency = 2
            keep_archives = false
            "#,
        )
        .unwrap();
        let overrides = Overrides {
            concurrency: Some(6),
            ..Overrides::default()
        };

        let settings = Settings::load(Some(&path), &overrides).unwrap();

        assert_eq!(settings.source_root, PathBuf::from("/mnt/emilia"));
        assert_eq!(settings.destination.as_deref(), Some("gs://from-file"));
        assert_eq!(settings.concurrency, 6);
        assert_eq!(settings.keep_archives, Some(false));
    }

    #[test]
    fn missing_file_is_reported() {
        let result = Settings::load(Some(Path::new("/definitely/not/here.toml")), &Overrides::default());
        assert!(matches!(result, Err(SettingsError::MissingFile(_))));
    }

    #[test]
    fn zero_concurrency_is_invalid() {
        let overrides = Overrides {
            concurrency: Some(0),
            ..Overrides::default()
        };
        let result = Settings::load(None, &overrides);
        assert!(matches!(result, Err(SettingsError::Invalid { key: "concurrency", .. })));
    }

    #[test]
    fn destination_needs_a_scheme() {
        let overrides = Overrides {
            destination: Some("bucket-without-scheme".into()),
            ..Overrides::default()
        };
        let result = Settings::load(None, &overrides);
        assert!(matches!(result, Err(SettingsError::Invalid { key: "destination", .. })));
    }

    #[test]
    fn retention_follows_command_default_unless_set() {
        let mut settings = Settings::default();
        assert_eq!(settings.pipeline_config(true).retention, Retention::Keep);
        assert_eq!(settings.pipeline_config(false).retention, Retention::Delete);

        settings.keep_archives = Some(true);
        assert_eq!(settings.pipeline_config(false).retention, Retention::Keep);
    }

    #[test]
    fn dry_run_carries_its_limit() {
        let settings = Settings {
            dry_run: true,
            dry_run_limit: 3,
            ..Settings::default()
        };
        let config = settings.pipeline_config(true);
        assert!(config.dry_run);
        assert_eq!(config.dry_run_limit, 3);
    }
}
