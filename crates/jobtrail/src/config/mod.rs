//! Settings loading and validation. Settings live in a YAML file and are
//! re-read at the start of every sync run, so edits apply without a restart.

pub mod settings;

pub use settings::{AiSettings, Settings};

use std::path::{Path, PathBuf};

use log::warn;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Settings validation failed: {message}")]
    Validation { message: String },
}

/// Loads and validates settings from a YAML file.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    load_settings_from_str(&raw)
}

pub fn load_settings_from_str(raw: &str) -> Result<Settings, ConfigError> {
    let settings: Settings = serde_yaml::from_str(raw)?;
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    if settings.focus_phrases.iter().all(|p| p.trim().is_empty()) {
        return Err(ConfigError::Validation {
            message: "focusPhrases must contain at least one non-empty phrase".to_string(),
        });
    }
    if settings.sync_lookback_days < 1 {
        return Err(ConfigError::Validation {
            message: "syncLookbackDays must be at least 1".to_string(),
        });
    }
    if settings.followup_after_days < 1 {
        return Err(ConfigError::Validation {
            message: "followupAfterDays must be at least 1".to_string(),
        });
    }
    if !(0.0..=1.0).contains(&settings.ai.min_confidence) {
        return Err(ConfigError::Validation {
            message: "ai.minConfidence must be between 0.0 and 1.0".to_string(),
        });
    }
    if settings.ai.enabled && settings.ai.endpoint.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "ai.endpoint must be set when ai.enabled is true".to_string(),
        });
    }
    Ok(())
}

/// Source of the settings used by a sync run. The engine asks for the
/// current value at the start of every run.
pub trait SettingsProvider: Send + Sync {
    fn current(&self) -> Settings;
}

/// Re-reads a YAML file on every call, falling back to defaults (with a
/// warning) when the file is missing or invalid.
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        FileSettings { path: path.into() }
    }
}

impl SettingsProvider for FileSettings {
    fn current(&self) -> Settings {
        match load_settings(&self.path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(
                    "failed to load settings from {}: {e}; using defaults",
                    self.path.display()
                );
                Settings::default()
            }
        }
    }
}

/// Fixed settings, mainly for tests and embedded use.
pub struct StaticSettings(pub Settings);

impl SettingsProvider for StaticSettings {
    fn current(&self) -> Settings {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rejects_empty_focus_phrases() {
        let err = load_settings_from_str("focusPhrases: ['  ']").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let err = load_settings_from_str("ai:\n  minConfidence: 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn rejects_zero_lookback() {
        let err = load_settings_from_str("syncLookbackDays: 0").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn file_settings_reads_current_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");

        std::fs::write(&path, "followupAfterDays: 3\n").unwrap();
        let provider = FileSettings::new(&path);
        assert_eq!(provider.current().followup_after_days, 3);

        // Edits apply on the next read without reconstructing the provider.
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "followupAfterDays: 9").unwrap();
        drop(file);
        assert_eq!(provider.current().followup_after_days, 9);
    }

    #[test]
    fn file_settings_falls_back_to_defaults_when_missing() {
        let provider = FileSettings::new("/nonexistent/settings.yaml");
        assert_eq!(provider.current(), Settings::default());
    }
}
