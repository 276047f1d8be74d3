/**
 * settings.rs
 * Tool settings (lizzy.yaml) with environment and flag overrides
 *
 * Format:
 * ```yaml
 * library_path: /home/me/lightrag_library
 * project_name: alpha
 * analytics:
 *   flush_every: 20
 *   max_events: 5000
 * ingest:
 *   extensions: [".txt", ".md"]
 * ```
 *
 * Precedence, highest first: command-line flags, environment
 * (LIZZY_LIBRARY, LIZZY_PROJECT_DIR, LIZZY_PROJECT), the settings file,
 * built-in defaults.
 */

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::analytics::{ANALYTICS_FILE, DEFAULT_FLUSH_EVERY, DEFAULT_MAX_EVENTS};
use crate::errors::{LizzyError, Result};
use crate::knowledge::DEFAULT_EXTENSIONS;
use crate::library::{BucketLibrary, LIBRARY_ENV};
use crate::project::lightrag_dir;

/// Settings file looked up in the project directory
pub const SETTINGS_FILE: &str = "lizzy.yaml";

pub const PROJECT_DIR_ENV: &str = "LIZZY_PROJECT_DIR";
pub const PROJECT_ENV: &str = "LIZZY_PROJECT";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalyticsSettings {
    pub flush_every: usize,
    pub max_events: usize,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        AnalyticsSettings {
            flush_every: DEFAULT_FLUSH_EVERY,
            max_events: DEFAULT_MAX_EVENTS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestSettings {
    pub extensions: Vec<String>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        IngestSettings {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Contents of lizzy.yaml
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SettingsFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    pub analytics: AnalyticsSettings,
    pub ingest: IngestSettings,
}

impl SettingsFile {
    /// Load and validate a settings file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(LizzyError::FileNotFound(path.to_string_lossy().to_string()));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| LizzyError::IoError(format!("Failed to read {}: {}", path.display(), e)))?;

        // An empty file means all defaults
        let settings: SettingsFile = if content.trim().is_empty() {
            SettingsFile::default()
        } else {
            serde_yaml::from_str(&content).map_err(|e| {
                LizzyError::ParseError(format!("Invalid settings YAML in {}: {}", path.display(), e))
            })?
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self).map_err(|e| {
            LizzyError::SerializationError(format!("Failed to serialize settings: {}", e))
        })?;

        fs::write(path.as_ref(), yaml)
            .map_err(|e| LizzyError::IoError(format!("Failed to write settings: {}", e)))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.analytics.flush_every == 0 {
            return Err(LizzyError::ValidationError(
                "analytics.flush_every must be at least 1".to_string(),
            ));
        }
        if self.analytics.max_events == 0 {
            return Err(LizzyError::ValidationError(
                "analytics.max_events must be at least 1".to_string(),
            ));
        }
        if let Some(bad) = self.ingest.extensions.iter().find(|e| !e.starts_with('.')) {
            return Err(LizzyError::ValidationError(format!(
                "ingest.extensions entries must start with '.', got '{}'",
                bad
            )));
        }
        Ok(())
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub config: Option<PathBuf>,
    pub library_path: Option<PathBuf>,
    pub project_dir: Option<PathBuf>,
    pub project_name: Option<String>,
}

/// Fully resolved settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub library_path: PathBuf,
    pub project_dir: PathBuf,
    /// None means "use the project directory's name"
    pub project_name: Option<String>,
    pub analytics: AnalyticsSettings,
    pub ingest: IngestSettings,
    /// Settings file that was read, if any
    pub source: Option<PathBuf>,
}

impl Settings {
    /// Resolve settings from flags, the process environment and lizzy.yaml
    pub fn resolve(overrides: SettingsOverrides) -> Result<Self> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup
    pub fn resolve_with<F>(overrides: SettingsOverrides, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_value = |key: &str| env(key).filter(|v| !v.is_empty());

        let project_dir = match overrides.project_dir {
            Some(dir) => dir,
            None => match env_value(PROJECT_DIR_ENV) {
                Some(dir) => PathBuf::from(dir),
                None => std::env::current_dir()?,
            },
        };

        let (file, source) = match overrides.config {
            Some(path) => (SettingsFile::load(&path)?, Some(path)),
            None => {
                let candidate = project_dir.join(SETTINGS_FILE);
                if candidate.exists() {
                    (SettingsFile::load(&candidate)?, Some(candidate))
                } else {
                    (SettingsFile::default(), None)
                }
            }
        };

        let library_path = match overrides
            .library_path
            .or_else(|| env_value(LIBRARY_ENV).map(PathBuf::from))
            .or(file.library_path)
        {
            Some(path) => path,
            None => BucketLibrary::default_library_path()?,
        };

        let project_name = overrides
            .project_name
            .or_else(|| env_value(PROJECT_ENV))
            .or(file.project_name);

        debug!(
            library = %library_path.display(),
            project_dir = %project_dir.display(),
            settings_file = ?source,
            "resolved settings"
        );

        Ok(Settings {
            library_path,
            project_dir,
            project_name,
            analytics: file.analytics,
            ingest: file.ingest,
            source,
        })
    }

    /// Location of the project's analytics file
    pub fn analytics_path(&self) -> PathBuf {
        lightrag_dir(&self.project_dir).join(ANALYTICS_FILE)
    }
}
