use super::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Name of the optional threshold override file inside the base directory
const THRESHOLDS_FILE: &str = "thresholds.json";

/// The stage a threshold belongs to. Each stage declares its own valid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdKind {
    /// Seed search against the topic formulation
    Search,
    /// Similarity propagation during expansion
    Mapping,
    /// Clustering of candidates offered for review
    Cluster,
    /// Clustering of the accepted set at final review
    Review,
}

impl ThresholdKind {
    /// Inclusive valid range for this kind of threshold
    pub fn range(self) -> (f32, f32) {
        match self {
            ThresholdKind::Search | ThresholdKind::Mapping => (0.58, 0.90),
            ThresholdKind::Cluster | ThresholdKind::Review => (0.60, 0.90),
        }
    }

    /// Fail fast with a configuration error when `value` is outside the range
    pub fn validate(self, value: f32) -> Result<f32> {
        let (min, max) = self.range();
        if !value.is_finite() || value < min || value > max {
            return Err(Error::Configuration(format!(
                "{} threshold {} is outside the valid range [{:.2}, {:.2}]",
                self, value, min, max
            )));
        }
        Ok(value)
    }
}

impl fmt::Display for ThresholdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThresholdKind::Search => "search",
            ThresholdKind::Mapping => "mapping",
            ThresholdKind::Cluster => "cluster",
            ThresholdKind::Review => "review",
        };
        f.write_str(name)
    }
}

/// Threshold parameters used by one topic-discovery session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub search: f32,
    pub mapping: f32,
    pub cluster: f32,
    pub review: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            search: 0.68,
            mapping: 0.68,
            cluster: 0.72,
            review: 0.74,
        }
    }
}

impl Thresholds {
    /// Check every threshold against its declared range
    pub fn validate(&self) -> Result<()> {
        ThresholdKind::Search.validate(self.search)?;
        ThresholdKind::Mapping.validate(self.mapping)?;
        ThresholdKind::Cluster.validate(self.cluster)?;
        ThresholdKind::Review.validate(self.review)?;
        Ok(())
    }
}

/// Configuration for satscope
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for satscope data
    pub base_dir: PathBuf,
    /// Directory for the session database
    pub database_dir: PathBuf,
    /// Directory for exported sessions
    pub outputs_dir: PathBuf,
    /// Path to the session store
    pub sessions_path: PathBuf,
}

impl Config {
    /// Get the default configuration directory
    pub fn default_base_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .ok_or_else(|| Error::Configuration("Could not determine home directory".to_string()))
            .map(|home| home.join(".satscope"))
    }

    /// Create a new configuration
    pub fn new(base_dir: Option<PathBuf>) -> Result<Self> {
        let base_dir = match base_dir {
            Some(dir) => dir,
            None => Self::default_base_dir()?,
        };
        let database_dir = base_dir.join("database");

        Ok(Self {
            sessions_path: database_dir.join("sessions.redb"),
            outputs_dir: base_dir.join("outputs"),
            database_dir,
            base_dir,
        })
    }

    /// Initialize the configuration directories
    pub fn init(&self) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(&self.database_dir)?;
        std::fs::create_dir_all(&self.outputs_dir)?;
        Ok(())
    }

    /// Check if the configuration is already initialized
    pub fn is_initialized(&self) -> bool {
        self.base_dir.exists() && self.database_dir.exists() && self.outputs_dir.exists()
    }

    /// Fail with a configuration error unless `init` has been run
    pub fn require_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::Configuration(format!(
                "satscope is not initialized at {}. Run 'satscope init' first.",
                self.base_dir.display()
            )))
        }
    }

    /// Default thresholds, overridden by `thresholds.json` in the base directory if present
    pub fn thresholds(&self) -> Result<Thresholds> {
        let path = self.base_dir.join(THRESHOLDS_FILE);
        if !path.exists() {
            return Ok(Thresholds::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let thresholds: Thresholds = serde_json::from_str(&content).map_err(|e| {
            Error::Parsing(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        thresholds.validate()?;
        tracing::debug!(?thresholds, "loaded threshold overrides");
        Ok(thresholds)
    }
}
