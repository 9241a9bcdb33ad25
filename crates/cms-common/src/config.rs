//! ---
//! cms_section: "01-core-functionality"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "Shared primitives and utilities for the core runtime."
//! cms_version: "v0.0.0-prealpha"
//! cms_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;
use url::Url;

use crate::logging::LogFormat;

/// Identifier of the demo plant reported in every telemetry sample.
pub const DEFAULT_PLANT_ID: &str = "nmdc_demo_01";

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_plant_id() -> String {
    DEFAULT_PLANT_ID.to_owned()
}

fn default_cadence() -> Duration {
    Duration::from_millis(1000)
}

fn default_window_capacity() -> usize {
    120
}

fn default_enforce() -> bool {
    true
}

fn default_role_store_path() -> PathBuf {
    PathBuf::from("target/state/roles.json")
}

fn default_inference_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_metrics_enabled() -> bool {
    true
}

/// Primary configuration object for the ComminuSense backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub rbac: RbacConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no candidate existed and built-in defaults are in effect.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "CMS_CONFIG";

    /// Load configuration from disk, respecting the `CMS_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration together with the effective source path.
    ///
    /// An explicit `CMS_CONFIG` path must exist. Otherwise the first existing
    /// candidate wins and the defaults apply when none of them exist.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path.to_path_buf()),
                });
            }
        }

        debug!(
            inspected = candidates.len(),
            "no configuration file found; using defaults"
        );
        let config = Self::default();
        config.validate()?;
        Ok(LoadedAppConfig {
            config,
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.simulation.validate()?;
        self.inference.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_api_listen(),
        }
    }
}

/// Telemetry simulator settings.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_plant_id")]
    pub plant_id: String,
    /// Interval between two samples of a stream subscription.
    #[serde(default = "default_cadence")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub cadence: Duration,
    /// Number of samples retained by rolling-window consumers.
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            plant_id: default_plant_id(),
            cadence: default_cadence(),
            window_capacity: default_window_capacity(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.plant_id.trim().is_empty() {
            return Err(anyhow!("simulation.plant_id must not be empty"));
        }
        if self.cadence.is_zero() {
            return Err(anyhow!("simulation.cadence must be greater than zero"));
        }
        if self.window_capacity == 0 {
            return Err(anyhow!("simulation.window_capacity must be at least 1"));
        }
        Ok(())
    }
}

/// Backing technology for role assignments.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoleStoreBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RbacConfig {
    /// When false every route is served without consulting role assignments.
    #[serde(default = "default_enforce")]
    pub enforce: bool,
    #[serde(default)]
    pub store: RoleStoreBackend,
    #[serde(default = "default_role_store_path")]
    pub store_path: PathBuf,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            enforce: default_enforce(),
            store: RoleStoreBackend::default(),
            store_path: default_role_store_path(),
        }
    }
}

/// Remote model-serving endpoints used by the energy optimiser and
/// maintenance alert pages.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default)]
    pub endpoint: Option<Url>,
    #[serde(default)]
    pub maintenance_endpoint: Option<Url>,
    #[serde(default = "default_inference_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            maintenance_endpoint: None,
            timeout: default_inference_timeout(),
        }
    }
}

impl InferenceConfig {
    pub fn validate(&self) -> Result<()> {
        let endpoints = [
            ("endpoint", &self.endpoint),
            ("maintenance_endpoint", &self.maintenance_endpoint),
        ];
        for (key, endpoint) in endpoints {
            if let Some(endpoint) = endpoint {
                if !matches!(endpoint.scheme(), "http" | "https") {
                    return Err(anyhow!(
                        "inference.{key} must use http or https, got {}",
                        endpoint.scheme()
                    ));
                }
            }
        }
        if self.timeout.is_zero() {
            return Err(anyhow!("inference.timeout must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}
