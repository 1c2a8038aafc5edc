//! ---
//! gdm_section: "01-core-functionality"
//! gdm_subsection: "module"
//! gdm_type: "source"
//! gdm_scope: "code"
//! gdm_description: "Shared primitives and utilities for the derating monitor."
//! gdm_version: "v0.1.0"
//! gdm_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

/// Fraction of the rated current used as the hysteresis margin when the
/// operator does not configure one explicitly.
pub const DEFAULT_HYSTERESIS_FRACTION: f64 = 0.005;

fn default_mode() -> Mode {
    Mode::Production
}

fn default_output_safety_factor() -> f64 {
    1.0
}

fn default_debounce_ticks() -> u32 {
    2
}

fn default_bus_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_outdoor_temperature_topic() -> String {
    "sensors/outdoor-temperature".to_owned()
}

fn default_generator_temperature_topic() -> String {
    "sensors/generator-temperature".to_owned()
}

fn default_altitude_topic() -> String {
    "gps/altitude".to_owned()
}

fn default_enable_switch_topic() -> String {
    "digital-input/derate-enable".to_owned()
}

fn default_current_limit_topic() -> String {
    "generator/max-output-current".to_owned()
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for the derating monitor.
///
/// The `[derate]` and `[control]` tables carry the operational parameters
/// and are required; a file missing any of them is rejected at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_mode")]
    pub mode: Mode,
    pub derate: DerateConfig,
    pub control: ControlConfig,
    #[serde(default)]
    pub bus: BusTopics,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "GDM_CONFIG";

    /// Load configuration from disk, respecting the `GDM_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// The hysteresis margin in amps, falling back to a fraction of the
    /// rated current when not configured.
    pub fn hysteresis_margin(&self) -> f64 {
        self.control
            .hysteresis_margin
            .unwrap_or(self.derate.rated_output_current * DEFAULT_HYSTERESIS_FRACTION)
    }

    /// Validate structural invariants. Any violation is a fatal startup error.
    pub fn validate(&self) -> Result<()> {
        self.derate.validate()?;
        self.control.validate()?;
        self.bus.validate()?;
        if let Some(margin) = self.control.hysteresis_margin {
            if margin >= self.derate.rated_output_current {
                return Err(anyhow!(
                    "control.hysteresis_margin ({}) must be smaller than derate.rated_output_current ({})",
                    margin,
                    self.derate.rated_output_current
                ));
            }
        }
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

/// Operating mode for the daemon.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Production,
    Simulation,
}

impl Mode {
    pub fn is_simulation(&self) -> bool {
        matches!(self, Mode::Simulation)
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Mode::Production),
            "simulation" => Ok(Mode::Simulation),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

/// Derating parameters. Every field except `output_safety_factor` is
/// required; refusing to run beats running with a guessed current limit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DerateConfig {
    /// Rated output capacity of the generator in amps.
    pub rated_output_current: f64,
    /// Amps lost per degree above `temp_reference`.
    pub temp_derate_coefficient: f64,
    /// Temperature above which derating begins.
    pub temp_reference: f64,
    /// Amps lost per altitude unit above `altitude_reference`.
    pub altitude_derate_coefficient: f64,
    /// Altitude above which derating begins. Negative values are valid.
    pub altitude_reference: f64,
    /// Floor below which the published limit is never reduced.
    pub min_output_current: f64,
    /// Multiplier applied to the rated current before derating, keeping the
    /// generator off its absolute maximum. 1.0 disables the buffer.
    #[serde(default = "default_output_safety_factor")]
    pub output_safety_factor: f64,
}

impl DerateConfig {
    /// The working ceiling: rated current scaled by the safety factor.
    pub fn ceiling(&self) -> f64 {
        self.rated_output_current * self.output_safety_factor
    }

    pub fn validate(&self) -> Result<()> {
        if self.rated_output_current <= 0.0 {
            return Err(anyhow!(
                "derate.rated_output_current must be positive, got {}",
                self.rated_output_current
            ));
        }
        if self.temp_derate_coefficient < 0.0 {
            return Err(anyhow!(
                "derate.temp_derate_coefficient must not be negative, got {}",
                self.temp_derate_coefficient
            ));
        }
        if self.altitude_derate_coefficient < 0.0 {
            return Err(anyhow!(
                "derate.altitude_derate_coefficient must not be negative, got {}",
                self.altitude_derate_coefficient
            ));
        }
        if self.min_output_current < 0.0 {
            return Err(anyhow!(
                "derate.min_output_current must not be negative, got {}",
                self.min_output_current
            ));
        }
        if self.min_output_current > self.rated_output_current {
            return Err(anyhow!(
                "derate.min_output_current ({}) must not exceed derate.rated_output_current ({})",
                self.min_output_current,
                self.rated_output_current
            ));
        }
        if !(self.output_safety_factor > 0.0 && self.output_safety_factor <= 1.0) {
            return Err(anyhow!(
                "derate.output_safety_factor must be in (0, 1], got {}",
                self.output_safety_factor
            ));
        }
        if self.min_output_current > self.ceiling() {
            return Err(anyhow!(
                "derate.min_output_current ({}) must not exceed the derated ceiling ({})",
                self.min_output_current,
                self.ceiling()
            ));
        }
        Ok(())
    }
}

/// Control-loop pacing and robustness knobs.
#[serde_as]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Seconds between polls of the sensor bus.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub poll_interval: Duration,
    /// Minimum change in amps before the limit is re-published. Defaults to
    /// a fraction of the rated current, see [`DEFAULT_HYSTERESIS_FRACTION`].
    #[serde(default)]
    pub hysteresis_margin: Option<f64>,
    /// Consecutive identical switch readings required before the loop
    /// changes state.
    #[serde(default = "default_debounce_ticks")]
    pub debounce_ticks: u32,
    /// Bound on any single bus read or write.
    #[serde(default = "default_bus_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub bus_timeout: Duration,
}

impl ControlConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(anyhow!("control.poll_interval must be positive"));
        }
        if let Some(margin) = self.hysteresis_margin {
            if margin < 0.0 {
                return Err(anyhow!(
                    "control.hysteresis_margin must not be negative, got {}",
                    margin
                ));
            }
        }
        if self.debounce_ticks == 0 {
            return Err(anyhow!("control.debounce_ticks must be at least 1"));
        }
        if self.bus_timeout.is_zero() {
            return Err(anyhow!("control.bus_timeout must be positive"));
        }
        Ok(())
    }
}

/// Topic paths on the gateway value bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusTopics {
    #[serde(default = "default_outdoor_temperature_topic")]
    pub outdoor_temperature: String,
    #[serde(default = "default_generator_temperature_topic")]
    pub generator_temperature: String,
    #[serde(default = "default_altitude_topic")]
    pub altitude: String,
    /// Digital input, already normalized so `true` means derating enabled.
    #[serde(default = "default_enable_switch_topic")]
    pub enable_switch: String,
    /// Write topic carrying the generator's allowed maximum output current.
    #[serde(default = "default_current_limit_topic")]
    pub current_limit: String,
}

impl Default for BusTopics {
    fn default() -> Self {
        Self {
            outdoor_temperature: default_outdoor_temperature_topic(),
            generator_temperature: default_generator_temperature_topic(),
            altitude: default_altitude_topic(),
            enable_switch: default_enable_switch_topic(),
            current_limit: default_current_limit_topic(),
        }
    }
}

impl BusTopics {
    pub fn validate(&self) -> Result<()> {
        for (name, topic) in [
            ("bus.outdoor_temperature", &self.outdoor_temperature),
            ("bus.generator_temperature", &self.generator_temperature),
            ("bus.altitude", &self.altitude),
            ("bus.enable_switch", &self.enable_switch),
            ("bus.current_limit", &self.current_limit),
        ] {
            if topic.trim().is_empty() {
                return Err(anyhow!("{} must not be empty", name));
            }
        }
        Ok(())
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
