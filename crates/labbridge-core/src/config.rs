/*!
 * Configuration management for labbridge.
 *
 * Settings are layered: built-in defaults, then an optional TOML file, then
 * environment variables (e.g. `LABBRIDGE__TRANSPORT__MODE=ble`). Command-line
 * flags are applied on top by the binary.
 */
use std::path::Path;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{ConnectionKind, ConnectionMode};

/// Environment variable prefix used by [`ConfigBuilder::with_default_environment`]
pub const ENV_PREFIX: &str = "LABBRIDGE";

/// Top-level labbridge configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Device transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Outbound stream configuration
    #[serde(default)]
    pub stream: StreamConfig,

    /// Simulated devices served by the built-in transport
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GeneralConfig {
    /// Wait for the operator to press return before exiting
    #[serde(default)]
    pub pause_on_exit: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to use JSON format for logs
    #[serde(default)]
    pub json_format: bool,
}

/// Device transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Which connection kinds the shared session searches
    #[serde(default)]
    pub mode: ConnectionMode,

    /// Sleep between two read polls of one device, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Outbound stream backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutletBackend {
    /// Lab Streaming Layer outlets (requires the `lsl` feature)
    #[default]
    Lsl,
    /// Write every sample to the debug log
    Log,
}

/// Outbound stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Which outlet backend publishes the streams
    #[serde(default)]
    pub backend: OutletBackend,

    /// Vendor prefix stripped from order codes to form the stream type
    #[serde(default = "default_vendor_prefix")]
    pub vendor_prefix: String,

    /// Manufacturer written into the acquisition metadata
    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,

    /// Type written for every channel
    #[serde(default = "default_channel_type")]
    pub channel_type: String,
}

/// Simulated transport configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SimulationConfig {
    /// Devices visible to the simulated transport
    #[serde(default)]
    pub devices: Vec<SimulatedDeviceConfig>,
}

/// One simulated device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedDeviceConfig {
    /// Display name, e.g. "GDX-FOR 071000A1"
    pub name: String,

    /// Order (model) code, e.g. "GDX-FOR"
    pub order_code: String,

    /// Serial number
    pub serial_number: String,

    /// Free-form model description
    #[serde(default)]
    pub description: String,

    /// How the device is attached
    #[serde(default = "default_connection_kind")]
    pub connection: ConnectionKind,

    /// Time between two readings in milliseconds
    #[serde(default = "default_sample_period_ms")]
    pub sample_period_ms: u64,

    /// Values delivered per sensor and reading
    #[serde(default = "default_values_per_reading")]
    pub values_per_reading: usize,

    /// Available sensors
    #[serde(default)]
    pub sensors: Vec<SimulatedSensorConfig>,

    /// Fail every open attempt
    #[serde(default)]
    pub fail_open: bool,

    /// Report a disconnect after this many successful readings
    #[serde(default)]
    pub disconnect_after_readings: Option<u64>,
}

/// One simulated sensor channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedSensorConfig {
    /// Transport-level sensor number
    pub id: u32,

    /// Human readable label, e.g. "Force"
    pub label: String,

    /// Unit, e.g. "N"
    #[serde(default)]
    pub unit: String,

    /// Part of the device default set
    #[serde(default)]
    pub default: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: ConnectionMode::default(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            backend: OutletBackend::default(),
            vendor_prefix: default_vendor_prefix(),
            manufacturer: default_manufacturer(),
            channel_type: default_channel_type(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1
}

fn default_vendor_prefix() -> String {
    "GDX-".to_string()
}

fn default_manufacturer() -> String {
    "Vernier".to_string()
}

fn default_channel_type() -> String {
    "vernier".to_string()
}

fn default_connection_kind() -> ConnectionKind {
    ConnectionKind::Usb
}

fn default_sample_period_ms() -> u64 {
    100
}

fn default_values_per_reading() -> usize {
    1
}

impl Config {
    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<String>,
    environment_prefix: Option<String>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Read overrides from `LABBRIDGE__*` environment variables
    pub fn with_default_environment(self) -> Self {
        self.with_environment_prefix(ENV_PREFIX)
    }

    /// Build the configuration
    ///
    /// A missing config file is an error: the operator asked for it explicitly.
    pub fn build(self) -> Result<Config> {
        let mut config_builder = ConfigLib::builder();

        // Start with default values
        let default_config = Config::default();
        config_builder = config_builder.add_source(
            ConfigLib::try_from(&default_config)
                .map_err(|e| Error::config(format!("Failed to create default config: {}", e)))?,
        );

        if let Some(config_file) = self.config_file {
            let path = Path::new(&config_file);
            if !path.exists() {
                return Err(Error::config(format!(
                    "Configuration file {} does not exist",
                    config_file
                )));
            }
            debug!("Loading configuration from {}", config_file);
            config_builder = config_builder.add_source(File::from(path));
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            config_builder = config_builder.add_source(
                Environment::with_prefix(&prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config_lib = config_builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?;

        let config: Config = config_lib
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;

        info!(
            mode = %config.transport.mode,
            simulated_devices = config.simulation.devices.len(),
            "Configuration loaded"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.transport.mode, ConnectionMode::Usb);
        assert_eq!(config.transport.poll_interval_ms, 1);
        assert_eq!(config.stream.vendor_prefix, "GDX-");
        assert_eq!(config.stream.backend, OutletBackend::Lsl);
        assert!(config.simulation.devices.is_empty());
        assert!(!config.general.pause_on_exit);
    }

    #[test]
    fn test_config_builder_defaults() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.stream.manufacturer, "Vernier");
    }

    #[test]
    fn test_config_builder_with_file() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("labbridge.toml");

        {
            let mut file = File::create(&file_path)?;
            file.write_all(
                br#"
                [transport]
                mode = "any"
                poll_interval_ms = 5

                [stream]
                backend = "log"

                [[simulation.devices]]
                name = "GDX-FOR 071000A1"
                order_code = "GDX-FOR"
                serial_number = "071000A1"
                connection = "ble"

                [[simulation.devices.sensors]]
                id = 1
                label = "Force"
                unit = "N"
                default = true
            "#,
            )?;
        }

        let config = ConfigBuilder::new().with_config_file(&file_path).build()?;

        assert_eq!(config.transport.mode, ConnectionMode::Any);
        assert_eq!(config.transport.poll_interval_ms, 5);
        assert_eq!(config.stream.backend, OutletBackend::Log);
        assert_eq!(config.stream.vendor_prefix, "GDX-");
        assert_eq!(config.simulation.devices.len(), 1);

        let device = &config.simulation.devices[0];
        assert_eq!(device.connection, ConnectionKind::Ble);
        assert_eq!(device.sample_period_ms, 100);
        assert_eq!(device.sensors[0].label, "Force");
        assert!(device.sensors[0].default);
        assert!(device.disconnect_after_readings.is_none());

        Ok(())
    }

    #[test]
    fn test_config_builder_missing_file() {
        let result = ConfigBuilder::new()
            .with_config_file("/nonexistent/labbridge.toml")
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_config_builder_with_env() -> Result<()> {
        env::set_var("LBTEST__TRANSPORT__MODE", "ble");
        env::set_var("LBTEST__LOGGING__LEVEL", "trace");

        let config = ConfigBuilder::new()
            .with_environment_prefix("LBTEST")
            .build()?;

        assert_eq!(config.transport.mode, ConnectionMode::Ble);
        assert_eq!(config.logging.level, "trace");

        env::remove_var("LBTEST__TRANSPORT__MODE");
        env::remove_var("LBTEST__LOGGING__LEVEL");

        Ok(())
    }

    #[test]
    fn test_to_toml() -> Result<()> {
        let rendered = Config::default().to_toml()?;
        assert!(rendered.contains("[transport]"));
        assert!(rendered.contains("mode = \"usb\""));
        Ok(())
    }
}
