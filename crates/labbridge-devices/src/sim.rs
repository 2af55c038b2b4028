/*!
 * Simulated transport.
 *
 * Serves devices described in the `[[simulation.devices]]` configuration
 * tables. Readings are sine waves paced by the configured sample period, so
 * the whole pipeline can be exercised without hardware.
 */
use std::collections::HashMap;
use std::f32::consts::TAU;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use labbridge_core::config::SimulatedDeviceConfig;
use labbridge_core::types::{ConnectionKind, ConnectionMode};

use crate::device::{DeviceError, Result, SensorDevice};
use crate::sensor::{SensorDescriptor, SensorId};
use crate::transport::Transport;

/// Samples per sine period
const WAVE_LENGTH: f32 = 50.0;

/// Transport backed by configured device descriptions
#[derive(Debug, Clone)]
pub struct SimulatedTransport {
    mode: ConnectionMode,
    devices: Vec<SimulatedDeviceConfig>,
}

impl SimulatedTransport {
    /// Create a transport searching `mode` among the given devices
    pub fn new(mode: ConnectionMode, devices: Vec<SimulatedDeviceConfig>) -> Self {
        Self { mode, devices }
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn mode(&self) -> ConnectionMode {
        self.mode
    }

    async fn list_devices(&self) -> Result<Vec<Box<dyn SensorDevice>>> {
        Ok(self
            .devices
            .iter()
            .filter(|config| self.mode.includes(config.connection))
            .map(|config| Box::new(SimulatedDevice::new(config.clone())) as Box<dyn SensorDevice>)
            .collect())
    }

    async fn quit(&self) -> Result<()> {
        info!("Simulated transport released");
        Ok(())
    }
}

/// A simulated sensor device.
///
/// Like real wired devices, a USB device reports an empty order code until it
/// has been opened once.
pub struct SimulatedDevice {
    config: SimulatedDeviceConfig,
    sensors: Vec<SensorDescriptor>,
    identified: bool,
    open: bool,
    started: bool,
    enabled: Vec<SensorId>,
    buffers: HashMap<SensorId, Vec<f32>>,
    readings: u64,
    samples: u64,
    next_reading: Option<Instant>,
}

impl fmt::Debug for SimulatedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedDevice")
            .field("name", &self.config.name)
            .field("connection", &self.config.connection)
            .field("open", &self.open)
            .field("started", &self.started)
            .field("enabled", &self.enabled)
            .field("readings", &self.readings)
            .finish()
    }
}

impl SimulatedDevice {
    /// Create a closed device from its description
    pub fn new(config: SimulatedDeviceConfig) -> Self {
        let sensors = config
            .sensors
            .iter()
            .map(|s| SensorDescriptor::new(s.id, s.label.clone(), s.unit.clone()))
            .collect();
        Self {
            identified: config.connection.is_wireless(),
            config,
            sensors,
            open: false,
            started: false,
            enabled: Vec::new(),
            buffers: HashMap::new(),
            readings: 0,
            samples: 0,
            next_reading: None,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(DeviceError::NotConnected)
        }
    }

    fn period(&self) -> Duration {
        Duration::from_millis(self.config.sample_period_ms.max(1))
    }

    fn known(&self, id: SensorId) -> Result<()> {
        if self.sensors.iter().any(|s| s.id == id) {
            Ok(())
        } else {
            Err(DeviceError::SensorNotFound(format!(
                "{} on {}",
                id, self.config.name
            )))
        }
    }

    /// Keep the enabled list in the order the device lists its sensors
    fn enable(&mut self, id: SensorId) {
        if !self.enabled.contains(&id) {
            self.enabled.push(id);
            let order: Vec<SensorId> = self.sensors.iter().map(|s| s.id).collect();
            self.enabled
                .sort_by_key(|id| order.iter().position(|o| o == id));
        }
    }

    fn generate(&mut self) {
        let per_reading = self.config.values_per_reading.max(1);
        for (index, id) in self.enabled.iter().enumerate() {
            let buffer = self.buffers.entry(*id).or_default();
            for k in 0..per_reading {
                let n = (self.samples + k as u64) as f32;
                let phase = TAU * n / WAVE_LENGTH + index as f32;
                buffer.push(phase.sin() + id.0 as f32);
            }
        }
        self.samples += per_reading as u64;
    }
}

#[async_trait]
impl SensorDevice for SimulatedDevice {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn order_code(&self) -> &str {
        if self.identified {
            &self.config.order_code
        } else {
            ""
        }
    }

    fn serial_number(&self) -> &str {
        &self.config.serial_number
    }

    fn connection(&self) -> ConnectionKind {
        self.config.connection
    }

    async fn open(&mut self) -> Result<()> {
        if self.config.fail_open {
            return Err(DeviceError::Connection(format!(
                "{} refused to open",
                self.config.name
            )));
        }
        self.open = true;
        self.identified = true;
        debug!("Opened {}", self.config.name);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        self.started = false;
        self.enabled.clear();
        self.buffers.clear();
        self.next_reading = None;
        debug!("Closed {}", self.config.name);
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.started = true;
        self.next_reading = Some(Instant::now() + self.period());
        debug!("Started {} with period {:?}", self.config.name, self.period());
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.started = false;
        self.next_reading = None;
        Ok(())
    }

    async fn read(&mut self) -> Result<bool> {
        self.ensure_open()?;
        if !self.started {
            return Err(DeviceError::CommunicationError(format!(
                "{} is not started",
                self.config.name
            )));
        }

        if let Some(limit) = self.config.disconnect_after_readings {
            if self.readings >= limit {
                self.open = false;
                self.started = false;
                return Err(DeviceError::Disconnected(self.config.name.clone()));
            }
        }

        let now = Instant::now();
        match self.next_reading {
            Some(due) if now >= due => {
                self.generate();
                self.readings += 1;
                self.next_reading = Some(due + self.period());
                trace!("{} produced reading {}", self.config.name, self.readings);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_sensors(&mut self) -> Result<Vec<SensorDescriptor>> {
        self.ensure_open()?;
        Ok(self.sensors.clone())
    }

    async fn enable_default_sensors(&mut self) -> Result<()> {
        self.ensure_open()?;
        let defaults: Vec<SensorId> = self
            .config
            .sensors
            .iter()
            .filter(|s| s.default)
            .map(|s| SensorId(s.id))
            .collect();
        for id in defaults {
            self.enable(id);
        }
        Ok(())
    }

    async fn enable_sensors(&mut self, ids: &[SensorId]) -> Result<()> {
        self.ensure_open()?;
        for id in ids {
            self.known(*id)?;
        }
        for id in ids {
            self.enable(*id);
        }
        Ok(())
    }

    async fn enabled_sensors(&mut self) -> Result<Vec<SensorDescriptor>> {
        self.ensure_open()?;
        Ok(self
            .enabled
            .iter()
            .filter_map(|id| self.sensors.iter().find(|s| s.id == *id).cloned())
            .collect())
    }

    fn sensor_values(&self, id: SensorId) -> Result<Vec<f32>> {
        self.known(id)?;
        Ok(self.buffers.get(&id).cloned().unwrap_or_default())
    }

    fn clear_sensor(&mut self, id: SensorId) -> Result<()> {
        self.known(id)?;
        if let Some(buffer) = self.buffers.get_mut(&id) {
            buffer.clear();
        }
        Ok(())
    }
}
