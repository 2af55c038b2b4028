/*!
 * Device scan report.
 *
 * Lists every reachable device with its sensors, marking the ones in the
 * device default set. Rendered as text for the operator or as JSON.
 */
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use labbridge_core::types::ConnectionMode;
use labbridge_devices::{DeviceCatalog, DeviceInfo, SensorNegotiator, TransportSession};

use crate::error::Result;

/// First line of every text report
pub const BANNER: &str = "Available devices. Default sensors are marked by *.";

/// Printed instead of device blocks when nothing was found
pub const NO_DEVICES: &str = "Found no devices.";

const SEPARATOR: &str = "---------------------------------------------------";

/// A sensor as listed in the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedSensor {
    /// Sensor label
    pub label: String,
    /// Part of the device default set
    pub default: bool,
}

/// A device as listed in the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedDevice {
    /// Order code
    pub order_code: String,
    /// Serial number
    pub serial_number: String,
    /// Display name
    pub name: String,
    /// Sensors in device order
    pub sensors: Vec<ScannedSensor>,
}

/// Result of a device scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    /// When the scan ran
    pub generated_at: DateTime<Utc>,
    /// Connection kinds searched
    pub mode: ConnectionMode,
    /// Devices found
    pub devices: Vec<ScannedDevice>,
}

impl ScanReport {
    /// Probe every reachable device and list its sensors
    pub async fn scan(session: &TransportSession) -> Result<Self> {
        let mut devices = Vec::new();
        for info in DeviceCatalog::collect(session).await? {
            if let Some(device) = describe(info).await {
                devices.push(device);
            }
        }

        Ok(Self {
            generated_at: Utc::now(),
            mode: session.mode(),
            devices,
        })
    }

    /// Number of devices found
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no device was found
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Text report for the terminal
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", BANNER);
        for device in &self.devices {
            let _ = writeln!(out, "{}", SEPARATOR);
            let _ = writeln!(out, "{} {}", device.order_code, device.serial_number);
            for sensor in &device.sensors {
                let mark = if sensor.default { "*" } else { " " };
                let _ = writeln!(out, "{} {} {}", mark, sensor.label, mark);
            }
        }
        if self.devices.is_empty() {
            let _ = writeln!(out, "{}", NO_DEVICES);
        }
        out
    }

    /// Pretty JSON report
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

async fn describe(mut info: DeviceInfo) -> Option<ScannedDevice> {
    let device = info.device.as_mut();
    let available = match SensorNegotiator::available_sensors(device).await {
        Ok(available) => available,
        Err(e) => {
            warn!("Could not list sensors of {}: {}", device.name(), e);
            return None;
        }
    };
    let defaults = match SensorNegotiator::default_sensors(device).await {
        Ok(defaults) => defaults,
        Err(e) => {
            warn!("Could not read default sensors of {}: {}", device.name(), e);
            Vec::new()
        }
    };

    Some(ScannedDevice {
        name: device.name().to_string(),
        sensors: available
            .into_iter()
            .map(|label| ScannedSensor {
                default: defaults.contains(&label),
                label,
            })
            .collect(),
        order_code: info.order_code,
        serial_number: info.serial_number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(devices: Vec<ScannedDevice>) -> ScanReport {
        ScanReport {
            generated_at: Utc::now(),
            mode: ConnectionMode::Usb,
            devices,
        }
    }

    #[test]
    fn test_render_marks_defaults() {
        let text = report(vec![ScannedDevice {
            order_code: "GDX-FOR".to_string(),
            serial_number: "071000A1".to_string(),
            name: "GDX-FOR 071000A1".to_string(),
            sensors: vec![
                ScannedSensor {
                    label: "Force".to_string(),
                    default: true,
                },
                ScannedSensor {
                    label: "X-axis acceleration".to_string(),
                    default: false,
                },
            ],
        }])
        .render();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], BANNER);
        assert_eq!(lines[2], "GDX-FOR 071000A1");
        assert_eq!(lines[3], "* Force *");
        assert_eq!(lines[4], "  X-axis acceleration  ");
        assert!(!text.contains(NO_DEVICES));
    }

    #[test]
    fn test_json_report() {
        let json = report(Vec::new()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["mode"], "usb");
        assert!(value["devices"].as_array().unwrap().is_empty());
    }
}
