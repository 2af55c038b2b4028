/*!
 * Device capability interface.
 *
 * [`SensorDevice`] is the complete set of operations the bridge needs from a
 * device driver. Hardware SDK backends implement it; nothing else of a vendor
 * SDK leaks into the rest of the workspace.
 */
use std::fmt::Debug;

use async_trait::async_trait;
use thiserror::Error;

use labbridge_core::types::ConnectionKind;

use crate::sensor::{SensorDescriptor, SensorId};

/// Error type for device operations
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The device is not open (or not started) for the operation
    #[error("Device not connected")]
    NotConnected,

    /// The device went away during a session
    #[error("Device disconnected: {0}")]
    Disconnected(String),

    /// The device could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// The sensor does not exist on the device
    #[error("Sensor not found: {0}")]
    SensorNotFound(String),

    /// Communication error with the device
    #[error("Communication error: {0}")]
    CommunicationError(String),
}

impl DeviceError {
    /// Whether the device is unreachable or gone, as opposed to a transient
    /// read problem. Streaming sessions end on connectivity faults.
    pub fn is_connectivity_fault(&self) -> bool {
        matches!(
            self,
            DeviceError::NotConnected | DeviceError::Disconnected(_) | DeviceError::Connection(_)
        )
    }
}

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;

/// The operations a device driver has to provide.
///
/// All methods except the identity getters and the sample buffer accessors may
/// block inside the driver; callers never wrap them in timeouts.
#[async_trait]
pub trait SensorDevice: Send + Debug {
    /// Display name, e.g. "GDX-FOR 071000A1"
    fn name(&self) -> &str;

    /// Free-form model description
    fn description(&self) -> &str;

    /// Order (model) code, e.g. "GDX-FOR".
    ///
    /// For wired devices this is only reliable after the device was opened once.
    fn order_code(&self) -> &str;

    /// Serial number
    fn serial_number(&self) -> &str;

    /// How the device is attached
    fn connection(&self) -> ConnectionKind;

    /// Open the device connection
    async fn open(&mut self) -> Result<()>;

    /// Close the device connection
    async fn close(&mut self) -> Result<()>;

    /// Enter acquisition mode so that [`SensorDevice::read`] can be polled
    async fn start(&mut self) -> Result<()>;

    /// Leave acquisition mode
    async fn stop(&mut self) -> Result<()>;

    /// Poll for a new reading. `Ok(true)` means every enabled sensor has new
    /// buffered values.
    async fn read(&mut self) -> Result<bool>;

    /// All sensors the device offers, in transport order
    async fn list_sensors(&mut self) -> Result<Vec<SensorDescriptor>>;

    /// Enable the device-defined default sensor set
    async fn enable_default_sensors(&mut self) -> Result<()>;

    /// Enable the given sensors in addition to those already enabled
    async fn enable_sensors(&mut self, ids: &[SensorId]) -> Result<()>;

    /// The sensors currently enabled, in transport order
    async fn enabled_sensors(&mut self) -> Result<Vec<SensorDescriptor>>;

    /// Values buffered for a sensor since it was last cleared
    fn sensor_values(&self, id: SensorId) -> Result<Vec<f32>>;

    /// Drop the buffered values of a sensor
    fn clear_sensor(&mut self, id: SensorId) -> Result<()>;
}

/// Identity of a reachable device together with its handle.
///
/// Whoever owns a `DeviceInfo` (or the device taken out of it) is the only
/// party that can open the device.
#[derive(Debug)]
pub struct DeviceInfo {
    /// Order (model) code
    pub order_code: String,
    /// Serial number
    pub serial_number: String,
    /// The device handle
    pub device: Box<dyn SensorDevice>,
}

impl DeviceInfo {
    /// Capture the identity currently reported by the device
    pub fn from_device(device: Box<dyn SensorDevice>) -> Self {
        Self {
            order_code: device.order_code().to_string(),
            serial_number: device.serial_number().to_string(),
            device,
        }
    }

    /// Give up the identity and keep the handle
    pub fn into_device(self) -> Box<dyn SensorDevice> {
        self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_faults() {
        assert!(DeviceError::NotConnected.is_connectivity_fault());
        assert!(DeviceError::Disconnected("unplugged".into()).is_connectivity_fault());
        assert!(DeviceError::Connection("busy".into()).is_connectivity_fault());
        assert!(!DeviceError::CommunicationError("crc".into()).is_connectivity_fault());
        assert!(!DeviceError::SensorNotFound("Force".into()).is_connectivity_fault());
    }
}
