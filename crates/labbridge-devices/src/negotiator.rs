/*!
 * Sensor channel negotiation.
 *
 * Turns the operator's requested channel names into the set of sensors the
 * device actually has enabled. The device's read-back list, not the request,
 * decides membership and order.
 */
use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::device::{Result, SensorDevice};
use crate::sensor::{EnabledChannelSet, SensorId};

/// Requested name that enables the device-defined default set
pub const DEFAULT_SENTINEL: &str = "default";

/// Split a command-line channel list such as `[default], Force` into names.
///
/// Square brackets are stripped, entries trimmed and empty entries dropped.
pub fn parse_channel_list(list: &str) -> Vec<String> {
    list.replace(['[', ']'], "")
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Enables requested channels on a device
#[derive(Debug, Clone, Copy, Default)]
pub struct SensorNegotiator;

impl SensorNegotiator {
    /// Open the device and enable the requested channels.
    ///
    /// Unknown names are logged and skipped. Duplicates are harmless. The
    /// device is left open for the streaming session that follows.
    pub async fn negotiate(
        device: &mut dyn SensorDevice,
        requested: &[String],
    ) -> Result<EnabledChannelSet> {
        device.open().await?;

        let available: HashMap<String, SensorId> = device
            .list_sensors()
            .await?
            .into_iter()
            .map(|s| (s.label, s.id))
            .collect();

        for name in requested.iter().map(|n| n.trim()) {
            if name.is_empty() {
                continue;
            }
            if name == DEFAULT_SENTINEL {
                debug!("Enabling default sensors on {}", device.name());
                device.enable_default_sensors().await?;
                continue;
            }
            match available.get(name) {
                Some(id) => {
                    debug!("Enabling {} ({}) on {}", name, id, device.name());
                    device.enable_sensors(&[*id]).await?;
                }
                None => warn!("{} has no sensor named {:?}, skipping", device.name(), name),
            }
        }

        let enabled = EnabledChannelSet::new(device.enabled_sensors().await?);
        info!(
            "{} streams {} channels: {:?}",
            device.name(),
            enabled.len(),
            enabled.labels()
        );
        Ok(enabled)
    }

    /// Labels of every sensor the device offers. Opens and closes the device.
    pub async fn available_sensors(device: &mut dyn SensorDevice) -> Result<Vec<String>> {
        device.open().await?;
        let listed = device.list_sensors().await;
        device.close().await?;
        Ok(listed?.into_iter().map(|s| s.label).collect())
    }

    /// Labels of the device default set. Opens and closes the device.
    pub async fn default_sensors(device: &mut dyn SensorDevice) -> Result<Vec<String>> {
        device.open().await?;
        let enabled = match device.enable_default_sensors().await {
            Ok(()) => device.enabled_sensors().await,
            Err(e) => Err(e),
        };
        device.close().await?;
        Ok(enabled?.into_iter().map(|s| s.label).collect())
    }
}

#[cfg(all(test, feature = "simulated"))]
mod tests {
    use super::*;
    use crate::sim::tests::{device_config, sensor};
    use crate::sim::SimulatedDevice;

    fn accel_force_device() -> SimulatedDevice {
        let mut config = device_config("GDX-FOR", "071000A1");
        config.sensors = vec![
            sensor(1, "Force", "N", false),
            sensor(2, "Accel", "m/s²", true),
        ];
        SimulatedDevice::new(config)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_channel_list() {
        assert_eq!(parse_channel_list("[default]"), vec!["default"]);
        assert_eq!(
            parse_channel_list(" Force , X-axis acceleration,,"),
            vec!["Force", "X-axis acceleration"]
        );
        assert!(parse_channel_list("[]").is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_default_and_explicit_are_united() {
        let mut device = accel_force_device();
        let enabled = SensorNegotiator::negotiate(&mut device, &names(&["default", "Force"]))
            .await
            .unwrap();

        // transport order, not request order
        assert_eq!(enabled.labels(), vec!["Force", "Accel"]);
    }

    #[tokio::test]
    async fn test_duplicates_are_idempotent() {
        let mut once = accel_force_device();
        let single = SensorNegotiator::negotiate(&mut once, &names(&["Force", "default"]))
            .await
            .unwrap();

        let mut twice = accel_force_device();
        let repeated =
            SensorNegotiator::negotiate(&mut twice, &names(&["Force", " Force ", "default", "default"]))
                .await
                .unwrap();

        assert_eq!(repeated, single);
        assert_eq!(repeated.labels(), vec!["Force", "Accel"]);
    }

    #[test_log::test(tokio::test)]
    async fn test_unknown_name_is_skipped() {
        let mut device = accel_force_device();
        let enabled = SensorNegotiator::negotiate(&mut device, &names(&["Pressure", "Force"]))
            .await
            .unwrap();
        assert_eq!(enabled.labels(), vec!["Force"]);
    }

    #[tokio::test]
    async fn test_empty_request_enables_nothing() {
        let mut device = accel_force_device();
        let enabled = SensorNegotiator::negotiate(&mut device, &[]).await.unwrap();
        assert!(enabled.is_empty());
    }

    #[tokio::test]
    async fn test_scan_helpers_close_device() {
        let mut device = accel_force_device();
        assert_eq!(
            SensorNegotiator::available_sensors(&mut device).await.unwrap(),
            vec!["Force", "Accel"]
        );
        assert_eq!(
            SensorNegotiator::default_sensors(&mut device).await.unwrap(),
            vec!["Accel"]
        );
        assert!(device.list_sensors().await.is_err());
    }

    #[tokio::test]
    async fn test_open_failure_propagates() {
        let mut config = device_config("GDX-FOR", "071000A1");
        config.fail_open = true;
        let mut device = SimulatedDevice::new(config);

        let err = SensorNegotiator::negotiate(&mut device, &names(&["default"]))
            .await
            .unwrap_err();
        assert!(err.is_connectivity_fault());
    }
}
