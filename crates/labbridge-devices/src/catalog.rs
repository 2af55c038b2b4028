/*!
 * Device catalog.
 *
 * Enumerates the devices reachable through the transport session and reads
 * their identity. Every call probes afresh because devices come and go.
 */
use futures::stream::{self, Stream, StreamExt};
use tracing::{debug, warn};

use crate::device::{DeviceInfo, Result, SensorDevice};
use crate::transport::TransportSession;

/// Enumerates reachable devices
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceCatalog;

impl DeviceCatalog {
    /// Lazily probe every device the transport currently lists.
    ///
    /// Wired devices are opened just long enough to read their identity and
    /// closed again. A device that cannot be opened is logged and left out;
    /// enumeration continues with the next one.
    pub async fn enumerate(
        session: &TransportSession,
    ) -> Result<impl Stream<Item = DeviceInfo> + Send> {
        let devices = session.list_devices().await?;
        Ok(stream::iter(devices).filter_map(probe))
    }

    /// Probe every device and collect the results
    pub async fn collect(session: &TransportSession) -> Result<Vec<DeviceInfo>> {
        let devices = Self::enumerate(session).await?.collect::<Vec<_>>().await;
        debug!("Catalog holds {} devices", devices.len());
        Ok(devices)
    }
}

/// Read the identity of a single device
pub async fn probe(mut device: Box<dyn SensorDevice>) -> Option<DeviceInfo> {
    if device.connection().is_wireless() {
        return Some(DeviceInfo::from_device(device));
    }

    if let Err(e) = device.open().await {
        warn!("Could not connect with {}: {}", device.name(), e);
        return None;
    }

    let mut info = DeviceInfo::from_device(device);
    if let Err(e) = info.device.close().await {
        warn!("Could not close {} after probing: {}", info.device.name(), e);
    }

    debug!(
        order_code = %info.order_code,
        serial = %info.serial_number,
        "Probed device"
    );
    Some(info)
}

#[cfg(all(test, feature = "simulated"))]
mod tests {
    use super::*;
    use crate::sim::tests::device_config;
    use crate::sim::SimulatedTransport;
    use labbridge_core::types::ConnectionMode;

    #[test_log::test(tokio::test)]
    async fn test_failed_open_is_skipped() {
        let mut broken = device_config("GDX-ACC", "A1");
        broken.fail_open = true;
        let transport = SimulatedTransport::new(
            ConnectionMode::Usb,
            vec![broken, device_config("GDX-FOR", "B2")],
        );
        let session = TransportSession::start(Box::new(transport));

        let catalog = DeviceCatalog::collect(&session).await.unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].order_code, "GDX-FOR");
        assert_eq!(catalog[0].serial_number, "B2");

        session.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_wireless_devices_are_not_opened() {
        let mut ble = device_config("GDX-ACC", "A1");
        ble.connection = labbridge_core::types::ConnectionKind::Ble;
        ble.fail_open = true;
        let session = TransportSession::start(Box::new(SimulatedTransport::new(
            ConnectionMode::Ble,
            vec![ble],
        )));

        let catalog = DeviceCatalog::collect(&session).await.unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].order_code, "GDX-ACC");

        session.shutdown().await.unwrap();
    }
}
