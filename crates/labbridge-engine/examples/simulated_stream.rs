use std::sync::Arc;
use std::time::Duration;

use labbridge_core::config::{SimulatedDeviceConfig, SimulatedSensorConfig, StreamConfig};
use labbridge_core::logging;
use labbridge_core::types::{ConnectionKind, ConnectionMode};
use labbridge_devices::sim::SimulatedTransport;
use labbridge_devices::{DeviceResolver, MatchCriteria, TransportSession};
use labbridge_engine::{MemoryOutletFactory, ScanReport, SessionSupervisor};

fn device(order_code: &str, serial_number: &str, period_ms: u64) -> SimulatedDeviceConfig {
    SimulatedDeviceConfig {
        name: format!("{} {}", order_code, serial_number),
        order_code: order_code.to_string(),
        serial_number: serial_number.to_string(),
        description: "simulated".to_string(),
        connection: ConnectionKind::Usb,
        sample_period_ms: period_ms,
        values_per_reading: 1,
        sensors: vec![
            SimulatedSensorConfig {
                id: 1,
                label: "Force".to_string(),
                unit: "N".to_string(),
                default: true,
            },
            SimulatedSensorConfig {
                id: 2,
                label: "X-axis acceleration".to_string(),
                unit: "m/s²".to_string(),
                default: false,
            },
        ],
        fail_open: false,
        disconnect_after_readings: None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_with_filter("info,labbridge_engine=debug")?;

    let transport = SimulatedTransport::new(
        ConnectionMode::Usb,
        vec![device("GDX-FOR", "071000A1", 50), device("GDX-FOR", "071000B2", 20)],
    );
    let session = TransportSession::start(Box::new(transport));

    print!("{}", ScanReport::scan(&session).await?.render());

    // Both devices share an order code; each stream is told apart by its serial
    let criteria = MatchCriteria::from_identity(None, Some("GDX-FOR".to_string()));
    let devices = DeviceResolver::resolve(&session, &criteria)
        .await?
        .ok_or("no device matched")?;

    let recorder = MemoryOutletFactory::new();
    let mut supervisor = SessionSupervisor::new(Arc::new(recorder.clone()), StreamConfig::default());
    supervisor.spawn_all(devices, &["default".to_string(), "X-axis acceleration".to_string()]);

    tokio::time::sleep(Duration::from_secs(1)).await;

    for summary in supervisor.shutdown().await {
        println!("{}", summary);
    }
    println!("Recorded {} samples", recorder.samples().len());

    session.shutdown().await?;
    Ok(())
}
