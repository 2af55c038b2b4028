/*!
 * Session supervisor.
 *
 * Spawns one tokio task per resolved device, hands out their stop signals and
 * collects the session summaries at shutdown. The supervisor never touches the
 * shared transport session.
 */
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{error, info, Instrument};

use labbridge_core::config::StreamConfig;
use labbridge_core::logging::device_span;
use labbridge_core::types::Id;
use labbridge_devices::SensorDevice;

use crate::acquisition::{AcquisitionLoop, SessionSummary, StopSignal, DEFAULT_POLL_INTERVAL};
use crate::error::{Error, Result};
use crate::outlet::{OutletFactory, StreamPublisher};

/// Fail unless exactly the requested number of devices was resolved
pub fn check_device_count(found: usize, requested: usize) -> Result<()> {
    if found == requested {
        Ok(())
    } else {
        Err(Error::resolution(format!(
            "Found {}, but {} were requested",
            found, requested
        )))
    }
}

struct RunningSession {
    id: Id,
    device: String,
    stop: StopSignal,
    handle: JoinHandle<SessionSummary>,
}

/// Owns the running acquisition tasks
pub struct SessionSupervisor {
    publisher: StreamPublisher,
    poll_interval: Duration,
    sessions: Vec<RunningSession>,
}

impl SessionSupervisor {
    /// Create a supervisor publishing through `factory`
    pub fn new(factory: Arc<dyn OutletFactory>, stream_config: StreamConfig) -> Self {
        Self {
            publisher: StreamPublisher::new(factory, stream_config),
            poll_interval: DEFAULT_POLL_INTERVAL,
            sessions: Vec::new(),
        }
    }

    /// Pause between polls for every loop spawned afterwards
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Start streaming one device with the requested channel names
    pub fn spawn(&mut self, device: Box<dyn SensorDevice>, requested: Vec<String>) -> Id {
        let span = device_span(device.order_code(), device.serial_number());
        let acquisition = AcquisitionLoop::new(device, requested, self.publisher.clone())
            .with_poll_interval(self.poll_interval);

        let id = acquisition.id().clone();
        let device = acquisition.device().name().to_string();
        let stop = acquisition.stop_signal();
        info!("Starting session {} for {}", id.short(), device);

        let handle = tokio::spawn(acquisition.run().instrument(span));
        self.sessions.push(RunningSession {
            id: id.clone(),
            device,
            stop,
            handle,
        });
        id
    }

    /// Start one session per device, all with the same requested channels
    pub fn spawn_all(&mut self, devices: Vec<Box<dyn SensorDevice>>, requested: &[String]) -> Vec<Id> {
        devices
            .into_iter()
            .map(|device| self.spawn(device, requested.to_vec()))
            .collect()
    }

    /// Number of sessions started
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session was started
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sessions whose task has not finished yet
    pub fn active(&self) -> usize {
        self.sessions
            .iter()
            .filter(|s| !s.handle.is_finished())
            .count()
    }

    /// Raise every stop signal
    pub fn stop_all(&self) {
        for session in &self.sessions {
            info!("Stopping session {} for {}", session.id.short(), session.device);
            session.stop.stop();
        }
    }

    /// Wait for every task and collect the summaries.
    ///
    /// A task that panicked is logged and has no summary.
    pub async fn join_all(self) -> Vec<SessionSummary> {
        let (names, handles): (Vec<_>, Vec<_>) = self
            .sessions
            .into_iter()
            .map(|s| (s.device, s.handle))
            .unzip();

        join_all(handles)
            .await
            .into_iter()
            .zip(names)
            .filter_map(|(joined, device)| match joined {
                Ok(summary) => Some(summary),
                Err(e) => {
                    error!("Session for {} did not finish: {}", device, Error::from(e));
                    None
                }
            })
            .collect()
    }

    /// Stop every session and wait for them
    pub async fn shutdown(self) -> Vec<SessionSummary> {
        self.stop_all();
        self.join_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::StopReason;
    use crate::outlet::MemoryOutletFactory;
    use labbridge_core::config::{SimulatedDeviceConfig, SimulatedSensorConfig};
    use labbridge_core::types::ConnectionKind;
    use labbridge_devices::sim::SimulatedDevice;

    fn device(serial_number: &str) -> Box<dyn SensorDevice> {
        Box::new(SimulatedDevice::new(SimulatedDeviceConfig {
            name: format!("GDX-FOR {}", serial_number),
            order_code: "GDX-FOR".to_string(),
            serial_number: serial_number.to_string(),
            description: String::new(),
            connection: ConnectionKind::Usb,
            sample_period_ms: 20,
            values_per_reading: 1,
            sensors: vec![SimulatedSensorConfig {
                id: 1,
                label: "Force".to_string(),
                unit: "N".to_string(),
                default: true,
            }],
            fail_open: false,
            disconnect_after_readings: None,
        }))
    }

    #[test]
    fn test_device_count() {
        assert!(check_device_count(2, 2).is_ok());
        let err = check_device_count(1, 2).unwrap_err();
        assert_eq!(err.to_string(), "Resolution error: Found 1, but 2 were requested");
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_sessions_are_independent() {
        let factory = MemoryOutletFactory::new();
        let mut supervisor =
            SessionSupervisor::new(Arc::new(factory.clone()), StreamConfig::default());

        let ids = supervisor.spawn_all(
            vec![device("A1"), device("B2")],
            &["default".to_string()],
        );
        assert_eq!(ids.len(), 2);
        assert_eq!(supervisor.len(), 2);

        tokio::time::sleep(Duration::from_millis(105)).await;
        assert_eq!(supervisor.active(), 2);

        let summaries = supervisor.shutdown().await;
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.reason == StopReason::Requested));

        let samples = factory.samples();
        for name in ["GDX-FOR_A1", "GDX-FOR_B2"] {
            let pushed = samples.iter().filter(|(stream, _)| stream == name).count();
            assert!(pushed >= 4, "{} pushed {}", name, pushed);
        }
    }
}
