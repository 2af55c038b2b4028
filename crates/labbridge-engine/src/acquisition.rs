/*!
 * Per-device acquisition loop.
 *
 * An [`AcquisitionLoop`] owns one device for the lifetime of a streaming
 * session. It negotiates the enabled channels, opens the outbound stream,
 * starts the device and then polls it, pushing one flat sample per reading
 * until it is asked to stop or the device goes away.
 */
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, trace, warn};

use labbridge_core::types::Id;
use labbridge_devices::{EnabledChannelSet, SensorDevice, SensorNegotiator};

use crate::error::{Error, Result};
use crate::outlet::{Outlet, StreamPublisher};
use crate::rate::RateTracker;

/// Default pause between two polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Lifecycle of an acquisition loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionState {
    /// Created, not yet running
    Idle,
    /// Enabling channels and opening the outlet
    Negotiating,
    /// Polling the device and pushing samples
    Streaming,
    /// Finished; the device is stopped and closed
    Stopped,
}

impl AcquisitionState {
    /// State name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionState::Idle => "idle",
            AcquisitionState::Negotiating => "negotiating",
            AcquisitionState::Streaming => "streaming",
            AcquisitionState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The stop signal was raised
    Requested,
    /// The device became unreachable
    Disconnected,
    /// The outbound stream could not be opened or rejected a sample
    OutletFailed,
    /// Channel negotiation or device start failed
    SetupFailed,
}

impl StopReason {
    fn from_setup_error(err: &Error) -> Self {
        if err.is_connectivity_fault() {
            StopReason::Disconnected
        } else if matches!(err, Error::Outlet(_)) {
            StopReason::OutletFailed
        } else {
            StopReason::SetupFailed
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Requested => "stop requested",
            StopReason::Disconnected => "device disconnected",
            StopReason::OutletFailed => "outlet failed",
            StopReason::SetupFailed => "setup failed",
        };
        f.write_str(s)
    }
}

/// Cooperative stop flag shared between a loop and its supervisor
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// A signal that has not been raised
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to stop after its current iteration
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of one streaming session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session id
    pub id: Id,
    /// Device display name
    pub device: String,
    /// Device serial number
    pub serial_number: String,
    /// Samples pushed downstream
    pub samples_pushed: u64,
    /// Why the session ended
    pub reason: StopReason,
    /// When the loop began
    pub started_at: DateTime<Utc>,
    /// When the device was closed
    pub stopped_at: DateTime<Utc>,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) pushed {} samples in {:.1}s, {}",
            self.device,
            self.serial_number,
            self.samples_pushed,
            (self.stopped_at - self.started_at).num_milliseconds() as f64 / 1000.0,
            self.reason
        )
    }
}

/// Streams one device until stopped
pub struct AcquisitionLoop {
    id: Id,
    device: Box<dyn SensorDevice>,
    requested: Vec<String>,
    publisher: StreamPublisher,
    poll_interval: Duration,
    stop: StopSignal,
    state: AcquisitionState,
    enabled: EnabledChannelSet,
    rate: RateTracker,
}

impl fmt::Debug for AcquisitionLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionLoop")
            .field("id", &self.id)
            .field("device", &self.device.name())
            .field("requested", &self.requested)
            .field("state", &self.state)
            .field("enabled", &self.enabled.labels())
            .finish()
    }
}

impl AcquisitionLoop {
    /// Create an idle loop for a device and its requested channel names
    pub fn new(
        device: Box<dyn SensorDevice>,
        requested: Vec<String>,
        publisher: StreamPublisher,
    ) -> Self {
        Self {
            id: Id::new(),
            device,
            requested,
            publisher,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop: StopSignal::new(),
            state: AcquisitionState::Idle,
            enabled: EnabledChannelSet::default(),
            rate: RateTracker::default(),
        }
    }

    /// Use a different pause between polls
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Session id
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Current state
    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// The device being streamed
    pub fn device(&self) -> &dyn SensorDevice {
        self.device.as_ref()
    }

    /// A handle that stops this loop
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    fn transition(&mut self, next: AcquisitionState) {
        debug!("{}: {} -> {}", self.device.name(), self.state, next);
        self.state = next;
    }

    /// Run the session to completion.
    ///
    /// The device is always stopped and closed before this returns.
    pub async fn run(mut self) -> SessionSummary {
        let started_at = Utc::now();

        let (reason, samples_pushed) = match self.setup().await {
            Ok(outlet) => self.stream(outlet).await,
            Err(e) => {
                error!("Could not start streaming {}: {}", self.device.name(), e);
                (StopReason::from_setup_error(&e), 0)
            }
        };

        self.teardown().await;

        let summary = SessionSummary {
            id: self.id.clone(),
            device: self.device.name().to_string(),
            serial_number: self.device.serial_number().to_string(),
            samples_pushed,
            reason,
            started_at,
            stopped_at: Utc::now(),
        };
        info!("Session {} finished: {}", self.id.short(), summary);
        summary
    }

    async fn setup(&mut self) -> Result<Box<dyn Outlet>> {
        self.transition(AcquisitionState::Negotiating);
        let enabled = SensorNegotiator::negotiate(self.device.as_mut(), &self.requested).await?;
        info!("{:?} are enabled. Starting to stream now", enabled.labels());

        let (descriptor, outlet) = self.publisher.publish(self.device.as_ref(), &enabled)?;
        debug!("Outlet {} is open", descriptor.name);

        self.device.start().await?;
        self.enabled = enabled;
        Ok(outlet)
    }

    async fn stream(&mut self, mut outlet: Box<dyn Outlet>) -> (StopReason, u64) {
        self.transition(AcquisitionState::Streaming);
        self.rate.reset();
        let mut pushed: u64 = 0;

        loop {
            if self.stop.is_stopped() {
                return (StopReason::Requested, pushed);
            }

            time::sleep(self.poll_interval).await;

            match self.device.read().await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) if e.is_connectivity_fault() => {
                    warn!("Lost {}: {}", self.device.name(), e);
                    return (StopReason::Disconnected, pushed);
                }
                Err(e) => {
                    trace!("Read from {} failed, no new data: {}", self.device.name(), e);
                    continue;
                }
            }

            let sample = match self.drain() {
                Ok(sample) => sample,
                Err(e) if e.is_connectivity_fault() => {
                    warn!("Lost {}: {}", self.device.name(), e);
                    return (StopReason::Disconnected, pushed);
                }
                Err(e) => {
                    warn!("Dropping reading from {}: {}", self.device.name(), e);
                    continue;
                }
            };

            let now = Instant::now();
            self.rate.record(now);

            if let Err(e) = outlet.push_sample(&sample) {
                error!("Could not push sample from {}: {}", self.device.name(), e);
                return (StopReason::OutletFailed, pushed);
            }
            pushed += 1;

            let elapsed = self
                .rate
                .first_push()
                .map(|first| now.saturating_duration_since(first).as_secs_f64())
                .unwrap_or_default();
            match self.rate.effective_rate() {
                Some(rate) => debug!(
                    "#{:5} with {:?} at {:4.2} approx Fs = {:4.2}",
                    pushed, sample, elapsed, rate
                ),
                None => debug!("#{:5} with {:?} at {:4.2}", pushed, sample, elapsed),
            }
        }
    }

    /// Take every buffered value, channel by channel, clearing as it goes
    fn drain(&mut self) -> labbridge_devices::device::Result<Vec<f32>> {
        let mut sample = Vec::new();
        for sensor in &self.enabled {
            sample.extend(self.device.sensor_values(sensor.id)?);
            self.device.clear_sensor(sensor.id)?;
        }
        Ok(sample)
    }

    async fn teardown(&mut self) {
        if let Err(e) = self.device.stop().await {
            debug!("Stopping {} failed: {}", self.device.name(), e);
        }
        if let Err(e) = self.device.close().await {
            warn!("Closing {} failed: {}", self.device.name(), e);
        }
        self.transition(AcquisitionState::Stopped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outlet::MemoryOutletFactory;
    use labbridge_core::config::{SimulatedDeviceConfig, SimulatedSensorConfig, StreamConfig};
    use labbridge_core::types::ConnectionKind;
    use labbridge_devices::sim::SimulatedDevice;

    fn simulated(disconnect_after_readings: Option<u64>) -> Box<dyn SensorDevice> {
        Box::new(SimulatedDevice::new(SimulatedDeviceConfig {
            name: "GDX-FOR 071000A1".to_string(),
            order_code: "GDX-FOR".to_string(),
            serial_number: "071000A1".to_string(),
            description: String::new(),
            connection: ConnectionKind::Usb,
            sample_period_ms: 10,
            values_per_reading: 2,
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
            disconnect_after_readings,
        }))
    }

    fn acquisition(
        device: Box<dyn SensorDevice>,
        factory: &MemoryOutletFactory,
    ) -> AcquisitionLoop {
        AcquisitionLoop::new(
            device,
            vec!["default".to_string(), "X-axis acceleration".to_string()],
            StreamPublisher::new(Arc::new(factory.clone()), StreamConfig::default()),
        )
    }

    #[test]
    fn test_stop_signal_is_shared() {
        let signal = StopSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_stopped());
        signal.stop();
        assert!(clone.is_stopped());
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_disconnect_ends_session() {
        let factory = MemoryOutletFactory::new();
        let summary = acquisition(simulated(Some(3)), &factory).run().await;

        assert_eq!(summary.reason, StopReason::Disconnected);
        assert_eq!(summary.samples_pushed, 3);

        let samples = factory.samples();
        assert_eq!(samples.len(), 3);
        // two channels, two values each
        assert!(samples.iter().all(|(_, sample)| sample.len() == 4));
        assert_eq!(samples[0].0, "GDX-FOR_071000A1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_request_ends_session() {
        let factory = MemoryOutletFactory::new();
        let acquisition = acquisition(simulated(None), &factory);
        let stop = acquisition.stop_signal();

        let handle = tokio::spawn(acquisition.run());
        time::sleep(Duration::from_millis(55)).await;
        stop.stop();
        let summary = handle.await.unwrap();

        assert_eq!(summary.reason, StopReason::Requested);
        assert!(summary.samples_pushed >= 4);
        assert_eq!(factory.samples().len() as u64, summary.samples_pushed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outlet_failure_ends_session() {
        let factory = MemoryOutletFactory::new().failing_after(2);
        let summary = acquisition(simulated(None), &factory).run().await;

        assert_eq!(summary.reason, StopReason::OutletFailed);
        assert_eq!(summary.samples_pushed, 2);
    }

    #[tokio::test]
    async fn test_open_failure_is_setup_disconnect() {
        let config = SimulatedDeviceConfig {
            name: "GDX-ACC 0K1002Z2".to_string(),
            order_code: "GDX-ACC".to_string(),
            serial_number: "0K1002Z2".to_string(),
            description: String::new(),
            connection: ConnectionKind::Usb,
            sample_period_ms: 10,
            values_per_reading: 1,
            sensors: Vec::new(),
            fail_open: true,
            disconnect_after_readings: None,
        };

        let factory = MemoryOutletFactory::new();
        let summary = acquisition(Box::new(SimulatedDevice::new(config)), &factory)
            .run()
            .await;

        assert_eq!(summary.reason, StopReason::Disconnected);
        assert_eq!(summary.samples_pushed, 0);
        assert!(factory.samples().is_empty());
    }
}
