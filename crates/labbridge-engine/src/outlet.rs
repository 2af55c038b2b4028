/*!
 * Outbound stream transport.
 *
 * An [`OutletFactory`] opens one [`Outlet`] per device stream. The LSL
 * backend is compiled in with the `lsl` feature; the log backend writes each
 * sample to the diagnostic log, and the memory backend keeps samples for
 * inspection.
 */
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use labbridge_core::config::{OutletBackend, StreamConfig};
use labbridge_devices::{EnabledChannelSet, SensorDevice};

use crate::error::{Error, Result};
use crate::stream::StreamDescriptor;

/// An open outbound stream
pub trait Outlet: Send + Debug {
    /// Send one sample vector downstream
    fn push_sample(&mut self, sample: &[f32]) -> Result<()>;
}

/// Opens outbound streams
pub trait OutletFactory: Send + Sync + Debug {
    /// Backend name used in logs
    fn name(&self) -> &'static str;

    /// Create a stream with the declared metadata
    fn create(&self, descriptor: &StreamDescriptor) -> Result<Box<dyn Outlet>>;
}

/// Pick the factory for the configured backend
pub fn factory_for(config: &StreamConfig) -> Result<Arc<dyn OutletFactory>> {
    match config.backend {
        OutletBackend::Log => Ok(Arc::new(LogOutletFactory)),
        #[cfg(feature = "lsl")]
        OutletBackend::Lsl => Ok(Arc::new(lsl_outlet::LslOutletFactory)),
        #[cfg(not(feature = "lsl"))]
        OutletBackend::Lsl => Err(Error::outlet(
            "LSL backend requested but labbridge was built without the `lsl` feature",
        )),
    }
}

/// Writes every sample to the diagnostic log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOutletFactory;

impl OutletFactory for LogOutletFactory {
    fn name(&self) -> &'static str {
        "log"
    }

    fn create(&self, descriptor: &StreamDescriptor) -> Result<Box<dyn Outlet>> {
        info!("Opened log outlet {} ({})", descriptor.name, descriptor.source_id);
        Ok(Box::new(LogOutlet {
            name: descriptor.name.clone(),
            pushed: 0,
        }))
    }
}

#[derive(Debug)]
struct LogOutlet {
    name: String,
    pushed: u64,
}

impl Outlet for LogOutlet {
    fn push_sample(&mut self, sample: &[f32]) -> Result<()> {
        self.pushed += 1;
        debug!(stream = %self.name, n = self.pushed, "{:?}", sample);
        Ok(())
    }
}

/// Samples recorded by a [`MemoryOutletFactory`], per stream name
pub type Recorded = Arc<Mutex<Vec<(String, Vec<f32>)>>>;

/// Keeps every pushed sample in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryOutletFactory {
    recorded: Recorded,
    fail_after: Option<usize>,
}

impl MemoryOutletFactory {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject pushes once this many samples were recorded
    pub fn failing_after(mut self, samples: usize) -> Self {
        self.fail_after = Some(samples);
        self
    }

    /// Everything pushed so far, in push order
    pub fn samples(&self) -> Vec<(String, Vec<f32>)> {
        self.recorded
            .lock()
            .map(|recorded| recorded.clone())
            .unwrap_or_default()
    }
}

impl OutletFactory for MemoryOutletFactory {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn create(&self, descriptor: &StreamDescriptor) -> Result<Box<dyn Outlet>> {
        Ok(Box::new(MemoryOutlet {
            name: descriptor.name.clone(),
            recorded: Arc::clone(&self.recorded),
            fail_after: self.fail_after,
        }))
    }
}

#[derive(Debug)]
struct MemoryOutlet {
    name: String,
    recorded: Recorded,
    fail_after: Option<usize>,
}

impl Outlet for MemoryOutlet {
    fn push_sample(&mut self, sample: &[f32]) -> Result<()> {
        let mut recorded = self
            .recorded
            .lock()
            .map_err(|_| Error::outlet("sample recorder poisoned"))?;
        if let Some(limit) = self.fail_after {
            if recorded.len() >= limit {
                return Err(Error::outlet(format!("{} stopped accepting samples", self.name)));
            }
        }
        recorded.push((self.name.clone(), sample.to_vec()));
        Ok(())
    }
}

/// Opens outbound streams for devices
#[derive(Debug, Clone)]
pub struct StreamPublisher {
    factory: Arc<dyn OutletFactory>,
    config: StreamConfig,
}

impl StreamPublisher {
    /// Publish through the given backend with the given stream settings
    pub fn new(factory: Arc<dyn OutletFactory>, config: StreamConfig) -> Self {
        Self { factory, config }
    }

    /// Open the outbound stream for a device and its enabled channels.
    ///
    /// The complete description is logged before the stream is created.
    pub fn publish(
        &self,
        device: &dyn SensorDevice,
        enabled: &EnabledChannelSet,
    ) -> Result<(StreamDescriptor, Box<dyn Outlet>)> {
        let descriptor = StreamDescriptor::from_device(device, enabled, &self.config);
        info!(
            "Opening {} outlet {} with {} channels",
            self.factory.name(),
            descriptor.name,
            descriptor.channel_count()
        );
        info!("Stream description:\n{}", descriptor.as_xml()?);
        let outlet = self.factory.create(&descriptor)?;
        Ok((descriptor, outlet))
    }
}

#[cfg(feature = "lsl")]
mod lsl_outlet {
    use lsl::Pushable;

    use super::{Outlet, OutletFactory};
    use crate::error::{Error, Result};
    use crate::stream::{StreamDescriptor, CHUNK_SIZE, MAX_BUFFERED};

    /// Opens Lab Streaming Layer outlets
    #[derive(Debug, Clone, Copy, Default)]
    pub struct LslOutletFactory;

    impl OutletFactory for LslOutletFactory {
        fn name(&self) -> &'static str {
            "lsl"
        }

        fn create(&self, descriptor: &StreamDescriptor) -> Result<Box<dyn Outlet>> {
            let mut info = lsl::StreamInfo::new(
                &descriptor.name,
                &descriptor.stream_type,
                descriptor.channel_count() as u32,
                descriptor.sample_rate,
                lsl::ChannelFormat::Float32,
                &descriptor.source_id,
            )
            .map_err(|e| Error::outlet(format!("Invalid stream info: {:?}", e)))?;

            let mut desc = info.desc();
            desc.append_child("acquisition")
                .append_child_value("manufacturer", &descriptor.manufacturer)
                .append_child_value("model", &descriptor.model)
                .append_child_value("compensated_lag", &descriptor.compensated_lag.to_string());
            let mut channels = desc.append_child("channels");
            for channel in &descriptor.channels {
                channels
                    .append_child("channel")
                    .append_child_value("label", &channel.label)
                    .append_child_value("unit", &channel.unit)
                    .append_child_value("type", &channel.channel_type);
            }

            let outlet = lsl::StreamOutlet::new(&info, CHUNK_SIZE, MAX_BUFFERED)
                .map_err(|e| Error::outlet(format!("Could not open outlet: {:?}", e)))?;
            Ok(Box::new(LslOutlet {
                name: descriptor.name.clone(),
                outlet,
            }))
        }
    }

    struct LslOutlet {
        name: String,
        outlet: lsl::StreamOutlet,
    }

    impl std::fmt::Debug for LslOutlet {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("LslOutlet").field("name", &self.name).finish()
        }
    }

    impl Outlet for LslOutlet {
        fn push_sample(&mut self, sample: &[f32]) -> Result<()> {
            self.outlet
                .push_sample(&sample.to_vec())
                .map_err(|e| Error::outlet(format!("{}: {:?}", self.name, e)))
        }
    }
}

#[cfg(feature = "lsl")]
pub use lsl_outlet::LslOutletFactory;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{ChannelFormat, ChannelMetadata};
    use labbridge_core::config::{SimulatedDeviceConfig, SimulatedSensorConfig};
    use labbridge_core::types::ConnectionKind;
    use labbridge_devices::sim::SimulatedDevice;
    use labbridge_devices::SensorDescriptor;

    fn device() -> SimulatedDevice {
        SimulatedDevice::new(SimulatedDeviceConfig {
            name: "GDX-FOR 071000A1".to_string(),
            order_code: "GDX-FOR".to_string(),
            serial_number: "071000A1".to_string(),
            description: "Go Direct Force and Acceleration".to_string(),
            connection: ConnectionKind::Ble,
            sample_period_ms: 100,
            values_per_reading: 1,
            sensors: vec![SimulatedSensorConfig {
                id: 1,
                label: "Force".to_string(),
                unit: "N".to_string(),
                default: true,
            }],
            fail_open: false,
            disconnect_after_readings: None,
        })
    }

    fn descriptor() -> StreamDescriptor {
        StreamDescriptor {
            name: "GDX-FOR_071000A1".to_string(),
            stream_type: "FOR".to_string(),
            sample_rate: 0.0,
            format: ChannelFormat::Float32,
            source_id: "071000A1".to_string(),
            manufacturer: "Vernier".to_string(),
            model: "Go Direct Force and Acceleration".to_string(),
            compensated_lag: 0.0,
            channels: vec![ChannelMetadata {
                label: "Force".to_string(),
                unit: "N".to_string(),
                channel_type: "vernier".to_string(),
            }],
        }
    }

    #[test]
    fn test_publish_derives_descriptor_from_device() {
        let factory = MemoryOutletFactory::new();
        let publisher = StreamPublisher::new(Arc::new(factory.clone()), StreamConfig::default());
        let device = device();
        let enabled = EnabledChannelSet::new(vec![SensorDescriptor::new(1, "Force", "N")]);

        let (descriptor, mut outlet) = publisher.publish(&device, &enabled).unwrap();
        assert_eq!(descriptor.stream_type, "FOR");
        assert_eq!(descriptor.source_id, "071000A1");
        assert_eq!(descriptor.name, "GDX-FOR_071000A1");
        assert_eq!(descriptor.model, "Go Direct Force and Acceleration");
        assert_eq!(descriptor.channel_count(), 1);

        outlet.push_sample(&[1.0]).unwrap();
        assert_eq!(
            factory.samples(),
            vec![("GDX-FOR_071000A1".to_string(), vec![1.0])]
        );
    }

    #[test]
    fn test_memory_outlet_records() {
        let factory = MemoryOutletFactory::new();
        let mut outlet = factory.create(&descriptor()).unwrap();
        outlet.push_sample(&[1.0, 2.0]).unwrap();

        assert_eq!(
            factory.samples(),
            vec![("GDX-FOR_071000A1".to_string(), vec![1.0, 2.0])]
        );
    }

    #[test]
    fn test_memory_outlet_failure() {
        let factory = MemoryOutletFactory::new().failing_after(1);
        let mut outlet = factory.create(&descriptor()).unwrap();

        outlet.push_sample(&[1.0]).unwrap();
        assert!(matches!(outlet.push_sample(&[2.0]), Err(Error::Outlet(_))));
    }

    #[test]
    fn test_factory_for_log_backend() {
        let config = StreamConfig {
            backend: OutletBackend::Log,
            ..StreamConfig::default()
        };
        assert_eq!(factory_for(&config).unwrap().name(), "log");
    }

    #[cfg(not(feature = "lsl"))]
    #[test]
    fn test_lsl_backend_needs_feature() {
        assert!(factory_for(&StreamConfig::default()).is_err());
    }
}
