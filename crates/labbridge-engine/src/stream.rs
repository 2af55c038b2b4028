/*!
 * Outbound stream metadata.
 *
 * A [`StreamDescriptor`] is everything a downstream consumer learns about a
 * device stream before the first sample: name, type, channel layout and the
 * serial number used to tell identical device models apart.
 */
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};

use labbridge_core::config::StreamConfig;
use labbridge_devices::{EnabledChannelSet, SensorDevice};

use crate::error::{Error, Result};

/// Samples per outbound chunk. Zero sends every sample immediately.
pub const CHUNK_SIZE: i32 = 0;

/// Outlet buffer depth in samples
pub const MAX_BUFFERED: i32 = 1;

/// Nominal rate of a stream whose transport exposes no reliable period
pub const IRREGULAR_RATE: f64 = 0.0;

/// Declared lag between measurement and push, in seconds
pub const COMPENSATED_LAG: f64 = 0.0;

/// Value format of every outbound channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelFormat {
    /// 32-bit float
    Float32,
}

impl ChannelFormat {
    /// Format name as written in the stream description
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelFormat::Float32 => "float32",
        }
    }
}

/// Metadata of one outbound channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMetadata {
    /// Sensor label
    pub label: String,
    /// Sensor unit
    pub unit: String,
    /// Channel type tag
    #[serde(rename = "type")]
    pub channel_type: String,
}

/// Declared metadata of an outbound stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Stream name, the device name with spaces replaced
    pub name: String,
    /// Stream type, the order code without vendor prefix
    pub stream_type: String,
    /// Nominal sample rate, zero when irregular
    pub sample_rate: f64,
    /// Value format
    pub format: ChannelFormat,
    /// Device serial number
    pub source_id: String,
    /// Manufacturer written into the acquisition block
    pub manufacturer: String,
    /// Device model, taken from its description
    pub model: String,
    /// Lag already compensated for, in seconds
    pub compensated_lag: f64,
    /// Channels in sample vector order
    pub channels: Vec<ChannelMetadata>,
}

impl StreamDescriptor {
    /// Derive the descriptor of a device stream
    pub fn from_device(
        device: &dyn SensorDevice,
        enabled: &EnabledChannelSet,
        config: &StreamConfig,
    ) -> Self {
        let channels = enabled
            .iter()
            .map(|sensor| ChannelMetadata {
                label: sensor.label.clone(),
                unit: sensor.unit.clone(),
                channel_type: config.channel_type.clone(),
            })
            .collect();

        Self {
            name: stream_name(device.name()),
            stream_type: stream_type(device.order_code(), &config.vendor_prefix),
            sample_rate: IRREGULAR_RATE,
            format: ChannelFormat::Float32,
            source_id: device.serial_number().to_string(),
            manufacturer: config.manufacturer.clone(),
            model: device.description().to_string(),
            compensated_lag: COMPENSATED_LAG,
            channels,
        }
    }

    /// Number of channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Render the full `<info>` description as XML
    pub fn as_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        self.write_info(&mut writer)?;
        String::from_utf8(writer.into_inner())
            .map_err(|e| Error::Serialization(format!("stream description is not UTF-8: {}", e)))
    }

    fn write_info(&self, writer: &mut Writer<Vec<u8>>) -> quick_xml::Result<()> {
        writer.write_event(Event::Decl(BytesDecl::new("1.0", None, None)))?;
        writer.write_event(Event::Start(BytesStart::new("info")))?;

        text_element(writer, "name", &self.name)?;
        text_element(writer, "type", &self.stream_type)?;
        text_element(writer, "channel_count", &self.channel_count().to_string())?;
        text_element(writer, "nominal_srate", &self.sample_rate.to_string())?;
        text_element(writer, "channel_format", self.format.as_str())?;
        text_element(writer, "source_id", &self.source_id)?;

        writer.write_event(Event::Start(BytesStart::new("desc")))?;

        writer.write_event(Event::Start(BytesStart::new("acquisition")))?;
        text_element(writer, "manufacturer", &self.manufacturer)?;
        text_element(writer, "model", &self.model)?;
        text_element(writer, "compensated_lag", &self.compensated_lag.to_string())?;
        writer.write_event(Event::End(BytesEnd::new("acquisition")))?;

        writer.write_event(Event::Start(BytesStart::new("channels")))?;
        for channel in &self.channels {
            writer.write_event(Event::Start(BytesStart::new("channel")))?;
            text_element(writer, "label", &channel.label)?;
            text_element(writer, "unit", &channel.unit)?;
            text_element(writer, "type", &channel.channel_type)?;
            writer.write_event(Event::End(BytesEnd::new("channel")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("channels")))?;

        writer.write_event(Event::End(BytesEnd::new("desc")))?;
        writer.write_event(Event::End(BytesEnd::new("info")))?;
        Ok(())
    }
}

fn text_element(writer: &mut Writer<Vec<u8>>, tag: &str, value: &str) -> quick_xml::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

/// Device display name, trimmed, with spaces replaced by underscores
pub fn stream_name(device_name: &str) -> String {
    device_name.trim().replace(' ', "_")
}

/// Order code without the vendor prefix, upper-cased.
///
/// A code that does not carry the prefix is upper-cased whole.
pub fn stream_type(order_code: &str, vendor_prefix: &str) -> String {
    order_code
        .strip_prefix(vendor_prefix)
        .unwrap_or(order_code)
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use labbridge_core::config::{SimulatedDeviceConfig, SimulatedSensorConfig};
    use labbridge_core::types::ConnectionKind;
    use labbridge_devices::sim::SimulatedDevice;
    use labbridge_devices::SensorDescriptor;

    fn device() -> SimulatedDevice {
        SimulatedDevice::new(SimulatedDeviceConfig {
            name: " GDX-FOR 071000A1 ".to_string(),
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

    #[test]
    fn test_names_and_types() {
        assert_eq!(stream_name(" GDX-FOR 071000A1 "), "GDX-FOR_071000A1");
        assert_eq!(stream_type("GDX-acc", "GDX-"), "ACC");
        assert_eq!(stream_type("go-temp", "GDX-"), "GO-TEMP");
    }

    #[test]
    fn test_descriptor_from_device() {
        let enabled = EnabledChannelSet::new(vec![
            SensorDescriptor::new(1, "Force", "N"),
            SensorDescriptor::new(2, "X-axis acceleration", "m/s²"),
        ]);
        let descriptor = StreamDescriptor::from_device(&device(), &enabled, &StreamConfig::default());

        assert_eq!(descriptor.name, "GDX-FOR_071000A1");
        assert_eq!(descriptor.stream_type, "FOR");
        assert_eq!(descriptor.source_id, "071000A1");
        assert_eq!(descriptor.sample_rate, 0.0);
        assert_eq!(descriptor.channel_count(), 2);
        assert_eq!(descriptor.channels[1].label, "X-axis acceleration");
        assert_eq!(descriptor.channels[1].channel_type, "vernier");
    }

    #[test]
    fn test_descriptor_carries_acquisition_metadata() {
        let enabled = EnabledChannelSet::new(vec![SensorDescriptor::new(1, "Force", "N")]);
        let descriptor = StreamDescriptor::from_device(&device(), &enabled, &StreamConfig::default());

        assert_eq!(descriptor.manufacturer, "Vernier");
        assert_eq!(descriptor.model, "Go Direct Force and Acceleration");
        assert_eq!(descriptor.compensated_lag, 0.0);

        let xml = descriptor.as_xml().unwrap();
        let acquisition_start = xml.find("<acquisition>").expect("acquisition block");
        let acquisition_end = xml.find("</acquisition>").unwrap();
        let acquisition = &xml[acquisition_start..acquisition_end];
        assert!(acquisition.contains("<manufacturer>Vernier</manufacturer>"));
        assert!(acquisition.contains("<model>Go Direct Force and Acceleration</model>"));
        assert!(acquisition.contains("<compensated_lag>0</compensated_lag>"));
        assert!(xml.find("<desc>").unwrap() < acquisition_start);
        assert!(acquisition_end < xml.find("<channels>").unwrap());
    }

    #[test]
    fn test_xml_is_escaped() {
        let enabled = EnabledChannelSet::new(vec![SensorDescriptor::new(1, "A<B", "m&s")]);
        let xml = StreamDescriptor::from_device(&device(), &enabled, &StreamConfig::default())
            .as_xml()
            .unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\"?>"));
        assert!(xml.contains("<name>GDX-FOR_071000A1</name>"));
        assert!(xml.contains("<channel_count>1</channel_count>"));
        assert!(xml.contains("<nominal_srate>0</nominal_srate>"));
        assert!(xml.contains("<label>A&lt;B</label>"));
        assert!(xml.contains("<unit>m&amp;s</unit>"));
    }
}
