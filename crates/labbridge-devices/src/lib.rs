/*!
 * labbridge devices
 *
 * This crate provides the device capability interface, the process-wide
 * transport session, device discovery and resolution, and sensor channel
 * negotiation.
 */

#![warn(missing_docs)]

pub mod catalog;
pub mod device;
pub mod negotiator;
pub mod resolver;
pub mod sensor;
pub mod transport;

#[cfg(feature = "simulated")]
pub mod sim;

pub use catalog::DeviceCatalog;
pub use device::{DeviceError, DeviceInfo, SensorDevice};
pub use negotiator::{parse_channel_list, SensorNegotiator, DEFAULT_SENTINEL};
pub use resolver::{DeviceField, DeviceResolver, MatchCriteria};
pub use sensor::{EnabledChannelSet, SensorDescriptor, SensorId};
pub use transport::{Transport, TransportSession};

/// labbridge devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Names of the transport backends compiled into this build
pub fn available_transports() -> Vec<&'static str> {
    let mut transports = Vec::new();

    #[cfg(feature = "simulated")]
    transports.push("simulated");

    transports
}
