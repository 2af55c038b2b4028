/*!
 * The process-wide transport session.
 *
 * A [`Transport`] is the connection manager of a device SDK. Exactly one is
 * started per process, wrapped in a [`TransportSession`] before any device is
 * resolved, and shut down once after every streaming session has stopped.
 */
use std::fmt::Debug;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use labbridge_core::types::ConnectionMode;

use crate::device::{Result, SensorDevice};

/// Connection manager of a device SDK
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Backend name used in logs
    fn name(&self) -> &'static str;

    /// Which connection kinds this transport searches
    fn mode(&self) -> ConnectionMode;

    /// Fresh handles for every device currently reachable.
    ///
    /// Handles are not opened.
    async fn list_devices(&self) -> Result<Vec<Box<dyn SensorDevice>>>;

    /// Release the SDK resources
    async fn quit(&self) -> Result<()>;
}

/// Single owner of the process-wide transport.
///
/// Catalog, resolver and scan borrow it; only [`TransportSession::shutdown`]
/// releases it.
#[derive(Debug)]
pub struct TransportSession {
    transport: Box<dyn Transport>,
    shut_down: bool,
}

impl TransportSession {
    /// Take ownership of a started transport
    pub fn start(transport: Box<dyn Transport>) -> Self {
        info!("Starting {} transport in {} mode", transport.name(), transport.mode());
        Self {
            transport,
            shut_down: false,
        }
    }

    /// Which connection kinds the session searches
    pub fn mode(&self) -> ConnectionMode {
        self.transport.mode()
    }

    /// Fresh, unopened handles for every reachable device
    pub async fn list_devices(&self) -> Result<Vec<Box<dyn SensorDevice>>> {
        let devices = self.transport.list_devices().await?;
        debug!("{} transport lists {} devices", self.transport.name(), devices.len());
        Ok(devices)
    }

    /// Release the transport. Consumes the session so it can only happen once.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Shutting down {} transport", self.transport.name());
        self.shut_down = true;
        self.transport.quit().await
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        if !self.shut_down {
            warn!(
                "{} transport session dropped without shutdown",
                self.transport.name()
            );
        }
    }
}
