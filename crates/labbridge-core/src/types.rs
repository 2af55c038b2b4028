/*!
 * Core data types for labbridge.
 *
 * This module defines the small set of types shared by every labbridge crate.
 */
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// A unique identifier for labbridge resources (streaming sessions, probes)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id(String);

impl Id {
    /// Create a new ID with a random UUID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create an ID from a string
    pub fn from_string<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_string())
    }

    /// Get the string representation of the ID
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first eight characters, enough to tell sessions apart in logs
    pub fn short(&self) -> &str {
        let end = self.0.len().min(8);
        &self.0[..end]
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

/// How a single device is physically attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// Wired USB connection
    Usb,
    /// Bluetooth Low Energy connection
    Ble,
}

impl ConnectionKind {
    /// Whether this is a wireless (long-range) connection
    pub fn is_wireless(&self) -> bool {
        matches!(self, ConnectionKind::Ble)
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionKind::Usb => "usb",
            ConnectionKind::Ble => "ble",
        }
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which connection kinds the shared transport session searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// USB devices only
    #[default]
    Usb,
    /// BLE devices only
    Ble,
    /// USB and BLE devices
    Any,
}

impl ConnectionMode {
    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionMode::Usb => "usb",
            ConnectionMode::Ble => "ble",
            ConnectionMode::Any => "any",
        }
    }

    /// Whether a device attached via `kind` is visible in this mode
    pub fn includes(&self, kind: ConnectionKind) -> bool {
        match self {
            ConnectionMode::Any => true,
            ConnectionMode::Usb => kind == ConnectionKind::Usb,
            ConnectionMode::Ble => kind == ConnectionKind::Ble,
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "usb" => Ok(ConnectionMode::Usb),
            "ble" => Ok(ConnectionMode::Ble),
            "any" => Ok(ConnectionMode::Any),
            other => Err(Error::config(format!(
                "Unknown connection mode '{}', expected usb, ble or any",
                other
            ))),
        }
    }
}
