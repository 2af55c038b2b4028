/*!
 * Device resolution.
 *
 * Filters the catalog against the identity criteria given by the operator.
 */
use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info};

use crate::catalog::DeviceCatalog;
use crate::device::{DeviceInfo, Result, SensorDevice};
use crate::transport::TransportSession;

/// A device identity field that can be matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceField {
    /// The serial number, e.g. "071000A1"
    SerialNumber,
    /// The order (model) code, e.g. "GDX-FOR"
    OrderCode,
}

impl DeviceField {
    /// Field name as used on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceField::SerialNumber => "serial_number",
            DeviceField::OrderCode => "order_code",
        }
    }

    /// The value of this field on a catalog entry
    pub fn value_of<'a>(&self, info: &'a DeviceInfo) -> &'a str {
        match self {
            DeviceField::SerialNumber => &info.serial_number,
            DeviceField::OrderCode => &info.order_code,
        }
    }
}

/// Mapping of identity field to an optional required value.
///
/// An unset value matches anything; a set value requires exact equality.
/// A device matches when every criterion holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchCriteria {
    criteria: BTreeMap<DeviceField, Option<String>>,
}

impl MatchCriteria {
    /// Criteria that match every device
    pub fn new() -> Self {
        Self::default()
    }

    /// Criteria from the two identity flags
    pub fn from_identity(serial_number: Option<String>, order_code: Option<String>) -> Self {
        Self::new()
            .with(DeviceField::SerialNumber, serial_number)
            .with(DeviceField::OrderCode, order_code)
    }

    /// Set (or wildcard with `None`) one criterion
    pub fn with<S: Into<String>>(mut self, field: DeviceField, value: Option<S>) -> Self {
        self.criteria.insert(field, value.map(Into::into));
        self
    }

    /// The required value of a field, if any
    pub fn get(&self, field: DeviceField) -> Option<&str> {
        self.criteria.get(&field).and_then(|v| v.as_deref())
    }

    /// Whether a catalog entry satisfies every criterion
    pub fn matches(&self, info: &DeviceInfo) -> bool {
        self.criteria.iter().all(|(field, wanted)| match wanted {
            Some(wanted) => field.value_of(info) == wanted,
            None => true,
        })
    }
}

impl fmt::Display for MatchCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .criteria
            .iter()
            .map(|(field, value)| match value {
                Some(value) => format!("{}={}", field.as_str(), value),
                None => format!("{}=*", field.as_str()),
            })
            .collect();
        if parts.is_empty() {
            f.write_str("*")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

/// Resolves match criteria to device handles
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceResolver;

impl DeviceResolver {
    /// Probe the catalog and keep the matching devices.
    ///
    /// Returns `None` when nothing matches; an empty list is never returned.
    pub async fn resolve(
        session: &TransportSession,
        criteria: &MatchCriteria,
    ) -> Result<Option<Vec<Box<dyn SensorDevice>>>> {
        info!("Searching for device matching: {}", criteria);
        let catalog = DeviceCatalog::collect(session).await?;
        Ok(Self::resolve_from(catalog, criteria)
            .map(|matched| matched.into_iter().map(DeviceInfo::into_device).collect()))
    }

    /// Filter already probed catalog entries, keeping catalog order
    pub fn resolve_from(
        candidates: impl IntoIterator<Item = DeviceInfo>,
        criteria: &MatchCriteria,
    ) -> Option<Vec<DeviceInfo>> {
        let fitting: Vec<DeviceInfo> = candidates
            .into_iter()
            .filter(|info| criteria.matches(info))
            .collect();

        debug!("{} devices match {}", fitting.len(), criteria);
        if fitting.is_empty() {
            None
        } else {
            Some(fitting)
        }
    }
}
