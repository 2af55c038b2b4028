/*!
 * Sensor channel types.
 *
 * A device exposes a fixed list of sensors when it is opened. The subset that
 * is currently enabled is kept by the transport for the open session; once a
 * streaming session has read it back, it is frozen into an [`EnabledChannelSet`].
 */
use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport-level sensor number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorId(pub u32);

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SensorId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// One measurable quantity on a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    /// Transport-level identifier
    pub id: SensorId,
    /// Human readable label, e.g. "Force"
    pub label: String,
    /// Measurement unit, e.g. "N"
    pub unit: String,
}

impl SensorDescriptor {
    /// Create a new sensor descriptor
    pub fn new<L: Into<String>, U: Into<String>>(id: impl Into<SensorId>, label: L, unit: U) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            unit: unit.into(),
        }
    }
}

/// The ordered sensors active on a device for one streaming session.
///
/// Order fixes the outbound channel index of every sensor and is never
/// changed once the set exists.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnabledChannelSet(Vec<SensorDescriptor>);

impl EnabledChannelSet {
    /// Freeze the list reported by the transport
    pub fn new(sensors: Vec<SensorDescriptor>) -> Self {
        Self(sensors)
    }

    /// Number of enabled channels
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no channel is enabled
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the channels in outbound order
    pub fn iter(&self) -> std::slice::Iter<'_, SensorDescriptor> {
        self.0.iter()
    }

    /// Channel labels in outbound order
    pub fn labels(&self) -> Vec<&str> {
        self.0.iter().map(|s| s.label.as_str()).collect()
    }

    /// Whether a channel with this label is enabled
    pub fn contains_label(&self, label: &str) -> bool {
        self.0.iter().any(|s| s.label == label)
    }

    /// Borrow the channels as a slice
    pub fn as_slice(&self) -> &[SensorDescriptor] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a EnabledChannelSet {
    type Item = &'a SensorDescriptor;
    type IntoIter = std::slice::Iter<'a, SensorDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_set_preserves_order() {
        let set = EnabledChannelSet::new(vec![
            SensorDescriptor::new(3, "Z-axis acceleration", "m/s²"),
            SensorDescriptor::new(1, "X-axis acceleration", "m/s²"),
        ]);

        assert_eq!(set.len(), 2);
        assert_eq!(set.labels(), vec!["Z-axis acceleration", "X-axis acceleration"]);
        assert!(set.contains_label("X-axis acceleration"));
        assert!(!set.contains_label("Force"));
    }
}
