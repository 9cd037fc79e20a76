//! Online/offline status as reported on the status feed.

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

/// Connectivity status of a single sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SensorStatus {
    Online,
    /// Also the status of any sensor the feed has not reported on.
    #[default]
    Offline,
}

impl SensorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStatus::Online => "online",
            SensorStatus::Offline => "offline",
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, SensorStatus::Online)
    }
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last received status per sensor id.
pub type StatusMap = BTreeMap<String, SensorStatus>;

/// Error returned for a status payload other than `online` or `offline`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown sensor status: {:?}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for SensorStatus {
    type Err = UnknownStatus;

    /// Parses the literal feed payload. Surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "online" => Ok(SensorStatus::Online),
            "offline" => Ok(SensorStatus::Offline),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
