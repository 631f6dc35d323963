use serde::{Deserialize, Serialize};
use std::fmt;

/// Controller number used when none is given
pub const DEFAULT_CONTROLLER: u32 = 1;

/// Zone identifier: a zone number on a given controller
///
/// Controllers can be chained, so a zone is only unique together with the
/// controller it belongs to.
///
/// ```
/// use russound_rio::ZoneId;
///
/// assert_eq!(ZoneId::new(1), ZoneId::with_controller(1, 1));
/// assert_eq!(ZoneId::with_controller(7, 4).device_str(), "C[4].Z[7]");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneId {
    controller: u32,
    zone: u32,
}

impl ZoneId {
    /// Zone on the first controller
    pub fn new(zone: u32) -> Self {
        Self::with_controller(zone, DEFAULT_CONTROLLER)
    }

    /// Zone on a specific controller
    pub fn with_controller(zone: u32, controller: u32) -> Self {
        Self { controller, zone }
    }

    pub fn controller(&self) -> u32 {
        self.controller
    }

    pub fn zone(&self) -> u32 {
        self.zone
    }

    /// Address form used on the wire, e.g. `C[1].Z[3]`
    pub fn device_str(&self) -> String {
        format!("C[{}].Z[{}]", self.controller, self.zone)
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.controller, self.zone)
    }
}

/// Source identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(u32);

impl SourceId {
    pub fn new(source: u32) -> Self {
        Self(source)
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    /// Address form used on the wire, e.g. `S[2]`
    pub fn device_str(&self) -> String {
        format!("S[{}]", self.0)
    }
}

impl From<u32> for SourceId {
    fn from(source: u32) -> Self {
        Self(source)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Any addressable entity on the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityId {
    Zone(ZoneId),
    Source(SourceId),
}

impl EntityId {
    pub fn device_str(&self) -> String {
        match self {
            EntityId::Zone(zone) => zone.device_str(),
            EntityId::Source(source) => source.device_str(),
        }
    }
}

impl From<ZoneId> for EntityId {
    fn from(zone: ZoneId) -> Self {
        EntityId::Zone(zone)
    }
}

impl From<SourceId> for EntityId {
    fn from(source: SourceId) -> Self {
        EntityId::Source(source)
    }
}

/// Lifecycle of a client's connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Running,
    Closing,
    Closed,
}

impl ConnectionState {
    /// Whether `connect()` may be called from this state
    pub fn can_connect(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Closed)
    }
}

/// Variable names are case-insensitive on the device; the cache keys them
/// by their lowercase form.
pub fn canonical_variable(name: &str) -> String {
    name.to_lowercase()
}
