//! Fluent `EventTime` extension type.
//!
//! The Forward protocol carries subsecond timestamps as a MessagePack
//! extension: type 0, 8 bytes, big-endian seconds followed by big-endian
//! nanoseconds.

use std::time::{SystemTime, UNIX_EPOCH};

/// MessagePack extension type tag for `EventTime`.
pub const EVENT_TIME_EXT_TYPE: i8 = 0;

/// Wire size of the `EventTime` payload.
pub const EVENT_TIME_LEN: u32 = 8;

/// Nanosecond-resolution event timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventTime {
    /// Seconds since the Unix epoch.
    pub secs: u32,
    /// Nanosecond remainder.
    pub nanos: u32,
}

impl EventTime {
    /// Build an `EventTime` from a wall-clock timestamp.
    ///
    /// Pre-epoch timestamps saturate to zero; the wire format has no sign.
    pub fn from_system_time(t: SystemTime) -> Self {
        match t.duration_since(UNIX_EPOCH) {
            Ok(d) => Self {
                secs: d.as_secs() as u32,
                nanos: d.subsec_nanos(),
            },
            Err(_) => Self { secs: 0, nanos: 0 },
        }
    }

    /// The 8-byte big-endian extension payload.
    pub fn to_bytes(self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(&self.secs.to_be_bytes());
        bytes[4..].copy_from_slice(&self.nanos.to_be_bytes());
        bytes
    }
}

impl From<SystemTime> for EventTime {
    fn from(t: SystemTime) -> Self {
        Self::from_system_time(t)
    }
}

/// Whole seconds since the Unix epoch, saturating at zero for pre-epoch
/// timestamps.
pub fn epoch_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
