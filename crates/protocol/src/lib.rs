//! Wire layer for the fluentd client.
//!
//! This crate holds everything that touches bytes but not sockets:
//!
//! - [`Message`] - the record envelope every post produces, recycled
//!   through the lock-free [`MessagePool`]
//! - [`Marshaler`] - pluggable framing, with the Forward-protocol
//!   MessagePack triple and the record-only JSON encoder built in
//! - [`EventTime`] - the nanosecond-resolution timestamp extension
//!
//! # Wire format
//!
//! Forward mode frames each record as a MessagePack 3-element array
//! `[tag, time, record]`, concatenated back-to-back on the stream; the
//! server frames on MessagePack boundaries. With subsecond timestamps
//! enabled, `time` is the 8-byte `EventTime` extension (type 0, big-endian
//! seconds then nanoseconds) instead of an integer.
//!
//! HTTP mode sends the record alone as JSON; the tag travels in the URL.

mod error;
mod marshal;
mod message;
mod time;

pub use error::{DeliveryError, MarshalError};
pub use marshal::{JsonMarshaler, Marshaler, MsgpackMarshaler};
pub use message::{Message, MessagePool, PoolMetrics, PoolSnapshot, ReplySlot, DEFAULT_POOL_CAPACITY};
pub use time::{epoch_secs, EventTime, EVENT_TIME_EXT_TYPE, EVENT_TIME_LEN};
