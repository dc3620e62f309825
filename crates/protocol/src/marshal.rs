//! Pluggable message framing.
//!
//! The engine serializes every [`Message`] through a [`Marshaler`] before it
//! touches the wire. Two framings ship with the crate:
//!
//! - [`MsgpackMarshaler`] - the Forward-protocol `[tag, time, record]`
//!   triple, the default for socket transports.
//! - [`JsonMarshaler`] - the record alone as JSON bytes, used by the HTTP
//!   transport whose tag travels in the URL instead.
//!
//! Any conforming implementation can be injected in their place.

use crate::error::MarshalError;
use crate::message::Message;
use crate::time::{epoch_secs, EventTime, EVENT_TIME_EXT_TYPE, EVENT_TIME_LEN};

/// Encode a message into its wire frame.
pub trait Marshaler: Send + Sync {
    fn marshal(&self, msg: &Message) -> Result<Vec<u8>, MarshalError>;
}

/// Forward-protocol MessagePack framing: `[tag, time, record]`.
///
/// `time` is the epoch-second integer, or the `EventTime` extension when
/// the message asks for subsecond resolution.
#[derive(Debug, Default, Clone, Copy)]
pub struct MsgpackMarshaler;

impl Marshaler for MsgpackMarshaler {
    fn marshal(&self, msg: &Message) -> Result<Vec<u8>, MarshalError> {
        let mut buf = Vec::with_capacity(64);

        rmp::encode::write_array_len(&mut buf, 3).map_err(MarshalError::msgpack)?;
        rmp::encode::write_str(&mut buf, &msg.tag).map_err(MarshalError::msgpack)?;

        if msg.subsecond {
            let et = EventTime::from(msg.timestamp);
            rmp::encode::write_ext_meta(&mut buf, EVENT_TIME_LEN, EVENT_TIME_EXT_TYPE)
                .map_err(MarshalError::msgpack)?;
            buf.extend_from_slice(&et.to_bytes());
        } else {
            rmp::encode::write_uint(&mut buf, epoch_secs(msg.timestamp))
                .map_err(MarshalError::msgpack)?;
        }

        rmp_serde::encode::write(&mut buf, &msg.record).map_err(MarshalError::msgpack)?;
        Ok(buf)
    }
}

/// Record-only JSON framing for the HTTP transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMarshaler;

impl Marshaler for JsonMarshaler {
    fn marshal(&self, msg: &Message) -> Result<Vec<u8>, MarshalError> {
        serde_json::to_vec(&msg.record).map_err(MarshalError::Json)
    }
}

#[cfg(test)]
#[path = "marshal_test.rs"]
mod marshal_test;
