//! Msgpack stream encoding of `[time, record]` entries
//!
//! Each entry is a two-element msgpack array; a chunk payload is the plain
//! concatenation of entries. Rich times are encoded as msgpack ext type 0
//! with 8 bytes: seconds then nanoseconds, both big-endian u32.

use bytes::Bytes;
use serde::ser::{Error as _, Serialize, Serializer};

use contracts::{BufferError, Record, Timestamp};

/// Msgpack ext type id of an event time
pub const EVENT_TIME_EXT_TYPE: i8 = 0;

struct PackedTime(Timestamp);

impl Serialize for PackedTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Timestamp::Integer(sec) => serializer.serialize_i64(sec),
            Timestamp::Event(t) => {
                let sec = u32::try_from(t.sec()).map_err(|_| {
                    S::Error::custom(format!("event time {} does not fit ext encoding", t.sec()))
                })?;
                let mut payload = [0u8; 8];
                payload[..4].copy_from_slice(&sec.to_be_bytes());
                payload[4..].copy_from_slice(&t.nsec().to_be_bytes());
                serializer.serialize_newtype_struct(
                    rmp_serde::MSGPACK_EXT_STRUCT_NAME,
                    &(EVENT_TIME_EXT_TYPE, serde_bytes::Bytes::new(&payload)),
                )
            }
        }
    }
}

/// Append one `[time, record]` entry to `buf`
pub fn encode_entry(buf: &mut Vec<u8>, time: Timestamp, record: &Record) -> Result<(), BufferError> {
    rmp_serde::encode::write(buf, &(PackedTime(time), record))
        .map_err(|e| BufferError::encode(e.to_string()))
}

/// Growing msgpack stream with an entry count
#[derive(Debug, Default, Clone)]
pub struct MsgpackStream {
    buf: Vec<u8>,
    count: usize,
}

impl MsgpackStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, time: Timestamp, record: &Record) -> Result<(), BufferError> {
        encode_entry(&mut self.buf, time, record)?;
        self.count += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn bytesize(&self) -> usize {
        self.buf.len()
    }

    /// Payload and entry count
    pub fn finish(self) -> (Bytes, usize) {
        (Bytes::from(self.buf), self.count)
    }
}
