//! Frame header and application message envelope
//!
//! ```text
//! +---------------+--------------------+----------+------------+---------+
//! | frame control | manufacturer code  | sequence | command id | payload |
//! |    1 byte     | 0/2 bytes (opt.)   |  1 byte  |   1 byte   |   ...   |
//! +---------------+--------------------+----------+------------+---------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

use crate::cluster::{Direction, FrameType};
use crate::error::{Result, ZclError};
use crate::types::need;

const FC_FRAME_TYPE_MASK: u8 = 0b0000_0011;
const FC_MANUFACTURER_SPECIFIC: u8 = 0b0000_0100;
const FC_DIRECTION: u8 = 0b0000_1000;
const FC_DISABLE_DEFAULT_RESPONSE: u8 = 0b0001_0000;

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_type: FrameType,
    pub manufacturer_code: Option<u16>,
    pub direction: Direction,
    pub disable_default_response: bool,
    pub transaction_sequence: u8,
    pub command_identifier: u8,
}

impl FrameHeader {
    /// Append the header to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        let mut control = self.frame_type as u8;
        if self.manufacturer_code.is_some() {
            control |= FC_MANUFACTURER_SPECIFIC;
        }
        if self.direction == Direction::ServerToClient {
            control |= FC_DIRECTION;
        }
        if self.disable_default_response {
            control |= FC_DISABLE_DEFAULT_RESPONSE;
        }

        buf.put_u8(control);
        if let Some(code) = self.manufacturer_code {
            buf.put_u16_le(code);
        }
        buf.put_u8(self.transaction_sequence);
        buf.put_u8(self.command_identifier);
    }

    /// Read a header from the front of `buf`
    pub fn decode(buf: &mut Bytes) -> Result<Self> {
        need(buf, 1)?;
        let control = buf.get_u8();

        let frame_type = match control & FC_FRAME_TYPE_MASK {
            0x00 => FrameType::Global,
            0x01 => FrameType::ClusterSpecific,
            other => {
                return Err(ZclError::InvalidFrame(format!(
                    "reserved frame type {}",
                    other
                )))
            }
        };

        let manufacturer_code = if control & FC_MANUFACTURER_SPECIFIC != 0 {
            need(buf, 2)?;
            Some(buf.get_u16_le())
        } else {
            None
        };

        need(buf, 2)?;
        let transaction_sequence = buf.get_u8();
        let command_identifier = buf.get_u8();

        Ok(Self {
            frame_type,
            manufacturer_code,
            direction: if control & FC_DIRECTION != 0 {
                Direction::ServerToClient
            } else {
                Direction::ClientToServer
            },
            disable_default_response: control & FC_DISABLE_DEFAULT_RESPONSE != 0,
            transaction_sequence,
            command_identifier,
        })
    }
}

/// Source of outbound transaction sequence numbers
///
/// Wraps from 255 back to 0.
#[derive(Debug)]
pub struct TransactionSequence {
    next: AtomicU8,
}

impl TransactionSequence {
    /// Start counting at `first`
    pub fn starting_at(first: u8) -> Self {
        Self {
            next: AtomicU8::new(first),
        }
    }

    /// Take the next sequence number
    pub fn next(&self) -> u8 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for TransactionSequence {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

/// An application-layer message exchanged with a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationMessage {
    pub cluster_id: u16,
    pub profile_id: u16,
    pub source_endpoint: u8,
    pub destination_endpoint: u8,
    /// Encoded cluster library frame
    #[serde(with = "hex_bytes")]
    pub data: Bytes,
}

mod hex_bytes {
    use bytes::Bytes;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(data))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map(Bytes::from).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = FrameHeader {
            frame_type: FrameType::ClusterSpecific,
            manufacturer_code: None,
            direction: Direction::ClientToServer,
            disable_default_response: true,
            transaction_sequence: 7,
            command_identifier: 0x02,
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(&buf[..], &[0x11, 0x07, 0x02]);
        assert_eq!(FrameHeader::decode(&mut buf.freeze()).unwrap(), header);
    }

    #[test]
    fn test_manufacturer_specific_header() {
        let mut data = Bytes::from_static(&[0x1c, 0x5f, 0x11, 0x09, 0x0a, 0xff]);
        let header = FrameHeader::decode(&mut data).unwrap();
        assert_eq!(header.frame_type, FrameType::Global);
        assert_eq!(header.manufacturer_code, Some(0x115f));
        assert_eq!(header.direction, Direction::ServerToClient);
        assert_eq!(header.transaction_sequence, 0x09);
        assert_eq!(header.command_identifier, 0x0a);
        assert_eq!(&data[..], &[0xff]);
    }

    #[test]
    fn test_reserved_frame_type() {
        let err = FrameHeader::decode(&mut Bytes::from_static(&[0x02, 0x00, 0x00])).unwrap_err();
        assert!(err.is_protocol_error());
    }

    #[test]
    fn test_sequence_wraps() {
        let seq = TransactionSequence::starting_at(254);
        assert_eq!(seq.next(), 254);
        assert_eq!(seq.next(), 255);
        assert_eq!(seq.next(), 0);
    }

    #[test]
    fn test_message_json_uses_hex() {
        let msg = ApplicationMessage {
            cluster_id: 6,
            profile_id: 0x0104,
            source_endpoint: 1,
            destination_endpoint: 1,
            data: Bytes::from_static(&[0x01, 0x02]),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["data"], "0102");
        let back: ApplicationMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }
}
