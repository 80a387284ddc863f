//! Profile-wide commands
//!
//! These carry variable-length lists of attribute records, so unlike the
//! cluster-specific commands they are coded by hand.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::cluster::status;
use crate::error::Result;
use crate::types::{need, AttributeValue, DataType};

/// Request the current value of attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadAttributes {
    pub identifiers: Vec<u16>,
}

impl ReadAttributes {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        for id in &self.identifiers {
            buf.put_u16_le(*id);
        }
        Ok(())
    }

    pub fn decode(buf: &mut Bytes) -> Result<Self> {
        let mut identifiers = Vec::with_capacity(buf.remaining() / 2);
        while buf.has_remaining() {
            need(buf, 2)?;
            identifiers.push(buf.get_u16_le());
        }
        Ok(Self { identifiers })
    }
}

/// One record of a read attributes response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadAttributeRecord {
    pub identifier: u16,
    pub status: u8,
    /// Present only when `status` is success
    pub data_type: Option<DataType>,
    pub value: Option<AttributeValue>,
}

/// Reply to [`ReadAttributes`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadAttributesResponse {
    pub records: Vec<ReadAttributeRecord>,
}

impl ReadAttributesResponse {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        for record in &self.records {
            buf.put_u16_le(record.identifier);
            buf.put_u8(record.status);
            if let (Some(data_type), Some(value)) = (record.data_type, &record.value) {
                buf.put_u8(data_type.0);
                value.encode(data_type, buf)?;
            }
        }
        Ok(())
    }

    pub fn decode(buf: &mut Bytes) -> Result<Self> {
        let mut records = Vec::new();
        while buf.has_remaining() {
            need(buf, 3)?;
            let identifier = buf.get_u16_le();
            let status = buf.get_u8();
            let (data_type, value) = if status == status::SUCCESS {
                need(buf, 1)?;
                let data_type = DataType(buf.get_u8());
                let value = AttributeValue::decode(data_type, buf)?;
                (Some(data_type), Some(value))
            } else {
                (None, None)
            };
            records.push(ReadAttributeRecord {
                identifier,
                status,
                data_type,
                value,
            });
        }
        Ok(Self { records })
    }
}

/// A typed attribute value, as carried by writes and reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeRecord {
    pub identifier: u16,
    pub data_type: DataType,
    pub value: AttributeValue,
}

impl AttributeRecord {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u16_le(self.identifier);
        buf.put_u8(self.data_type.0);
        self.value.encode(self.data_type, buf)
    }

    fn decode(buf: &mut Bytes) -> Result<Self> {
        need(buf, 3)?;
        let identifier = buf.get_u16_le();
        let data_type = DataType(buf.get_u8());
        let value = AttributeValue::decode(data_type, buf)?;
        Ok(Self {
            identifier,
            data_type,
            value,
        })
    }

    fn decode_all(buf: &mut Bytes) -> Result<Vec<Self>> {
        let mut records = Vec::new();
        while buf.has_remaining() {
            records.push(Self::decode(buf)?);
        }
        Ok(records)
    }
}

/// Change attribute values
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriteAttributes {
    pub records: Vec<AttributeRecord>,
}

impl WriteAttributes {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        for record in &self.records {
            record.encode(buf)?;
        }
        Ok(())
    }

    pub fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            records: AttributeRecord::decode_all(buf)?,
        })
    }
}

/// Per-attribute outcome of a write
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteStatusRecord {
    pub status: u8,
    /// Absent in the single-record "all succeeded" form
    pub identifier: Option<u16>,
}

/// Reply to [`WriteAttributes`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriteAttributesResponse {
    pub records: Vec<WriteStatusRecord>,
}

impl WriteAttributesResponse {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        for record in &self.records {
            buf.put_u8(record.status);
            if let Some(id) = record.identifier {
                buf.put_u16_le(id);
            }
        }
        Ok(())
    }

    pub fn decode(buf: &mut Bytes) -> Result<Self> {
        let mut records = Vec::new();
        while buf.has_remaining() {
            let status = buf.get_u8();
            let identifier = if status == status::SUCCESS && !buf.has_remaining() {
                None
            } else {
                need(buf, 2)?;
                Some(buf.get_u16_le())
            };
            records.push(WriteStatusRecord { status, identifier });
        }
        Ok(Self { records })
    }
}

/// Unsolicited attribute values pushed by a node
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportAttributes {
    pub records: Vec<AttributeRecord>,
}

impl ReportAttributes {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        for record in &self.records {
            record.encode(buf)?;
        }
        Ok(())
    }

    pub fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            records: AttributeRecord::decode_all(buf)?,
        })
    }
}

/// Generic acknowledgement of a received command
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DefaultResponse {
    pub command_identifier: u8,
    pub status: u8,
}

impl DefaultResponse {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(self.command_identifier);
        buf.put_u8(self.status);
        Ok(())
    }

    pub fn decode(buf: &mut Bytes) -> Result<Self> {
        need(buf, 2)?;
        Ok(Self {
            command_identifier: buf.get_u8(),
            status: buf.get_u8(),
        })
    }
}
