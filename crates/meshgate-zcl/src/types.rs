//! Attribute data types and values
//!
//! Attribute records on the wire are self-describing: a one-byte data type
//! code followed by a value whose layout the code determines. Integers are
//! little-endian and may be any width from 1 to 8 bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::error::{Result, ZclError};
use crate::fields::{coerce_bool, coerce_float, coerce_signed, coerce_text, coerce_unsigned};

/// Fail with [`ZclError::Truncated`] unless `needed` bytes remain
pub(crate) fn need(buf: &Bytes, needed: usize) -> Result<()> {
    if buf.remaining() < needed {
        return Err(ZclError::Truncated {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

/// One-byte attribute data type code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct DataType(pub u8);

impl DataType {
    pub const NO_DATA: Self = Self(0x00);
    pub const DATA8: Self = Self(0x08);
    pub const DATA16: Self = Self(0x09);
    pub const DATA24: Self = Self(0x0a);
    pub const DATA32: Self = Self(0x0b);
    pub const BOOLEAN: Self = Self(0x10);
    pub const BITMAP8: Self = Self(0x18);
    pub const BITMAP16: Self = Self(0x19);
    pub const BITMAP24: Self = Self(0x1a);
    pub const BITMAP32: Self = Self(0x1b);
    pub const BITMAP64: Self = Self(0x1f);
    pub const UINT8: Self = Self(0x20);
    pub const UINT16: Self = Self(0x21);
    pub const UINT24: Self = Self(0x22);
    pub const UINT32: Self = Self(0x23);
    pub const UINT40: Self = Self(0x24);
    pub const UINT48: Self = Self(0x25);
    pub const UINT56: Self = Self(0x26);
    pub const UINT64: Self = Self(0x27);
    pub const INT8: Self = Self(0x28);
    pub const INT16: Self = Self(0x29);
    pub const INT24: Self = Self(0x2a);
    pub const INT32: Self = Self(0x2b);
    pub const INT48: Self = Self(0x2d);
    pub const INT64: Self = Self(0x2f);
    pub const ENUM8: Self = Self(0x30);
    pub const ENUM16: Self = Self(0x31);
    pub const FLOAT16: Self = Self(0x38);
    pub const FLOAT32: Self = Self(0x39);
    pub const FLOAT64: Self = Self(0x3a);
    pub const OCTET_STRING: Self = Self(0x41);
    pub const CHAR_STRING: Self = Self(0x42);
    pub const ARRAY: Self = Self(0x48);
    pub const STRUCT: Self = Self(0x4c);
    pub const UTC_TIME: Self = Self(0xe2);
    pub const CLUSTER_ID: Self = Self(0xe8);
    pub const ATTRIBUTE_ID: Self = Self(0xe9);
    pub const IEEE_ADDRESS: Self = Self(0xf0);

    fn layout(self) -> Option<Layout> {
        let layout = match self.0 {
            0x00 => Layout::NoData,
            0x10 => Layout::Boolean,
            // dataN, bitmapN
            0x08..=0x0f => Layout::Unsigned(usize::from(self.0 - 0x07)),
            0x18..=0x1f => Layout::Unsigned(usize::from(self.0 - 0x17)),
            0x20..=0x27 => Layout::Unsigned(usize::from(self.0 - 0x1f)),
            0x28..=0x2f => Layout::Signed(usize::from(self.0 - 0x27)),
            0x30 => Layout::Unsigned(1),
            0x31 => Layout::Unsigned(2),
            0x38 => Layout::Half,
            0x39 => Layout::Single,
            0x3a => Layout::Double,
            0x41 => Layout::OctetString,
            0x42 => Layout::CharString,
            0x48 => Layout::Array,
            0x4c => Layout::Structure,
            0xe2 => Layout::Unsigned(4),
            0xe8 | 0xe9 => Layout::Unsigned(2),
            0xf0 => Layout::Unsigned(8),
            _ => return None,
        };
        Some(layout)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    NoData,
    Boolean,
    Unsigned(usize),
    Signed(usize),
    Half,
    Single,
    Double,
    OctetString,
    CharString,
    Array,
    Structure,
}

/// A decoded attribute value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// No data, or the invalid marker of a string/array type
    Null,
    Bool(bool),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Text(String),
    #[serde(serialize_with = "serialize_hex")]
    Octets(Vec<u8>),
    List(Vec<AttributeValue>),
}

fn serialize_hex<S: Serializer>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

impl AttributeValue {
    /// Read a value of `data_type` from the front of `buf`
    pub fn decode(data_type: DataType, buf: &mut Bytes) -> Result<Self> {
        let layout = data_type
            .layout()
            .ok_or(ZclError::UnsupportedDataType(data_type.0))?;

        let value = match layout {
            Layout::NoData => AttributeValue::Null,
            Layout::Boolean => {
                need(buf, 1)?;
                match buf.get_u8() {
                    0xff => AttributeValue::Null,
                    b => AttributeValue::Bool(b != 0),
                }
            }
            Layout::Unsigned(width) => {
                need(buf, width)?;
                AttributeValue::Unsigned(buf.get_uint_le(width))
            }
            Layout::Signed(width) => {
                need(buf, width)?;
                AttributeValue::Signed(buf.get_int_le(width))
            }
            Layout::Half => {
                need(buf, 2)?;
                AttributeValue::Float(f64::from(half_to_f32(buf.get_u16_le())))
            }
            Layout::Single => {
                need(buf, 4)?;
                AttributeValue::Float(f64::from(buf.get_f32_le()))
            }
            Layout::Double => {
                need(buf, 8)?;
                AttributeValue::Float(buf.get_f64_le())
            }
            Layout::OctetString | Layout::CharString => {
                need(buf, 1)?;
                let len = buf.get_u8();
                if len == 0xff {
                    return Ok(AttributeValue::Null);
                }
                let len = usize::from(len);
                need(buf, len)?;
                let raw = buf.copy_to_bytes(len);
                if layout == Layout::CharString {
                    AttributeValue::Text(String::from_utf8_lossy(&raw).into_owned())
                } else {
                    AttributeValue::Octets(raw.to_vec())
                }
            }
            Layout::Array => {
                need(buf, 3)?;
                let element_type = DataType(buf.get_u8());
                let count = buf.get_u16_le();
                if count == 0xffff {
                    return Ok(AttributeValue::Null);
                }
                let mut items = Vec::with_capacity(usize::from(count).min(64));
                for _ in 0..count {
                    items.push(AttributeValue::decode(element_type, buf)?);
                }
                AttributeValue::List(items)
            }
            Layout::Structure => {
                need(buf, 2)?;
                let count = buf.get_u16_le();
                if count == 0xffff {
                    return Ok(AttributeValue::Null);
                }
                let mut items = Vec::with_capacity(usize::from(count).min(64));
                for _ in 0..count {
                    need(buf, 1)?;
                    let element_type = DataType(buf.get_u8());
                    items.push(AttributeValue::decode(element_type, buf)?);
                }
                AttributeValue::List(items)
            }
        };

        Ok(value)
    }

    /// Append this value in the layout of `data_type`
    pub fn encode(&self, data_type: DataType, buf: &mut BytesMut) -> Result<()> {
        let layout = data_type
            .layout()
            .ok_or(ZclError::UnsupportedDataType(data_type.0))?;
        let mismatch = || ZclError::InvalidFrame(format!("{:?} cannot be encoded as {}", self, data_type));

        match (layout, self) {
            (Layout::NoData, _) => {}
            (Layout::Boolean, AttributeValue::Bool(b)) => buf.put_u8(u8::from(*b)),
            (Layout::Unsigned(width), AttributeValue::Unsigned(v)) => {
                if width < 8 && *v >> (width * 8) != 0 {
                    return Err(mismatch());
                }
                buf.put_uint_le(*v, width);
            }
            (Layout::Signed(width), AttributeValue::Signed(v)) => {
                let bits = width * 8;
                if bits < 64 && (*v < -(1i64 << (bits - 1)) || *v >= (1i64 << (bits - 1))) {
                    return Err(mismatch());
                }
                buf.put_int_le(*v, width);
            }
            (Layout::Single, AttributeValue::Float(v)) => buf.put_f32_le(*v as f32),
            (Layout::Double, AttributeValue::Float(v)) => buf.put_f64_le(*v),
            (Layout::CharString, AttributeValue::Text(s)) => put_short_string(buf, s.as_bytes())?,
            (Layout::OctetString, AttributeValue::Octets(b)) => put_short_string(buf, b)?,
            (Layout::Half | Layout::Array | Layout::Structure, _) => {
                return Err(ZclError::UnsupportedDataType(data_type.0))
            }
            _ => return Err(mismatch()),
        }

        Ok(())
    }

    /// Convert a bus-supplied JSON value to a value of `data_type`
    ///
    /// Follows the field setter rules: `Ok(None)` for kinds the type does
    /// not accept, [`ZclError::FieldOutOfRange`] for values that do not fit.
    pub fn from_json(data_type: DataType, field: &str, value: &Value) -> Result<Option<Self>> {
        let Some(layout) = data_type.layout() else {
            return Ok(None);
        };

        let converted = match layout {
            Layout::Boolean => coerce_bool(value).map(AttributeValue::Bool),
            Layout::Unsigned(width) => {
                let max = if width >= 8 { u64::MAX } else { (1u64 << (width * 8)) - 1 };
                coerce_unsigned(field, value, max)?.map(AttributeValue::Unsigned)
            }
            Layout::Signed(width) => {
                let bits = width * 8;
                let (min, max) = if bits >= 64 {
                    (i64::MIN, i64::MAX)
                } else {
                    (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
                };
                coerce_signed(field, value, min, max)?.map(AttributeValue::Signed)
            }
            Layout::Single | Layout::Double => coerce_float(value).map(AttributeValue::Float),
            Layout::CharString => coerce_text(value).map(AttributeValue::Text),
            Layout::OctetString => coerce_text(value)
                .and_then(|s| hex::decode(s).ok())
                .map(AttributeValue::Octets),
            Layout::NoData | Layout::Half | Layout::Array | Layout::Structure => None,
        };

        Ok(converted)
    }
}

fn put_short_string(buf: &mut BytesMut, bytes: &[u8]) -> Result<()> {
    let len = u8::try_from(bytes.len())
        .ok()
        .filter(|l| *l != 0xff)
        .ok_or_else(|| ZclError::InvalidFrame(format!("string of {} bytes too long", bytes.len())))?;
    buf.put_u8(len);
    buf.put_slice(bytes);
    Ok(())
}

/// IEEE 754 binary16 to binary32
fn half_to_f32(bits: u16) -> f32 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = i32::from((bits >> 10) & 0x1f);
    let mantissa = f32::from(bits & 0x03ff);

    match exponent {
        0 => sign * mantissa * 2f32.powi(-24),
        0x1f if mantissa == 0.0 => sign * f32::INFINITY,
        0x1f => f32::NAN,
        e => sign * (1.0 + mantissa / 1024.0) * 2f32.powi(e - 15),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(data_type: DataType, bytes: &'static [u8]) -> AttributeValue {
        AttributeValue::decode(data_type, &mut Bytes::from_static(bytes)).unwrap()
    }

    #[test]
    fn test_decode_integers() {
        assert_eq!(decode(DataType::UINT8, &[0xfe]), AttributeValue::Unsigned(254));
        assert_eq!(
            decode(DataType::UINT24, &[0x01, 0x02, 0x03]),
            AttributeValue::Unsigned(0x030201)
        );
        assert_eq!(decode(DataType::INT16, &[0x2e, 0xfb]), AttributeValue::Signed(-1234));
        assert_eq!(decode(DataType::ENUM8, &[0x02]), AttributeValue::Unsigned(2));
        assert_eq!(decode(DataType::BOOLEAN, &[0x01]), AttributeValue::Bool(true));
    }

    #[test]
    fn test_decode_strings() {
        assert_eq!(
            decode(DataType::CHAR_STRING, &[0x04, b'l', b'u', b'm', b'i']),
            AttributeValue::Text("lumi".into())
        );
        assert_eq!(decode(DataType::CHAR_STRING, &[0xff]), AttributeValue::Null);
        assert_eq!(
            decode(DataType::OCTET_STRING, &[0x02, 0xab, 0xcd]),
            AttributeValue::Octets(vec![0xab, 0xcd])
        );
    }

    #[test]
    fn test_decode_half_float() {
        // 0x3c00 is 1.0, 0xc000 is -2.0
        assert_eq!(decode(DataType::FLOAT16, &[0x00, 0x3c]), AttributeValue::Float(1.0));
        assert_eq!(decode(DataType::FLOAT16, &[0x00, 0xc0]), AttributeValue::Float(-2.0));
    }

    #[test]
    fn test_decode_array() {
        let value = decode(DataType::ARRAY, &[0x20, 0x02, 0x00, 0x05, 0x06]);
        assert_eq!(
            value,
            AttributeValue::List(vec![AttributeValue::Unsigned(5), AttributeValue::Unsigned(6)])
        );
    }

    #[test]
    fn test_decode_errors() {
        let err = AttributeValue::decode(DataType::UINT32, &mut Bytes::from_static(&[1, 2])).unwrap_err();
        assert!(matches!(err, ZclError::Truncated { needed: 4, remaining: 2 }));

        let err = AttributeValue::decode(DataType(0x99), &mut Bytes::new()).unwrap_err();
        assert!(matches!(err, ZclError::UnsupportedDataType(0x99)));
    }

    #[test]
    fn test_encode_checks_width() {
        let mut buf = BytesMut::new();
        AttributeValue::Unsigned(300)
            .encode(DataType::UINT16, &mut buf)
            .unwrap();
        assert_eq!(&buf[..], &[0x2c, 0x01]);

        assert!(AttributeValue::Unsigned(300)
            .encode(DataType::UINT8, &mut buf)
            .is_err());
        assert!(AttributeValue::Signed(-129).encode(DataType::INT8, &mut buf).is_err());
        assert!(AttributeValue::Text("x".into())
            .encode(DataType::UINT8, &mut buf)
            .is_err());
    }

    #[test]
    fn test_from_json_follows_setter_rules() {
        assert_eq!(
            AttributeValue::from_json(DataType::UINT16, "OnTime", &json!(300)).unwrap(),
            Some(AttributeValue::Unsigned(300))
        );
        assert!(AttributeValue::from_json(DataType::UINT8, "x", &json!(-1)).is_err());
        assert_eq!(
            AttributeValue::from_json(DataType::INT8, "x", &json!(-1)).unwrap(),
            Some(AttributeValue::Signed(-1))
        );
        assert_eq!(
            AttributeValue::from_json(DataType::BOOLEAN, "x", &json!(1)).unwrap(),
            None
        );
        assert_eq!(
            AttributeValue::from_json(DataType::CHAR_STRING, "x", &json!("hi")).unwrap(),
            Some(AttributeValue::Text("hi".into()))
        );
    }

    #[test]
    fn test_json_shape() {
        let list = AttributeValue::List(vec![
            AttributeValue::Null,
            AttributeValue::Unsigned(1),
            AttributeValue::Octets(vec![0xbe, 0xef]),
        ]);
        assert_eq!(serde_json::to_value(&list).unwrap(), json!([null, 1, "beef"]));
    }
}
