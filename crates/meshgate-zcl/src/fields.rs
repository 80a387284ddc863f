//! Dynamic field population
//!
//! Command parameters arrive from the bus as an untyped JSON object, while
//! the encoder needs a concrete command struct. [`FieldSetter`] bridges the
//! two: for every entry it finds the destination field by exact name and
//! converts the JSON scalar to the field's type.
//!
//! Conversion rules:
//!
//! - Any JSON number may populate any numeric field. Floats are truncated
//!   toward zero first.
//! - A value that does not fit the destination (negative into unsigned,
//!   too large for the width) is rejected with
//!   [`ZclError::FieldOutOfRange`]. The sign is never discarded.
//! - Booleans and strings only populate fields of the same kind.
//! - Unknown keys, mismatched kinds and non-scalar values are skipped and
//!   the field keeps its default.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, ZclError};
use crate::types::need;

/// A command whose fields can be assigned by wire name
pub trait SetField {
    /// Assign `value` to the field called `name`
    ///
    /// Returns `Ok(false)` when the field does not exist or the value kind
    /// is not accepted by it.
    fn set_field(&mut self, name: &str, value: &Value) -> Result<bool>;
}

/// A scalar that can live in a fixed-layout command
pub trait CommandField: Sized + Default {
    /// Convert a JSON value, `None` when the kind is not accepted
    fn from_json(field: &str, value: &Value) -> Result<Option<Self>>;

    /// Append the little-endian wire form
    fn encode(&self, buf: &mut BytesMut);

    /// Read the little-endian wire form
    fn decode(buf: &mut Bytes) -> Result<Self>;
}

/// Populates typed commands from untyped parameter maps
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldSetter;

impl FieldSetter {
    /// Copy every recognised entry of `params` onto `target`
    ///
    /// Returns the number of fields assigned. Stops at the first value that
    /// is out of range for its field.
    pub fn apply<T: SetField + ?Sized>(target: &mut T, params: &Map<String, Value>) -> Result<usize> {
        let mut assigned = 0;
        for (name, value) in params {
            if target.set_field(name, value)? {
                assigned += 1;
            } else {
                debug!(field = %name, "Skipping parameter with no matching field");
            }
        }
        Ok(assigned)
    }
}

fn out_of_range(field: &str, value: &Value) -> ZclError {
    ZclError::FieldOutOfRange {
        field: field.to_string(),
        value: value.to_string(),
    }
}

/// Convert to an unsigned integer no larger than `max`
pub(crate) fn coerce_unsigned(field: &str, value: &Value, max: u64) -> Result<Option<u64>> {
    let Value::Number(n) = value else {
        return Ok(None);
    };

    if let Some(u) = n.as_u64() {
        return if u <= max {
            Ok(Some(u))
        } else {
            Err(out_of_range(field, value))
        };
    }
    if n.is_i64() {
        // as_u64 failed, so the integer is negative
        return Err(out_of_range(field, value));
    }
    match n.as_f64().map(f64::trunc) {
        Some(t) if t.is_finite() && t >= 0.0 && t <= max as f64 => Ok(Some(t as u64)),
        Some(_) => Err(out_of_range(field, value)),
        None => Ok(None),
    }
}

/// Convert to a signed integer within `min..=max`
pub(crate) fn coerce_signed(field: &str, value: &Value, min: i64, max: i64) -> Result<Option<i64>> {
    let Value::Number(n) = value else {
        return Ok(None);
    };

    if let Some(i) = n.as_i64() {
        return if i >= min && i <= max {
            Ok(Some(i))
        } else {
            Err(out_of_range(field, value))
        };
    }
    if n.is_u64() {
        // larger than i64::MAX
        return Err(out_of_range(field, value));
    }
    match n.as_f64().map(f64::trunc) {
        Some(t) if t.is_finite() && t >= min as f64 && t <= max as f64 => Ok(Some(t as i64)),
        Some(_) => Err(out_of_range(field, value)),
        None => Ok(None),
    }
}

/// Convert to a float; any JSON number qualifies
pub(crate) fn coerce_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Booleans only accept booleans
pub(crate) fn coerce_bool(value: &Value) -> Option<bool> {
    value.as_bool()
}

/// Strings only accept strings
pub(crate) fn coerce_text(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

macro_rules! unsigned_field {
    ($ty:ty, $put:ident, $get:ident) => {
        impl CommandField for $ty {
            fn from_json(field: &str, value: &Value) -> Result<Option<Self>> {
                Ok(coerce_unsigned(field, value, <$ty>::MAX as u64)?.map(|v| v as $ty))
            }

            fn encode(&self, buf: &mut BytesMut) {
                buf.$put(*self);
            }

            fn decode(buf: &mut Bytes) -> Result<Self> {
                need(buf, std::mem::size_of::<$ty>())?;
                Ok(buf.$get())
            }
        }
    };
}

macro_rules! signed_field {
    ($ty:ty, $put:ident, $get:ident) => {
        impl CommandField for $ty {
            fn from_json(field: &str, value: &Value) -> Result<Option<Self>> {
                Ok(coerce_signed(field, value, <$ty>::MIN as i64, <$ty>::MAX as i64)?
                    .map(|v| v as $ty))
            }

            fn encode(&self, buf: &mut BytesMut) {
                buf.$put(*self);
            }

            fn decode(buf: &mut Bytes) -> Result<Self> {
                need(buf, std::mem::size_of::<$ty>())?;
                Ok(buf.$get())
            }
        }
    };
}

unsigned_field!(u8, put_u8, get_u8);
unsigned_field!(u16, put_u16_le, get_u16_le);
unsigned_field!(u32, put_u32_le, get_u32_le);
signed_field!(i8, put_i8, get_i8);
signed_field!(i16, put_i16_le, get_i16_le);
signed_field!(i32, put_i32_le, get_i32_le);

impl CommandField for bool {
    fn from_json(_field: &str, value: &Value) -> Result<Option<Self>> {
        Ok(coerce_bool(value))
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(u8::from(*self));
    }

    fn decode(buf: &mut Bytes) -> Result<Self> {
        need(buf, 1)?;
        Ok(buf.get_u8() != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::TypedCommand;
    use serde_json::json;

    cluster_command! {
        /// Probe with one field of each supported kind
        Probe {
            level: u16 => "Level",
            offset: i8 => "Offset",
            enabled: bool => "Enabled",
        }
    }

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_integer_populates_unsigned_field() {
        let mut probe = Probe::default();
        let n = FieldSetter::apply(&mut probe, &params(json!({"Level": 108}))).unwrap();
        assert_eq!(n, 1);
        assert_eq!(probe.level, 108);
    }

    #[test]
    fn test_negative_into_unsigned_is_rejected() {
        let mut probe = Probe::default();
        let err = FieldSetter::apply(&mut probe, &params(json!({"Level": -5}))).unwrap_err();
        assert!(matches!(err, ZclError::FieldOutOfRange { ref field, .. } if field == "Level"));
        assert_eq!(probe.level, 0);
    }

    #[test]
    fn test_too_wide_is_rejected() {
        let mut probe = Probe::default();
        assert!(FieldSetter::apply(&mut probe, &params(json!({"Level": 70000}))).is_err());
        assert!(FieldSetter::apply(&mut probe, &params(json!({"Offset": 200}))).is_err());
    }

    #[test]
    fn test_float_truncates_toward_zero() {
        let mut probe = Probe::default();
        FieldSetter::apply(&mut probe, &params(json!({"Level": 12.9, "Offset": -3.7}))).unwrap();
        assert_eq!(probe.level, 12);
        assert_eq!(probe.offset, -3);
    }

    #[test]
    fn test_kind_mismatch_is_skipped() {
        let mut probe = Probe::default();
        let n = FieldSetter::apply(
            &mut probe,
            &params(json!({"Level": "high", "Enabled": 1, "Offset": [1]})),
        )
        .unwrap();
        assert_eq!(n, 0);
        assert_eq!(probe, Probe::default());
    }

    #[test]
    fn test_unknown_key_is_skipped() {
        let mut probe = Probe::default();
        let n = FieldSetter::apply(&mut probe, &params(json!({"level": 5, "Enabled": true}))).unwrap();
        assert_eq!(n, 1);
        assert_eq!(probe.level, 0);
        assert!(probe.enabled);
    }

    #[test]
    fn test_field_names_in_wire_order() {
        assert_eq!(Probe::FIELD_NAMES, &["Level", "Offset", "Enabled"]);

        let probe = Probe {
            level: 0x0102,
            offset: -1,
            enabled: true,
        };
        let mut buf = BytesMut::new();
        probe.encode_payload(&mut buf);
        assert_eq!(&buf[..], &[0x02, 0x01, 0xff, 0x01]);

        let decoded = Probe::decode_payload(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, probe);
    }

    #[test]
    fn test_decode_truncated() {
        let err = Probe::decode_payload(&mut Bytes::from_static(&[0x01])).unwrap_err();
        assert!(err.is_protocol_error());
    }
}
