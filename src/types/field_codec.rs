//! Wire encoding for schema field values
//!
//! One encoder and one decoder per [`FieldType`], selected by a single match.
//! All multi-byte integers are big-endian.

use std::net::Ipv4Addr;

use super::{FieldType, FieldValue};
use crate::{Result, TrafficError};

/// Append the wire form of `value` to `out`.
pub fn encode_value(value: &FieldValue, out: &mut Vec<u8>) -> Result<()> {
    match value {
        FieldValue::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
        FieldValue::Byte(v) => out.push(*v),
        FieldValue::Short(v) | FieldValue::Enum(v) => out.extend_from_slice(&v.to_be_bytes()),
        FieldValue::Long(v) => out.extend_from_slice(&v.to_be_bytes()),
        FieldValue::IpAddress(ip) => out.extend_from_slice(&ip.octets()),
        FieldValue::Mac(mac) => out.extend_from_slice(mac),
        FieldValue::Str(s) => {
            let len = u16::try_from(s.len()).map_err(|_| {
                TrafficError::decode("string field", format!("{} bytes exceeds 65535", s.len()))
            })?;
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(s.as_bytes());
        }
    }
    Ok(())
}

/// Decode one value of `field_type` from the front of `data`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_value(field_type: FieldType, data: &[u8]) -> Result<(FieldValue, usize)> {
    match field_type {
        FieldType::Int => {
            let bytes = take::<4>(data, field_type)?;
            Ok((FieldValue::Int(i32::from_be_bytes(bytes)), 4))
        }
        FieldType::Byte => {
            let [byte] = take::<1>(data, field_type)?;
            Ok((FieldValue::Byte(byte), 1))
        }
        FieldType::Short => {
            let bytes = take::<2>(data, field_type)?;
            Ok((FieldValue::Short(u16::from_be_bytes(bytes)), 2))
        }
        FieldType::Enum => {
            let bytes = take::<2>(data, field_type)?;
            Ok((FieldValue::Enum(u16::from_be_bytes(bytes)), 2))
        }
        FieldType::Long => {
            let bytes = take::<8>(data, field_type)?;
            Ok((FieldValue::Long(u64::from_be_bytes(bytes)), 8))
        }
        FieldType::IpAddress => {
            let bytes = take::<4>(data, field_type)?;
            Ok((FieldValue::IpAddress(Ipv4Addr::from(bytes)), 4))
        }
        FieldType::Mac => {
            let bytes = take::<6>(data, field_type)?;
            Ok((FieldValue::Mac(bytes), 6))
        }
        FieldType::Str => {
            let len = u16::from_be_bytes(take::<2>(data, field_type)?) as usize;
            let body = data.get(2..2 + len).ok_or_else(|| {
                TrafficError::decode(
                    "string field",
                    format!("declared {} bytes, {} available", len, data.len().saturating_sub(2)),
                )
            })?;
            let text = std::str::from_utf8(body)
                .map_err(|e| TrafficError::decode("string field", e.to_string()))?;
            Ok((FieldValue::Str(text.to_string()), 2 + len))
        }
    }
}

fn take<const N: usize>(data: &[u8], field_type: FieldType) -> Result<[u8; N]> {
    data.get(..N).and_then(|bytes| <[u8; N]>::try_from(bytes).ok()).ok_or_else(|| {
        TrafficError::decode(
            format!("{field_type} value"),
            format!("need {} bytes, {} available", N, data.len()),
        )
    })
}
