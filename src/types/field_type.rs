//! Schema field type definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Supported schema field types.
///
/// The closed set of primitive kinds a declarative schema may use. Each kind
/// has a fixed wire encoding except `Str`, which is length-prefixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// 32-bit signed integer
    Int,
    /// Length-prefixed UTF-8 string
    Str,
    /// 8-bit unsigned integer
    Byte,
    /// 16-bit unsigned integer
    Short,
    /// 64-bit unsigned integer
    Long,
    /// IPv4 address
    IpAddress,
    /// 48-bit hardware address
    Mac,
    /// 16-bit unsigned value constrained to a set of named choices
    Enum,
}

impl FieldType {
    /// Resolve a schema `tipo` name to a field type.
    ///
    /// Accepts the `*Field` names used by schema files as well as the bare
    /// kind names. Returns `None` for anything else.
    pub fn from_type_name(name: &str) -> Option<Self> {
        let kind = match name {
            "IntField" | "Int" => FieldType::Int,
            "StrField" | "Str" => FieldType::Str,
            "ByteField" | "Byte" => FieldType::Byte,
            "ShortField" | "Short" => FieldType::Short,
            "LongField" | "Long" => FieldType::Long,
            "IPField" | "IPAddress" => FieldType::IpAddress,
            "MACField" | "MAC" => FieldType::Mac,
            "EnumField" | "Enum" => FieldType::Enum,
            _ => return None,
        };
        Some(kind)
    }

    /// Encoded size in bytes, or `None` for variable-length kinds.
    pub const fn fixed_size(&self) -> Option<usize> {
        match self {
            FieldType::Byte => Some(1),
            FieldType::Short | FieldType::Enum => Some(2),
            FieldType::Int | FieldType::IpAddress => Some(4),
            FieldType::Mac => Some(6),
            FieldType::Long => Some(8),
            FieldType::Str => None,
        }
    }

    /// Whether values of this kind are integers.
    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            FieldType::Int | FieldType::Byte | FieldType::Short | FieldType::Long | FieldType::Enum
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Int => "IntField",
            FieldType::Str => "StrField",
            FieldType::Byte => "ByteField",
            FieldType::Short => "ShortField",
            FieldType::Long => "LongField",
            FieldType::IpAddress => "IPField",
            FieldType::Mac => "MACField",
            FieldType::Enum => "EnumField",
        };
        f.write_str(name)
    }
}

/// Runtime value held by one record field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldValue {
    Int(i32),
    Str(String),
    Byte(u8),
    Short(u16),
    Long(u64),
    IpAddress(Ipv4Addr),
    Mac([u8; 6]),
    Enum(u16),
}

impl FieldValue {
    /// The field type this value encodes as.
    pub const fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Int(_) => FieldType::Int,
            FieldValue::Str(_) => FieldType::Str,
            FieldValue::Byte(_) => FieldType::Byte,
            FieldValue::Short(_) => FieldType::Short,
            FieldValue::Long(_) => FieldType::Long,
            FieldValue::IpAddress(_) => FieldType::IpAddress,
            FieldValue::Mac(_) => FieldType::Mac,
            FieldValue::Enum(_) => FieldType::Enum,
        }
    }

    /// Integer view of the value, if it is integer-typed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(i64::from(*v)),
            FieldValue::Byte(v) => Some(i64::from(*v)),
            FieldValue::Short(v) | FieldValue::Enum(v) => Some(i64::from(*v)),
            FieldValue::Long(v) => i64::try_from(*v).ok(),
            FieldValue::Str(_) | FieldValue::IpAddress(_) | FieldValue::Mac(_) => None,
        }
    }

    /// Build a value of `field_type` from an integer, if it fits.
    pub fn from_integer(field_type: FieldType, value: i64) -> Option<Self> {
        match field_type {
            FieldType::Int => i32::try_from(value).ok().map(FieldValue::Int),
            FieldType::Byte => u8::try_from(value).ok().map(FieldValue::Byte),
            FieldType::Short => u16::try_from(value).ok().map(FieldValue::Short),
            FieldType::Enum => u16::try_from(value).ok().map(FieldValue::Enum),
            FieldType::Long => u64::try_from(value).ok().map(FieldValue::Long),
            FieldType::Str | FieldType::IpAddress | FieldType::Mac => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Str(v) => write!(f, "{v:?}"),
            FieldValue::Byte(v) => write!(f, "{v}"),
            FieldValue::Short(v) | FieldValue::Enum(v) => write!(f, "{v}"),
            FieldValue::Long(v) => write!(f, "{v}"),
            FieldValue::IpAddress(v) => write!(f, "{v}"),
            FieldValue::Mac(m) => write!(
                f,
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                m[0], m[1], m[2], m[3], m[4], m[5]
            ),
        }
    }
}

/// Parse a colon- or dash-separated MAC address.
pub fn parse_mac(text: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = text.split([':', '-']);
    for byte in mac.iter_mut() {
        let part = parts.next()?;
        if part.len() != 2 {
            return None;
        }
        *byte = u8::from_str_radix(part, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(mac)
}
