//! Declarative protocol schema types
//!
//! A schema file names a protocol and lists its fields in wire order:
//!
//! ```json
//! {"nome": "Ping", "campos": [
//!     {"tipo": "IntField", "nome": "seq", "default": 1},
//!     {"tipo": "EnumField", "nome": "kind", "default": "echo", "args": [["echo", "reply"]]},
//!     {"tipo": "IntField", "nome": "timestamp", "default": 0}
//! ]}
//! ```
//!
//! Loading resolves every field type and default eagerly, so an unknown type
//! or an out-of-range default fails before any traffic is sent or captured.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::Path;

use super::field_type::parse_mac;
use super::{FieldType, FieldValue};
use crate::{Result, TrafficError};

/// Name of the field the generator stamps with the send time.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Parsed protocol schema: a name plus fields in wire order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolSchema {
    /// Protocol name as declared in the schema file
    pub name: String,
    /// Fields in declaration (and wire) order
    pub fields: Vec<FieldSpec>,
}

/// One declared field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    /// Value used for every generated record unless overridden
    pub default: FieldValue,
    /// Named choices for `Enum` fields, as (value, name) pairs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<(u16, String)>,
}

impl FieldSpec {
    /// Name of the enum choice matching `value`, if any.
    pub fn choice_name(&self, value: u16) -> Option<&str> {
        self.choices.iter().find(|(v, _)| *v == value).map(|(_, name)| name.as_str())
    }
}

/// Schema file layout as written on disk.
#[derive(Debug, Deserialize)]
struct RawSchema {
    nome: String,
    campos: Vec<RawField>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    tipo: String,
    nome: String,
    #[serde(default)]
    default: Option<JsonValue>,
    #[serde(default)]
    args: Vec<JsonValue>,
}

impl ProtocolSchema {
    /// Load and validate a schema from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| TrafficError::file_error(path.to_path_buf(), e))?;
        Self::from_json(&text)
    }

    /// Parse and validate a schema from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawSchema = serde_json::from_str(text)
            .map_err(|e| TrafficError::schema("schema JSON", e.to_string()))?;

        let mut fields = Vec::with_capacity(raw.campos.len());
        for raw_field in raw.campos {
            fields.push(resolve_field(raw_field)?);
        }

        Self::new(raw.nome, fields)
    }

    /// Create a schema from already-resolved fields.
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Result<Self> {
        let schema = Self { name: name.into(), fields };
        schema.validate()?;
        Ok(schema)
    }

    /// Validate the schema for consistency.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(TrafficError::schema("Schema validation", "Field with empty name"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(TrafficError::schema(
                    "Schema validation",
                    format!("Duplicate field name '{}'", field.name),
                ));
            }
            if field.default.field_type() != field.field_type {
                return Err(TrafficError::schema(
                    "Schema validation",
                    format!(
                        "Default for '{}' is a {} but the field is a {}",
                        field.name,
                        field.default.field_type(),
                        field.field_type
                    ),
                ));
            }
            if field.name == TIMESTAMP_FIELD
                && !matches!(field.field_type, FieldType::Int | FieldType::Long | FieldType::Str)
            {
                return Err(TrafficError::schema(
                    "Schema validation",
                    format!("a {} field cannot carry a timestamp", field.field_type),
                ));
            }
            if let FieldValue::Str(s) = &field.default {
                if s.len() > usize::from(u16::MAX) {
                    return Err(TrafficError::schema(
                        "Schema validation",
                        format!("Default for '{}' is {} bytes, over 65535", field.name, s.len()),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Get a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Position of a field in wire order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Whether the schema carries a `timestamp` field.
    pub fn has_timestamp(&self) -> bool {
        self.field(TIMESTAMP_FIELD).is_some()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

fn resolve_field(raw: RawField) -> Result<FieldSpec> {
    let field_type = FieldType::from_type_name(&raw.tipo)
        .ok_or_else(|| TrafficError::unsupported_field_type(&raw.nome, &raw.tipo))?;

    let choices = if field_type == FieldType::Enum {
        parse_choices(&raw.nome, &raw.args)?
    } else {
        Vec::new()
    };

    let default = match &raw.default {
        None | Some(JsonValue::Null) => zero_value(field_type),
        Some(value) => default_value(&raw.nome, field_type, value, &choices)?,
    };

    Ok(FieldSpec { name: raw.nome, field_type, default, choices })
}

/// Value a field takes when the schema gives no default.
fn zero_value(field_type: FieldType) -> FieldValue {
    match field_type {
        FieldType::Int => FieldValue::Int(0),
        FieldType::Str => FieldValue::Str(String::new()),
        FieldType::Byte => FieldValue::Byte(0),
        FieldType::Short => FieldValue::Short(0),
        FieldType::Long => FieldValue::Long(0),
        FieldType::IpAddress => FieldValue::IpAddress(Ipv4Addr::UNSPECIFIED),
        FieldType::Mac => FieldValue::Mac([0; 6]),
        FieldType::Enum => FieldValue::Enum(0),
    }
}

fn default_value(
    field: &str,
    field_type: FieldType,
    value: &JsonValue,
    choices: &[(u16, String)],
) -> Result<FieldValue> {
    let bad = |why: &str| {
        TrafficError::schema(
            format!("default of field '{field}'"),
            format!("{value} is not a valid {field_type}: {why}"),
        )
    };

    match field_type {
        FieldType::Str => match value {
            JsonValue::String(s) => Ok(FieldValue::Str(s.clone())),
            JsonValue::Number(n) => Ok(FieldValue::Str(n.to_string())),
            _ => Err(bad("expected a string")),
        },
        FieldType::IpAddress => value
            .as_str()
            .and_then(|s| s.parse::<Ipv4Addr>().ok())
            .map(FieldValue::IpAddress)
            .ok_or_else(|| bad("expected a dotted IPv4 address")),
        FieldType::Mac => value
            .as_str()
            .and_then(parse_mac)
            .map(FieldValue::Mac)
            .ok_or_else(|| bad("expected a MAC address like 00:11:22:33:44:55")),
        FieldType::Enum => {
            if let Some(name) = value.as_str() {
                return choices
                    .iter()
                    .find(|(_, choice)| choice == name)
                    .map(|(v, _)| FieldValue::Enum(*v))
                    .ok_or_else(|| bad("not one of the declared choices"));
            }
            integer_default(value)
                .and_then(|v| FieldValue::from_integer(FieldType::Enum, v))
                .ok_or_else(|| bad("expected a choice name or a 16-bit value"))
        }
        FieldType::Int | FieldType::Byte | FieldType::Short | FieldType::Long => {
            integer_default(value)
                .and_then(|v| FieldValue::from_integer(field_type, v))
                .ok_or_else(|| bad("expected an integer in range"))
        }
    }
}

/// Integer defaults may be written as numbers or numeric strings.
fn integer_default(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        JsonValue::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Enum choices come either as a list of names (value = index) or as an
/// object mapping numeric values to names, optionally wrapped in an outer list.
fn parse_choices(field: &str, args: &[JsonValue]) -> Result<Vec<(u16, String)>> {
    let bad = |details: String| TrafficError::schema(format!("args of field '{field}'"), details);

    let spec = match args {
        [] => return Ok(Vec::new()),
        [single @ (JsonValue::Array(_) | JsonValue::Object(_)), ..] => single,
        _ if args.iter().all(JsonValue::is_string) => {
            return Ok(args
                .iter()
                .enumerate()
                .filter_map(|(i, v)| v.as_str().map(|s| (i as u16, s.to_string())))
                .collect());
        }
        _ => return Err(bad("expected a list of choice names or a value-to-name map".into())),
    };

    match spec {
        JsonValue::Array(names) => names
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let name = v.as_str().ok_or_else(|| bad(format!("choice {v} is not a string")))?;
                let index =
                    u16::try_from(i).map_err(|_| bad("more than 65536 choices".to_string()))?;
                Ok((index, name.to_string()))
            })
            .collect(),
        JsonValue::Object(map) => {
            let mut choices = map
                .iter()
                .map(|(key, v)| {
                    let value = key
                        .trim()
                        .parse::<u16>()
                        .map_err(|_| bad(format!("choice key '{key}' is not a 16-bit value")))?;
                    let name =
                        v.as_str().ok_or_else(|| bad(format!("choice {v} is not a string")))?;
                    Ok((value, name.to_string()))
                })
                .collect::<Result<Vec<_>>>()?;
            choices.sort_by_key(|(v, _)| *v);
            Ok(choices)
        }
        _ => Err(bad("expected a list of choice names or a value-to-name map".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PING: &str = r#"{"nome":"Ping","campos":[
        {"tipo":"IntField","nome":"seq","default":1},
        {"tipo":"IntField","nome":"timestamp","default":0}]}"#;

    #[test]
    fn loads_ping_schema_in_order() {
        let schema = ProtocolSchema::from_json(PING).unwrap();
        assert_eq!(schema.name, "Ping");
        assert_eq!(schema.field_count(), 2);
        assert_eq!(schema.fields[0].name, "seq");
        assert_eq!(schema.fields[0].default, FieldValue::Int(1));
        assert_eq!(schema.position("timestamp"), Some(1));
        assert!(schema.has_timestamp());
    }

    #[test]
    fn bogus_type_is_unsupported() {
        let err = ProtocolSchema::from_json(
            r#"{"nome":"X","campos":[{"tipo":"Bogus","nome":"a","default":0}]}"#,
        )
        .unwrap_err();
        match err {
            TrafficError::UnsupportedFieldType { field, type_name } => {
                assert_eq!(field, "a");
                assert_eq!(type_name, "Bogus");
            }
            other => panic!("expected UnsupportedFieldType, got {other:?}"),
        }
    }

    #[test]
    fn timestamp_field_must_hold_a_send_time() {
        for tipo in ["ByteField", "ShortField", "EnumField", "IPField", "MACField"] {
            let json = format!(r#"{{"nome":"T","campos":[{{"tipo":"{tipo}","nome":"timestamp"}}]}}"#);
            let err = ProtocolSchema::from_json(&json).unwrap_err();
            assert!(
                matches!(err, TrafficError::Schema { ref details, .. } if details.contains("timestamp")),
                "{tipo}: {err:?}"
            );
        }
        for tipo in ["IntField", "LongField", "StrField"] {
            let json = format!(r#"{{"nome":"T","campos":[{{"tipo":"{tipo}","nome":"timestamp"}}]}}"#);
            assert!(ProtocolSchema::from_json(&json).is_ok(), "{tipo}");
        }
    }

    #[test]
    fn oversized_string_default_is_rejected_at_load() {
        let long = "x".repeat(usize::from(u16::MAX) + 1);
        let json = format!(r#"{{"nome":"L","campos":[{{"tipo":"StrField","nome":"note","default":"{long}"}}]}}"#);
        let err = ProtocolSchema::from_json(&json).unwrap_err();
        assert!(matches!(err, TrafficError::Schema { .. }), "{err:?}");
    }

    #[test]
    fn missing_defaults_fall_back_to_zero_values() {
        let schema = ProtocolSchema::from_json(
            r#"{"nome":"Z","campos":[
                {"tipo":"StrField","nome":"s"},
                {"tipo":"IPField","nome":"ip"},
                {"tipo":"MACField","nome":"mac"},
                {"tipo":"LongField","nome":"l"}]}"#,
        )
        .unwrap();
        assert_eq!(schema.fields[0].default, FieldValue::Str(String::new()));
        assert_eq!(schema.fields[1].default, FieldValue::IpAddress(Ipv4Addr::UNSPECIFIED));
        assert_eq!(schema.fields[2].default, FieldValue::Mac([0; 6]));
        assert_eq!(schema.fields[3].default, FieldValue::Long(0));
    }

    #[test]
    fn out_of_range_default_is_a_schema_error() {
        let err = ProtocolSchema::from_json(
            r#"{"nome":"X","campos":[{"tipo":"ByteField","nome":"b","default":300}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, TrafficError::Schema { .. }), "{err:?}");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = ProtocolSchema::from_json(
            r#"{"nome":"X","campos":[
                {"tipo":"ByteField","nome":"b"},
                {"tipo":"ShortField","nome":"b"}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn enum_choices_from_list_and_map() {
        let schema = ProtocolSchema::from_json(
            r#"{"nome":"E","campos":[
                {"tipo":"EnumField","nome":"kind","default":"reply","args":[["echo","reply"]]},
                {"tipo":"EnumField","nome":"code","default":7,"args":[{"7":"seven","1":"one"}]},
                {"tipo":"EnumField","nome":"flat","default":"b","args":["a","b","c"]}]}"#,
        )
        .unwrap();

        assert_eq!(schema.fields[0].default, FieldValue::Enum(1));
        assert_eq!(schema.fields[0].choice_name(0), Some("echo"));
        assert_eq!(schema.fields[1].default, FieldValue::Enum(7));
        assert_eq!(schema.fields[1].choices, vec![(1, "one".into()), (7, "seven".into())]);
        assert_eq!(schema.fields[2].default, FieldValue::Enum(1));
    }

    #[test]
    fn unknown_enum_choice_is_rejected() {
        let err = ProtocolSchema::from_json(
            r#"{"nome":"E","campos":[
                {"tipo":"EnumField","nome":"kind","default":"nope","args":[["echo"]]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, TrafficError::Schema { .. }));
    }

    #[test]
    fn malformed_json_is_a_schema_error() {
        let err = ProtocolSchema::from_json("{\"nome\": ").unwrap_err();
        assert!(matches!(err, TrafficError::Schema { .. }));
    }
}
