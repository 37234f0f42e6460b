//! Structured record over a protocol schema.
//!
//! A [`SchemaRecord`] is an ordered list of `(name, value)` pairs laid out by a
//! [`ProtocolSchema`]. The generator builds one template record per run from
//! the schema defaults and stamps a copy for every message; the receiver
//! decodes captured payloads back into records with the same schema.

use std::sync::Arc;

use crate::types::{FieldValue, ProtocolSchema, TIMESTAMP_FIELD, field_codec};
use crate::{Result, TrafficError};

/// A record whose fields follow a shared schema, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaRecord {
    schema: Arc<ProtocolSchema>,
    values: Vec<FieldValue>,
}

impl SchemaRecord {
    /// Record with every field set to its schema default.
    pub fn from_defaults(schema: Arc<ProtocolSchema>) -> Self {
        let values = schema.fields.iter().map(|f| f.default.clone()).collect();
        Self { schema, values }
    }

    /// Look up a field value by name.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.schema.position(name).map(|idx| &self.values[idx])
    }

    /// Replace a field value; the value must match the declared type.
    pub fn set(&mut self, name: &str, value: FieldValue) -> Result<()> {
        let idx = self.schema.position(name).ok_or_else(|| {
            TrafficError::schema("record update", format!("no field named '{name}'"))
        })?;
        let declared = self.schema.fields[idx].field_type;
        if value.field_type() != declared {
            return Err(TrafficError::schema(
                "record update",
                format!("field '{name}' is a {declared}, got a {}", value.field_type()),
            ));
        }
        self.values[idx] = value;
        Ok(())
    }

    /// Stamp the `timestamp` field with a send time, if the schema has one.
    ///
    /// Integer fields take the integer part of the time; string fields take the
    /// decimal seconds. Returns whether a field was stamped.
    pub fn stamp(&mut self, sent_at: f64) -> Result<bool> {
        let Some(field) = self.schema.field(TIMESTAMP_FIELD) else {
            return Ok(false);
        };

        let value = match field.field_type {
            crate::types::FieldType::Str => FieldValue::Str(format!("{sent_at:.6}")),
            t if t.is_integer() => {
                FieldValue::from_integer(t, sent_at.trunc() as i64).ok_or_else(|| {
                    TrafficError::schema(
                        "timestamp field",
                        format!("{} cannot hold send time {}", t, sent_at.trunc()),
                    )
                })?
            }
            other => {
                return Err(TrafficError::schema(
                    "timestamp field",
                    format!("a {other} field cannot carry a timestamp"),
                ));
            }
        };

        self.set(TIMESTAMP_FIELD, value)?;
        Ok(true)
    }

    /// The `timestamp` field as seconds, if present.
    ///
    /// Returns `Some(Err(..))` when the field exists but does not hold a number.
    pub fn timestamp(&self) -> Option<Result<f64>> {
        let value = self.get(TIMESTAMP_FIELD)?;
        let parsed = match value {
            FieldValue::Str(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| TrafficError::invalid_timestamp(s.clone())),
            other => other
                .as_i64()
                .map(|v| v as f64)
                .ok_or_else(|| TrafficError::invalid_timestamp(other.to_string())),
        };
        Some(parsed)
    }

    /// Encode all fields back to back in schema order.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.encoded_hint());
        for value in &self.values {
            field_codec::encode_value(value, &mut out)?;
        }
        Ok(out)
    }

    /// Decode a payload with `schema`. Trailing bytes are ignored.
    pub fn decode(schema: Arc<ProtocolSchema>, data: &[u8]) -> Result<Self> {
        let mut values = Vec::with_capacity(schema.fields.len());
        let mut offset = 0;

        for field in &schema.fields {
            let (value, used) = field_codec::decode_value(field.field_type, &data[offset..])
                .map_err(|e| match e {
                    TrafficError::Decode { details, .. } => TrafficError::decode(
                        format!("field '{}' of {} at offset {}", field.name, schema.name, offset),
                        details,
                    ),
                    other => other,
                })?;
            values.push(value);
            offset += used;
        }

        if offset < data.len() {
            tracing::trace!(trailing = data.len() - offset, "ignoring bytes after last field");
        }

        Ok(Self { schema, values })
    }

    /// `(name, value)` pairs in schema order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.schema.fields.iter().map(|f| f.name.as_str()).zip(self.values.iter())
    }

    /// One-line summary, e.g. `Ping(seq=1, kind=echo, timestamp=1700000000)`.
    pub fn summary(&self) -> String {
        let fields = self
            .schema
            .fields
            .iter()
            .zip(&self.values)
            .map(|(spec, value)| match value {
                FieldValue::Enum(v) => match spec.choice_name(*v) {
                    Some(name) => format!("{}={}", spec.name, name),
                    None => format!("{}={}", spec.name, v),
                },
                other => format!("{}={}", spec.name, other),
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({})", self.schema.name, fields)
    }

    fn encoded_hint(&self) -> usize {
        self.values.iter().map(|v| v.field_type().fixed_size().unwrap_or(16)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ping_schema;
    use crate::types::{FieldSpec, FieldType};
    use proptest::prelude::*;
    use std::net::Ipv4Addr;

    fn wide_schema() -> Arc<ProtocolSchema> {
        let field = |name: &str, field_type, default| FieldSpec {
            name: name.to_string(),
            field_type,
            default,
            choices: Vec::new(),
        };
        Arc::new(
            ProtocolSchema::new(
                "Wide",
                vec![
                    field("b", FieldType::Byte, FieldValue::Byte(0)),
                    field("s", FieldType::Short, FieldValue::Short(0)),
                    field("label", FieldType::Str, FieldValue::Str(String::new())),
                    field("l", FieldType::Long, FieldValue::Long(0)),
                    field("ip", FieldType::IpAddress, FieldValue::IpAddress(Ipv4Addr::UNSPECIFIED)),
                    field("mac", FieldType::Mac, FieldValue::Mac([0; 6])),
                    field("e", FieldType::Enum, FieldValue::Enum(0)),
                    field("timestamp", FieldType::Int, FieldValue::Int(0)),
                ],
            )
            .unwrap(),
        )
    }

    proptest! {
        #[test]
        fn prop_records_round_trip_through_the_wire(
            b in any::<u8>(),
            s in any::<u16>(),
            label in "[a-zA-Z0-9 ]{0,40}",
            l in any::<u64>(),
            ip in any::<[u8; 4]>(),
            mac in any::<[u8; 6]>(),
            e in any::<u16>(),
            ts in 0i32..i32::MAX
        ) {
            let schema = wide_schema();
            let mut record = SchemaRecord::from_defaults(Arc::clone(&schema));
            record.set("b", FieldValue::Byte(b)).unwrap();
            record.set("s", FieldValue::Short(s)).unwrap();
            record.set("label", FieldValue::Str(label)).unwrap();
            record.set("l", FieldValue::Long(l)).unwrap();
            record.set("ip", FieldValue::IpAddress(Ipv4Addr::from(ip))).unwrap();
            record.set("mac", FieldValue::Mac(mac)).unwrap();
            record.set("e", FieldValue::Enum(e)).unwrap();
            record.stamp(ts as f64 + 0.75).unwrap();

            let bytes = record.encode().unwrap();
            let decoded = SchemaRecord::decode(schema, &bytes).unwrap();

            prop_assert_eq!(&decoded, &record);
            prop_assert_eq!(decoded.get("timestamp"), Some(&FieldValue::Int(ts)));
        }
    }

    #[test]
    fn ping_record_stamps_integer_seconds() {
        let schema = Arc::new(ping_schema());
        let mut record = SchemaRecord::from_defaults(Arc::clone(&schema));
        assert!(record.stamp(1_700_000_123.987).unwrap());

        assert_eq!(record.get("seq"), Some(&FieldValue::Int(1)));
        assert_eq!(record.get("timestamp"), Some(&FieldValue::Int(1_700_000_123)));
        let names: Vec<_> = record.fields().map(|(name, _)| name).collect();
        assert_eq!(names, ["seq", "timestamp"]);
        assert_eq!(record.encode().unwrap().len(), 8);
        assert_eq!(record.timestamp().unwrap().unwrap(), 1_700_000_123.0);
        assert_eq!(record.summary(), "Ping(seq=1, timestamp=1700000123)");
    }

    #[test]
    fn stamping_without_timestamp_field_is_a_no_op() {
        let schema = Arc::new(ProtocolSchema::from_json(
            r#"{"nome":"Bare","campos":[{"tipo":"ByteField","nome":"x","default":9}]}"#,
        )
        .unwrap());
        let mut record = SchemaRecord::from_defaults(schema);
        assert!(!record.stamp(5.0).unwrap());
        assert!(record.timestamp().is_none());
    }

    #[test]
    fn stamping_past_the_int_range_fails() {
        let mut record = SchemaRecord::from_defaults(Arc::new(ping_schema()));
        assert!(matches!(record.stamp(3_000_000_000.0), Err(TrafficError::Schema { .. })));
    }

    #[test]
    fn string_timestamps_keep_fractional_seconds() {
        let schema = Arc::new(ProtocolSchema::from_json(
            r#"{"nome":"S","campos":[{"tipo":"StrField","nome":"timestamp"}]}"#,
        )
        .unwrap());
        let mut record = SchemaRecord::from_defaults(schema);
        record.stamp(12.5).unwrap();
        assert_eq!(record.get("timestamp"), Some(&FieldValue::Str("12.500000".into())));
        assert_eq!(record.timestamp().unwrap().unwrap(), 12.5);
    }

    #[test]
    fn short_payload_names_the_failing_field() {
        let schema = Arc::new(ping_schema());
        let err = SchemaRecord::decode(schema, &[0, 0, 0, 1, 0, 0]).unwrap_err();
        match err {
            TrafficError::Decode { context, .. } => assert!(context.contains("timestamp")),
            other => panic!("expected Decode error, got {other:?}"),
        }
    }

    #[test]
    fn set_rejects_mismatched_types() {
        let mut record = SchemaRecord::from_defaults(Arc::new(ping_schema()));
        assert!(record.set("seq", FieldValue::Byte(1)).is_err());
        assert!(record.set("missing", FieldValue::Int(1)).is_err());
    }
}
