//! Core data types for traffic generation and reception.
//!
//! ## Architecture
//!
//! - [`TrafficSpec`] describes one generator run; [`ReceiverConfig`] one receiver run
//! - [`ArrivalPlan`] holds the per-second packet counts drawn before a run starts
//! - [`ProtocolSchema`] / [`FieldSpec`] describe a schema-defined protocol
//! - [`FieldType`] / [`FieldValue`] are the closed set of field kinds and their values
//! - [`DelaySample`] / [`DelayStats`] carry receive-side measurements
//!
//! ## Usage Example
//!
//! ```rust
//! use burstgen::types::{FieldValue, ProtocolSchema, TrafficSpec, ProtocolKind};
//!
//! let schema = ProtocolSchema::from_json(
//!     r#"{"nome":"Ping","campos":[{"tipo":"IntField","nome":"seq","default":1}]}"#,
//! ).unwrap();
//! assert_eq!(schema.fields[0].default, FieldValue::Int(1));
//!
//! let spec = TrafficSpec::new(3, 5.0, ProtocolKind::Udp, "192.0.2.10");
//! assert!(spec.validate().is_ok());
//! ```

mod delay;
pub mod field_codec;
mod field_type;
mod listen;
mod plan;
mod protocol;
mod schema;
mod traffic;

// Re-export all public types
pub use delay::{DelaySample, DelayStats};
pub use field_type::{FieldType, FieldValue, parse_mac};
pub use listen::{DEFAULT_HTTP_PORT, ReceiverConfig};
pub use plan::ArrivalPlan;
pub use protocol::ProtocolKind;
pub use schema::{FieldSpec, ProtocolSchema, TIMESTAMP_FIELD};
pub use traffic::{
    DEFAULT_BROKER_PORT, DEFAULT_CUSTOM_IP_PROTOCOL, DEFAULT_PORT, DEFAULT_SEND_TIMEOUT,
    HttpHeader, ProtocolExtras, TrafficSpec, lookup_ipv4, resolve_ipv4,
};

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    const ALL_FIELD_TYPES: [FieldType; 8] = [
        FieldType::Int,
        FieldType::Str,
        FieldType::Byte,
        FieldType::Short,
        FieldType::Long,
        FieldType::IpAddress,
        FieldType::Mac,
        FieldType::Enum,
    ];

    proptest! {
        #[test]
        fn prop_integer_values_respect_type_range(
            field_type in prop::sample::select(ALL_FIELD_TYPES.to_vec()),
            value in any::<i64>()
        ) {
            match FieldValue::from_integer(field_type, value) {
                Some(v) => {
                    prop_assert_eq!(v.field_type(), field_type);
                    prop_assert_eq!(v.as_i64(), Some(value));
                }
                None => {
                    let fits = match field_type {
                        FieldType::Int => i32::try_from(value).is_ok(),
                        FieldType::Byte => u8::try_from(value).is_ok(),
                        FieldType::Short | FieldType::Enum => u16::try_from(value).is_ok(),
                        FieldType::Long => value >= 0,
                        FieldType::Str | FieldType::IpAddress | FieldType::Mac => false,
                    };
                    prop_assert!(!fits);
                }
            }
        }

        #[test]
        fn prop_fixed_size_matches_encoding(
            field_type in prop::sample::select(ALL_FIELD_TYPES.to_vec()),
            value in 0i64..=255
        ) {
            let v = match field_type {
                FieldType::Str => FieldValue::Str(value.to_string()),
                FieldType::IpAddress => FieldValue::IpAddress(std::net::Ipv4Addr::new(10, 0, 0, value as u8)),
                FieldType::Mac => FieldValue::Mac([value as u8; 6]),
                other => FieldValue::from_integer(other, value).unwrap(),
            };
            let mut out = Vec::new();
            field_codec::encode_value(&v, &mut out).unwrap();

            match field_type.fixed_size() {
                Some(size) => prop_assert_eq!(out.len(), size),
                None => prop_assert_eq!(out.len(), 2 + value.to_string().len()),
            }
        }

        #[test]
        fn prop_mac_text_round_trips(bytes in any::<[u8; 6]>()) {
            let text = FieldValue::Mac(bytes).to_string();
            prop_assert_eq!(parse_mac(&text), Some(bytes));
        }
    }

    #[test]
    fn type_names_resolve() {
        assert_eq!(FieldType::from_type_name("IntField"), Some(FieldType::Int));
        assert_eq!(FieldType::from_type_name("IPAddress"), Some(FieldType::IpAddress));
        assert_eq!(FieldType::from_type_name("MACField"), Some(FieldType::Mac));
        assert_eq!(FieldType::from_type_name("Bogus"), None);

        for field_type in ALL_FIELD_TYPES {
            let name = field_type.to_string();
            assert_eq!(FieldType::from_type_name(&name), Some(field_type));
        }
    }

    #[test]
    fn protocol_names_parse_case_insensitively() {
        assert_eq!("tcp".parse::<ProtocolKind>().unwrap(), ProtocolKind::Tcp);
        assert_eq!("Custom".parse::<ProtocolKind>().unwrap(), ProtocolKind::Custom);
        assert_eq!("MQTT".parse::<ProtocolKind>().unwrap(), ProtocolKind::Mqtt);
        assert!("XML".parse::<ProtocolKind>().is_err());

        for kind in ProtocolKind::ALL {
            assert_eq!(kind.to_string().parse::<ProtocolKind>().unwrap(), kind);
        }
    }

    #[test]
    fn arrival_plan_accessors() {
        let plan = ArrivalPlan::new(vec![3, 0, 7]);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.total(), 10);
        assert_eq!(plan.count_at(1), Some(0));
        assert_eq!(plan.count_at(3), None);
        assert_eq!(plan.iter().collect::<Vec<_>>(), vec![(0, 3), (1, 0), (2, 7)]);
    }
}
