//! Turns one captured unit into a delay sample.
//!
//! Classification is terminal in one step: a unit is either ignored (it does
//! not match the configured protocol and port), yields a [`DelaySample`], or
//! carries a timestamp that cannot be interpreted.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::capture::{CapturedUnit, Transport, parse_frame};
use crate::codec::http::looks_like_request;
use crate::codec::ipv4::{IPPROTO_TCP, IPPROTO_UDP};
use crate::record::SchemaRecord;
use crate::timestamp::parse_epoch;
use crate::types::{DelaySample, ProtocolKind, ProtocolSchema, ReceiverConfig};
use crate::{Result, TrafficError};

/// Outcome of classifying one captured unit.
#[derive(Debug)]
pub enum Classification {
    /// Not traffic this receiver listens for
    Ignored,
    Delay(DelaySample),
    /// Matching traffic whose timestamp could not be read
    Invalid(TrafficError),
    /// Matching traffic that carries no timestamp at all
    Unstamped { reason: &'static str },
}

/// Configured once per receiver and consulted for every captured unit.
#[derive(Debug, Clone)]
pub struct ReceiverClassifier {
    protocol: ProtocolKind,
    port: u16,
    topic: Option<String>,
    custom_ip_protocol: u8,
    schema: Option<Arc<ProtocolSchema>>,
}

impl ReceiverClassifier {
    pub fn new(config: &ReceiverConfig, schema: Option<Arc<ProtocolSchema>>) -> Result<Self> {
        if config.protocol == ProtocolKind::Custom && schema.is_none() {
            return Err(TrafficError::configuration(
                "JSON schema file is required for Custom protocol",
            ));
        }
        Ok(Self {
            protocol: config.protocol,
            port: config.effective_port(),
            topic: config.topic.clone(),
            custom_ip_protocol: config.custom_ip_protocol,
            schema,
        })
    }

    /// Validate `config` and load its schema file, if any.
    pub fn load(config: &ReceiverConfig) -> Result<Self> {
        config.validate()?;
        let schema = match (&config.protocol, &config.schema_path) {
            (ProtocolKind::Custom, Some(path)) => Some(Arc::new(ProtocolSchema::from_file(path)?)),
            _ => None,
        };
        Self::new(config, schema)
    }

    pub fn protocol(&self) -> ProtocolKind {
        self.protocol
    }

    pub fn classify(&self, unit: &CapturedUnit) -> Classification {
        match unit {
            CapturedUnit::Message { topic, payload, received_at } => {
                if self.protocol != ProtocolKind::Mqtt {
                    return Classification::Ignored;
                }
                if self.topic.as_deref().is_some_and(|t| t != topic) {
                    trace!(topic, "message on another topic");
                    return Classification::Ignored;
                }
                let text = String::from_utf8_lossy(payload);
                delay_from_text(&text, *received_at)
            }
            CapturedUnit::Frame { link, data, received_at } => {
                let Some(datagram) = parse_frame(*link, data) else {
                    return Classification::Ignored;
                };
                match (self.protocol, datagram.protocol, datagram.transport) {
                    (ProtocolKind::Tcp | ProtocolKind::Http, IPPROTO_TCP, transport) => {
                        match transport {
                            Transport::Tcp { destination_port, payload, .. }
                                if destination_port == self.port =>
                            {
                                self.classify_tcp(payload, *received_at)
                            }
                            _ => Classification::Ignored,
                        }
                    }
                    (ProtocolKind::Udp, IPPROTO_UDP, transport) => match transport {
                        Transport::Udp { destination_port, payload, .. }
                            if destination_port == self.port =>
                        {
                            classify_udp(payload, *received_at)
                        }
                        _ => Classification::Ignored,
                    },
                    (ProtocolKind::Custom, protocol, Transport::Other { payload })
                        if protocol == self.custom_ip_protocol =>
                    {
                        self.classify_record(payload, *received_at)
                    }
                    _ => Classification::Ignored,
                }
            }
        }
    }

    /// Both request-shaped and plain payloads carry the timestamp on the last
    /// CRLF-separated line.
    fn classify_tcp(&self, payload: &[u8], received_at: f64) -> Classification {
        if payload.is_empty() {
            return Classification::Unstamped { reason: "TCP packet without payload" };
        }
        let text = String::from_utf8_lossy(payload);
        if looks_like_request(&text) {
            debug!(port = self.port, "HTTP request received");
        } else {
            debug!(port = self.port, "TCP payload received");
        }
        let last_line = text.split("\r\n").last().unwrap_or_default();
        delay_from_text(last_line, received_at)
    }

    fn classify_record(&self, payload: &[u8], received_at: f64) -> Classification {
        let Some(schema) = &self.schema else {
            return Classification::Ignored;
        };
        let record = match SchemaRecord::decode(Arc::clone(schema), payload) {
            Ok(record) => record,
            Err(e) => return Classification::Invalid(e),
        };
        debug!(record = %record.summary(), "record received");

        match record.timestamp() {
            Some(Ok(sent_at)) => Classification::Delay(DelaySample::new(sent_at, received_at)),
            Some(Err(e)) => Classification::Invalid(e),
            None => {
                warn!(schema = %schema.name, "timestamp field not found");
                Classification::Unstamped { reason: "record has no timestamp field" }
            }
        }
    }
}

fn classify_udp(payload: &[u8], received_at: f64) -> Classification {
    match std::str::from_utf8(payload) {
        Ok(text) => delay_from_text(text, received_at),
        Err(_) => Classification::Invalid(TrafficError::invalid_timestamp(
            String::from_utf8_lossy(payload).into_owned(),
        )),
    }
}

fn delay_from_text(text: &str, received_at: f64) -> Classification {
    match parse_epoch(text) {
        Ok(sent_at) => Classification::Delay(DelaySample::new(sent_at, received_at)),
        Err(e) => Classification::Invalid(e),
    }
}
