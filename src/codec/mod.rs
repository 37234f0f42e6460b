//! Turning "a message sent at time t" into wire bytes.
//!
//! [`ProtocolCodec`] is built once per run from a [`TrafficSpec`] and then
//! asked for one [`OutboundMessage`] per send. Raw-IP protocols produce a full
//! IPv4 datagram; MQTT produces a topic and body for the publisher.

pub mod http;
pub mod ipv4;

use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::trace;

use crate::record::SchemaRecord;
use crate::timestamp::{epoch_seconds, format_epoch, now};
use crate::types::{ProtocolKind, ProtocolSchema, TrafficSpec};
use crate::{Result, TrafficError};
use ipv4::{PacketBuilder, TCP_SYN};

/// One message ready for a transmitter, owned by the send call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Complete IPv4 datagram, header included.
    Packet { destination: Ipv4Addr, bytes: Vec<u8> },
    /// Broker publish.
    Publish { topic: String, payload: Vec<u8> },
}

impl OutboundMessage {
    /// Number of bytes handed to the transport.
    pub fn len(&self) -> usize {
        match self {
            OutboundMessage::Packet { bytes, .. } => bytes.len(),
            OutboundMessage::Publish { payload, .. } => payload.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
enum Body {
    /// TCP segments; HTTP requests carry a precomputed header block.
    Segment { packets: PacketBuilder, source_port: u16, port: u16, http_head: Option<String> },
    Datagram { packets: PacketBuilder, source_port: u16, port: u16 },
    Publish { topic: String },
    Record { packets: PacketBuilder, template: SchemaRecord, ip_protocol: u8 },
}

/// Per-run message factory for one protocol.
#[derive(Debug, Clone)]
pub struct ProtocolCodec {
    kind: ProtocolKind,
    body: Body,
}

impl ProtocolCodec {
    /// Build the codec for `spec`.
    ///
    /// `source` is the address written into crafted IPv4 headers; it is unused
    /// for MQTT. Custom runs need the schema named by `spec`, already loaded.
    pub fn new(
        spec: &TrafficSpec,
        source: Ipv4Addr,
        schema: Option<Arc<ProtocolSchema>>,
    ) -> Result<Self> {
        let destination = match spec.protocol {
            ProtocolKind::Mqtt => Ipv4Addr::UNSPECIFIED,
            _ => spec.target_ipv4()?,
        };
        Self::with_destination(spec, source, destination, schema)
    }

    /// [`ProtocolCodec::new`] with the target already resolved to `destination`.
    pub fn with_destination(
        spec: &TrafficSpec,
        source: Ipv4Addr,
        destination: Ipv4Addr,
        schema: Option<Arc<ProtocolSchema>>,
    ) -> Result<Self> {
        let body = match spec.protocol {
            ProtocolKind::Mqtt => {
                let topic = spec.extras.mqtt_topic.clone().ok_or_else(|| {
                    TrafficError::configuration("MQTT topic is required for MQTT protocol")
                })?;
                Body::Publish { topic }
            }
            ProtocolKind::Tcp => Body::Segment {
                packets: PacketBuilder::new(source, destination),
                source_port: ephemeral_port(),
                port: spec.port,
                http_head: None,
            },
            ProtocolKind::Http => Body::Segment {
                packets: PacketBuilder::new(source, destination),
                source_port: ephemeral_port(),
                port: spec.port,
                http_head: Some(http::request_head(&spec.target, &spec.extras.http_headers)),
            },
            ProtocolKind::Udp => Body::Datagram {
                packets: PacketBuilder::new(source, destination),
                source_port: ephemeral_port(),
                port: spec.port,
            },
            ProtocolKind::Custom => {
                let schema = schema.ok_or_else(|| {
                    TrafficError::configuration("JSON schema file is required for Custom protocol")
                })?;
                let template = SchemaRecord::from_defaults(schema);
                // Width problems must surface here, not on the first send.
                let mut trial = template.clone();
                trial.stamp(epoch_seconds(now()))?;
                trial.encode()?;
                Body::Record {
                    packets: PacketBuilder::new(source, destination),
                    template,
                    ip_protocol: spec.extras.custom_ip_protocol,
                }
            }
        };

        Ok(Self { kind: spec.protocol, body })
    }

    pub fn kind(&self) -> ProtocolKind {
        self.kind
    }

    /// Application payload for a message sent at `at`.
    pub fn payload(&self, at: DateTime<Utc>) -> Result<Vec<u8>> {
        match &self.body {
            Body::Segment { http_head: Some(head), .. } => {
                Ok(http::request(head, &format_epoch(at)).into_bytes())
            }
            Body::Segment { http_head: None, .. } | Body::Datagram { .. } | Body::Publish { .. } => {
                Ok(format_epoch(at).into_bytes())
            }
            Body::Record { template, .. } => {
                let mut record = template.clone();
                record.stamp(epoch_seconds(at))?;
                trace!(record = %record.summary(), "built record");
                record.encode()
            }
        }
    }

    /// Build the complete message for a send at `at`.
    pub fn build(&mut self, at: DateTime<Utc>) -> Result<OutboundMessage> {
        let payload = self.payload(at)?;

        let message = match &mut self.body {
            Body::Segment { packets, source_port, port, .. } => OutboundMessage::Packet {
                destination: packets.destination(),
                bytes: packets.tcp(*source_port, *port, rand::random(), TCP_SYN, &payload)?,
            },
            Body::Datagram { packets, source_port, port } => OutboundMessage::Packet {
                destination: packets.destination(),
                bytes: packets.udp(*source_port, *port, &payload)?,
            },
            Body::Record { packets, ip_protocol, .. } => OutboundMessage::Packet {
                destination: packets.destination(),
                bytes: packets.raw(*ip_protocol, &payload)?,
            },
            Body::Publish { topic } => OutboundMessage::Publish { topic: topic.clone(), payload },
        };

        Ok(message)
    }
}

fn ephemeral_port() -> u16 {
    rand::rng().random_range(49152..=65535)
}
