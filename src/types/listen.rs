//! Receiver run description

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::ProtocolKind;
use super::traffic::{DEFAULT_BROKER_PORT, DEFAULT_CUSTOM_IP_PROTOCOL, DEFAULT_PORT};
use crate::{Result, TrafficError};

/// Port HTTP receivers listen on when none is given.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Everything the receiver needs, fixed at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    pub protocol: ProtocolKind,
    /// Destination port to match; see [`ReceiverConfig::effective_port`]
    #[serde(default)]
    pub port: Option<u16>,
    /// Interface to capture on
    #[serde(default)]
    pub interface: Option<String>,
    /// Broker host (MQTT)
    #[serde(default)]
    pub broker: Option<String>,
    #[serde(default = "default_broker_port")]
    pub broker_port: u16,
    /// Topic to subscribe to (MQTT)
    #[serde(default)]
    pub topic: Option<String>,
    /// Schema file (Custom)
    #[serde(default)]
    pub schema_path: Option<PathBuf>,
    /// IPv4 protocol number carrying Custom records
    #[serde(default = "default_custom_ip_protocol")]
    pub custom_ip_protocol: u8,
}

fn default_broker_port() -> u16 {
    DEFAULT_BROKER_PORT
}

fn default_custom_ip_protocol() -> u8 {
    DEFAULT_CUSTOM_IP_PROTOCOL
}

impl ReceiverConfig {
    pub fn new(protocol: ProtocolKind) -> Self {
        Self {
            protocol,
            port: None,
            interface: None,
            broker: None,
            broker_port: DEFAULT_BROKER_PORT,
            topic: None,
            schema_path: None,
            custom_ip_protocol: DEFAULT_CUSTOM_IP_PROTOCOL,
        }
    }

    /// Port to match: the configured one, else 80 for HTTP, else 12345.
    pub fn effective_port(&self) -> u16 {
        match (self.port, self.protocol) {
            (Some(port), _) => port,
            (None, ProtocolKind::Http) => DEFAULT_HTTP_PORT,
            (None, _) => DEFAULT_PORT,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.protocol {
            ProtocolKind::Mqtt => {
                let broker_missing = self.broker.as_deref().is_none_or(|b| b.trim().is_empty());
                let topic_missing = self.topic.as_deref().is_none_or(|t| t.trim().is_empty());
                if broker_missing || topic_missing {
                    return Err(TrafficError::configuration(
                        "Broker address and topic are required for MQTT protocol",
                    ));
                }
            }
            ProtocolKind::Custom => {
                if self.schema_path.is_none() {
                    return Err(TrafficError::configuration(
                        "JSON schema file is required for Custom protocol",
                    ));
                }
            }
            ProtocolKind::Tcp | ProtocolKind::Udp | ProtocolKind::Http => {}
        }
        Ok(())
    }
}
