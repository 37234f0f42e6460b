//! Protocol kind selection

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TrafficError;

/// Protocols the generator can emit and the receiver can classify.
///
/// Names parse case-insensitively, both from the CLI and from run profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProtocolKind {
    /// Crafted TCP segment carrying the timestamp as payload
    Tcp,
    /// Crafted UDP datagram carrying the timestamp as payload
    Udp,
    /// Crafted TCP segment carrying a GET request with a trailing timestamp line
    Http,
    /// Broker publish with the timestamp as message body
    Mqtt,
    /// Schema-defined record carried directly over IPv4
    Custom,
}

impl ProtocolKind {
    /// All supported protocols, in CLI listing order.
    pub const ALL: [ProtocolKind; 5] = [
        ProtocolKind::Tcp,
        ProtocolKind::Udp,
        ProtocolKind::Mqtt,
        ProtocolKind::Http,
        ProtocolKind::Custom,
    ];

    /// Whether packets of this kind are crafted and sent as raw IPv4.
    pub const fn is_raw_ip(&self) -> bool {
        !matches!(self, ProtocolKind::Mqtt)
    }

    /// Whether this kind rides on a TCP segment.
    pub const fn is_tcp(&self) -> bool {
        matches!(self, ProtocolKind::Tcp | ProtocolKind::Http)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            ProtocolKind::Tcp => "TCP",
            ProtocolKind::Udp => "UDP",
            ProtocolKind::Http => "HTTP",
            ProtocolKind::Mqtt => "MQTT",
            ProtocolKind::Custom => "Custom",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolKind {
    type Err = TrafficError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TCP" => Ok(ProtocolKind::Tcp),
            "UDP" => Ok(ProtocolKind::Udp),
            "HTTP" => Ok(ProtocolKind::Http),
            "MQTT" => Ok(ProtocolKind::Mqtt),
            "CUSTOM" => Ok(ProtocolKind::Custom),
            _ => Err(TrafficError::configuration(format!("Unsupported protocol: {s}"))),
        }
    }
}

impl TryFrom<String> for ProtocolKind {
    type Error = TrafficError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProtocolKind> for String {
    fn from(kind: ProtocolKind) -> Self {
        kind.as_str().to_string()
    }
}
