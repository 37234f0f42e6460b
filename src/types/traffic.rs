//! Generator run description

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::ProtocolKind;
use crate::{Result, TrafficError};

/// Destination port used when none is given.
pub const DEFAULT_PORT: u16 = 12345;
/// Standard MQTT broker port.
pub const DEFAULT_BROKER_PORT: u16 = 1883;
/// IPv4 protocol number carrying Custom records (RFC 3692 experimentation).
pub const DEFAULT_CUSTOM_IP_PROTOCOL: u8 = 253;
/// Upper bound on a single send before it counts as a transmission failure.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything needed to run one generator session.
///
/// Immutable for the lifetime of a run; call [`TrafficSpec::validate`] before
/// handing it to an emitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSpec {
    /// Run length in seconds
    pub duration_secs: u32,
    /// Mean messages per second
    pub mean_rate: f64,
    pub protocol: ProtocolKind,
    /// Destination address (raw protocols) or broker host (MQTT)
    pub target: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Interface to send from
    #[serde(default)]
    pub interface: Option<String>,
    /// Source address override for crafted packets
    #[serde(default)]
    pub source: Option<Ipv4Addr>,
    #[serde(default)]
    pub extras: ProtocolExtras,
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

/// Protocol-specific options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolExtras {
    /// Extra request headers (HTTP)
    #[serde(default)]
    pub http_headers: Vec<HttpHeader>,
    /// Topic to publish on (MQTT)
    #[serde(default)]
    pub mqtt_topic: Option<String>,
    #[serde(default = "default_broker_port")]
    pub broker_port: u16,
    /// Schema file (Custom)
    #[serde(default)]
    pub schema_path: Option<PathBuf>,
    /// IPv4 protocol number for Custom records
    #[serde(default = "default_custom_ip_protocol")]
    pub custom_ip_protocol: u8,
}

impl Default for ProtocolExtras {
    fn default() -> Self {
        Self {
            http_headers: Vec::new(),
            mqtt_topic: None,
            broker_port: DEFAULT_BROKER_PORT,
            schema_path: None,
            custom_ip_protocol: DEFAULT_CUSTOM_IP_PROTOCOL,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_broker_port() -> u16 {
    DEFAULT_BROKER_PORT
}

fn default_custom_ip_protocol() -> u8 {
    DEFAULT_CUSTOM_IP_PROTOCOL
}

fn default_send_timeout_ms() -> u64 {
    DEFAULT_SEND_TIMEOUT.as_millis() as u64
}

impl TrafficSpec {
    /// Create a spec with default port, extras and timeout.
    pub fn new(
        duration_secs: u32,
        mean_rate: f64,
        protocol: ProtocolKind,
        target: impl Into<String>,
    ) -> Self {
        Self {
            duration_secs,
            mean_rate,
            protocol,
            target: target.into(),
            port: DEFAULT_PORT,
            interface: None,
            source: None,
            extras: ProtocolExtras::default(),
            send_timeout_ms: default_send_timeout_ms(),
        }
    }

    /// Check that the options required by the chosen protocol are present.
    pub fn validate(&self) -> Result<()> {
        if self.duration_secs == 0 {
            return Err(TrafficError::configuration("Duration must be at least one second"));
        }
        if !self.mean_rate.is_finite() || self.mean_rate <= 0.0 {
            return Err(TrafficError::configuration(format!(
                "Mean rate must be a positive number, got {}",
                self.mean_rate
            )));
        }
        if self.target.trim().is_empty() {
            return Err(TrafficError::configuration("Target address is required"));
        }
        if self.send_timeout_ms == 0 {
            return Err(TrafficError::configuration("Send timeout must be positive"));
        }

        match self.protocol {
            ProtocolKind::Mqtt => {
                if self.extras.mqtt_topic.as_deref().is_none_or(|t| t.trim().is_empty()) {
                    return Err(TrafficError::configuration(
                        "MQTT topic is required for MQTT protocol",
                    ));
                }
            }
            ProtocolKind::Http => {
                if self.extras.http_headers.is_empty() {
                    return Err(TrafficError::configuration(
                        "HTTP headers are required for HTTP protocol",
                    ));
                }
            }
            ProtocolKind::Custom => {
                if self.extras.schema_path.is_none() {
                    return Err(TrafficError::configuration(
                        "JSON schema file is required for Custom protocol",
                    ));
                }
            }
            ProtocolKind::Tcp | ProtocolKind::Udp => {}
        }

        Ok(())
    }

    /// Extra checks for a run that goes out on a real network.
    ///
    /// Crafted packets leave through a named interface; MQTT only needs the
    /// broker.
    pub fn validate_for_network(&self) -> Result<()> {
        self.validate()?;
        if self.protocol.is_raw_ip() && self.interface.as_deref().is_none_or(|i| i.trim().is_empty())
        {
            return Err(TrafficError::configuration(format!(
                "A network interface is required for {}",
                self.protocol
            )));
        }
        Ok(())
    }

    /// Timeout applied to each individual send.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Resolve the target to an IPv4 address for crafted packets.
    pub fn target_ipv4(&self) -> Result<Ipv4Addr> {
        resolve_ipv4(&self.target)
    }
}

/// Resolve a literal address or host name to its first IPv4 address.
///
/// Host names go through the blocking system resolver; async callers use
/// [`lookup_ipv4`].
pub fn resolve_ipv4(host: &str) -> Result<Ipv4Addr> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ip);
    }

    let addrs = (host, 0).to_socket_addrs().map_err(|e| {
        TrafficError::configuration(format!("Cannot resolve target '{host}': {e}"))
    })?;
    first_ipv4(host, addrs)
}

/// [`resolve_ipv4`] without blocking the runtime.
pub async fn lookup_ipv4(host: &str) -> Result<Ipv4Addr> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ip);
    }

    let addrs = tokio::net::lookup_host((host, 0)).await.map_err(|e| {
        TrafficError::configuration(format!("Cannot resolve target '{host}': {e}"))
    })?;
    first_ipv4(host, addrs)
}

fn first_ipv4(host: &str, addrs: impl Iterator<Item = SocketAddr>) -> Result<Ipv4Addr> {
    addrs
        .filter_map(|addr| match addr.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| TrafficError::configuration(format!("Target '{host}' has no IPv4 address")))
}

/// One `name: value` request header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeader {
    pub name: String,
    pub value: String,
}

impl HttpHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

impl FromStr for HttpHeader {
    type Err = TrafficError;

    /// Parse `name:value`; surrounding whitespace is trimmed and the value may
    /// itself contain colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = s.split_once(':').ok_or_else(|| {
            TrafficError::configuration(format!("Header '{s}' must look like name:value"))
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(TrafficError::configuration(format!("Header '{s}' has an empty name")));
        }
        Ok(Self::new(name, value.trim()))
    }
}

impl fmt::Display for HttpHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(protocol: ProtocolKind) -> TrafficSpec {
        TrafficSpec::new(3, 5.0, protocol, "127.0.0.1")
    }

    #[test]
    fn plain_protocols_validate_with_defaults() {
        assert!(spec(ProtocolKind::Tcp).validate().is_ok());
        assert!(spec(ProtocolKind::Udp).validate().is_ok());
        assert_eq!(spec(ProtocolKind::Udp).port, DEFAULT_PORT);
    }

    #[test]
    fn protocol_specific_options_are_required() {
        for protocol in [ProtocolKind::Mqtt, ProtocolKind::Http, ProtocolKind::Custom] {
            let err = spec(protocol).validate().unwrap_err();
            assert!(matches!(err, TrafficError::Configuration { .. }), "{protocol}: {err:?}");
        }

        let mut mqtt = spec(ProtocolKind::Mqtt);
        mqtt.extras.mqtt_topic = Some("load/test".into());
        assert!(mqtt.validate().is_ok());

        let mut http = spec(ProtocolKind::Http);
        http.extras.http_headers.push("Host:x".parse().unwrap());
        assert!(http.validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_rate_and_duration() {
        let mut s = spec(ProtocolKind::Udp);
        s.mean_rate = 0.0;
        assert!(s.validate().is_err());
        s.mean_rate = f64::NAN;
        assert!(s.validate().is_err());

        let mut s = spec(ProtocolKind::Udp);
        s.duration_secs = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn header_parsing_keeps_colons_in_value() {
        let header: HttpHeader = "Referer: http://example.com:8080/".parse().unwrap();
        assert_eq!(header.name, "Referer");
        assert_eq!(header.value, "http://example.com:8080/");
        assert_eq!(header.to_string(), "Referer: http://example.com:8080/");

        assert!("no-colon".parse::<HttpHeader>().is_err());
        assert!(":value".parse::<HttpHeader>().is_err());
    }

    #[test]
    fn network_runs_of_crafted_packets_need_an_interface() {
        let mut udp = spec(ProtocolKind::Udp);
        let err = udp.validate_for_network().unwrap_err();
        assert!(matches!(err, TrafficError::Configuration { ref reason } if reason.contains("interface")));

        udp.interface = Some("eth0".into());
        assert!(udp.validate_for_network().is_ok());

        let mut mqtt = spec(ProtocolKind::Mqtt);
        mqtt.extras.mqtt_topic = Some("load/test".into());
        assert!(mqtt.validate_for_network().is_ok());
    }

    #[test]
    fn literal_targets_resolve_without_lookup() {
        assert_eq!(resolve_ipv4("10.1.2.3").unwrap(), Ipv4Addr::new(10, 1, 2, 3));
    }

    #[tokio::test]
    async fn async_lookup_matches_blocking_resolution() {
        assert_eq!(lookup_ipv4("10.1.2.3").await.unwrap(), Ipv4Addr::new(10, 1, 2, 3));
        let err = lookup_ipv4("no-such-host.invalid").await.unwrap_err();
        assert!(matches!(err, TrafficError::Configuration { .. }));
    }
}
