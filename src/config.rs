//! Run profiles.
//!
//! A profile is a YAML file with optional `generate` and `receive` sections.
//! Every key is optional so a profile can hold just the parts that rarely
//! change (target, headers, schema) while the command line supplies the rest:
//!
//! ```yaml
//! generate:
//!   protocol: http
//!   target: 192.0.2.10
//!   port: 8080
//!   http_headers:
//!     - "Host: example.test"
//!     - "User-Agent: burstgen"
//! receive:
//!   protocol: http
//!   port: 8080
//! ```
//!
//! Command-line values are layered on top with [`GeneratorProfile::merge`] and
//! the result is turned into a validated [`TrafficSpec`] or
//! [`ReceiverConfig`].

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use crate::types::{HttpHeader, ProtocolKind, ReceiverConfig, TrafficSpec};
use crate::{Result, TrafficError};

/// Contents of a profile file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunProfile {
    pub generate: GeneratorProfile,
    pub receive: ReceiverProfile,
}

impl RunProfile {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(yaml)
            .map_err(|e| TrafficError::configuration(format!("Invalid run profile: {e}")))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| TrafficError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml(&yaml).map_err(|e| match e {
            TrafficError::Configuration { reason } => {
                TrafficError::configuration(format!("{}: {reason}", path.display()))
            }
            other => other,
        })
    }
}

/// Generator options, all optional until [`GeneratorProfile::into_spec`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorProfile {
    pub duration_secs: Option<u32>,
    pub mean_rate: Option<f64>,
    pub protocol: Option<ProtocolKind>,
    pub target: Option<String>,
    pub port: Option<u16>,
    pub interface: Option<String>,
    pub source: Option<Ipv4Addr>,
    /// `name: value` strings
    pub http_headers: Vec<String>,
    pub mqtt_topic: Option<String>,
    pub broker_port: Option<u16>,
    pub schema_path: Option<PathBuf>,
    pub custom_ip_protocol: Option<u8>,
    pub send_timeout_ms: Option<u64>,
}

impl GeneratorProfile {
    /// Layer `overrides` on top of `self`. Headers given in `overrides`
    /// replace the profile's headers rather than adding to them.
    pub fn merge(self, overrides: GeneratorProfile) -> Self {
        Self {
            duration_secs: overrides.duration_secs.or(self.duration_secs),
            mean_rate: overrides.mean_rate.or(self.mean_rate),
            protocol: overrides.protocol.or(self.protocol),
            target: overrides.target.or(self.target),
            port: overrides.port.or(self.port),
            interface: overrides.interface.or(self.interface),
            source: overrides.source.or(self.source),
            http_headers: if overrides.http_headers.is_empty() {
                self.http_headers
            } else {
                overrides.http_headers
            },
            mqtt_topic: overrides.mqtt_topic.or(self.mqtt_topic),
            broker_port: overrides.broker_port.or(self.broker_port),
            schema_path: overrides.schema_path.or(self.schema_path),
            custom_ip_protocol: overrides.custom_ip_protocol.or(self.custom_ip_protocol),
            send_timeout_ms: overrides.send_timeout_ms.or(self.send_timeout_ms),
        }
    }

    /// Build and validate the [`TrafficSpec`].
    pub fn into_spec(self) -> Result<TrafficSpec> {
        let duration = self.duration_secs.ok_or_else(|| missing("duration"))?;
        let rate = self.mean_rate.ok_or_else(|| missing("mean rate"))?;
        let protocol = self.protocol.ok_or_else(|| missing("protocol"))?;
        let target = self.target.ok_or_else(|| missing("target"))?;

        let mut spec = TrafficSpec::new(duration, rate, protocol, target);
        if let Some(port) = self.port {
            spec.port = port;
        }
        spec.interface = self.interface;
        spec.source = self.source;
        spec.extras.http_headers = self
            .http_headers
            .iter()
            .map(|h| h.parse::<HttpHeader>())
            .collect::<Result<Vec<_>>>()?;
        spec.extras.mqtt_topic = self.mqtt_topic;
        if let Some(port) = self.broker_port {
            spec.extras.broker_port = port;
        }
        spec.extras.schema_path = self.schema_path;
        if let Some(number) = self.custom_ip_protocol {
            spec.extras.custom_ip_protocol = number;
        }
        if let Some(ms) = self.send_timeout_ms {
            spec.send_timeout_ms = ms;
        }

        spec.validate()?;
        Ok(spec)
    }
}

/// Receiver options, all optional until [`ReceiverProfile::into_config`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReceiverProfile {
    pub protocol: Option<ProtocolKind>,
    pub port: Option<u16>,
    pub interface: Option<String>,
    pub broker: Option<String>,
    pub broker_port: Option<u16>,
    pub topic: Option<String>,
    pub schema_path: Option<PathBuf>,
    pub custom_ip_protocol: Option<u8>,
}

impl ReceiverProfile {
    /// Layer `overrides` on top of `self`.
    pub fn merge(self, overrides: ReceiverProfile) -> Self {
        Self {
            protocol: overrides.protocol.or(self.protocol),
            port: overrides.port.or(self.port),
            interface: overrides.interface.or(self.interface),
            broker: overrides.broker.or(self.broker),
            broker_port: overrides.broker_port.or(self.broker_port),
            topic: overrides.topic.or(self.topic),
            schema_path: overrides.schema_path.or(self.schema_path),
            custom_ip_protocol: overrides.custom_ip_protocol.or(self.custom_ip_protocol),
        }
    }

    /// Build and validate the receiver configuration.
    pub fn into_config(self) -> Result<ReceiverConfig> {
        let protocol = self.protocol.ok_or_else(|| missing("protocol"))?;

        let mut config = ReceiverConfig::new(protocol);
        config.port = self.port;
        config.interface = self.interface;
        config.broker = self.broker;
        if let Some(port) = self.broker_port {
            config.broker_port = port;
        }
        config.topic = self.topic;
        config.schema_path = self.schema_path;
        if let Some(number) = self.custom_ip_protocol {
            config.custom_ip_protocol = number;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Receiver settings that match what `spec` sends.
pub fn receiver_for(spec: &TrafficSpec) -> ReceiverConfig {
    let mut config = ReceiverConfig::new(spec.protocol);
    config.port = Some(spec.port);
    config.interface = spec.interface.clone();
    if spec.protocol == ProtocolKind::Mqtt {
        config.broker = Some(spec.target.clone());
        config.broker_port = spec.extras.broker_port;
        config.topic = spec.extras.mqtt_topic.clone();
    }
    config.schema_path = spec.extras.schema_path.clone();
    config.custom_ip_protocol = spec.extras.custom_ip_protocol;
    config
}

fn missing(option: &str) -> TrafficError {
    TrafficError::configuration(format!("The {option} is required"))
}
