//! Capture sources for the receiver.
//!
//! A [`CaptureSource`] yields [`CapturedUnit`]s in arrival order: link-layer
//! frames from a socket or libpcap, or broker messages from an MQTT
//! subscription. Sources stamp each unit with its local receive time.

pub mod frame;
pub mod mqtt;
#[cfg(feature = "pcap")]
pub mod pcap;
#[cfg(unix)]
pub mod raw;

use crate::Result;
use crate::types::{ProtocolKind, ReceiverConfig};

pub use crate::transport::LoopbackCapture;
pub use frame::{Datagram, LinkType, Transport, parse_frame, parse_ipv4};
pub use mqtt::MqttSubscription;
#[cfg(unix)]
pub use raw::RawSocketCapture;

/// One unit delivered by a capture source.
#[derive(Debug, Clone, PartialEq)]
pub enum CapturedUnit {
    /// Captured frame with its link-layer framing.
    Frame { link: LinkType, data: Vec<u8>, received_at: f64 },
    /// Message delivered by a broker subscription.
    Message { topic: String, payload: Vec<u8>, received_at: f64 },
}

impl CapturedUnit {
    /// Local receive time, seconds since the Unix epoch.
    pub fn received_at(&self) -> f64 {
        match self {
            CapturedUnit::Frame { received_at, .. } | CapturedUnit::Message { received_at, .. } => {
                *received_at
            }
        }
    }
}

/// Trait for sources of captured traffic.
///
/// Sources abstract over raw sockets, libpcap, broker subscriptions and the
/// in-process loopback, and handle their own waiting internally.
#[async_trait::async_trait]
pub trait CaptureSource: Send + 'static {
    /// Get the next captured unit
    ///
    /// Returns:
    /// - `Ok(Some(unit))` - New unit available
    /// - `Ok(None)` - Source ended (normal termination)
    /// - `Err(e)` - Capture primitive failed
    async fn next_unit(&mut self) -> Result<Option<CapturedUnit>>;

    /// Short description for logs, e.g. `raw socket (udp)`.
    fn describe(&self) -> String;
}

#[async_trait::async_trait]
impl<T: CaptureSource + ?Sized> CaptureSource for Box<T> {
    async fn next_unit(&mut self) -> Result<Option<CapturedUnit>> {
        (**self).next_unit().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Backend used for frame-based protocols.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaptureBackend {
    /// Kernel raw socket for the IP protocol; no extra libraries needed.
    #[default]
    RawSocket,
    /// libpcap with a BPF filter (feature `pcap`).
    Pcap,
}

/// Open the capture source a real (non loopback) receiver for `config` needs.
pub async fn open_capture(
    config: &ReceiverConfig,
    backend: CaptureBackend,
) -> Result<Box<dyn CaptureSource>> {
    if config.protocol == ProtocolKind::Mqtt {
        let subscription = MqttSubscription::subscribe(config).await?;
        return Ok(Box::new(subscription));
    }

    let ip_protocol = ip_protocol_for(config);
    match backend {
        CaptureBackend::RawSocket => open_raw(config, ip_protocol),
        CaptureBackend::Pcap => open_pcap(config, ip_protocol),
    }
}

/// IPv4 protocol number carrying `config.protocol`.
pub fn ip_protocol_for(config: &ReceiverConfig) -> u8 {
    use crate::codec::ipv4::{IPPROTO_TCP, IPPROTO_UDP};
    match config.protocol {
        ProtocolKind::Tcp | ProtocolKind::Http => IPPROTO_TCP,
        ProtocolKind::Udp => IPPROTO_UDP,
        ProtocolKind::Custom | ProtocolKind::Mqtt => config.custom_ip_protocol,
    }
}

/// BPF filter matching the traffic `config` listens for.
pub fn bpf_filter(config: &ReceiverConfig) -> String {
    match config.protocol {
        ProtocolKind::Tcp | ProtocolKind::Http => format!("tcp port {}", config.effective_port()),
        ProtocolKind::Udp => format!("udp port {}", config.effective_port()),
        ProtocolKind::Custom | ProtocolKind::Mqtt => format!("ip proto {}", config.custom_ip_protocol),
    }
}

#[cfg(unix)]
fn open_raw(config: &ReceiverConfig, ip_protocol: u8) -> Result<Box<dyn CaptureSource>> {
    Ok(Box::new(RawSocketCapture::open(ip_protocol, config.interface.as_deref())?))
}

#[cfg(not(unix))]
fn open_raw(_config: &ReceiverConfig, _ip_protocol: u8) -> Result<Box<dyn CaptureSource>> {
    Err(crate::TrafficError::unsupported_platform("Raw socket capture", "Unix"))
}

#[cfg(feature = "pcap")]
fn open_pcap(config: &ReceiverConfig, _ip_protocol: u8) -> Result<Box<dyn CaptureSource>> {
    let filter = bpf_filter(config);
    Ok(Box::new(pcap::PcapCapture::open(config.interface.as_deref(), &filter)?))
}

#[cfg(not(feature = "pcap"))]
fn open_pcap(_config: &ReceiverConfig, _ip_protocol: u8) -> Result<Box<dyn CaptureSource>> {
    Err(crate::TrafficError::configuration(
        "libpcap capture needs a build with the `pcap` feature",
    ))
}
