//! Send primitives.
//!
//! A [`Transmitter`] hands one [`OutboundMessage`] to the network. It never
//! retries: a failed send is returned to the emitter, which ends the run.

pub mod loopback;
pub mod mqtt;
#[cfg(unix)]
pub mod raw;

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use crate::codec::OutboundMessage;
use crate::types::{ProtocolKind, TrafficSpec};
use crate::{Result, TrafficError};

pub use loopback::{LoopbackCapture, LoopbackTransmitter, loopback};
pub use mqtt::MqttPublisher;
#[cfg(unix)]
pub use raw::RawSocketTransmitter;

/// Sends crafted messages.
#[async_trait::async_trait]
pub trait Transmitter: Send {
    /// Send one message.
    async fn transmit(&mut self, message: OutboundMessage) -> Result<()>;

    /// Flush and release the underlying handle. Called once after the last send.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl<T: Transmitter + ?Sized> Transmitter for Box<T> {
    async fn transmit(&mut self, message: OutboundMessage) -> Result<()> {
        (**self).transmit(message).await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}

/// Open the transmitter a real (non loopback) run of `spec` needs.
pub async fn open_transmitter(spec: &TrafficSpec) -> Result<Box<dyn Transmitter>> {
    match spec.protocol {
        ProtocolKind::Mqtt => {
            let publisher = MqttPublisher::connect(
                &spec.target,
                spec.extras.broker_port,
                spec.send_timeout(),
            )
            .await?;
            Ok(Box::new(publisher))
        }
        ProtocolKind::Tcp | ProtocolKind::Udp | ProtocolKind::Http | ProtocolKind::Custom => {
            open_raw(spec.interface.as_deref())
        }
    }
}

#[cfg(unix)]
fn open_raw(interface: Option<&str>) -> Result<Box<dyn Transmitter>> {
    Ok(Box::new(RawSocketTransmitter::open(interface)?))
}

#[cfg(not(unix))]
fn open_raw(_interface: Option<&str>) -> Result<Box<dyn Transmitter>> {
    Err(TrafficError::unsupported_platform("Raw IPv4 transmission", "Unix"))
}

/// Local address the kernel would use to reach `destination`.
///
/// Connecting a UDP socket selects a route without sending anything.
pub fn discover_source(destination: Ipv4Addr) -> Result<Ipv4Addr> {
    let probe = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect(SocketAddrV4::new(destination, 9))?;
            socket.local_addr()
        })
        .map_err(|e| {
            TrafficError::transmission_with_source(
                format!("no route to {destination}"),
                Box::new(e),
            )
        })?;

    match probe.ip() {
        std::net::IpAddr::V4(ip) => Ok(ip),
        std::net::IpAddr::V6(ip) => Err(TrafficError::transmission(format!(
            "route to {destination} uses IPv6 source {ip}"
        ))),
    }
}
