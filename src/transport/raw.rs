//! Raw IPv4 socket transmitter.
//!
//! The socket is opened with `IPPROTO_RAW`, so every write must be a complete
//! datagram including the IPv4 header. Requires root or `CAP_NET_RAW`.

use std::net::SocketAddrV4;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::io::unix::AsyncFd;
use tracing::debug;

use super::Transmitter;
use crate::codec::OutboundMessage;
use crate::{Result, TrafficError};

const IPPROTO_RAW: i32 = 255;

/// Sends crafted IPv4 datagrams, optionally pinned to one interface.
pub struct RawSocketTransmitter {
    socket: AsyncFd<Socket>,
}

impl RawSocketTransmitter {
    pub fn open(interface: Option<&str>) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::from(IPPROTO_RAW)))
            .map_err(|e| TrafficError::transmission_with_source("opening raw socket", Box::new(e)))?;
        socket
            .set_header_included_v4(true)
            .map_err(|e| TrafficError::transmission_with_source("enabling IP_HDRINCL", Box::new(e)))?;

        if let Some(name) = interface {
            bind_to_interface(&socket, name)?;
        }

        socket
            .set_nonblocking(true)
            .map_err(|e| TrafficError::transmission_with_source("configuring raw socket", Box::new(e)))?;
        // SAFETY: `Socket` owns its descriptor, which stays open until the
        // AsyncFd drops it.
        let socket = unsafe { AsyncFd::register(socket) }.map_err(|e| {
            let cause = std::io::Error::from(e);
            TrafficError::transmission_with_source("registering raw socket", Box::new(cause))
        })?;

        debug!(interface = ?interface, "raw IPv4 socket ready");
        Ok(Self { socket })
    }
}

#[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
fn bind_to_interface(socket: &Socket, name: &str) -> Result<()> {
    socket.bind_device(Some(name.as_bytes())).map_err(|e| {
        TrafficError::transmission_with_source(format!("binding to interface {name}"), Box::new(e))
    })
}

#[cfg(not(any(target_os = "android", target_os = "fuchsia", target_os = "linux")))]
fn bind_to_interface(_socket: &Socket, name: &str) -> Result<()> {
    tracing::warn!(interface = name, "interface binding is not supported here, using the routing table");
    Ok(())
}

#[async_trait::async_trait]
impl Transmitter for RawSocketTransmitter {
    async fn transmit(&mut self, message: OutboundMessage) -> Result<()> {
        let OutboundMessage::Packet { destination, bytes } = message else {
            return Err(TrafficError::configuration(
                "raw socket transmitter cannot publish broker messages",
            ));
        };
        let address = SockAddr::from(SocketAddrV4::new(destination, 0));

        loop {
            let mut guard = self.socket.writable().await.map_err(|e| {
                TrafficError::transmission_with_source("waiting for raw socket", Box::new(e))
            })?;

            match guard.try_io(|inner| inner.get_ref().send_to(&bytes, &address)) {
                Ok(Ok(written)) if written == bytes.len() => return Ok(()),
                Ok(Ok(written)) => {
                    return Err(TrafficError::transmission(format!(
                        "short write to {destination}: {written} of {} bytes",
                        bytes.len()
                    )));
                }
                Ok(Err(e)) => {
                    return Err(TrafficError::transmission_with_source(
                        format!("sending to {destination}"),
                        Box::new(e),
                    ));
                }
                Err(_would_block) => continue,
            }
        }
    }
}
