//! Raw IPv4 socket capture.
//!
//! A raw socket opened for IP protocol `P` receives a copy of every inbound
//! datagram carrying `P`, IPv4 header included. Requires root or `CAP_NET_RAW`.

use std::io::Read;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::unix::AsyncFd;
use tracing::debug;

use super::{CaptureSource, CapturedUnit, LinkType};
use crate::timestamp::{epoch_seconds, now};
use crate::{Result, TrafficError};

const BUFFER_SIZE: usize = 65_536;

pub struct RawSocketCapture {
    socket: AsyncFd<Socket>,
    ip_protocol: u8,
    buffer: Vec<u8>,
}

impl RawSocketCapture {
    pub fn open(ip_protocol: u8, interface: Option<&str>) -> Result<Self> {
        let socket =
            Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::from(i32::from(ip_protocol))))
                .map_err(|e| TrafficError::capture_with_source("opening raw socket", Box::new(e)))?;

        #[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
        if let Some(name) = interface {
            socket.bind_device(Some(name.as_bytes())).map_err(|e| {
                TrafficError::capture_with_source(format!("binding to interface {name}"), Box::new(e))
            })?;
        }
        #[cfg(not(any(target_os = "android", target_os = "fuchsia", target_os = "linux")))]
        if let Some(name) = interface {
            tracing::warn!(interface = name, "interface binding is not supported here");
        }

        socket
            .set_nonblocking(true)
            .map_err(|e| TrafficError::capture_with_source("configuring raw socket", Box::new(e)))?;
        // SAFETY: `Socket` owns its descriptor, which stays open until the
        // AsyncFd drops it.
        let socket = unsafe { AsyncFd::register(socket) }.map_err(|e| {
            let cause = std::io::Error::from(e);
            TrafficError::capture_with_source("registering raw socket", Box::new(cause))
        })?;

        debug!(ip_protocol, interface = ?interface, "raw capture socket ready");
        Ok(Self { socket, ip_protocol, buffer: vec![0; BUFFER_SIZE] })
    }
}

#[async_trait::async_trait]
impl CaptureSource for RawSocketCapture {
    async fn next_unit(&mut self) -> Result<Option<CapturedUnit>> {
        loop {
            let mut guard = self.socket.readable().await.map_err(|e| {
                TrafficError::capture_with_source("waiting for raw socket", Box::new(e))
            })?;

            let buffer = &mut self.buffer;
            match guard.try_io(|inner| {
                let mut socket = inner.get_ref();
                socket.read(buffer)
            }) {
                Ok(Ok(len)) => {
                    return Ok(Some(CapturedUnit::Frame {
                        link: LinkType::RawIp,
                        data: self.buffer[..len].to_vec(),
                        received_at: epoch_seconds(now()),
                    }));
                }
                Ok(Err(e)) => {
                    return Err(TrafficError::capture_with_source("reading raw socket", Box::new(e)));
                }
                Err(_would_block) => continue,
            }
        }
    }

    fn describe(&self) -> String {
        format!("raw socket (ip proto {})", self.ip_protocol)
    }
}
