//! In-process loopback: a transmitter and a capture source joined by a channel.
//!
//! Datagrams arrive at the capture side as bare IPv4 frames and publishes as
//! broker messages, stamped with the time they were sent through the channel.
//! Used by `burstgen selftest` and the integration tests.

use tokio::sync::mpsc;

use super::Transmitter;
use crate::capture::{CaptureSource, CapturedUnit, LinkType};
use crate::codec::OutboundMessage;
use crate::timestamp::{epoch_seconds, now};
use crate::{Result, TrafficError};

/// Create a connected transmitter / capture pair buffering up to `capacity` units.
pub fn loopback(capacity: usize) -> (LoopbackTransmitter, LoopbackCapture) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (LoopbackTransmitter { tx: Some(tx) }, LoopbackCapture { rx })
}

pub struct LoopbackTransmitter {
    tx: Option<mpsc::Sender<CapturedUnit>>,
}

#[async_trait::async_trait]
impl Transmitter for LoopbackTransmitter {
    async fn transmit(&mut self, message: OutboundMessage) -> Result<()> {
        let tx = self.tx.as_ref().ok_or_else(|| TrafficError::transmission("loopback closed"))?;

        let received_at = epoch_seconds(now());
        let unit = match message {
            OutboundMessage::Packet { bytes, .. } => {
                CapturedUnit::Frame { link: LinkType::RawIp, data: bytes, received_at }
            }
            OutboundMessage::Publish { topic, payload } => {
                CapturedUnit::Message { topic, payload, received_at }
            }
        };

        tx.send(unit).await.map_err(|_| TrafficError::transmission("loopback receiver dropped"))
    }

    /// Dropping the sender ends the capture side once it drains.
    async fn close(&mut self) -> Result<()> {
        self.tx = None;
        Ok(())
    }
}

pub struct LoopbackCapture {
    rx: mpsc::Receiver<CapturedUnit>,
}

#[async_trait::async_trait]
impl CaptureSource for LoopbackCapture {
    async fn next_unit(&mut self) -> Result<Option<CapturedUnit>> {
        Ok(self.rx.recv().await)
    }

    fn describe(&self) -> String {
        "loopback".to_string()
    }
}
