//! MQTT publisher.
//!
//! One broker connection is held for the whole run. Messages go out at QoS 0,
//! so a publish completes once it is queued for the connection.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::Transmitter;
use crate::codec::OutboundMessage;
use crate::{Result, TrafficError};

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_CAPACITY: usize = 256;

/// Options shared by the publisher and the subscriber.
pub(crate) fn options(role: &str, host: &str, port: u16) -> MqttOptions {
    let client_id = format!("burstgen-{role}-{:08x}", rand::random::<u32>());
    let mut options = MqttOptions::new(client_id, host, port);
    options.set_keep_alive(KEEP_ALIVE);
    options.set_clean_session(true);
    options
}

/// Drive `events` until the broker acknowledges the connection.
pub(crate) async fn await_connack(
    events: &mut EventLoop,
    broker: &str,
    timeout: Duration,
) -> Result<()> {
    let handshake = async {
        loop {
            match events.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    debug!(code = ?ack.code, "broker accepted connection");
                    return Ok(());
                }
                Ok(_) => continue,
                Err(e) => {
                    return Err(TrafficError::transmission_with_source(
                        format!("connecting to broker {broker}"),
                        Box::new(e),
                    ));
                }
            }
        }
    };

    tokio::time::timeout(timeout, handshake)
        .await
        .map_err(|_| TrafficError::Timeout { duration: timeout })?
}

/// Publishes each message on its topic over a single broker connection.
pub struct MqttPublisher {
    client: AsyncClient,
    events: Option<JoinHandle<()>>,
    broker: String,
    timeout: Duration,
}

impl MqttPublisher {
    /// Connect to `host:port`, failing if no acknowledgement arrives within `timeout`.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let broker = format!("{host}:{port}");
        let (client, mut events) = AsyncClient::new(options("pub", host, port), REQUEST_CAPACITY);
        await_connack(&mut events, &broker, timeout).await?;
        info!(broker = %broker, "connected to MQTT broker");

        let task_broker = broker.clone();
        let handle = tokio::spawn(async move { drive(events, task_broker).await });

        Ok(Self { client, events: Some(handle), broker, timeout })
    }
}

async fn drive(mut events: EventLoop, broker: String) {
    loop {
        match events.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!(broker = %broker, "disconnected from broker");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(broker = %broker, error = %e, "broker connection lost");
                break;
            }
        }
    }
}

#[async_trait::async_trait]
impl Transmitter for MqttPublisher {
    async fn transmit(&mut self, message: OutboundMessage) -> Result<()> {
        let OutboundMessage::Publish { topic, payload } = message else {
            return Err(TrafficError::configuration("MQTT publisher cannot send raw datagrams"));
        };

        if self.events.as_ref().is_none_or(|handle| handle.is_finished()) {
            return Err(TrafficError::transmission(format!(
                "connection to broker {} is closed",
                self.broker
            )));
        }

        self.client.publish(topic, QoS::AtMostOnce, false, payload).await.map_err(|e| {
            TrafficError::transmission_with_source(
                format!("publishing to broker {}", self.broker),
                Box::new(e),
            )
        })
    }

    async fn close(&mut self) -> Result<()> {
        let Some(handle) = self.events.take() else {
            return Ok(());
        };

        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "disconnect request not delivered");
        }
        if tokio::time::timeout(self.timeout, handle).await.is_err() {
            warn!(broker = %self.broker, "broker connection did not close in time");
        }
        Ok(())
    }
}
