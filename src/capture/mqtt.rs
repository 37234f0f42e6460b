//! MQTT subscription capture.

use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use tracing::{debug, info};

use super::{CaptureSource, CapturedUnit};
use crate::timestamp::{epoch_seconds, now};
use crate::transport::mqtt::{await_connack, options};
use crate::types::{DEFAULT_SEND_TIMEOUT, ReceiverConfig};
use crate::{Result, TrafficError};

const REQUEST_CAPACITY: usize = 16;

/// Delivers every message published on one topic.
pub struct MqttSubscription {
    client: AsyncClient,
    events: EventLoop,
    broker: String,
    topic: String,
    reconnecting: bool,
}

impl MqttSubscription {
    pub async fn subscribe(config: &ReceiverConfig) -> Result<Self> {
        let (Some(host), Some(topic)) = (config.broker.as_deref(), config.topic.as_deref()) else {
            return Err(TrafficError::configuration(
                "Broker address and topic are required for MQTT protocol",
            ));
        };

        let broker = format!("{host}:{}", config.broker_port);
        let (client, mut events) =
            AsyncClient::new(options("sub", host, config.broker_port), REQUEST_CAPACITY);

        await_connack(&mut events, &broker, DEFAULT_SEND_TIMEOUT)
            .await
            .map_err(|e| TrafficError::capture(format!("subscribing on {broker}: {e}")))?;
        client.subscribe(topic, QoS::AtMostOnce).await.map_err(|e| {
            TrafficError::capture_with_source(format!("subscribing to {topic}"), Box::new(e))
        })?;

        info!(broker = %broker, topic, "subscribed");
        Ok(Self { client, events, broker, topic: topic.to_string(), reconnecting: false })
    }
}

#[async_trait::async_trait]
impl CaptureSource for MqttSubscription {
    async fn next_unit(&mut self) -> Result<Option<CapturedUnit>> {
        loop {
            match self.events.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Ok(Some(CapturedUnit::Message {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                        received_at: epoch_seconds(now()),
                    }));
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) if self.reconnecting => {
                    // Clean sessions drop subscriptions on reconnect.
                    self.reconnecting = false;
                    self.client.subscribe(self.topic.clone(), QoS::AtMostOnce).await.map_err(|e| {
                        TrafficError::capture_with_source(
                            format!("resubscribing to {}", self.topic),
                            Box::new(e),
                        )
                    })?;
                    info!(broker = %self.broker, topic = %self.topic, "resubscribed");
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    debug!(pkid = ack.pkid, "subscription acknowledged");
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    info!(broker = %self.broker, "broker closed the session");
                    return Ok(None);
                }
                Ok(_) => {}
                Err(e) => {
                    // The next poll reconnects.
                    self.reconnecting = true;
                    return Err(TrafficError::capture_with_source(
                        format!("receiving from {}", self.broker),
                        Box::new(e),
                    ));
                }
            }
        }
    }

    fn describe(&self) -> String {
        format!("MQTT subscription ({} on {})", self.topic, self.broker)
    }
}
