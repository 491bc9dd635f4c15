//! Message bus boundary.
//!
//! The broker connection runs its network I/O in an independent background
//! task owned by [`MqttBus`]; camera code only ever sees the
//! [`BusPublisher`] trait. Publishes are fire-and-forget at QoS 0 - no
//! acknowledgment awaited, no retry on failure.

use crate::config::MqttSettings;
use crate::error::{CamError, CamResult};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Outbound side of the bus connection.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    /// Publish one message at the lowest delivery guarantee.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> CamResult<()>;

    /// Close the broker connection.
    async fn disconnect(&self) -> CamResult<()>;
}

/// MQTT client wrapper: one broker connection per camera.
pub struct MqttBus {
    client: AsyncClient,
}

impl MqttBus {
    /// Connect to the broker and start the background network loop.
    ///
    /// When `trigger_topic` is given it is subscribed at QoS 0 and incoming
    /// payloads are forwarded over the returned channel. The call blocks
    /// until the broker acknowledges the connection; a broker that cannot
    /// be reached at startup is a fatal configuration problem.
    pub async fn connect(
        settings: &MqttSettings,
        trigger_topic: Option<String>,
    ) -> CamResult<(Self, Option<mpsc::Receiver<Vec<u8>>>)> {
        let mut options = MqttOptions::new(
            settings.client_id.clone(),
            settings.host.clone(),
            settings.port,
        );
        options.set_keep_alive(Duration::from_secs(5));
        let (client, mut eventloop) = AsyncClient::new(options, 10);

        // Wait for the handshake so a dead broker fails fast instead of
        // silently queueing publishes forever.
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => break,
                Ok(_) => continue,
                Err(e) => {
                    return Err(CamError::Bus(format!(
                        "broker {}:{} not reachable: {e}",
                        settings.host, settings.port
                    )))
                }
            }
        }
        info!(host = %settings.host, port = settings.port, "connected to MQTT broker");

        let trigger_tx = if let Some(topic) = &trigger_topic {
            client
                .subscribe(topic.clone(), QoS::AtMostOnce)
                .await
                .map_err(|e| CamError::Bus(format!("subscribe to '{topic}' failed: {e}")))?;
            info!(topic = %topic, "subscribed for trigger input");
            let (tx, rx) = mpsc::channel::<Vec<u8>>(16);
            Some((tx, rx))
        } else {
            None
        };
        let (tx, rx) = match trigger_tx {
            Some((tx, rx)) => (Some(tx), Some(rx)),
            None => (None, None),
        };

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        debug!(topic = %publish.topic, "incoming message");
                        if let Some(tx) = &tx {
                            if tx.send(publish.payload.to_vec()).await.is_err() {
                                // Receiver gone: the trigger loop ended.
                                break;
                            }
                        }
                    }
                    Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT connection error: {e}; reconnecting");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            debug!("MQTT network loop stopped");
        });

        Ok((Self { client }, rx))
    }
}

#[async_trait]
impl BusPublisher for MqttBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> CamResult<()> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| CamError::Bus(format!("publish to '{topic}' failed: {e}")))
    }

    async fn disconnect(&self) -> CamResult<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| CamError::Bus(format!("disconnect failed: {e}")))
    }
}
