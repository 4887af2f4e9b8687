//! TransportChannel processor.
//!
//! Keeps one MQTT connection to the card-reader broker alive and
//! translates it into `TransportEvent`s:
//!
//! - on every `ConnAck` it subscribes to the response topic at QoS 1;
//! - once the subscription is acknowledged it publishes the "request
//!   current state" token once;
//! - a rejected subscription or failed publish surfaces as
//!   `TransportEvent::Error`, never as a crash;
//! - connection errors are retried after a fixed interval.
//!
//! Only this processor publishes on the request topic, so any number of
//! session observers can follow the derived state without re-requesting.

use bytes::Bytes;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, SubscribeReasonCode};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::BrokerConfig;
use crate::events::{TransportEvent, TransportEventSender};

/// Capacity of the request queue between `AsyncClient` and the event loop.
const REQUEST_QUEUE_CAPACITY: usize = 16;

/// What an incoming packet means for the channel.
#[derive(Debug, PartialEq, Eq)]
enum Inbound {
    Connected,
    Subscribed,
    SubscribeRejected,
    Message(Bytes),
    Ignored,
}

fn classify(packet: &Packet, response_topic: &str) -> Inbound {
    match packet {
        Packet::ConnAck(_) => Inbound::Connected,
        Packet::SubAck(ack) => {
            if ack
                .return_codes
                .iter()
                .any(|code| matches!(code, SubscribeReasonCode::Failure))
            {
                Inbound::SubscribeRejected
            } else {
                Inbound::Subscribed
            }
        }
        Packet::Publish(publish) if publish.topic == response_topic => {
            Inbound::Message(publish.payload.clone())
        }
        _ => Inbound::Ignored,
    }
}

pub struct TransportChannel {
    config: BrokerConfig,
    event_tx: TransportEventSender,
}

impl TransportChannel {
    pub fn new(config: BrokerConfig, event_tx: TransportEventSender) -> Self {
        Self { config, event_tx }
    }

    /// Run until shutdown is signaled or the event receiver is dropped.
    ///
    /// The connection is closed before returning.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.host.clone(),
            self.config.port,
        );
        options.set_keep_alive(self.config.keep_alive);
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_QUEUE_CAPACITY);

        info!(
            host = %self.config.host,
            port = self.config.port,
            topic = %self.config.response_topic,
            "TransportChannel started"
        );

        let mut connected = false;
        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("TransportChannel received shutdown signal");
                        break;
                    }
                }

                polled = eventloop.poll() => {
                    let keep_going = match polled {
                        Ok(Event::Incoming(packet)) => {
                            self.on_packet(&client, &packet, &mut connected).await
                        }
                        Ok(Event::Outgoing(_)) => true,
                        Err(e) => {
                            self.on_connection_error(e, &mut connected, &mut shutdown_rx)
                                .await
                        }
                    };
                    if !keep_going {
                        break;
                    }
                }
            }
        }

        if let Err(e) = client.try_disconnect() {
            debug!(error = %e, "Disconnect request not queued");
        }
        drain_disconnect(&mut eventloop).await;
        info!("TransportChannel shutdown complete");
    }

    async fn on_packet(&self, client: &AsyncClient, packet: &Packet, connected: &mut bool) -> bool {
        match classify(packet, &self.config.response_topic) {
            Inbound::Connected => {
                info!("Connected to broker");
                *connected = true;
                if !self.emit(TransportEvent::Connected).await {
                    return false;
                }
                if let Err(e) = client.try_subscribe(&self.config.response_topic, QoS::AtLeastOnce)
                {
                    error!(error = %e, "Failed to queue subscription");
                    return self
                        .emit(TransportEvent::Error(format!("subscribe failed: {e}")))
                        .await;
                }
                true
            }
            Inbound::Subscribed => {
                debug!(topic = %self.config.response_topic, "Subscribed, requesting current card");
                if let Err(e) = client.try_publish(
                    &self.config.request_topic,
                    QoS::AtLeastOnce,
                    false,
                    self.config.request_payload.clone().into_bytes(),
                ) {
                    error!(error = %e, "Failed to queue card state request");
                    return self
                        .emit(TransportEvent::Error(format!("request failed: {e}")))
                        .await;
                }
                true
            }
            Inbound::SubscribeRejected => {
                error!(topic = %self.config.response_topic, "Broker rejected subscription");
                self.emit(TransportEvent::Error("subscription rejected".to_string()))
                    .await
            }
            Inbound::Message(payload) => {
                debug!(bytes = payload.len(), "Received card message");
                self.emit(TransportEvent::Message(payload)).await
            }
            Inbound::Ignored => true,
        }
    }

    async fn on_connection_error(
        &self,
        e: rumqttc::ConnectionError,
        connected: &mut bool,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> bool {
        let event = if std::mem::take(connected) {
            warn!(error = %e, "Broker connection lost");
            TransportEvent::Disconnected
        } else {
            warn!(error = %e, "Broker connection failed");
            TransportEvent::Error(e.to_string())
        };
        if !self.emit(event).await {
            return false;
        }

        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return false;
                }
            }

            _ = tokio::time::sleep(self.config.reconnect_interval) => {}
        }

        debug!("Reconnecting to broker");
        self.emit(TransportEvent::Reconnecting).await
    }

    async fn emit(&self, event: TransportEvent) -> bool {
        if let Err(e) = self.event_tx.send(event).await {
            warn!(error = %e, "Failed to send TransportEvent, receiver dropped");
            return false;
        }
        true
    }
}

/// Give the event loop a brief chance to flush the DISCONNECT packet.
async fn drain_disconnect(eventloop: &mut EventLoop) {
    let flush = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    };
    if tokio::time::timeout(std::time::Duration::from_millis(500), flush)
        .await
        .is_err()
    {
        debug!("Timed out flushing disconnect");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, ConnectReturnCode, Publish, SubAck};

    #[test]
    fn test_classify_packets() {
        let connack = Packet::ConnAck(ConnAck::new(ConnectReturnCode::Success, false));
        assert_eq!(classify(&connack, "card/response"), Inbound::Connected);

        let ok = Packet::SubAck(SubAck::new(
            1,
            vec![SubscribeReasonCode::Success(QoS::AtLeastOnce)],
        ));
        assert_eq!(classify(&ok, "card/response"), Inbound::Subscribed);

        let rejected = Packet::SubAck(SubAck::new(1, vec![SubscribeReasonCode::Failure]));
        assert_eq!(classify(&rejected, "card/response"), Inbound::SubscribeRejected);
    }

    #[test]
    fn test_only_response_topic_is_forwarded() {
        let ours = Packet::Publish(Publish::new("card/response", QoS::AtLeastOnce, "null"));
        assert_eq!(
            classify(&ours, "card/response"),
            Inbound::Message(Bytes::from_static(b"null"))
        );

        let other = Packet::Publish(Publish::new("card/request", QoS::AtLeastOnce, "get_current"));
        assert_eq!(classify(&other, "card/response"), Inbound::Ignored);
        assert_eq!(classify(&Packet::PingResp, "card/response"), Inbound::Ignored);
    }

    #[tokio::test]
    async fn test_shutdown_during_reconnect_wait_returns_promptly() {
        // Bind then drop a listener so the port refuses connections.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = BrokerConfig {
            host: "127.0.0.1".to_string(),
            port,
            reconnect_interval: std::time::Duration::from_secs(60),
            ..BrokerConfig::default()
        };
        let (event_tx, mut event_rx) = crate::events::transport_event_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(TransportChannel::new(config, event_tx).run(shutdown_rx));

        let first = tokio::time::timeout(std::time::Duration::from_secs(5), event_rx.recv())
            .await
            .unwrap();
        assert!(matches!(first, Some(TransportEvent::Error(_))));

        // Now parked in the 60 s reconnect wait.
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("channel did not stop on shutdown")
            .unwrap();

        assert_eq!(event_rx.recv().await, None);
    }
}
