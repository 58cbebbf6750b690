use crate::config::{Config, MqttTransport};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS, Transport};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

pub const STATUS_QUEUE_CAPACITY: usize = 10;
const REQUEST_CAPACITY: usize = 32;

/// Fire-and-forget publishing. Implementations must not block the caller on
/// broker delivery and only report failures through logs.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: String, payload: Vec<u8>);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubStatus {
    Online,
    Offline,
    Unknown(String),
}

impl HubStatus {
    pub fn parse(payload: &[u8]) -> Self {
        let text = String::from_utf8_lossy(payload);
        match text.trim() {
            "online" => HubStatus::Online,
            "offline" => HubStatus::Offline,
            other => HubStatus::Unknown(other.to_string()),
        }
    }
}

pub fn status_channel() -> (mpsc::Sender<HubStatus>, mpsc::Receiver<HubStatus>) {
    mpsc::channel(STATUS_QUEUE_CAPACITY)
}

/// Hands a status to the event loop without waiting. A full queue drops the
/// newest status; hub statuses are repeatable signals.
pub fn enqueue_status(tx: &mpsc::Sender<HubStatus>, status: HubStatus) {
    match tx.try_send(status) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(status)) => {
            tracing::warn!(?status, "hub status queue full; dropping status");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!("hub status queue closed");
        }
    }
}

#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

impl Publisher for MqttPublisher {
    fn publish(&self, topic: String, payload: Vec<u8>) {
        tracing::debug!(
            topic = %topic,
            payload = %String::from_utf8_lossy(&payload),
            "publish"
        );
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(err) = client
                .publish(topic.clone(), QoS::AtMostOnce, false, payload)
                .await
            {
                tracing::warn!(error=%err, topic=%topic, "publishing msg failed");
            }
        });
    }
}

pub fn mqtt_options(config: &Config) -> MqttOptions {
    let mut mqttoptions = MqttOptions::new(
        config.mqtt_client_id.clone(),
        config.mqtt_host.clone(),
        config.mqtt_port,
    );
    mqttoptions.set_keep_alive(config.mqtt_keepalive());
    if let Some(username) = &config.mqtt_username {
        mqttoptions.set_credentials(
            username.clone(),
            config.mqtt_password.clone().unwrap_or_default(),
        );
    }
    if config.mqtt_transport == MqttTransport::Tls {
        mqttoptions.set_transport(Transport::tls_with_default_config());
    }
    mqttoptions
}

pub fn connect(config: &Config) -> (MqttPublisher, EventLoop) {
    tracing::info!(
        host = %config.mqtt_host,
        port = config.mqtt_port,
        client_id = %config.mqtt_client_id,
        user = config.mqtt_username.as_deref().unwrap_or(""),
        "connecting to mqtt"
    );
    let (client, eventloop) = AsyncClient::new(mqtt_options(config), REQUEST_CAPACITY);
    (MqttPublisher::new(client), eventloop)
}

pub fn hub_status_topic(discovery_prefix: &str) -> String {
    format!("{discovery_prefix}/status")
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConnectionStep {
    Resubscribe,
    Continue,
}

/// Applies one inbound packet. A fresh session has no subscriptions, so every
/// ConnAck asks the caller to subscribe again.
pub fn handle_incoming(
    incoming: &Incoming,
    status_topic: &str,
    status_tx: &mpsc::Sender<HubStatus>,
) -> ConnectionStep {
    match incoming {
        Incoming::ConnAck(_) => {
            tracing::info!("MQTT connected");
            ConnectionStep::Resubscribe
        }
        Incoming::Publish(publish) if publish.topic == status_topic => {
            let status = HubStatus::parse(&publish.payload);
            tracing::info!(?status, "received hub status");
            enqueue_status(status_tx, status);
            ConnectionStep::Continue
        }
        _ => ConnectionStep::Continue,
    }
}

/// Drives the rumqttc event loop for the process lifetime. Polling again
/// after an error makes rumqttc reconnect.
pub async fn run_connection(
    publisher: MqttPublisher,
    mut eventloop: EventLoop,
    status_topic: String,
    status_tx: mpsc::Sender<HubStatus>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(incoming)) => {
                if handle_incoming(&incoming, &status_topic, &status_tx)
                    == ConnectionStep::Resubscribe
                {
                    match publisher
                        .client
                        .try_subscribe(status_topic.clone(), QoS::AtMostOnce)
                    {
                        Ok(()) => tracing::info!(topic=%status_topic, "subscribed to hub status"),
                        Err(err) => tracing::warn!(error=%err, "failed to subscribe to hub status"),
                    }
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error=%err, "MQTT connection dropped; reconnecting");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
