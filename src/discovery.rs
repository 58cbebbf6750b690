//! Home Assistant MQTT discovery.
//!
//! One config message per channel lets the hub register the
//! sensor entities on its own. Announcing is stateless and may be repeated on
//! every hub restart; the hub treats a repeated config as an update.

use crate::channel::{Channel, ChannelSet};
use crate::mqtt::Publisher;
use serde::Serialize;

/// Seconds after which the hub marks an entity unavailable without a new value.
pub const EXPIRE_AFTER_SECS: u64 = 1800;

const MANUFACTURER: &str = "Sensirion";
const MODEL: &str = "SCD30";
const DEVICE_NAME: &str = "Sensirion SCD30";

#[derive(Debug, Clone)]
pub struct Topics {
    pub state_prefix: String,
    pub discovery_prefix: String,
    pub device_id: String,
}

impl Topics {
    /// Format: {state_prefix}/{device_id}/{channel}
    pub fn state_topic(&self, channel: &str) -> String {
        format!("{}/{}/{}", self.state_prefix, self.device_id, channel)
    }

    /// Format: {discovery_prefix}/sensor/{device_id}_{channel}/config
    pub fn discovery_topic(&self, channel: &str) -> String {
        format!(
            "{}/sensor/{}/config",
            self.discovery_prefix,
            self.unique_id(channel)
        )
    }

    pub fn unique_id(&self, channel: &str) -> String {
        format!("{}_{}", self.device_id, channel)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceDescriptor {
    pub identifiers: String,
    pub manufacturer: String,
    pub model: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryMessage {
    pub unique_id: String,
    pub name: String,
    pub device: DeviceDescriptor,
    pub state_topic: String,
    pub unit_of_measurement: String,
    pub device_class: String,
    pub state_class: String,
    pub expire_after: u64,
}

#[derive(Debug, Clone)]
pub struct Announcer {
    topics: Topics,
    display_name: String,
}

impl Announcer {
    pub fn new(topics: Topics, display_name: impl Into<String>) -> Self {
        Self {
            topics,
            display_name: display_name.into(),
        }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn message(&self, channel: &Channel) -> DiscoveryMessage {
        let id = channel.id.as_str();
        DiscoveryMessage {
            unique_id: self.topics.unique_id(id),
            name: format!("{} {}", self.display_name, id),
            device: DeviceDescriptor {
                identifiers: self.topics.device_id.clone(),
                manufacturer: MANUFACTURER.to_string(),
                model: MODEL.to_string(),
                name: DEVICE_NAME.to_string(),
            },
            state_topic: self.topics.state_topic(id),
            unit_of_measurement: channel.unit.to_string(),
            device_class: channel.device_class.to_string(),
            state_class: "measurement".to_string(),
            expire_after: EXPIRE_AFTER_SECS,
        }
    }

    /// Publishes one discovery message per channel. Never waits on the broker.
    pub fn announce<P: Publisher + ?Sized>(&self, publisher: &P, channels: &ChannelSet) {
        tracing::info!(channels = channels.len(), "announcing to mqtt discovery");
        for channel in channels.iter() {
            let topic = self.topics.discovery_topic(channel.id.as_str());
            match serde_json::to_vec(&self.message(channel)) {
                Ok(payload) => publisher.publish(topic, payload),
                Err(err) => tracing::warn!(
                    error=%err,
                    channel=%channel.id,
                    "cannot encode discovery message"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl Publisher for Recorder {
        fn publish(&self, topic: String, payload: Vec<u8>) {
            self.sent.lock().unwrap().push((topic, payload));
        }
    }

    fn announcer() -> Announcer {
        Announcer::new(
            Topics {
                state_prefix: "scd30".to_string(),
                discovery_prefix: "homeassistant".to_string(),
                device_id: "office".to_string(),
            },
            "Office",
        )
    }

    #[test]
    fn builds_topics() {
        let topics = announcer().topics().clone();
        assert_eq!(topics.state_topic("co2"), "scd30/office/co2");
        assert_eq!(
            topics.discovery_topic("humidity"),
            "homeassistant/sensor/office_humidity/config"
        );
    }

    #[test]
    fn discovery_payload_matches_schema() {
        let recorder = Recorder::default();
        announcer().announce(&recorder, &ChannelSet::scd30());

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 3);

        let (topic, payload) = &sent[0];
        assert_eq!(topic, "homeassistant/sensor/office_co2/config");
        let doc: Value = serde_json::from_slice(payload).unwrap();
        assert_eq!(doc["unique_id"], "office_co2");
        assert_eq!(doc["name"], "Office co2");
        assert_eq!(doc["state_topic"], "scd30/office/co2");
        assert_eq!(doc["unit_of_measurement"], "ppm");
        assert_eq!(doc["device_class"], "carbon_dioxide");
        assert_eq!(doc["state_class"], "measurement");
        assert_eq!(doc["expire_after"], 1800);
        assert_eq!(doc["device"]["identifiers"], "office");
        assert_eq!(doc["device"]["manufacturer"], "Sensirion");
        assert_eq!(doc["device"]["model"], "SCD30");
        assert_eq!(doc["device"]["name"], "Sensirion SCD30");

        let temperature: Value = serde_json::from_slice(&sent[1].1).unwrap();
        assert_eq!(temperature["unit_of_measurement"], "°C");
        let humidity: Value = serde_json::from_slice(&sent[2].1).unwrap();
        assert_eq!(humidity["device_class"], "humidity");
    }

    #[test]
    fn repeated_announcements_are_identical() {
        let recorder = Recorder::default();
        let announcer = announcer();
        let channels = ChannelSet::scd30();
        announcer.announce(&recorder, &channels);
        announcer.announce(&recorder, &channels);

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 6);
        assert_eq!(sent[..3], sent[3..]);
    }
}
