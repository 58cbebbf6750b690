
use crate::channel::ChannelSet;
use crate::decision::{decide, Decision, Sample};
use crate::discovery::Announcer;
use crate::mqtt::{HubStatus, Publisher};
use crate::sensor::SensorSource;
use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Single-writer owner of the channel state. Every decision runs on the task
/// that drives [`Bridge::run`]; publish completion is handled by the
/// publisher and never sees a channel.
pub struct Bridge<S, P> {
    channels: ChannelSet,
    sensor: S,
    publisher: P,
    announcer: Announcer,
}

impl<S, P> Bridge<S, P>
where
    S: SensorSource,
    P: Publisher,
{
    pub fn new(channels: ChannelSet, sensor: S, publisher: P, announcer: Announcer) -> Self {
        Self {
            channels,
            sensor,
            publisher,
            announcer,
        }
    }

    #[cfg(test)]
    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    pub fn announce(&self) {
        self.announcer.announce(&self.publisher, &self.channels);
    }

    /// Waits on the poll timer and the hub status queue until the sensor fails.
    pub async fn run(
        mut self,
        poll_interval: Duration,
        mut status_rx: mpsc::Receiver<HubStatus>,
    ) -> Result<()> {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut status_open = true;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_sensor()?;
                }
                status = status_rx.recv(), if status_open => {
                    match status {
                        Some(status) => self.handle_hub_status(status),
                        None => {
                            tracing::warn!("hub status feed closed");
                            status_open = false;
                        }
                    }
                }
            }
        }
    }

    /// Reads one batch if the sensor has one ready. Sensor errors are fatal.
    pub fn poll_sensor(&mut self) -> Result<()> {
        let ready = self
            .sensor
            .has_new_sample()
            .context("sensor data-ready check failed")?;
        if !ready {
            return Ok(());
        }

        let reading = self
            .sensor
            .read_sample()
            .context("sensor measurement read failed")?;
        tracing::debug!(
            co2 = reading.co2,
            temperature = reading.temperature,
            humidity = reading.humidity,
            "got measurement"
        );

        for sample in reading.samples(Instant::now()) {
            self.handle_sample(sample);
        }
        Ok(())
    }

    pub fn handle_sample(&mut self, sample: Sample) -> Decision {
        let Some(channel) = self.channels.get_mut(sample.channel) else {
            tracing::warn!(channel = %sample.channel, "sample for unknown channel");
            return Decision::Reject;
        };

        let decision = decide(channel, &sample);
        match decision {
            Decision::Publish(value) => {
                let topic = self.announcer.topics().state_topic(channel.id.as_str());
                self.publisher.publish(topic, channel.render(value).into_bytes());
            }
            Decision::Suppress => {
                tracing::trace!(
                    channel = %channel.id,
                    value = sample.value,
                    last = ?channel.last_publish().map(|last| last.value),
                    "suppressed"
                );
            }
            Decision::Reject => {
                tracing::info!(
                    channel = %channel.id,
                    value = sample.value,
                    "value is out of range"
                );
            }
        }
        decision
    }

    pub fn handle_hub_status(&self, status: HubStatus) {
        match status {
            HubStatus::Online => {
                tracing::info!("hub online; announcing discovery");
                self.announce();
            }
            HubStatus::Offline => {
                tracing::debug!("hub offline");
            }
            HubStatus::Unknown(raw) => {
                tracing::info!(status = %raw, "unknown hub status message");
            }
        }
    }
}
