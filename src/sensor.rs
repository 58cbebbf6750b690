pub mod scd30;

use crate::channel::ChannelId;
use crate::decision::Sample;
use embedded_hal::i2c::ErrorKind;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("i2c transfer failed: {0:?}")]
    Bus(ErrorKind),
    #[error("crc mismatch: received {received:#04x}, computed {computed:#04x}")]
    Crc { received: u8, computed: u8 },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// One measurement batch as reported by the sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub co2: f32,
    pub temperature: f32,
    pub humidity: f32,
}

impl Reading {
    pub fn samples(&self, received_at: Instant) -> [Sample; 3] {
        [
            Sample::new(ChannelId::Co2, f64::from(self.co2), received_at),
            Sample::new(ChannelId::Temperature, f64::from(self.temperature), received_at),
            Sample::new(ChannelId::Humidity, f64::from(self.humidity), received_at),
        ]
    }
}

pub trait SensorSource {
    /// `Ok(false)` means the next batch is not ready yet.
    fn has_new_sample(&mut self) -> Result<bool, SensorError>;

    fn read_sample(&mut self) -> Result<Reading, SensorError>;
}
