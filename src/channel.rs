use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    Co2,
    Temperature,
    Humidity,
}

impl ChannelId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelId::Co2 => "co2",
            ChannelId::Temperature => "temperature",
            ChannelId::Humidity => "humidity",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive bounds for accepted readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidRange {
    pub min: f64,
    pub max: f64,
}

impl ValidRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayFormat {
    pub decimals: usize,
}

impl DisplayFormat {
    pub const fn fixed(decimals: usize) -> Self {
        Self { decimals }
    }

    pub fn render(&self, value: f64) -> String {
        format!("{:.*}", self.decimals, value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LastPublish {
    pub value: f64,
    pub at: Instant,
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub id: ChannelId,
    pub unit: &'static str,
    pub device_class: &'static str,
    pub valid_range: ValidRange,
    pub display_format: DisplayFormat,
    pub significance_threshold: f64,
    // value and timestamp live together so neither can change alone
    last: Option<LastPublish>,
}

impl Channel {
    pub fn new(
        id: ChannelId,
        unit: &'static str,
        device_class: &'static str,
        valid_range: ValidRange,
        display_format: DisplayFormat,
        significance_threshold: f64,
    ) -> Self {
        Self {
            id,
            unit,
            device_class,
            valid_range,
            display_format,
            significance_threshold,
            last: None,
        }
    }

    pub fn co2() -> Self {
        Self::new(
            ChannelId::Co2,
            "ppm",
            "carbon_dioxide",
            ValidRange::new(100.0, 10_000.0),
            DisplayFormat::fixed(0),
            50.0,
        )
    }

    pub fn temperature() -> Self {
        Self::new(
            ChannelId::Temperature,
            "°C",
            "temperature",
            ValidRange::new(-50.0, 150.0),
            DisplayFormat::fixed(1),
            0.5,
        )
    }

    pub fn humidity() -> Self {
        Self::new(
            ChannelId::Humidity,
            "%",
            "humidity",
            ValidRange::new(1.0, 100.0),
            DisplayFormat::fixed(0),
            3.0,
        )
    }

    pub fn last_publish(&self) -> Option<LastPublish> {
        self.last
    }

    pub fn render(&self, value: f64) -> String {
        self.display_format.render(value)
    }

    pub(crate) fn record_publish(&mut self, value: f64, at: Instant) {
        let at = match self.last {
            Some(prev) if at < prev.at => prev.at,
            _ => at,
        };
        self.last = Some(LastPublish { value, at });
    }
}

/// Channels owned by the event loop for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct ChannelSet {
    channels: Vec<Channel>,
}

impl ChannelSet {
    pub fn new(channels: Vec<Channel>) -> Self {
        Self { channels }
    }

    pub fn scd30() -> Self {
        Self::new(vec![
            Channel::co2(),
            Channel::temperature(),
            Channel::humidity(),
        ])
    }

    pub fn get_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|channel| channel.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }
}
