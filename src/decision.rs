use crate::channel::{Channel, ChannelId};
use std::time::{Duration, Instant};

/// Longest time a channel may go without a publish, even when unchanged.
pub const STALENESS_WINDOW: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub channel: ChannelId,
    pub value: f64,
    pub received_at: Instant,
}

impl Sample {
    pub fn new(channel: ChannelId, value: f64, received_at: Instant) -> Self {
        Self {
            channel,
            value,
            received_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Publish(f64),
    Suppress,
    Reject,
}

/// Runs one sample through the range, staleness and significance checks.
///
/// On `Publish` the channel has already recorded the value and arrival time;
/// the caller only has to render and send it. `Reject` and `Suppress` leave
/// the channel untouched.
pub fn decide(channel: &mut Channel, sample: &Sample) -> Decision {
    if !channel.valid_range.contains(sample.value) {
        return Decision::Reject;
    }

    if let Some(last) = channel.last_publish() {
        let elapsed = sample.received_at.saturating_duration_since(last.at);
        let delta = (sample.value - last.value).abs();
        if elapsed < STALENESS_WINDOW && delta < channel.significance_threshold {
            return Decision::Suppress;
        }
    }

    channel.record_publish(sample.value, sample.received_at);
    Decision::Publish(sample.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LastPublish;

    fn at(base: Instant, secs: u64) -> Instant {
        base + Duration::from_secs(secs)
    }

    #[test]
    fn first_valid_sample_is_always_published() {
        let base = Instant::now();
        for mut channel in [Channel::co2(), Channel::temperature(), Channel::humidity()] {
            let value = channel.valid_range.min;
            let sample = Sample::new(channel.id, value, base);
            assert_eq!(decide(&mut channel, &sample), Decision::Publish(value));
            assert_eq!(
                channel.last_publish(),
                Some(LastPublish { value, at: base })
            );
        }
    }

    #[test]
    fn co2_heartbeat_and_threshold_scenario() {
        let base = Instant::now();
        let mut co2 = Channel::co2();

        let baseline = Sample::new(ChannelId::Co2, 420.0, base);
        assert_eq!(decide(&mut co2, &baseline), Decision::Publish(420.0));

        let small = Sample::new(ChannelId::Co2, 430.0, at(base, 10));
        assert_eq!(decide(&mut co2, &small), Decision::Suppress);
        assert_eq!(
            co2.last_publish(),
            Some(LastPublish {
                value: 420.0,
                at: base
            })
        );

        let large = Sample::new(ChannelId::Co2, 480.0, at(base, 20));
        assert_eq!(decide(&mut co2, &large), Decision::Publish(480.0));
        assert_eq!(co2.last_publish().map(|last| last.at), Some(at(base, 20)));

        let heartbeat = Sample::new(ChannelId::Co2, 480.0, at(base, 700));
        assert_eq!(decide(&mut co2, &heartbeat), Decision::Publish(480.0));
        assert_eq!(co2.last_publish().map(|last| last.at), Some(at(base, 700)));
    }

    #[test]
    fn delta_equal_to_threshold_is_published() {
        let base = Instant::now();
        let mut humidity = Channel::humidity();
        decide(&mut humidity, &Sample::new(ChannelId::Humidity, 40.0, base));
        let sample = Sample::new(ChannelId::Humidity, 43.0, at(base, 1));
        assert_eq!(decide(&mut humidity, &sample), Decision::Publish(43.0));
    }

    #[test]
    fn unchanged_value_is_suppressed_until_window_elapses() {
        let base = Instant::now();
        let mut temperature = Channel::temperature();
        decide(
            &mut temperature,
            &Sample::new(ChannelId::Temperature, 21.0, base),
        );

        let early = Sample::new(ChannelId::Temperature, 21.0, at(base, 599));
        assert_eq!(decide(&mut temperature, &early), Decision::Suppress);

        let late = Sample::new(ChannelId::Temperature, 21.0, at(base, 601));
        assert_eq!(decide(&mut temperature, &late), Decision::Publish(21.0));
    }

    #[test]
    fn unchanged_value_is_published_exactly_at_window() {
        let base = Instant::now();
        let mut co2 = Channel::co2();
        decide(&mut co2, &Sample::new(ChannelId::Co2, 500.0, base));

        let due = Sample::new(ChannelId::Co2, 500.0, base + STALENESS_WINDOW);
        assert_eq!(decide(&mut co2, &due), Decision::Publish(500.0));
        assert_eq!(
            co2.last_publish().map(|last| last.at),
            Some(base + STALENESS_WINDOW)
        );
    }

    #[test]
    fn out_of_range_temperature_is_rejected_without_state_change() {
        let base = Instant::now();
        let mut temperature = Channel::temperature();
        let sample = Sample::new(ChannelId::Temperature, 200.0, base);
        assert_eq!(decide(&mut temperature, &sample), Decision::Reject);
        assert!(temperature.last_publish().is_none());

        decide(
            &mut temperature,
            &Sample::new(ChannelId::Temperature, 20.0, base),
        );
        let before = temperature.last_publish();
        let stale_but_invalid = Sample::new(ChannelId::Temperature, -60.0, at(base, 5_000));
        assert_eq!(decide(&mut temperature, &stale_but_invalid), Decision::Reject);
        assert_eq!(temperature.last_publish(), before);
    }

    #[test]
    fn nan_is_rejected() {
        let mut co2 = Channel::co2();
        let sample = Sample::new(ChannelId::Co2, f64::NAN, Instant::now());
        assert_eq!(decide(&mut co2, &sample), Decision::Reject);
        assert!(co2.last_publish().is_none());
    }

    #[test]
    fn single_spike_over_threshold_is_published_unfiltered() {
        let base = Instant::now();
        let mut co2 = Channel::co2();
        decide(&mut co2, &Sample::new(ChannelId::Co2, 500.0, base));
        let spike = Sample::new(ChannelId::Co2, 900.0, at(base, 1));
        assert_eq!(decide(&mut co2, &spike), Decision::Publish(900.0));
        let back = Sample::new(ChannelId::Co2, 505.0, at(base, 2));
        assert_eq!(decide(&mut co2, &back), Decision::Publish(505.0));
    }
}
