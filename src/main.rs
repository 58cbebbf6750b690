mod bridge;
mod channel;
mod config;
mod decision;
mod discovery;
mod mqtt;
mod sensor;

use crate::bridge::Bridge;
use crate::channel::ChannelSet;
use crate::config::Config;
use crate::discovery::{Announcer, Topics};
use crate::sensor::scd30::Scd30;
use anyhow::{Context, Result};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use linux_embedded_hal::{Delay, I2cdev};
use std::time::Duration;

const FORCED_CALIBRATION_INTERVAL_SECS: u16 = 2;
const FORCED_CALIBRATION_SETTLE: Duration = Duration::from_secs(125);

fn init_tracing(config: &Config) -> Result<()> {
    let default_filter = if config.debug {
        "debug,scd30_bridge=debug"
    } else {
        "info,scd30_bridge=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

fn configure_sensor<I: I2c, D: DelayNs>(
    sensor: &mut Scd30<I, D>,
    config: &Config,
) -> Result<()> {
    let offset = sensor
        .temperature_offset()
        .context("read temperature offset")?;
    tracing::info!(offset, "got temperature offset");
    if offset != config.temperature_offset {
        tracing::info!(offset = config.temperature_offset, "setting temperature offset");
        sensor
            .set_temperature_offset(config.temperature_offset)
            .context("set temperature offset")?;
    }

    sensor
        .start_measurements(config.interval_secs)
        .context("start continuous measurement")?;
    sensor
        .set_auto_self_calibration(config.auto_calibration)
        .context("set automatic self-calibration")?;
    Ok(())
}

async fn run_forced_calibration<I: I2c, D: DelayNs>(
    sensor: &mut Scd30<I, D>,
    co2_ppm: u16,
) -> Result<()> {
    sensor
        .set_auto_self_calibration(false)
        .context("disable automatic self-calibration")?;
    sensor
        .start_measurements(FORCED_CALIBRATION_INTERVAL_SECS)
        .context("start continuous measurement")?;
    tracing::info!(
        co2_ppm,
        wait_secs = FORCED_CALIBRATION_SETTLE.as_secs(),
        "forced calibration started; waiting for readings to settle"
    );
    tokio::time::sleep(FORCED_CALIBRATION_SETTLE).await;
    sensor
        .set_forced_recalibration(co2_ppm)
        .context("write forced recalibration value")?;
    tracing::info!(co2_ppm, "forced calibration done");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config)?;

    let bus = I2cdev::new(&config.i2c_bus)
        .with_context(|| format!("open i2c bus {}", config.i2c_bus.display()))?;
    let mut sensor = Scd30::new(bus, Delay);

    if let Some(co2_ppm) = config.forced_calibration {
        return run_forced_calibration(&mut sensor, co2_ppm).await;
    }
    configure_sensor(&mut sensor, &config)?;

    let (publisher, eventloop) = mqtt::connect(&config);
    let (status_tx, status_rx) = mqtt::status_channel();
    let connection_handle = tokio::spawn(mqtt::run_connection(
        publisher.clone(),
        eventloop,
        mqtt::hub_status_topic(&config.discovery_prefix),
        status_tx,
    ));

    let announcer = Announcer::new(
        Topics {
            state_prefix: config.topic_prefix.clone(),
            discovery_prefix: config.discovery_prefix.clone(),
            device_id: config.device_id.clone(),
        },
        config.device_name.clone(),
    );
    let bridge = Bridge::new(ChannelSet::scd30(), sensor, publisher, announcer);
    bridge.announce();

    let result = tokio::select! {
        res = bridge.run(config.poll_interval(), status_rx) => res,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    };

    connection_handle.abort();
    if let Err(err) = &result {
        tracing::error!(error=?err, "bridge stopped");
    }
    result
}
