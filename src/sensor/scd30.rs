//! Sensirion SCD30 NDIR CO2 sensor adapter.
//!
//! Talks to the sensor through any `embedded_hal::i2c::I2c` bus. Commands are
//! 16-bit big-endian; each 16-bit data word is followed by a CRC-8/NRSC-5 byte.

use super::{Reading, SensorError, SensorSource};
use crc::{Crc, CRC_8_NRSC_5};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error as _, I2c};
use std::ops::RangeInclusive;

pub const DEFAULT_ADDRESS: u8 = 0x61;
pub const INTERVAL_RANGE: RangeInclusive<u16> = 2..=1800;
pub const FORCED_RECALIBRATION_RANGE: RangeInclusive<u16> = 400..=2000;

const CMD_START_CONTINUOUS: u16 = 0x0010;
const CMD_MEASUREMENT_INTERVAL: u16 = 0x4600;
const CMD_DATA_READY: u16 = 0x0202;
const CMD_READ_MEASUREMENT: u16 = 0x0300;
const CMD_AUTO_SELF_CALIBRATION: u16 = 0x5306;
const CMD_FORCED_RECALIBRATION: u16 = 0x5204;
const CMD_TEMPERATURE_OFFSET: u16 = 0x5403;

// minimum pause between a read command and the read transfer
const READ_DELAY_MS: u32 = 3;

const WORD_CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_NRSC_5);

pub struct Scd30<I, D> {
    i2c: I,
    delay: D,
    address: u8,
}

impl<I: I2c, D: DelayNs> Scd30<I, D> {
    pub fn new(i2c: I, delay: D) -> Self {
        Self {
            i2c,
            delay,
            address: DEFAULT_ADDRESS,
        }
    }

    /// Sets the measurement interval and starts continuous measurement
    /// without ambient pressure compensation.
    pub fn start_measurements(&mut self, interval_secs: u16) -> Result<(), SensorError> {
        self.set_measurement_interval(interval_secs)?;
        self.write_with_arg(CMD_START_CONTINUOUS, 0)
    }

    pub fn set_measurement_interval(&mut self, interval_secs: u16) -> Result<(), SensorError> {
        if !INTERVAL_RANGE.contains(&interval_secs) {
            return Err(SensorError::InvalidArgument(format!(
                "measurement interval {interval_secs}s outside {}..={}",
                INTERVAL_RANGE.start(),
                INTERVAL_RANGE.end()
            )));
        }
        self.write_with_arg(CMD_MEASUREMENT_INTERVAL, interval_secs)
    }

    pub fn data_ready(&mut self) -> Result<bool, SensorError> {
        let [ready] = self.read_words::<1>(CMD_DATA_READY)?;
        Ok(ready == 1)
    }

    pub fn read_measurement(&mut self) -> Result<Reading, SensorError> {
        let words = self.read_words::<6>(CMD_READ_MEASUREMENT)?;
        let float = |hi: u16, lo: u16| f32::from_bits((u32::from(hi) << 16) | u32::from(lo));
        Ok(Reading {
            co2: float(words[0], words[1]),
            temperature: float(words[2], words[3]),
            humidity: float(words[4], words[5]),
        })
    }

    pub fn set_auto_self_calibration(&mut self, enabled: bool) -> Result<(), SensorError> {
        self.write_with_arg(CMD_AUTO_SELF_CALIBRATION, u16::from(enabled))
    }

    pub fn set_forced_recalibration(&mut self, co2_ppm: u16) -> Result<(), SensorError> {
        if !FORCED_RECALIBRATION_RANGE.contains(&co2_ppm) {
            return Err(SensorError::InvalidArgument(format!(
                "forced recalibration reference {co2_ppm}ppm outside {}..={}",
                FORCED_RECALIBRATION_RANGE.start(),
                FORCED_RECALIBRATION_RANGE.end()
            )));
        }
        self.write_with_arg(CMD_FORCED_RECALIBRATION, co2_ppm)
    }

    /// Offset in hundredths of a degree.
    pub fn temperature_offset(&mut self) -> Result<u16, SensorError> {
        let [offset] = self.read_words::<1>(CMD_TEMPERATURE_OFFSET)?;
        Ok(offset)
    }

    pub fn set_temperature_offset(&mut self, offset: u16) -> Result<(), SensorError> {
        self.write_with_arg(CMD_TEMPERATURE_OFFSET, offset)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SensorError> {
        self.i2c
            .write(self.address, bytes)
            .map_err(|err| SensorError::Bus(err.kind()))
    }

    fn write_with_arg(&mut self, command: u16, arg: u16) -> Result<(), SensorError> {
        let [c0, c1] = command.to_be_bytes();
        let [a0, a1] = arg.to_be_bytes();
        self.write(&[c0, c1, a0, a1, WORD_CRC.checksum(&[a0, a1])])
    }

    fn read_words<const N: usize>(&mut self, command: u16) -> Result<[u16; N], SensorError> {
        self.write(&command.to_be_bytes())?;
        self.delay.delay_ms(READ_DELAY_MS);

        let mut raw = vec![0u8; N * 3];
        self.i2c
            .read(self.address, &mut raw)
            .map_err(|err| SensorError::Bus(err.kind()))?;

        let mut words = [0u16; N];
        for (word, chunk) in words.iter_mut().zip(raw.chunks_exact(3)) {
            let computed = WORD_CRC.checksum(&chunk[..2]);
            if computed != chunk[2] {
                return Err(SensorError::Crc {
                    received: chunk[2],
                    computed,
                });
            }
            *word = u16::from_be_bytes([chunk[0], chunk[1]]);
        }
        Ok(words)
    }
}

impl<I: I2c, D: DelayNs> SensorSource for Scd30<I, D> {
    fn has_new_sample(&mut self) -> Result<bool, SensorError> {
        self.data_ready()
    }

    fn read_sample(&mut self) -> Result<Reading, SensorError> {
        self.read_measurement()
    }
}
