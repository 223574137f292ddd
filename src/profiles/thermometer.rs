//! Health Thermometer temperature measurements.
//!
//! ```text
//! byte 0      flags: bit0 °F, bit1 timestamp present, bit2 type present
//! bytes 1..5  IEEE-11073 32-bit FLOAT (24-bit signed mantissa, i8 exponent)
//! bytes 5..12 timestamp: year u16 LE, seconds, minutes, hour, month, day
//! next byte   temperature type (body location)
//! ```
//!
//! The expected length follows from the flags; any other length is rejected.

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use super::ProfileDecoder;
use crate::buffer::Channel;
use crate::codec::{expect_len, read_uint, Endian};
use crate::config::SessionConfig;
use crate::error::DecodeError;
use crate::export::{ExportFormatter, Table};
use crate::protocol::*;
use crate::timestamp::SessionClock;
use crate::types::{NotificationEvent, TemperatureUnit};

pub const CH_TEMPERATURE: &str = "temperature";

/// Date and time reported by the thermometer itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl fmt::Display for DeviceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Rounded to two decimals.
    pub value: f64,
    pub unit: TemperatureUnit,
    pub device_time: Option<DeviceTime>,
    pub location: Option<&'static str>,
    pub label: String,
}

/// Decode an IEEE-11073 32-bit FLOAT (`mantissa * 10^exponent`).
///
/// The reserved mantissas map to NaN (NaN, NRes, reserved) and to the
/// signed infinities.
pub fn ieee11073_float(data: &[u8], offset: usize) -> Result<f64, DecodeError> {
    let raw = read_uint(data, offset, 3, Endian::Little)?;
    let exponent = read_uint(data, offset + 3, 1, Endian::Little)? as u8 as i8;
    Ok(match raw {
        0x7F_FFFF | 0x80_0000 | 0x80_0001 => f64::NAN,
        0x7F_FFFE => f64::INFINITY,
        0x80_0002 => f64::NEG_INFINITY,
        _ => {
            let mantissa = ((raw << 8) as i32 >> 8) as f64;
            mantissa * 10f64.powi(exponent as i32)
        }
    })
}

pub fn location_name(byte: u8) -> &'static str {
    TEMPERATURE_TYPES
        .get(byte as usize)
        .copied()
        .unwrap_or(TEMPERATURE_TYPES[0])
}

fn parse(data: &[u8]) -> Result<(f64, TemperatureUnit, Option<DeviceTime>, Option<&'static str>), DecodeError> {
    let flags = read_uint(data, 0, 1, Endian::Little)? as u8;
    let has_time = flags & THERMO_FLAG_TIMESTAMP != 0;
    let has_type = flags & THERMO_FLAG_TYPE != 0;
    let type_offset = if has_time { 12 } else { 5 };
    expect_len(data, type_offset + has_type as usize)?;

    let value = ieee11073_float(data, 1)?;
    let unit = if flags & THERMO_FLAG_FAHRENHEIT != 0 {
        TemperatureUnit::Fahrenheit
    } else {
        TemperatureUnit::Celsius
    };
    let device_time = has_time.then(|| DeviceTime {
        year: u16::from_le_bytes([data[5], data[6]]),
        second: data[7],
        minute: data[8],
        hour: data[9],
        month: data[10],
        day: data[11],
    });
    let location = has_type.then(|| location_name(data[type_offset]));
    Ok((value, unit, device_time, location))
}

pub struct ThermometerDecoder {
    temperature: Channel,
    history: VecDeque<Measurement>,
    capacity: usize,
}

impl ThermometerDecoder {
    pub fn new(config: &SessionConfig) -> Self {
        let capacity = config.thermometer_history.max(1);
        Self {
            temperature: Channel::new(CH_TEMPERATURE, capacity),
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn latest(&self) -> Option<&Measurement> {
        self.history.back()
    }

    pub fn history(&self) -> impl Iterator<Item = &Measurement> {
        self.history.iter()
    }
}

impl ProfileDecoder for ThermometerDecoder {
    fn decode(
        &mut self,
        event: &NotificationEvent,
        clock: &mut SessionClock,
        now: Instant,
    ) -> Result<(), DecodeError> {
        if event.characteristic != TEMPERATURE_MEASUREMENT {
            return Ok(());
        }
        let (value, unit, device_time, location) = parse(&event.payload)?;
        let value = (value * 100.0).round() / 100.0;

        let sample = self.temperature.push(value, clock.elapsed(now));
        let label = sample.timestamp_label.clone();
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(Measurement {
            value,
            unit,
            device_time,
            location,
            label,
        });
        Ok(())
    }

    fn channels(&self) -> Vec<&Channel> {
        vec![&self.temperature]
    }

    fn readings(&self) -> Vec<(&'static str, String)> {
        let Some(m) = self.latest() else {
            return Vec::new();
        };
        let mut out = vec![("Temperature", format!("{} {}", m.value, m.unit.name()))];
        if let Some(t) = m.device_time {
            out.push(("Device time", t.to_string()));
        }
        if let Some(loc) = m.location {
            out.push(("Location", loc.to_owned()));
        }
        out
    }

    fn export(&self) -> String {
        let mut table = Table::new(&["Time", "Temperature", "Units", "Device Time", "Location"]);
        for m in &self.history {
            table.push_row(vec![
                m.label.clone(),
                m.value.to_string(),
                m.unit.name().to_owned(),
                m.device_time.map(|t| t.to_string()).unwrap_or_default(),
                m.location.unwrap_or_default().to_owned(),
            ]);
        }
        ExportFormatter::default().format(&[table])
    }

    fn reset(&mut self) {
        self.temperature.reset();
        self.history.clear();
    }
}
