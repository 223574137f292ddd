//! TI SensorTag multi-sensor profile.
//!
//! Each sensor is a separate GATT service with a data characteristic and,
//! except for the simple keys, a configuration characteristic that has to be
//! written to switch the sensor on.
//!
//! | Sensor | Bytes | Decoding |
//! |---|---|---|
//! | optical | 2 | u16 LE: `(v & 0xfff) * 0.01 * 2^(v >> 12)` lux |
//! | humidity | 4 | u16 LE `h`: `h / 65536 * 100` %RH and `h / 65536 * 165 - 40` °C |
//! | barometer | 6 | u24 LE at byte 3, `/ 100` hPa |
//! | IR temperature | 4 | object, ambient: u16 LE `(raw >> 2) * lsb` |
//! | movement | 18 | u16 LE ×9: gyro `/ (65536/500)`, acc `/ (32768/2)`, mag raw |
//! | simple keys | 1 | bit mask, see [`key_transitions`] |

use std::time::{Duration, Instant};

use uuid::Uuid;

use super::ProfileDecoder;
use crate::buffer::Channel;
use crate::codec::{decode_field, expect_len, read_uint, Endian, FieldSpec};
use crate::config::SessionConfig;
use crate::error::DecodeError;
use crate::export::{ExportFormatter, Table};
use crate::protocol::*;
use crate::timestamp::SessionClock;
use crate::types::{NotificationEvent, TemperatureUnit};

/// GATT layout of one SensorTag sensor.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SensorSpec {
    pub service: Uuid,
    pub data: Uuid,
    pub config: Option<Uuid>,
    pub enable: &'static [u8],
    pub disable: &'static [u8],
    pub frame_len: usize,
}

pub(crate) const SENSORS: [SensorSpec; 6] = [
    SensorSpec {
        service: IR_TEMPERATURE_SERVICE,
        data: IR_TEMPERATURE_DATA,
        config: Some(IR_TEMPERATURE_CONFIG),
        enable: &SENSOR_ENABLE,
        disable: &SENSOR_DISABLE,
        frame_len: IR_TEMPERATURE_FRAME_LEN,
    },
    SensorSpec {
        service: HUMIDITY_SERVICE,
        data: HUMIDITY_DATA,
        config: Some(HUMIDITY_CONFIG),
        enable: &SENSOR_ENABLE,
        disable: &SENSOR_DISABLE,
        frame_len: HUMIDITY_FRAME_LEN,
    },
    SensorSpec {
        service: BAROMETER_SERVICE,
        data: BAROMETER_DATA,
        config: Some(BAROMETER_CONFIG),
        enable: &SENSOR_ENABLE,
        disable: &SENSOR_DISABLE,
        frame_len: BAROMETER_FRAME_LEN,
    },
    SensorSpec {
        service: OPTICAL_SERVICE,
        data: OPTICAL_DATA,
        config: Some(OPTICAL_CONFIG),
        enable: &SENSOR_ENABLE,
        disable: &SENSOR_DISABLE,
        frame_len: OPTICAL_FRAME_LEN,
    },
    SensorSpec {
        service: MOVEMENT_SERVICE,
        data: MOVEMENT_DATA,
        config: Some(MOVEMENT_CONFIG),
        enable: &MOVEMENT_ENABLE,
        disable: &MOVEMENT_DISABLE,
        frame_len: MOVEMENT_FRAME_LEN,
    },
    SensorSpec {
        service: SIMPLE_KEYS_SERVICE,
        data: SIMPLE_KEYS_DATA,
        config: None,
        enable: &[],
        disable: &[],
        frame_len: SIMPLE_KEYS_FRAME_LEN,
    },
];

// Channel names, in the order reported by `channels()`.
pub const CH_OPTICAL: &str = "optical";
pub const CH_HUMIDITY: &str = "humidity";
pub const CH_HUMIDITY_TEMPERATURE: &str = "humidity_temperature";
pub const CH_PRESSURE: &str = "pressure";
pub const CH_IR_OBJECT: &str = "ir_object";
pub const CH_IR_AMBIENT: &str = "ir_ambient";
pub const CH_MOVEMENT: [&str; 9] = [
    "gyro_x", "gyro_y", "gyro_z", "acc_x", "acc_y", "acc_z", "mag_x", "mag_y", "mag_z",
];
pub const CH_KEY_LEFT: &str = "key_left";
pub const CH_KEY_RIGHT: &str = "key_right";

/// Lux from the optical sensor's mantissa/exponent word.
pub fn optical_lux(raw: u16) -> f64 {
    let m = (raw & 0x0fff) as f64;
    let e = (raw >> 12) as i32;
    m * (0.01 * 2f64.powi(e))
}

pub fn humidity_percent(raw: u16) -> f64 {
    raw as f64 / 65536.0 * 100.0
}

pub fn humidity_temperature(raw: u16) -> f64 {
    raw as f64 / 65536.0 * 165.0 - 40.0
}

pub fn ir_celsius(raw: u16, lsb: f64) -> f64 {
    (raw >> 2) as f64 * lsb
}

/// New `(left, right)` key states, `None` where a side is untouched.
pub fn key_transitions(mask: u8) -> (Option<u8>, Option<u8>) {
    match mask {
        1 => (Some(1), None),
        2 => (None, Some(1)),
        3 => (Some(1), Some(1)),
        _ => (Some(0), Some(0)),
    }
}

pub struct SensorTagDecoder {
    optical: Channel,
    humidity: Channel,
    humidity_temperature: Channel,
    pressure: Channel,
    ir_object: Channel,
    ir_ambient: Channel,
    movement: [Channel; 9],
    key_left: Channel,
    key_right: Channel,
    ir_lsb: f64,
    unit: TemperatureUnit,
}

impl SensorTagDecoder {
    pub fn new(config: &SessionConfig) -> Self {
        let cap = config.points_to_display;
        Self {
            optical: Channel::new(CH_OPTICAL, cap),
            humidity: Channel::new(CH_HUMIDITY, cap),
            humidity_temperature: Channel::new(CH_HUMIDITY_TEMPERATURE, cap),
            pressure: Channel::new(CH_PRESSURE, cap),
            ir_object: Channel::new(CH_IR_OBJECT, cap),
            ir_ambient: Channel::new(CH_IR_AMBIENT, cap),
            movement: CH_MOVEMENT.map(|name| Channel::new(name, cap)),
            key_left: Channel::new(CH_KEY_LEFT, cap),
            key_right: Channel::new(CH_KEY_RIGHT, cap),
            ir_lsb: config.temperature_scale_lsb,
            unit: config.temp_units,
        }
    }

    fn all_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        [
            &mut self.optical,
            &mut self.humidity,
            &mut self.humidity_temperature,
            &mut self.pressure,
            &mut self.ir_object,
            &mut self.ir_ambient,
        ]
        .into_iter()
        .chain(self.movement.iter_mut())
        .chain([&mut self.key_left, &mut self.key_right])
    }

    fn decode_sensor(&mut self, spec: &SensorSpec, data: &[u8], elapsed: Duration) -> Result<(), DecodeError> {
        let u16_at = |offset| read_uint(data, offset, 2, Endian::Little).map(|v| v as u16);

        if spec.data == OPTICAL_DATA {
            let lux = optical_lux(u16_at(0)?);
            self.optical.push(lux, elapsed);
        } else if spec.data == HUMIDITY_DATA {
            let raw = u16_at(0)?;
            self.humidity.push(humidity_percent(raw), elapsed);
            self.humidity_temperature.push(humidity_temperature(raw), elapsed);
        } else if spec.data == BAROMETER_DATA {
            let pressure = read_uint(data, 3, 3, Endian::Little)? as f64 / 100.0;
            self.pressure.push(pressure, elapsed);
        } else if spec.data == IR_TEMPERATURE_DATA {
            let object = self.unit.from_celsius(ir_celsius(u16_at(0)?, self.ir_lsb));
            let ambient = self.unit.from_celsius(ir_celsius(u16_at(2)?, self.ir_lsb));
            self.ir_object.push(object, elapsed);
            self.ir_ambient.push(ambient, elapsed);
        } else if spec.data == MOVEMENT_DATA {
            let mut values = [0.0; 9];
            for (axis, value) in values.iter_mut().enumerate() {
                let raw = decode_field(data, &FieldSpec::new(axis * 2, 2))?;
                *value = match axis {
                    0..=2 => raw / GYRO_DIVISOR,
                    3..=5 => raw / ACC_DIVISOR,
                    _ => raw,
                };
            }
            for (channel, value) in self.movement.iter_mut().zip(values) {
                channel.push(value, elapsed);
            }
        } else if spec.data == SIMPLE_KEYS_DATA {
            let (left, right) = key_transitions(data[0]);
            if let Some(v) = left {
                self.key_left.push(v as f64, elapsed);
            }
            if let Some(v) = right {
                self.key_right.push(v as f64, elapsed);
            }
        }
        Ok(())
    }
}

impl ProfileDecoder for SensorTagDecoder {
    fn decode(
        &mut self,
        event: &NotificationEvent,
        clock: &mut SessionClock,
        now: Instant,
    ) -> Result<(), DecodeError> {
        let Some(spec) = SENSORS.iter().find(|s| s.data == event.characteristic) else {
            return Ok(());
        };
        expect_len(&event.payload, spec.frame_len)?;
        let elapsed = clock.elapsed(now);
        self.decode_sensor(spec, &event.payload, elapsed)
    }

    fn channels(&self) -> Vec<&Channel> {
        let mut out = vec![
            &self.optical,
            &self.humidity,
            &self.humidity_temperature,
            &self.pressure,
            &self.ir_object,
            &self.ir_ambient,
        ];
        out.extend(self.movement.iter());
        out.extend([&self.key_left, &self.key_right]);
        out
    }

    fn readings(&self) -> Vec<(&'static str, String)> {
        vec![("IR temperature unit", self.unit.name().to_owned())]
    }

    /// One `Time, Formatted Time, <channel>` table per channel.
    fn export(&self) -> String {
        let tables: Vec<Table> = self
            .channels()
            .into_iter()
            .map(|c| Table::from_samples(c.name(), &c.snapshot()))
            .collect();
        ExportFormatter::default().format(&tables)
    }

    fn reset(&mut self) {
        for channel in self.all_mut() {
            channel.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(dec: &mut SensorTagDecoder, characteristic: Uuid, payload: &[u8]) -> Result<(), DecodeError> {
        let service = SENSORS
            .iter()
            .find(|s| s.data == characteristic)
            .map_or(Uuid::nil(), |s| s.service);
        let ev = NotificationEvent::new("p", service, characteristic, payload.to_vec());
        dec.decode(&ev, &mut SessionClock::new(), Instant::now())
    }

    fn last(dec: &SensorTagDecoder, name: &str) -> Option<f64> {
        dec.channel(name).and_then(|c| c.last()).map(|s| s.value)
    }

    #[test]
    fn scalar_conversions() {
        // m = 0x234, e = 3
        assert_eq!(optical_lux(0x3234), 564.0 * (0.01 * 8.0));
        assert_eq!(humidity_percent(0x8000), 50.0);
        assert_eq!(humidity_temperature(0x8000), 42.5);
        assert_eq!(ir_celsius(0x0C80, 0.03125), 25.0);
    }

    #[test]
    fn humidity_and_barometer() {
        let mut dec = SensorTagDecoder::new(&SessionConfig::default());
        decode(&mut dec, HUMIDITY_DATA, &[0x00, 0x80, 0x00, 0x00]).unwrap();
        assert_eq!(last(&dec, CH_HUMIDITY), Some(50.0));
        assert_eq!(last(&dec, CH_HUMIDITY_TEMPERATURE), Some(42.5));

        // 101325 → 0x018BCD
        decode(&mut dec, BAROMETER_DATA, &[0, 0, 0, 0xCD, 0x8B, 0x01]).unwrap();
        assert_eq!(last(&dec, CH_PRESSURE), Some(1013.25));
    }

    #[test]
    fn ir_temperature_in_fahrenheit() {
        let cfg = SessionConfig {
            temp_units: TemperatureUnit::Fahrenheit,
            ..SessionConfig::default()
        };
        let mut dec = SensorTagDecoder::new(&cfg);
        decode(&mut dec, IR_TEMPERATURE_DATA, &[0x80, 0x0C, 0x00, 0x00]).unwrap();
        assert_eq!(last(&dec, CH_IR_OBJECT), Some(77.0));
        assert_eq!(last(&dec, CH_IR_AMBIENT), Some(32.0));
    }

    #[test]
    fn movement_axes_are_unsigned() {
        let mut dec = SensorTagDecoder::new(&SessionConfig::default());
        let mut payload = [0u8; 18];
        payload[0..2].copy_from_slice(&[0xFF, 0xFF]);
        payload[6..8].copy_from_slice(&16384u16.to_le_bytes());
        payload[16..18].copy_from_slice(&[0xF9, 0xFF]);
        decode(&mut dec, MOVEMENT_DATA, &payload).unwrap();

        let gyro_x = last(&dec, "gyro_x").unwrap();
        assert_eq!(gyro_x, 65535.0 / GYRO_DIVISOR);
        assert!((gyro_x - 499.99).abs() < 0.01);
        assert_eq!(last(&dec, "acc_x"), Some(1.0));
        assert_eq!(last(&dec, "mag_z"), Some(65529.0));
    }

    #[test]
    fn simple_keys() {
        assert_eq!(key_transitions(1), (Some(1), None));
        assert_eq!(key_transitions(9), (Some(0), Some(0)));

        let mut dec = SensorTagDecoder::new(&SessionConfig::default());
        for mask in [1u8, 2, 0, 3] {
            decode(&mut dec, SIMPLE_KEYS_DATA, &[mask]).unwrap();
        }
        let left: Vec<f64> = dec.key_left.iter().map(|s| s.value).collect();
        let right: Vec<f64> = dec.key_right.iter().map(|s| s.value).collect();
        assert_eq!(left, vec![1.0, 0.0, 1.0]);
        assert_eq!(right, vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let mut dec = SensorTagDecoder::new(&SessionConfig::default());
        assert!(decode(&mut dec, MOVEMENT_DATA, &[0; 12]).is_err());
        assert!(decode(&mut dec, OPTICAL_DATA, &[0; 3]).is_err());
        assert!(dec.channels().iter().all(|c| c.is_empty()));
    }

    #[test]
    fn config_writes_cover_every_configurable_sensor() {
        let starts = crate::profiles::Profile::SensorTag.start_writes();
        assert_eq!(starts.len(), 5);
        let movement = starts.iter().find(|w| w.characteristic == MOVEMENT_CONFIG).unwrap();
        assert_eq!(movement.bytes, vec![0xFF, 0xFF]);
    }
}
