//! Battery Service level (`180F` / `2A19`): one byte, percent.
//!
//! The level is read once when the session starts and then follows
//! notifications, where the peripheral supports them.

use std::time::Instant;

use super::ProfileDecoder;
use crate::buffer::Channel;
use crate::codec::{decode_field, expect_len, FieldSpec};
use crate::config::SessionConfig;
use crate::error::DecodeError;
use crate::export::{ExportFormatter, Table};
use crate::protocol::*;
use crate::timestamp::SessionClock;
use crate::types::NotificationEvent;

pub const CH_BATTERY: &str = "battery";

const LEVEL: FieldSpec = FieldSpec::new(0, BATTERY_FRAME_LEN);

/// Coarse charge bucket for a level in percent.
///
/// | Level | Bucket |
/// |---|---|
/// | 1–34 | quarter |
/// | 35–59 | half |
/// | 60–80 | three-quarters |
/// | 81–100 | full |
/// | 0 or > 100 | empty |
pub fn charge_bucket(level: u8) -> &'static str {
    match level {
        1..=34 => "quarter",
        35..=59 => "half",
        60..=80 => "three-quarters",
        81..=100 => "full",
        _ => "empty",
    }
}

pub struct BatteryDecoder {
    level: Channel,
}

impl BatteryDecoder {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            level: Channel::new(CH_BATTERY, config.points_to_display),
        }
    }

    pub fn level(&self) -> Option<u8> {
        self.level.last().map(|s| s.value as u8)
    }
}

impl ProfileDecoder for BatteryDecoder {
    fn decode(
        &mut self,
        event: &NotificationEvent,
        clock: &mut SessionClock,
        now: Instant,
    ) -> Result<(), DecodeError> {
        if event.characteristic != BATTERY_LEVEL {
            return Ok(());
        }
        expect_len(&event.payload, BATTERY_FRAME_LEN)?;
        let value = decode_field(&event.payload, &LEVEL)?;
        self.level.push(value, clock.elapsed(now));
        Ok(())
    }

    fn channels(&self) -> Vec<&Channel> {
        vec![&self.level]
    }

    fn readings(&self) -> Vec<(&'static str, String)> {
        match self.level() {
            Some(level) => vec![
                ("Battery level", format!("{level}%")),
                ("Charge", charge_bucket(level).to_owned()),
            ],
            None => vec![("Battery level", "Loading...".to_owned())],
        }
    }

    fn export(&self) -> String {
        ExportFormatter::default().format(&[Table::from_samples(
            "Battery Level (%)",
            &self.level.snapshot(),
        )])
    }

    fn reset(&mut self) {
        self.level.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(payload: &[u8]) -> NotificationEvent {
        NotificationEvent::new("p", BATTERY_SERVICE, BATTERY_LEVEL, payload.to_vec())
    }

    #[test]
    fn buckets() {
        assert_eq!(charge_bucket(0), "empty");
        assert_eq!(charge_bucket(34), "quarter");
        assert_eq!(charge_bucket(35), "half");
        assert_eq!(charge_bucket(80), "three-quarters");
        assert_eq!(charge_bucket(100), "full");
        assert_eq!(charge_bucket(101), "empty");
    }

    #[test]
    fn decodes_level() {
        let mut dec = BatteryDecoder::new(&SessionConfig::default());
        let mut clock = SessionClock::new();
        assert_eq!(dec.readings()[0].1, "Loading...");

        dec.decode(&event(&[87]), &mut clock, Instant::now()).unwrap();
        assert_eq!(dec.level(), Some(87));
        assert_eq!(
            dec.readings(),
            vec![
                ("Battery level", "87%".to_owned()),
                ("Charge", "full".to_owned())
            ]
        );
        assert!(dec.export().starts_with("Time,Formatted Time,Battery Level (%)\r\n"));
    }

    #[test]
    fn wrong_length_is_rejected() {
        let mut dec = BatteryDecoder::new(&SessionConfig::default());
        let mut clock = SessionClock::new();
        assert!(dec.decode(&event(&[]), &mut clock, Instant::now()).is_err());
        assert!(dec.decode(&event(&[50, 0]), &mut clock, Instant::now()).is_err());
        assert_eq!(dec.level(), None);
    }
}
