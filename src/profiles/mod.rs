//! Per-device decoding rules.
//!
//! | Profile | Notify characteristics | Frame | Channels |
//! |---|---|---|---|
//! | [`Profile::EcgPatch`] | `bb01` | 216 B | ECG, pace tag, respiration (+ filtered) |
//! | [`Profile::EcgHolter`] | `bb02` | 217 B | ECG1–4, pace amp/width/polarity, respiration (+ filtered), indicator |
//! | [`Profile::Adc`] | `dd02` | ≥ 2 B | display samples; raw 32-bit hex log |
//! | [`Profile::RangeTest`] | `f402`–`f408`, `f40a` | 4 B / 1 B | current RSSI; scalar counters |
//! | [`Profile::Thermometer`] | `2A1C` | ≥ 5 B | temperature history |
//! | [`Profile::SensorTag`] | 6 sensors | 1–18 B | one channel per axis / quantity |
//! | [`Profile::Battery`] | `2A19` | 1 B | battery level, also read once at start |
//!
//! A decoder owns all channels and carried state of one session. It is
//! created by [`Profile::decoder`] on every session start and is only ever
//! driven from the controller's single decode task.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use uuid::Uuid;

use crate::buffer::Channel;
use crate::config::SessionConfig;
use crate::error::DecodeError;
use crate::filter::MedianFilter;
use crate::protocol::*;
use crate::timestamp::SessionClock;
use crate::types::{GattWrite, NotificationEvent, Sample};

pub mod adc;
pub mod battery;
pub mod ecg_holter;
pub mod ecg_patch;
pub mod sensor_tag;
pub mod thermometer;

pub use adc::AdcDecoder;
pub use battery::BatteryDecoder;
pub use ecg_holter::EcgHolterDecoder;
pub use ecg_patch::EcgPatchDecoder;
pub use range_test::RangeTestDecoder;
pub use sensor_tag::SensorTagDecoder;
pub use thermometer::ThermometerDecoder;

// ── Decoder trait ────────────────────────────────────────────────────────────

/// Turns notification payloads into channel samples for one profile.
pub trait ProfileDecoder: Send {
    /// Decode one notification. Payloads from characteristics the profile
    /// does not use are ignored. A payload of the wrong length is rejected as
    /// a whole and leaves every channel untouched.
    fn decode(
        &mut self,
        event: &NotificationEvent,
        clock: &mut SessionClock,
        now: Instant,
    ) -> Result<(), DecodeError>;

    fn channels(&self) -> Vec<&Channel>;

    fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels().into_iter().find(|c| c.name() == name)
    }

    /// Scalar state that does not fit a channel (counters, labels, last
    /// readings), as display name/value pairs.
    fn readings(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    /// Expected minus decoded samples, for profiles that can tell.
    fn loss(&self) -> Option<f64> {
        None
    }

    /// Arm a one-shot respiration baseline capture. Returns `false` when the
    /// profile has no baseline.
    fn arm_baseline(&mut self) -> bool {
        false
    }

    /// The session's data as delimited text.
    fn export(&self) -> String;

    /// Clear channels and every piece of carried state.
    fn reset(&mut self);
}

// ── Profile ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Profile {
    EcgPatch,
    EcgHolter,
    Adc,
    RangeTest,
    Thermometer,
    SensorTag,
    Battery,
}

impl Profile {
    pub const ALL: [Profile; 7] = [
        Profile::EcgPatch,
        Profile::EcgHolter,
        Profile::Adc,
        Profile::RangeTest,
        Profile::Thermometer,
        Profile::SensorTag,
        Profile::Battery,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Profile::EcgPatch => "ecg-patch",
            Profile::EcgHolter => "ecg-holter",
            Profile::Adc => "adc",
            Profile::RangeTest => "range-test",
            Profile::Thermometer => "thermometer",
            Profile::SensorTag => "sensor-tag",
            Profile::Battery => "battery",
        }
    }

    /// Service that identifies the peripheral and keys the single-session
    /// registry.
    pub fn primary_service(self) -> Uuid {
        match self {
            Profile::EcgPatch | Profile::EcgHolter => ECG_SERVICE,
            Profile::Adc => ADC_SERVICE,
            Profile::RangeTest => RANGE_SERVICE,
            Profile::Thermometer => THERMOMETER_SERVICE,
            Profile::SensorTag => MOVEMENT_SERVICE,
            Profile::Battery => BATTERY_SERVICE,
        }
    }

    /// `(service, characteristic)` pairs to subscribe, in subscribe order.
    pub fn subscriptions(self) -> Vec<(Uuid, Uuid)> {
        match self {
            Profile::EcgPatch => vec![(ECG_SERVICE, ECG_PATCH_CHARACTERISTIC)],
            Profile::EcgHolter => vec![(ECG_SERVICE, ECG_HOLTER_CHARACTERISTIC)],
            Profile::Adc => vec![(ADC_SERVICE, ADC_DATA_CHARACTERISTIC)],
            Profile::RangeTest => RANGE_NOTIFY_CHARACTERISTICS
                .iter()
                .map(|c| (RANGE_SERVICE, *c))
                .collect(),
            Profile::Thermometer => vec![(THERMOMETER_SERVICE, TEMPERATURE_MEASUREMENT)],
            Profile::SensorTag => sensor_tag::SENSORS
                .iter()
                .map(|s| (s.service, s.data))
                .collect(),
            Profile::Battery => vec![(BATTERY_SERVICE, BATTERY_LEVEL)],
        }
    }

    /// Characteristics read once after the start writes; the values are
    /// decoded like notifications.
    pub fn initial_reads(self) -> Vec<(Uuid, Uuid)> {
        match self {
            Profile::Battery => vec![(BATTERY_SERVICE, BATTERY_LEVEL)],
            _ => Vec::new(),
        }
    }

    /// Writes issued after every subscription is in place.
    pub fn start_writes(self) -> Vec<GattWrite> {
        match self {
            Profile::Adc => vec![GattWrite::new(ADC_SERVICE, ADC_CONTROL_CHARACTERISTIC, &CMD_START)],
            Profile::RangeTest => vec![GattWrite::new(RANGE_SERVICE, RANGE_START_TEST, &CMD_START)],
            Profile::SensorTag => sensor_tag::SENSORS
                .iter()
                .filter_map(|s| s.config.map(|c| GattWrite::new(s.service, c, s.enable)))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Writes issued before the subscriptions are released.
    pub fn stop_writes(self) -> Vec<GattWrite> {
        match self {
            Profile::Adc => vec![GattWrite::new(ADC_SERVICE, ADC_CONTROL_CHARACTERISTIC, &CMD_STOP)],
            Profile::RangeTest => vec![GattWrite::new(RANGE_SERVICE, RANGE_START_TEST, &CMD_STOP)],
            Profile::SensorTag => sensor_tag::SENSORS
                .iter()
                .filter_map(|s| s.config.map(|c| GattWrite::new(s.service, c, s.disable)))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// A fresh decoder with all state at its initial value.
    pub fn decoder(self, config: &SessionConfig) -> Box<dyn ProfileDecoder> {
        match self {
            Profile::EcgPatch => Box::new(EcgPatchDecoder::new(config)),
            Profile::EcgHolter => Box::new(EcgHolterDecoder::new(config)),
            Profile::Adc => Box::new(AdcDecoder::new(config)),
            Profile::RangeTest => Box::new(RangeTestDecoder::new(config)),
            Profile::Thermometer => Box::new(ThermometerDecoder::new(config)),
            Profile::SensorTag => Box::new(SensorTagDecoder::new(config)),
            Profile::Battery => Box::new(BatteryDecoder::new(config)),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase().replace('_', "-");
        Profile::ALL
            .into_iter()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Profile::ALL.iter().map(|p| p.name()).collect();
                format!("unknown profile {s:?} (expected one of: {})", names.join(", "))
            })
    }
}

// ── Shared respiration path ──────────────────────────────────────────────────

/// Raw respiration samples plus the optional running-median output, shared by
/// both ECG profiles.
#[derive(Debug, Clone)]
pub(crate) struct Respiration {
    pub raw: Channel,
    pub filtered: Channel,
    filter: MedianFilter,
    apply_filter: bool,
}

impl Respiration {
    pub fn new(raw_name: &str, config: &SessionConfig) -> Self {
        Self {
            raw: Channel::new(raw_name, config.points_to_display),
            filtered: Channel::new(format!("{raw_name}_filtered"), config.points_to_display),
            filter: MedianFilter::new(config.median_every, config.median_on),
            apply_filter: config.apply_resp_filter,
        }
    }

    pub fn push(&mut self, value: f64, elapsed: std::time::Duration) {
        let sample: Sample = self.raw.push(value, elapsed).clone();
        if self.apply_filter {
            if let Some(median) = self.filter.push(sample) {
                self.filtered.append(median);
            }
        }
    }

    pub fn filter_applied(&self) -> bool {
        self.apply_filter
    }

    pub fn reset(&mut self) {
        self.raw.reset();
        self.filtered.reset();
        self.filter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_names_round_trip() {
        for p in Profile::ALL {
            assert_eq!(p.name().parse::<Profile>().unwrap(), p);
        }
        assert_eq!("ECG_Holter".parse::<Profile>().unwrap(), Profile::EcgHolter);
        assert!("holter-x".parse::<Profile>().is_err());
    }

    #[test]
    fn every_profile_subscribes_to_something() {
        for p in Profile::ALL {
            assert!(!p.subscriptions().is_empty(), "{p}");
        }
        assert_eq!(Profile::RangeTest.subscriptions().len(), 8);
    }

    #[test]
    fn only_battery_reads_at_start() {
        for p in Profile::ALL {
            let reads = p.initial_reads();
            if p == Profile::Battery {
                assert_eq!(reads, vec![(BATTERY_SERVICE, BATTERY_LEVEL)]);
            } else {
                assert!(reads.is_empty(), "{p}");
            }
        }
    }

    #[test]
    fn adc_control_writes() {
        let start = Profile::Adc.start_writes();
        let stop = Profile::Adc.stop_writes();
        assert_eq!(start[0].characteristic, ADC_CONTROL_CHARACTERISTIC);
        assert_eq!(start[0].bytes, vec![1]);
        assert_eq!(stop[0].bytes, vec![0]);
    }

    #[test]
    fn respiration_filter_is_optional() {
        let cfg = SessionConfig {
            median_every: 1,
            median_on: 1,
            ..SessionConfig::default()
        };
        let mut on = Respiration::new("resp", &cfg);
        on.push(1.0, std::time::Duration::ZERO);
        assert_eq!(on.filtered.len(), 1);

        let mut off = Respiration::new(
            "resp",
            &SessionConfig {
                apply_resp_filter: false,
                ..cfg
            },
        );
        off.push(1.0, std::time::Duration::ZERO);
        assert_eq!((off.raw.len(), off.filtered.len()), (1, 0));
    }
}
