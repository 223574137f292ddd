use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timestamp::{format_clock, format_seconds};

/// One decoded point of a channel.
///
/// Samples are immutable once produced. `sequence_index` counts up by one per
/// sample within a channel and restarts at `0` on every session start.
/// `elapsed` is measured from the session's time zero (the first decoded
/// sample after `start()`), and `timestamp_label` is that same offset rendered
/// as `hh:mm:ss:cc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub sequence_index: u64,
    pub value: f64,
    pub elapsed: Duration,
    pub timestamp_label: String,
}

impl Sample {
    pub fn new(sequence_index: u64, value: f64, elapsed: Duration) -> Self {
        Self {
            sequence_index,
            value,
            elapsed,
            timestamp_label: format_clock(elapsed),
        }
    }

    /// The short `ss.cc` form used in the "Time" column of exports.
    pub fn time_column(&self) -> String {
        format_seconds(self.elapsed)
    }
}

/// A value-changed notification as delivered by the transport.
///
/// The transport validates and normalises events into this shape before any
/// profile decoder sees them; decoders never deal with untyped payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub peripheral_id: String,
    pub service: Uuid,
    pub characteristic: Uuid,
    pub payload: Vec<u8>,
}

impl NotificationEvent {
    pub fn new(
        peripheral_id: impl Into<String>,
        service: Uuid,
        characteristic: Uuid,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            peripheral_id: peripheral_id.into(),
            service,
            characteristic,
            payload: payload.into(),
        }
    }
}

/// Lifecycle of a notification session.
///
/// ```text
/// Idle ──start()──▶ Starting ──subscribed──▶ Recording ──stop()──▶ Stopping ──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Recording,
    Stopping,
}

/// Rhythm classification appended as the last byte of every ECG Holter frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Normal,
    Mild,
    Severe,
    Emergency,
    Unknown(u8),
}

impl Indicator {
    /// Byte the device sends when it has no new classification.
    pub const NONE: u8 = 7;

    /// Map a raw indicator byte. Returns `None` for [`Indicator::NONE`].
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            Self::NONE => None,
            1 => Some(Indicator::Normal),
            2 => Some(Indicator::Mild),
            3 => Some(Indicator::Severe),
            4 => Some(Indicator::Emergency),
            other => Some(Indicator::Unknown(other)),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Indicator::Normal => "Normal",
            Indicator::Mild => "Mild",
            Indicator::Severe => "Severe",
            Indicator::Emergency => "Emergency",
            Indicator::Unknown(_) => "Unknown Indicator",
        }
    }

    /// Rhythms grouped under each severity, as shown next to the label.
    pub fn description(&self) -> &'static str {
        match self {
            Indicator::Normal => "NSR: Normal sinus rhythm",
            Indicator::Mild => {
                "APB: Atrial premature beat\n\
                 Fusion: Fusion of paced and normal beat\n\
                 Bigeminy: Ventricular bigeminy\n\
                 Trigeminy: Ventricular trigeminy\n\
                 AFL: Atrial flutter\n\
                 SVTA: Supraventricular tachyarrhythmia\n\
                 PVC: Premature ventricular contraction\n\
                 LBBBB: Left bundle branch block beat\n\
                 RBBBB: Right bundle branch block beat"
            }
            Indicator::Severe => {
                "AFIB: Atrial fibrillation\n\
                 WPW: Pre-excitation (PREX)\n\
                 IVR: Idioventricular rhythm\n\
                 SDHB: Second-degree heart block (BII)"
            }
            Indicator::Emergency => "VFL: Ventricular flutter\nVT: Ventricular tachycardia",
            Indicator::Unknown(_) => "",
        }
    }
}

/// A notify subscription created by a session.
///
/// The controller keeps exactly the handles it created and releases exactly
/// those on `stop()`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub peripheral_id: String,
    pub service: Uuid,
    pub characteristic: Uuid,
}

/// A characteristic write a profile issues around its subscriptions
/// (sensor enable bits, test start/stop flags).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattWrite {
    pub service: Uuid,
    pub characteristic: Uuid,
    pub bytes: Vec<u8>,
}

impl GattWrite {
    pub fn new(service: Uuid, characteristic: Uuid, bytes: &[u8]) -> Self {
        Self {
            service,
            characteristic,
            bytes: bytes.to_vec(),
        }
    }
}

/// Display unit for temperatures decoded from the SensorTag IR sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn from_celsius(self, celsius: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => celsius,
            TemperatureUnit::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "Celsius",
            TemperatureUnit::Fahrenheit => "Fahrenheit",
        }
    }
}
