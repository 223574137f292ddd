//! ECG Holter: four ECG leads, pace pulse descriptor and PCG respiration, plus
//! an on-device rhythm classification.
//!
//! Frame layout (217 bytes):
//!
//! ```text
//! words 0..54 (big-endian u32), in groups of six:
//!   0..=3  ECG1..ECG4
//!   4      pace word: byte 1 = width/polarity, bytes 2..4 = amplitude
//!   5      PCG / respiration
//! byte 216 indicator
//! ```
//!
//! All samples of one frame share a single timestamp.

use std::time::Instant;

use log::{debug, info};

use super::{ProfileDecoder, Respiration};
use crate::buffer::Channel;
use crate::codec::{decode_field, expect_len, read_uint, Endian, FieldSpec};
use crate::config::SessionConfig;
use crate::error::DecodeError;
use crate::export::{ExportFormatter, Table};
use crate::protocol::*;
use crate::timestamp::SessionClock;
use crate::types::{Indicator, NotificationEvent};

pub const CH_ECG: [&str; 4] = ["ecg1", "ecg2", "ecg3", "ecg4"];
pub const CH_PACE_AMPLITUDE: &str = "pace_amplitude";
pub const CH_PACE_WIDTH: &str = "pace_width";
pub const CH_PACE_POLARITY: &str = "pace_polarity";
pub const CH_RESPIRATION: &str = "holter_respiration";
pub const CH_INDICATOR: &str = "indicator";

const SAMPLE: FieldSpec = FieldSpec::new(0, ECG_WORD_LEN)
    .big_endian()
    .inverted(ECG_SAMPLE_BITS)
    .scaled(HOLTER_SCALE);

/// One decoded pace descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pace {
    pub amplitude: f64,
    pub width: f64,
    pub polarity: u8,
}

impl Pace {
    /// Decode the pace word at `offset`.
    pub fn decode(data: &[u8], offset: usize) -> Result<Self, DecodeError> {
        let width_byte = read_uint(data, offset + 1, 1, Endian::Big)? as u8;
        let amplitude = read_uint(data, offset + 2, 2, Endian::Big)? as f64 * HOLTER_PACE_AMP_SCALE;
        let (width, polarity) = if width_byte < HOLTER_POLARITY_BIT {
            (width_byte as f64 * HOLTER_PACE_WIDTH_SCALE, 0)
        } else {
            ((width_byte - HOLTER_POLARITY_BIT) as f64 * HOLTER_PACE_WIDTH_SCALE, 1)
        };
        Ok(Self {
            amplitude,
            width,
            polarity,
        })
    }

    fn is_pulse(&self) -> bool {
        self.amplitude != 0.0 && self.width != 0.0
    }
}

pub struct EcgHolterDecoder {
    ecg: [Channel; 4],
    pace_amplitude: Channel,
    pace_width: Channel,
    pace_polarity: Channel,
    resp: Respiration,
    indicators: Channel,
    current: Option<Indicator>,
    last_pace: Option<Pace>,
}

impl EcgHolterDecoder {
    pub fn new(config: &SessionConfig) -> Self {
        let cap = config.points_to_display;
        Self {
            ecg: CH_ECG.map(|name| Channel::new(name, cap)),
            pace_amplitude: Channel::new(CH_PACE_AMPLITUDE, cap),
            pace_width: Channel::new(CH_PACE_WIDTH, cap),
            pace_polarity: Channel::new(CH_PACE_POLARITY, cap),
            resp: Respiration::new(CH_RESPIRATION, config),
            indicators: Channel::new(CH_INDICATOR, cap),
            current: None,
            last_pace: None,
        }
    }

    /// Most recent classification; unchanged by "no new classification" bytes.
    pub fn indicator(&self) -> Option<Indicator> {
        self.current
    }

    /// Last pace descriptor that carried a pulse, or the first one seen.
    pub fn last_pace(&self) -> Option<Pace> {
        self.last_pace
    }
}

/// Values decoded from one frame before they are committed.
struct Frame {
    groups: Vec<([f64; 4], Pace, f64)>,
    indicator: u8,
}

fn parse_frame(data: &[u8]) -> Result<Frame, DecodeError> {
    expect_len(data, ECG_HOLTER_FRAME_LEN)?;
    let group_bytes = HOLTER_GROUP_LEN * ECG_WORD_LEN;
    let mut groups = Vec::with_capacity(ECG_WORDS_PER_FRAME / HOLTER_GROUP_LEN);

    for g in 0..ECG_WORDS_PER_FRAME / HOLTER_GROUP_LEN {
        let base = g * group_bytes;
        let word = |field: usize| base + field * ECG_WORD_LEN;
        let mut leads = [0.0; 4];
        for (lead, value) in leads.iter_mut().enumerate() {
            *value = decode_field(data, &SAMPLE.at(word(lead)))? * HOLTER_MILLI;
        }
        let pace = Pace::decode(data, word(HOLTER_PACE_FIELD))?;
        let pcg = decode_field(data, &SAMPLE.at(word(HOLTER_PCG_FIELD)))? * HOLTER_MILLI;
        groups.push((leads, pace, pcg));
    }
    Ok(Frame {
        groups,
        indicator: data[ECG_HOLTER_FRAME_LEN - 1],
    })
}

impl ProfileDecoder for EcgHolterDecoder {
    fn decode(
        &mut self,
        event: &NotificationEvent,
        clock: &mut SessionClock,
        now: Instant,
    ) -> Result<(), DecodeError> {
        if event.characteristic != ECG_HOLTER_CHARACTERISTIC {
            return Ok(());
        }
        let frame = parse_frame(&event.payload)?;
        let elapsed = clock.elapsed(now);

        match Indicator::from_byte(frame.indicator) {
            Some(indicator) => {
                if self.current != Some(indicator) {
                    info!("indicator: {}", indicator.label());
                }
                self.current = Some(indicator);
                self.indicators.push(frame.indicator as f64, elapsed);
            }
            None => debug!("indicator unchanged"),
        }

        for (leads, pace, pcg) in &frame.groups {
            for (channel, value) in self.ecg.iter_mut().zip(leads) {
                channel.push(*value, elapsed);
            }
            self.pace_amplitude.push(pace.amplitude, elapsed);
            self.pace_width.push(pace.width, elapsed);
            self.pace_polarity.push(pace.polarity as f64, elapsed);
            self.resp.push(*pcg, elapsed);
        }

        if let Some((_, pace, _)) = frame.groups.last() {
            if pace.is_pulse() || self.last_pace.is_none() {
                self.last_pace = Some(*pace);
            }
        }
        Ok(())
    }

    fn channels(&self) -> Vec<&Channel> {
        let mut out: Vec<&Channel> = self.ecg.iter().collect();
        out.extend([
            &self.pace_amplitude,
            &self.pace_width,
            &self.pace_polarity,
            &self.resp.raw,
            &self.resp.filtered,
            &self.indicators,
        ]);
        out
    }

    fn readings(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![(
            "Indicator",
            self.current.map(|i| i.label()).unwrap_or("-").to_owned(),
        )];
        if let Some(p) = self.last_pace {
            out.push(("Pace amplitude", p.amplitude.to_string()));
            out.push(("Pace width", p.width.to_string()));
            out.push(("Pace polarity", p.polarity.to_string()));
        }
        out
    }

    fn export(&self) -> String {
        let mut ecg = Table::new(&[
            "Time",
            "Formatted Time",
            "Pace Amplitude",
            "Pace Width",
            "Pace Polarity",
            "ECG1",
            "ECG2",
            "ECG3",
            "ECG4",
        ]);
        let [e1, e2, e3, e4] = &self.ecg;
        let rows = self
            .pace_amplitude
            .iter()
            .zip(self.pace_width.iter())
            .zip(self.pace_polarity.iter())
            .zip(e1.iter().zip(e2.iter()).zip(e3.iter().zip(e4.iter())));
        for (((amp, width), pol), ((c1, c2), (c3, c4))) in rows {
            ecg.push_row(vec![
                amp.time_column(),
                amp.timestamp_label.clone(),
                amp.value.to_string(),
                width.value.to_string(),
                pol.value.to_string(),
                c1.value.to_string(),
                c2.value.to_string(),
                c3.value.to_string(),
                c4.value.to_string(),
            ]);
        }

        let mut tables = vec![ecg, Table::from_samples("Holter Respiration", &self.resp.raw.snapshot())];
        if self.resp.filter_applied() {
            tables.push(Table::from_samples(
                "Filtered Respiration",
                &self.resp.filtered.snapshot(),
            ));
        }

        let mut indicators = Table::new(&["Time", "Formatted Time", "Indicator"]);
        for s in self.indicators.iter() {
            let label = Indicator::from_byte(s.value as u8).map_or("", |i| i.label());
            indicators.push_row(vec![s.time_column(), s.timestamp_label.clone(), label.to_owned()]);
        }
        tables.push(indicators);

        ExportFormatter::default().format(&tables)
    }

    fn reset(&mut self) {
        for channel in self.channels_mut() {
            channel.reset();
        }
        self.resp.reset();
        self.current = None;
        self.last_pace = None;
    }
}

impl EcgHolterDecoder {
    fn channels_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.ecg.iter_mut().chain([
            &mut self.pace_amplitude,
            &mut self.pace_width,
            &mut self.pace_polarity,
            &mut self.indicators,
        ])
    }
}
